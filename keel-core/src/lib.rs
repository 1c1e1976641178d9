//! Keel Core
//!
//! Core types and abstractions for the Keel deployment service.
//!
//! This crate contains:
//! - Lifecycle: the table-driven state machine shared by every entity kind
//! - Domain types: Deployments, pipelines, infrastructure and configurations
//! - DTOs: Data transfer objects for the orchestrator API

#[macro_use]
mod names;

pub mod domain;
pub mod dto;
pub mod lifecycle;

pub use names::UnknownName;
