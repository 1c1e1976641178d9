//! Core domain types
//!
//! This module contains the aggregates persisted by the orchestrator and
//! returned by its API. Each lifecycle-bearing entity implements
//! [`Stateful`](crate::lifecycle::Stateful) so its status only moves along its
//! transition table.

pub mod configuration;
pub mod deployment;
pub mod environment;
pub mod infrastructure;
pub mod pipeline;
