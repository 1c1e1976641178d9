//! Data Transfer Objects for the orchestrator API
//!
//! Requests accepted by the orchestrator and lightweight summaries returned by
//! its list endpoints. Full aggregates are returned as the domain types.

pub mod configuration;
pub mod deployment;
pub mod infrastructure;
pub mod lifecycle;
pub mod pipeline;
