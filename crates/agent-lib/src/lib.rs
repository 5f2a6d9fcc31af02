//! Agent library for vSphere performance collection
//!
//! This crate provides the core functionality for:
//! - Loading and validating the counter catalog
//! - Talking to vSphere endpoints over the VI/JSON API
//! - Resolving source identities in the registry
//! - Submitting measurements to the ingestion backend
//! - Scheduled, overrun-safe poll cycles
//! - Health checks and observability

pub mod catalog;
pub mod counters;
pub mod endpoint;
pub mod error;
pub mod health;
mod http;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod poller;
pub mod source;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
