//! Uppe observer - periodic endpoint probing with an append-only result log
//!
//! Endpoints are grouped by polling interval. Each group gets a scheduler
//! feeding a shared, bounded job queue; a fixed pool of workers probes the
//! jobs and a single sink appends every result as one JSON line.

pub mod config;
pub mod error;
pub mod loader;
pub mod monitoring;
pub mod orchestrator;

pub use error::ObserveError;
pub use orchestrator::{Orchestrator, PipelineReport, PipelineSettings};
