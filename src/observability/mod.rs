//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via `tracing`, one subscriber set up at startup
//! - Metrics are cheap atomic updates behind the `metrics` facade,
//!   exposed by a Prometheus endpoint when enabled

pub mod logging;
pub mod metrics;
