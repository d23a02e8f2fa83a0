//! cryoqc-monitor library interface
//!
//! Exposes the ingestion, aggregation, artifact and transfer components for the
//! binary and for integration testing.

pub mod aggregate;
pub mod analysis;
pub mod artifacts;
pub mod models;
pub mod monitor;
pub mod services;
pub mod sources;
pub mod transfer;
pub mod utils;

pub use monitor::{QcMonitor, StepSummary};
