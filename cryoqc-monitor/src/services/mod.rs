//! Ingestion services
//!
//! Movie arrival → stability check → bounded dispatch into the external pipeline.

pub mod backlog;
pub mod dispatch;
pub mod ingest;
pub mod pipeline;
pub mod stable_file;
pub mod watcher;

pub use backlog::{has_accepted_extension, scan_backlog, ScanError};
pub use dispatch::{DispatchPool, DispatchStats, SubmitOutcome};
pub use ingest::{run_watch, IngestError, IngestSummary};
pub use pipeline::{
    expand_args, ExternalPipeline, PipelineError, PipelineOutcome, PipelineRunner, RunStatus,
    StageContext,
};
pub use stable_file::{wait_until_stable, StabilityError};
pub use watcher::DirectoryWatcher;
