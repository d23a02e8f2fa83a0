//! Utility modules for the QC monitor

pub mod blocking;
pub mod db_retry;

pub use blocking::{run_blocking, BlockingError};
pub use db_retry::retry_on_lock;
