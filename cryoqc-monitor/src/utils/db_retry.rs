//! Store lock retry
//!
//! Metadata stores are written by the running pipeline while the monitor reads
//! them, so a read can hit SQLite's "database is locked". Such reads are retried
//! with exponential backoff until `max_wait_ms` elapses; any other error fails
//! immediately.
//!
//! **Backoff:** starts at 10ms, doubles per attempt, capped at 1000ms.

use cryoqc_common::{Error, Result};
use std::time::{Duration, Instant};

/// Retry a store operation while it reports a lock conflict
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g. the store path)
/// * `max_wait_ms` - Maximum total time to keep retrying
/// * `operation` - Async closure performing the read
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Store read succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !is_lock_error(&err) => return Err(err),
            Err(err) => {
                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms,
                        "Store still locked, giving up for this cycle"
                    );
                    return Err(err);
                }

                tracing::debug!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Store locked, retrying after backoff"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}

/// Whether the error is a transient SQLite lock conflict
pub fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => {
            let message = db_err.to_string();
            message.contains("database is locked") || message.contains("database is busy")
        }
        _ => false,
    }
}
