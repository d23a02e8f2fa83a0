//! Bounded blocking calls
//!
//! Image decoding and chart rendering are synchronous and can stall on odd
//! inputs. They run on the blocking pool under a deadline so one slow artifact
//! cannot hold up the poll cycle. A call that times out keeps running in the
//! background; its result is discarded.

use std::time::Duration;
use thiserror::Error;

/// Failure of a bounded blocking call
#[derive(Debug, Error)]
pub enum BlockingError {
    #[error("{0} timed out after {1:?}")]
    TimedOut(String, Duration),

    #[error("{0} panicked: {1}")]
    Panicked(String, String),
}

/// Run `f` on the blocking pool, giving up after `timeout`
pub async fn run_blocking<T, F>(label: &str, timeout: Duration, f: F) -> Result<T, BlockingError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_err)) => Err(BlockingError::Panicked(label.to_string(), join_err.to_string())),
        Err(_) => Err(BlockingError::TimedOut(label.to_string(), timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_value_within_deadline() {
        let value = run_blocking("sum", Duration::from_secs(5), || 2 + 2).await.unwrap();
        assert_eq!(value, 4);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let result = run_blocking("sleep", Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(500));
        })
        .await;
        assert!(matches!(result, Err(BlockingError::TimedOut(_, _))));
    }
}
