//! File stability detection
//!
//! A file is ready once its size is identical across two checks one interval
//! apart. There is no upper bound on the wait; the caller cancels instead.
//!
//! A zero-byte file that never grows counts as stable after one interval.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum StabilityError {
    #[error("Stability wait cancelled: {0}")]
    Cancelled(PathBuf),

    #[error("Cannot stat {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
}

/// Wait until the size of `path` stops changing; returns the final size
pub async fn wait_until_stable(
    path: &Path,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<u64, StabilityError> {
    let mut previous = file_size(path).await?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(StabilityError::Cancelled(path.to_path_buf()));
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let current = file_size(path).await?;
        if current == previous {
            tracing::debug!(path = %path.display(), size = current, "File stable");
            return Ok(current);
        }

        tracing::trace!(
            path = %path.display(),
            previous,
            current,
            "File still growing"
        );
        previous = current;
    }
}

async fn file_size(path: &Path) -> Result<u64, StabilityError> {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|e| StabilityError::Io(path.to_path_buf(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unchanged_file_is_stable_after_one_interval() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("movie.mrcs");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        let size = wait_until_stable(&path, Duration::from_millis(20), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(size, 64);
    }

    #[tokio::test]
    async fn test_empty_file_counts_as_stable() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.mrc");
        std::fs::File::create(&path).unwrap();

        let size = wait_until_stable(&path, Duration::from_millis(10), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(size, 0);
    }

    #[tokio::test]
    async fn test_growing_file_waits_for_writer() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("growing.mrcs");
        let mut file = std::fs::File::create(&path).unwrap();

        let writer = std::thread::spawn(move || {
            for _ in 0..5 {
                file.write_all(&[1u8; 100]).unwrap();
                file.flush().unwrap();
                std::thread::sleep(Duration::from_millis(20));
            }
        });

        let size = wait_until_stable(&path, Duration::from_millis(250), &CancellationToken::new())
            .await
            .unwrap();
        writer.join().unwrap();

        assert_eq!(size, 500);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_wait() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("movie.mrcs");
        std::fs::write(&path, b"data").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = wait_until_stable(&path, Duration::from_secs(60), &cancel).await;
        assert!(matches!(result, Err(StabilityError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let result = wait_until_stable(
            &temp.path().join("gone.mrc"),
            Duration::from_millis(10),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(StabilityError::Io(_, _))));
    }
}
