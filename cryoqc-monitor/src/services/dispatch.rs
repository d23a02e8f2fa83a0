//! Bounded-concurrency dispatch of pipeline invocations
//!
//! Every accepted movie path is run through the [`PipelineRunner`] exactly once.
//! At most `workers` invocations run at the same time; further submissions wait
//! for a permit. [`DispatchPool::shutdown`] stops intake and waits for all
//! outstanding invocations, including queued ones, to finish. In-flight
//! invocations are never cancelled.

use super::backlog::has_accepted_extension;
use super::pipeline::{PipelineRunner, RunStatus};
use chrono::Utc;
use cryoqc_common::config::DispatchConfig;
use cryoqc_common::events::{EventBus, QcEvent};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::MutexGuard;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Result of [`DispatchPool::submit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued for exactly one pipeline invocation
    Accepted,
    /// Extension not in the allow-list
    Rejected,
    /// Path was already accepted earlier
    Duplicate,
    /// Pool is shutting down
    Closed,
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub accepted: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicUsize,
    rejected: AtomicUsize,
    duplicates: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

pub struct DispatchPool {
    runner: Arc<dyn PipelineRunner>,
    accepted_extensions: Vec<String>,
    workers: usize,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    seen: Mutex<HashSet<PathBuf>>,
    /// Held from the closed check until the invocation is in the tracker
    closed: Mutex<bool>,
    counters: Arc<Counters>,
    failures: Arc<Mutex<Vec<(PathBuf, RunStatus)>>>,
    event_bus: Option<EventBus>,
}

impl DispatchPool {
    pub fn new(
        runner: Arc<dyn PipelineRunner>,
        workers: usize,
        accepted_extensions: Vec<String>,
    ) -> Self {
        let workers = workers.max(1);
        Self {
            runner,
            accepted_extensions,
            workers,
            permits: Arc::new(Semaphore::new(workers)),
            tracker: TaskTracker::new(),
            seen: Mutex::new(HashSet::new()),
            closed: Mutex::new(false),
            counters: Arc::new(Counters::default()),
            failures: Arc::new(Mutex::new(Vec::new())),
            event_bus: None,
        }
    }

    pub fn from_config(runner: Arc<dyn PipelineRunner>, config: &DispatchConfig) -> Self {
        Self::new(runner, config.workers, config.accepted_extensions.clone())
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn accepts(&self, path: &Path) -> bool {
        has_accepted_extension(path, &self.accepted_extensions)
    }

    /// Queue one pipeline invocation for `path`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, path: impl Into<PathBuf>) -> SubmitOutcome {
        let path = path.into();

        let closed = self.lock_closed();
        if *closed {
            debug!(path = %path.display(), "Pool closed, submission ignored");
            return SubmitOutcome::Closed;
        }

        if !self.accepts(&path) {
            self.counters.rejected.fetch_add(1, Ordering::SeqCst);
            debug!(path = %path.display(), "Extension not accepted");
            return SubmitOutcome::Rejected;
        }

        let newly_seen = match self.seen.lock() {
            Ok(mut seen) => seen.insert(path.clone()),
            Err(poisoned) => poisoned.into_inner().insert(path.clone()),
        };
        if !newly_seen {
            self.counters.duplicates.fetch_add(1, Ordering::SeqCst);
            debug!(path = %path.display(), "Already dispatched");
            return SubmitOutcome::Duplicate;
        }

        self.counters.accepted.fetch_add(1, Ordering::SeqCst);
        info!(path = %path.display(), "Movie accepted");
        self.emit(QcEvent::MovieAccepted {
            path: path.clone(),
            timestamp: Utc::now(),
        });

        let runner = Arc::clone(&self.runner);
        let permits = Arc::clone(&self.permits);
        let counters = Arc::clone(&self.counters);
        let failures = Arc::clone(&self.failures);
        let event_bus = self.event_bus.clone();

        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!(path = %path.display(), "Worker permits closed, invocation dropped");
                return;
            };

            let running = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            counters.peak_in_flight.fetch_max(running, Ordering::SeqCst);

            if let Some(bus) = &event_bus {
                bus.emit_lossy(QcEvent::PipelineStarted {
                    path: path.clone(),
                    timestamp: Utc::now(),
                });
            }

            let success = match runner.run(&path).await {
                Ok(outcome) => {
                    debug!(path = %path.display(), stages = outcome.stages_run, "Invocation succeeded");
                    counters.succeeded.fetch_add(1, Ordering::SeqCst);
                    true
                }
                Err(e) => {
                    let status = runner.status(&path);
                    warn!(path = %path.display(), error = %e, ?status, "Invocation failed");
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    failures
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push((path.clone(), status));
                    false
                }
            };

            counters.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(bus) = &event_bus {
                bus.emit_lossy(QcEvent::PipelineFinished {
                    path,
                    success,
                    timestamp: Utc::now(),
                });
            }
        });
        drop(closed);

        SubmitOutcome::Accepted
    }

    pub fn stats(&self) -> DispatchStats {
        let c = &self.counters;
        DispatchStats {
            accepted: c.accepted.load(Ordering::SeqCst),
            rejected: c.rejected.load(Ordering::SeqCst),
            duplicates: c.duplicates.load(Ordering::SeqCst),
            succeeded: c.succeeded.load(Ordering::SeqCst),
            failed: c.failed.load(Ordering::SeqCst),
            in_flight: c.in_flight.load(Ordering::SeqCst),
            peak_in_flight: c.peak_in_flight.load(Ordering::SeqCst),
        }
    }

    /// Failed movies with the runner's last status for each
    pub fn failures(&self) -> Vec<(PathBuf, RunStatus)> {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Invocations accepted but not yet finished
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_closed(&self) -> bool {
        *self.lock_closed()
    }

    /// Stop intake and wait for every outstanding invocation
    pub async fn shutdown(&self) {
        {
            let mut closed = self.lock_closed();
            *closed = true;
            self.tracker.close();
        }

        let outstanding = self.tracker.len();
        if outstanding > 0 {
            info!(outstanding, "Draining dispatched pipeline invocations");
        }
        self.tracker.wait().await;

        let stats = self.stats();
        info!(
            accepted = stats.accepted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "Dispatch pool drained"
        );
    }

    fn lock_closed(&self) -> MutexGuard<'_, bool> {
        self.closed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: QcEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pipeline::{PipelineError, PipelineOutcome, RunStatus};
    use async_trait::async_trait;
    use std::time::Duration;

    struct CountingRunner {
        calls: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl PipelineRunner for CountingRunner {
        async fn run(&self, movie: &Path) -> Result<PipelineOutcome, PipelineError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.calls.lock().unwrap().push(movie.to_path_buf());
            Ok(PipelineOutcome {
                movie: movie.to_path_buf(),
                stages_run: 1,
                elapsed: Duration::from_millis(10),
            })
        }

        fn status(&self, _movie: &Path) -> RunStatus {
            RunStatus::Unknown
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl PipelineRunner for FailingRunner {
        async fn run(&self, _movie: &Path) -> Result<PipelineOutcome, PipelineError> {
            Err(PipelineError::StageFailed {
                stage: "align".to_string(),
                status: "exit status: 2".to_string(),
                stderr: String::new(),
            })
        }

        fn status(&self, _movie: &Path) -> RunStatus {
            RunStatus::Failed {
                stage: "align".to_string(),
                reason: "exit status: 2".to_string(),
            }
        }
    }

    fn pool(runner: Arc<CountingRunner>) -> DispatchPool {
        DispatchPool::new(runner, 2, vec!["mrc".to_string(), "mrcs".to_string()])
    }

    #[tokio::test]
    async fn test_submit_outcomes() {
        let runner = Arc::new(CountingRunner {
            calls: Mutex::new(Vec::new()),
        });
        let pool = pool(runner.clone());

        assert_eq!(pool.submit("/in/a.mrc"), SubmitOutcome::Accepted);
        assert_eq!(pool.submit("/in/a.mrc"), SubmitOutcome::Duplicate);
        assert_eq!(pool.submit("/in/a.MRC"), SubmitOutcome::Rejected);
        assert_eq!(pool.submit("/in/notes.txt"), SubmitOutcome::Rejected);

        pool.shutdown().await;
        assert_eq!(pool.submit("/in/b.mrc"), SubmitOutcome::Closed);

        assert_eq!(runner.calls.lock().unwrap().as_slice(), &[PathBuf::from("/in/a.mrc")]);
        let stats = pool.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.succeeded, 1);
    }

    #[tokio::test]
    async fn test_events_bracket_each_invocation() {
        let runner = Arc::new(CountingRunner {
            calls: Mutex::new(Vec::new()),
        });
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let pool = pool(runner).with_event_bus(bus);

        pool.submit("/in/a.mrcs");
        pool.shutdown().await;

        let kinds: Vec<&'static str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| match e {
                QcEvent::MovieAccepted { .. } => "accepted",
                QcEvent::PipelineStarted { .. } => "started",
                QcEvent::PipelineFinished { success: true, .. } => "finished",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["accepted", "started", "finished"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_accepted_submission_finishes_before_shutdown_returns() {
        let runner = Arc::new(CountingRunner {
            calls: Mutex::new(Vec::new()),
        });
        let pool = Arc::new(pool(runner.clone()));

        let submitter = tokio::spawn({
            let pool = pool.clone();
            async move {
                let mut accepted = 0usize;
                for i in 0.. {
                    match pool.submit(format!("/in/m_{}.mrc", i)) {
                        SubmitOutcome::Accepted => accepted += 1,
                        SubmitOutcome::Closed => break,
                        other => panic!("unexpected outcome {:?}", other),
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                accepted
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.shutdown().await;
        let finished = runner.calls.lock().unwrap().len();

        let accepted = submitter.await.unwrap();
        assert!(accepted > 0);
        assert_eq!(finished, accepted);
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_failures_keep_runner_status() {
        let pool = DispatchPool::new(Arc::new(FailingRunner), 1, vec!["mrc".to_string()]);
        pool.submit("/in/a.mrc");
        pool.shutdown().await;

        assert_eq!(pool.stats().failed, 1);
        assert_eq!(
            pool.failures(),
            vec![(
                PathBuf::from("/in/a.mrc"),
                RunStatus::Failed {
                    stage: "align".to_string(),
                    reason: "exit status: 2".to_string(),
                }
            )]
        );
    }
}
