//! QC polling loop
//!
//! One step: read every metadata store, merge, rewrite the consolidated table,
//! then generate missing artifacts. Steps repeat every sampling interval until
//! the configured run time is spent or the loop is cancelled. Cancellation never
//! interrupts a step halfway through a table write.

use crate::aggregate::{PollSummary, RecordAggregator};
use crate::artifacts::{ArtifactGenerator, ArtifactJob, GenerationSummary};
use cryoqc_common::config::QcConfig;
use cryoqc_common::events::EventBus;
use cryoqc_common::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Result of one monitor step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepSummary {
    pub poll: PollSummary,
    pub artifacts: GenerationSummary,
}

pub struct QcMonitor {
    project: PathBuf,
    aggregator: RecordAggregator,
    generator: ArtifactGenerator,
    sampling_interval: Duration,
    monitor_time: Option<Duration>,
}

impl QcMonitor {
    pub fn new(project: impl Into<PathBuf>, aggregator: RecordAggregator, generator: ArtifactGenerator) -> Self {
        Self {
            project: project.into(),
            aggregator,
            generator,
            sampling_interval: Duration::from_secs(60),
            monitor_time: None,
        }
    }

    pub fn from_config(config: &QcConfig, project: impl Into<PathBuf>, event_bus: EventBus) -> Self {
        let project = project.into();
        let aggregator =
            RecordAggregator::from_config(config, project.clone()).with_event_bus(event_bus.clone());
        let generator = ArtifactGenerator::from_config(config).with_event_bus(event_bus);

        Self::new(project, aggregator, generator)
            .with_sampling_interval(config.qc.sampling_interval())
            .with_monitor_time(config.qc.monitor_time())
    }

    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    /// `None` runs until cancelled
    pub fn with_monitor_time(mut self, monitor_time: Option<Duration>) -> Self {
        self.monitor_time = monitor_time;
        self
    }

    pub fn aggregator(&self) -> &RecordAggregator {
        &self.aggregator
    }

    pub fn generator(&self) -> &ArtifactGenerator {
        &self.generator
    }

    /// Read, merge, write the table, then render missing artifacts
    pub async fn step(&mut self) -> Result<StepSummary> {
        let poll = self.aggregator.poll().await?;
        let jobs = ArtifactJob::from_table(self.aggregator.table(), &self.project);
        let artifacts = self.generator.generate_all(jobs).await;

        info!(
            records = poll.records,
            rendered = artifacts.rendered,
            failed = artifacts.failed,
            "QC step complete"
        );

        Ok(StepSummary { poll, artifacts })
    }

    /// Step repeatedly until the run time is spent or `cancel` fires
    pub async fn run(&mut self, cancel: CancellationToken) -> usize {
        let deadline = self.monitor_time.map(|t| Instant::now() + t);
        let mut steps = 0usize;

        info!(
            project = %self.project.display(),
            interval_secs = self.sampling_interval.as_secs(),
            "QC monitor started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if let Err(e) = self.step().await {
                error!(error = %e, "QC step failed");
            }
            steps += 1;

            if deadline_passed(deadline) || sleep_or_cancel(self.sampling_interval, &cancel).await {
                break;
            }
        }

        info!(steps, "QC monitor stopped");
        steps
    }
}

pub(crate) fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Sleep for `interval`; returns true if cancelled first
pub(crate) async fn sleep_or_cancel(interval: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(interval) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn monitor(temp: &TempDir) -> QcMonitor {
        let project = temp.path().join("project");
        let qc = temp.path().join("qc");
        QcMonitor::new(
            &project,
            RecordAggregator::new(&project, qc.join("qc_summary.csv")),
            ArtifactGenerator::new(qc.join("extra")),
        )
        .with_sampling_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_step_on_empty_project_writes_header_only() {
        let temp = TempDir::new().unwrap();
        let mut monitor = monitor(&temp);

        let summary = monitor.step().await.unwrap();
        assert_eq!(summary.poll.records, 0);

        let text = std::fs::read_to_string(temp.path().join("qc/qc_summary.csv")).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_at_monitor_time() {
        let temp = TempDir::new().unwrap();
        let mut monitor = monitor(&temp).with_monitor_time(Some(Duration::from_millis(50)));

        let steps = monitor.run(CancellationToken::new()).await;
        assert!(steps >= 1);
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let temp = TempDir::new().unwrap();
        let mut monitor = monitor(&temp).with_sampling_interval(Duration::from_secs(3600));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let steps = tokio::time::timeout(Duration::from_secs(10), monitor.run(cancel))
            .await
            .unwrap();
        assert_eq!(steps, 1);
    }
}
