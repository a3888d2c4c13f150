//! Recurring flush across all registered indices
//!
//! [`FlushTask`] is one unit of background work: a periodic upload for
//! every index in the registry, run concurrently. Its [`WorkResult`] tells
//! the host scheduler whether to come back at the regular cadence or sooner
//! with backoff. [`FlushScheduler`] is the default host scheduler.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;

use crate::config::SchedulerConfig;
use crate::registry::Registry;
use crate::uploader::UploadOutcome;

/// What the scheduler should do after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    Success,
    /// At least one index failed; run again after backoff
    Retry,
}

/// Per-index outcomes of one flush run
#[derive(Debug, Clone, Default)]
pub struct FlushReport {
    pub outcomes: Vec<(String, UploadOutcome)>,
}

impl FlushReport {
    pub fn result(&self) -> WorkResult {
        if self.outcomes.iter().all(|(_, outcome)| outcome.is_success()) {
            WorkResult::Success
        } else {
            WorkResult::Retry
        }
    }

    /// Indices whose upload did not succeed
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(index, _)| index.as_str())
            .collect()
    }

    /// Total events delivered in this run
    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, outcome)| match outcome {
                UploadOutcome::Delivered { count } => *count,
                _ => 0,
            })
            .sum()
    }
}

/// Periodic upload of every registered index
#[derive(Clone)]
pub struct FlushTask {
    registry: Arc<Registry>,
}

impl FlushTask {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run once and collect every index outcome
    pub async fn run_report(&self) -> FlushReport {
        let trackers = self.registry.all();
        let indices: Vec<&str> = trackers.iter().map(|t| t.index()).collect();
        tracing::info!(indices = ?indices, "Flush started");

        let outcomes = join_all(trackers.iter().map(|tracker| async move {
            let outcome = tracker.uploader().periodic_upload().await;
            (tracker.index().to_string(), outcome)
        }))
        .await;

        let report = FlushReport { outcomes };
        tracing::info!(
            result = ?report.result(),
            delivered = report.delivered(),
            failed = ?report.failed(),
            "Flush finished"
        );
        report
    }

    /// Run once; `Success` only if every index succeeded
    pub async fn run(&self) -> WorkResult {
        self.run_report().await.result()
    }
}

/// Exponential backoff between retries
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: None,
        }
    }

    /// Delay before the next retry; doubles on every call up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(current) => current.saturating_mul(2),
        }
        .min(self.max);
        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Runs a [`FlushTask`] on an interval until told to stop
pub struct FlushScheduler {
    task: FlushTask,
    interval: Duration,
    backoff: Backoff,
}

impl FlushScheduler {
    pub fn new(task: FlushTask, interval: Duration, backoff: Backoff) -> Self {
        Self {
            task,
            interval,
            backoff,
        }
    }

    pub fn from_config(task: FlushTask, config: &SchedulerConfig) -> Self {
        Self::new(
            task,
            config.flush_interval(),
            Backoff::new(config.initial_backoff(), config.max_backoff()),
        )
    }

    /// Run immediately, then keep running until `shutdown` flips to true
    /// or its sender is dropped. An in-flight run always completes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Flush scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.task.run().await {
                WorkResult::Success => {
                    self.backoff.reset();
                    self.interval
                }
                WorkResult::Retry => {
                    let delay = self.backoff.next_delay();
                    tracing::debug!(delay_ms = delay.as_millis() as u64, "Flush retry scheduled");
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Flush scheduler stopped");
    }
}
