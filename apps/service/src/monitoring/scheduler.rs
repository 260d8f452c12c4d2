use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::checker::ProbeTransport;
use super::executor::CheckExecutor;
use super::processor::{OutcomeProcessor, Processed};
use super::validation::validate_check;
use crate::clock::Clock;
use crate::notify::Notifier;
use crate::storage::{CheckStore, LogSink};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(86_400);

/// Timing of the two scheduler cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub sweep_interval: Duration,
    pub rotation_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { sweep_interval: DEFAULT_SWEEP_INTERVAL, rotation_interval: DEFAULT_ROTATION_INTERVAL }
    }
}

/// What happened to a single listed check during a sweep
#[derive(Debug)]
enum Evaluation {
    Evaluated(Processed),
    Rejected,
    Unreadable,
}

/// Summary of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub listed: usize,
    pub evaluated: usize,
    pub alerted: usize,
    pub rejected: usize,
    /// Missing, unreadable, or lost to a panicked task
    pub unreadable: usize,
}

/// Summary of one rotation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub rotated: Vec<String>,
    pub failed: Vec<String>,
}

/// Join handles of the running cycles
pub struct SchedulerHandles {
    pub sweep: JoinHandle<()>,
    pub rotation: JoinHandle<()>,
}

impl SchedulerHandles {
    pub fn abort(&self) {
        self.sweep.abort();
        self.rotation.abort();
    }
}

/// Monitoring scheduler - drives the check sweep and log rotation cycles
pub struct Scheduler {
    store: Arc<dyn CheckStore>,
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    executor: CheckExecutor,
    processor: OutcomeProcessor,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn CheckStore>,
        sink: Arc<dyn LogSink>,
        notifier: Arc<dyn Notifier>,
        transport: Arc<dyn ProbeTransport>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let executor = CheckExecutor::new(transport, Arc::clone(&clock));
        let processor =
            OutcomeProcessor::new(Arc::clone(&store), Arc::clone(&sink), notifier, Arc::clone(&clock));

        Self { store, sink, clock, executor, processor, config }
    }

    /// Start both cycles. Each fires immediately, then on its interval.
    ///
    /// Every sweep tick spawns its own task, so a slow sweep overlaps with the
    /// next one instead of delaying it.
    pub fn start(self: &Arc<Self>) -> SchedulerHandles {
        let scheduler = Arc::clone(self);
        let sweep = tokio::spawn(async move {
            let mut timer = interval(scheduler.config.sweep_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;

                let runner = Arc::clone(&scheduler);
                tokio::spawn(async move {
                    let report = runner.sweep().await;
                    info!(
                        "Sweep completed: {} listed, {} evaluated, {} alerted, {} rejected, {} unreadable",
                        report.listed, report.evaluated, report.alerted, report.rejected, report.unreadable
                    );
                });
            }
        });

        let scheduler = Arc::clone(self);
        let rotation = tokio::spawn(async move {
            let mut timer = interval(scheduler.config.rotation_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;

                let report = scheduler.rotate_logs().await;
                info!(
                    "Log rotation completed: {} rotated, {} failed",
                    report.rotated.len(),
                    report.failed.len()
                );
            }
        });

        SchedulerHandles { sweep, rotation }
    }

    /// Evaluate every stored check once, concurrently
    pub async fn sweep(self: &Arc<Self>) -> SweepReport {
        let ids = match self.store.list_check_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Failed to list checks: {e}");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport { listed: ids.len(), ..SweepReport::default() };
        if ids.is_empty() {
            debug!("Could not find any checks to process");
            return report;
        }

        let mut tasks = JoinSet::new();
        for id in ids {
            let scheduler = Arc::clone(self);
            tasks.spawn(async move { scheduler.evaluate(&id).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Evaluation::Evaluated(processed)) => {
                    report.evaluated += 1;
                    if processed.alerted {
                        report.alerted += 1;
                    }
                }
                Ok(Evaluation::Rejected) => report.rejected += 1,
                Ok(Evaluation::Unreadable) => report.unreadable += 1,
                Err(e) => {
                    error!("Check evaluation task failed: {e}");
                    report.unreadable += 1;
                }
            }
        }

        report
    }

    /// Read, validate, probe and process a single check
    async fn evaluate(&self, id: &str) -> Evaluation {
        let raw = match self.store.read_check(id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(check = %id, "Listed check has no stored record, skipping");
                return Evaluation::Unreadable;
            }
            Err(e) => {
                warn!(check = %id, "Error reading check data: {e}");
                return Evaluation::Unreadable;
            }
        };

        let spec = match validate_check(&raw) {
            Ok(spec) => spec,
            Err(rejected) => {
                warn!(check = %id, "Check is not properly formatted, skipping it: {rejected}");
                return Evaluation::Rejected;
            }
        };

        let outcome = self.executor.execute(&spec).await;
        Evaluation::Evaluated(self.processor.process(spec, outcome).await)
    }

    /// Archive and truncate every live log that has data.
    ///
    /// Logs are rotated independently; one failing leaves the others alone and
    /// stays live until the next rotation.
    pub async fn rotate_logs(&self) -> RotationReport {
        let logs = match self.sink.list_rotatable().await {
            Ok(logs) => logs,
            Err(e) => {
                error!("Failed to list logs for rotation: {e}");
                return RotationReport::default();
            }
        };

        if logs.is_empty() {
            debug!("No log files to rotate");
            return RotationReport::default();
        }

        let stamp = self.clock.now().timestamp_millis();
        let results = join_all(logs.into_iter().map(|log_id| async move {
            let archive_id = format!("{log_id}-{stamp}");
            let rotated = self.rotate_one(&log_id, &archive_id).await;
            (log_id, rotated)
        }))
        .await;

        let mut report = RotationReport::default();
        for (log_id, rotated) in results {
            if rotated {
                report.rotated.push(log_id);
            } else {
                report.failed.push(log_id);
            }
        }
        report
    }

    async fn rotate_one(&self, log_id: &str, archive_id: &str) -> bool {
        match self.sink.rotate(log_id, archive_id).await {
            Ok(()) => {
                debug!(log = %log_id, archive = %archive_id, "Log rotated");
                true
            }
            Err(e) => {
                warn!(log = %log_id, "Error rotating log file: {e}");
                false
            }
        }
    }
}
