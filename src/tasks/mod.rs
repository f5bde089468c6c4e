// src/tasks/mod.rs

//! Background task management.
//! Runs the squasher on a fixed interval and reports task metrics.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info};

use crate::error::Result;
use crate::ledger::{CountLedger, SquashReport};

pub mod config;
pub mod metrics;

use config::TaskConfig;
use metrics::TaskMetrics;

pub const SQUASH_TASK: &str = "squash";

/// Manages the ledger's background tasks
pub struct TaskManager {
    ledger: Arc<dyn CountLedger>,
    config: TaskConfig,
    metrics: Arc<TaskMetrics>,
    handles: Vec<JoinHandle<()>>,
}

impl TaskManager {
    pub fn new(ledger: Arc<dyn CountLedger>, config: TaskConfig) -> Self {
        Self {
            ledger,
            config,
            metrics: Arc::new(TaskMetrics::new()),
            handles: Vec::new(),
        }
    }

    pub fn metrics(&self) -> Arc<TaskMetrics> {
        self.metrics.clone()
    }

    /// Starts all background tasks
    pub fn start(&mut self) {
        info!("Starting background task manager");

        if self.config.squash_enabled {
            let handle = self.spawn_squash_scheduler();
            self.handles.push(handle);
        }

        let handle = self.spawn_metrics_reporter();
        self.handles.push(handle);

        info!("Started {} background tasks", self.handles.len());
    }

    /// Spawns the squash scheduler task.
    ///
    /// Missed ticks are skipped, so a slow cycle never overlaps the next one.
    fn spawn_squash_scheduler(&self) -> JoinHandle<()> {
        let ledger = self.ledger.clone();
        let interval = self.config.squash_interval;
        let batch = self.config.squash_batch;
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            info!("Squash scheduler started (interval: {:?}, batch: {})", interval, batch);

            let mut interval_timer = time::interval(interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;
                // failures are already logged and counted inside
                let _ = run_squash_task(ledger.as_ref(), batch, &metrics).await;
            }
        })
    }

    /// Spawns the metrics reporter task
    fn spawn_metrics_reporter(&self) -> JoinHandle<()> {
        let metrics = self.metrics.clone();
        let interval = self.config.metrics_interval;

        tokio::spawn(async move {
            let mut interval_timer = time::interval(interval);
            interval_timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                interval_timer.tick().await;
                metrics.report();
            }
        })
    }

    /// Gracefully shuts down all tasks
    pub async fn shutdown(self) {
        info!("Shutting down {} background tasks", self.handles.len());

        for handle in self.handles {
            handle.abort();
        }

        self.metrics.report();
    }
}

/// One squash cycle with metrics bookkeeping.
pub async fn run_squash_task(
    ledger: &dyn CountLedger,
    batch: usize,
    metrics: &TaskMetrics,
) -> Result<SquashReport> {
    let start = Instant::now();

    match ledger.squash(batch).await {
        Ok(report) => {
            metrics.record_task_duration(SQUASH_TASK, start.elapsed());
            metrics.add_processed_items(SQUASH_TASK, report.squashed + report.cleared);
            for _ in 0..report.failed {
                metrics.record_error(SQUASH_TASK);
            }
            Ok(report)
        }
        Err(e) => {
            error!("Squash cycle failed: {:#}", e);
            metrics.record_error(SQUASH_TASK);
            Err(e)
        }
    }
}
