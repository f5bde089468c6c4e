// src/tasks/config.rs
// Configuration for background tasks

use std::time::Duration;

use crate::config::TallyConfig;

#[derive(Debug, Clone)]
pub struct TaskConfig {
    // Squash scheduler
    pub squash_enabled: bool,
    pub squash_interval: Duration,
    pub squash_batch: usize,

    // Metrics reporter
    pub metrics_interval: Duration,
}

impl TaskConfig {
    pub fn from_config(config: &TallyConfig) -> Self {
        Self {
            squash_enabled: config.squash_enabled,
            squash_interval: config.squash_interval(),
            squash_batch: config.squash_batch.max(1),
            // Report every hour
            metrics_interval: Duration::from_secs(3600),
        }
    }

    /// Get a human-readable summary of the configuration
    pub fn summary(&self) -> String {
        format!(
            "Tasks Config:\n\
            - Squash: {} (every {} secs, batch {})\n\
            - Metrics report: every {} min",
            if self.squash_enabled { "ON" } else { "OFF" },
            self.squash_interval.as_secs(),
            self.squash_batch,
            self.metrics_interval.as_secs() / 60,
        )
    }
}
