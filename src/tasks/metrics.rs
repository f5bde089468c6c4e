// src/tasks/metrics.rs

//! Task metrics tracking

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub runs: usize,
    pub processed: usize,
    pub errors: usize,
    pub last_duration: Option<Duration>,
}

#[derive(Default)]
pub struct TaskMetrics {
    tasks: Mutex<HashMap<String, TaskStats>>,
}

impl TaskMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskStats>> {
        self.tasks.lock()
    }

    pub fn add_processed_items(&self, task: &str, count: usize) {
        self.lock().entry(task.to_string()).or_default().processed += count;
    }

    pub fn record_error(&self, task: &str) {
        self.lock().entry(task.to_string()).or_default().errors += 1;
    }

    pub fn record_task_duration(&self, task: &str, duration: Duration) {
        let mut map = self.lock();
        let stats = map.entry(task.to_string()).or_default();
        stats.runs += 1;
        stats.last_duration = Some(duration);
    }

    pub fn snapshot(&self, task: &str) -> TaskStats {
        self.lock().get(task).cloned().unwrap_or_default()
    }

    pub fn report(&self) {
        for (task, stats) in self.lock().iter() {
            info!(
                "Task '{}': runs={}, processed={}, errors={}, last={:?}",
                task, stats.runs, stats.processed, stats.errors, stats.last_duration
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_per_task() {
        let metrics = TaskMetrics::new();
        metrics.add_processed_items("squash", 3);
        metrics.add_processed_items("squash", 2);
        metrics.record_error("squash");
        metrics.record_task_duration("squash", Duration::from_millis(5));

        let stats = metrics.snapshot("squash");
        assert_eq!(stats.processed, 5);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.last_duration, Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_unknown_task_is_empty() {
        assert_eq!(TaskMetrics::new().snapshot("nope"), TaskStats::default());
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = TaskMetrics::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        metrics.add_processed_items("squash", 1);
                    }
                });
            }
        });
        assert_eq!(metrics.snapshot("squash").processed, 400);
    }
}
