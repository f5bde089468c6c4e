// tests/tasks_test.rs

use std::sync::Arc;
use std::time::Duration;

use tally::db;
use tally::ledger::{CountLedger, CountQuery, SqliteCountLedger};
use tally::scope::{LedgerName, ScopeKey};
use tally::tasks::config::TaskConfig;
use tally::tasks::metrics::TaskMetrics;
use tally::tasks::{run_squash_task, TaskManager, SQUASH_TASK};

const COUNTS: LedgerName = LedgerName::from_static("test.tasks");

async fn create_test_ledger() -> SqliteCountLedger {
    let pool = db::memory_pool()
        .await
        .expect("Failed to create in-memory database");
    SqliteCountLedger::new(pool)
}

#[tokio::test]
async fn test_run_squash_task_records_metrics() {
    let ledger = create_test_ledger().await;
    let metrics = TaskMetrics::new();

    ledger.record(&COUNTS, &ScopeKey::org(1), 2, None).await.unwrap();
    ledger.record(&COUNTS, &ScopeKey::org(1), 3, None).await.unwrap();
    ledger.record(&COUNTS, &ScopeKey::org(2), 1, None).await.unwrap();
    ledger.record(&COUNTS, &ScopeKey::org(2), -1, None).await.unwrap();

    let report = run_squash_task(&ledger, 100, &metrics).await.unwrap();
    assert_eq!(report.squashed, 1);
    assert_eq!(report.cleared, 1);

    let stats = metrics.snapshot(SQUASH_TASK);
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.errors, 0);
    assert!(stats.last_duration.is_some());

    run_squash_task(&ledger, 100, &metrics).await.unwrap();
    let stats = metrics.snapshot(SQUASH_TASK);
    assert_eq!(stats.runs, 2);
    assert_eq!(stats.processed, 2);
}

#[tokio::test]
async fn test_task_manager_squashes_on_schedule() {
    let ledger = create_test_ledger().await;
    for _ in 0..3 {
        ledger.record(&COUNTS, &ScopeKey::org(1), 1, None).await.unwrap();
    }

    let config = TaskConfig {
        squash_enabled: true,
        squash_interval: Duration::from_millis(20),
        squash_batch: 100,
        metrics_interval: Duration::from_secs(3600),
    };
    let mut manager = TaskManager::new(Arc::new(ledger.clone()), config);
    let metrics = manager.metrics();
    manager.start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.shutdown().await;

    assert!(metrics.snapshot(SQUASH_TASK).runs >= 1);
    assert_eq!(ledger.total_rows().await.unwrap(), 1);
    assert_eq!(ledger.sum(&CountQuery::new(COUNTS)).await.unwrap(), 3);
}

#[tokio::test]
async fn test_task_manager_without_squash() {
    let ledger = create_test_ledger().await;
    ledger.record(&COUNTS, &ScopeKey::org(1), 1, None).await.unwrap();
    ledger.record(&COUNTS, &ScopeKey::org(1), 1, None).await.unwrap();

    let config = TaskConfig {
        squash_enabled: false,
        squash_interval: Duration::from_millis(20),
        squash_batch: 100,
        metrics_interval: Duration::from_secs(3600),
    };
    let mut manager = TaskManager::new(Arc::new(ledger.clone()), config);
    let metrics = manager.metrics();
    manager.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    manager.shutdown().await;

    assert_eq!(metrics.snapshot(SQUASH_TASK).runs, 0);
    assert_eq!(ledger.total_rows().await.unwrap(), 2);
}
