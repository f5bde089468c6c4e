// src/ledger/squash.rs

//! Squasher: compacts every `(ledger, scope, day)` key that has unsquashed
//! rows into a single squashed row.
//!
//! Each key is handled in its own `BEGIN IMMEDIATE` transaction, so the read
//! happens under the write lock and never races a snapshot upgrade. The rows
//! read are deleted by id, never by re-evaluating the key predicate, so a row
//! appended after the read survives and is folded in on a later cycle. A key
//! whose rows sum to zero is removed outright.
//!
//! Candidates are taken oldest first, resuming after the last key of the
//! previous cycle, so keys that keep failing can't starve the rest.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TallyError};

/// Deletes are issued in chunks to stay under SQLite's bound-variable limit
const DELETE_CHUNK: usize = 500;

/// What one squash cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SquashReport {
    /// Keys with unsquashed rows picked up by the cycle
    pub keys_seen: usize,
    /// Keys collapsed into one squashed row
    pub squashed: usize,
    /// Keys that summed to zero and were removed
    pub cleared: usize,
    /// Keys another squasher had already handled
    pub skipped: usize,
    /// Keys whose transaction failed; retried next cycle
    pub failed: usize,
    pub rows_removed: usize,
}

impl SquashReport {
    pub fn did_work(&self) -> bool {
        self.squashed + self.cleared + self.failed > 0
    }

    fn add(&mut self, outcome: SquashOutcome) {
        match outcome {
            SquashOutcome::Squashed { removed } => {
                self.squashed += 1;
                self.rows_removed += removed;
            }
            SquashOutcome::Cleared { removed } => {
                self.cleared += 1;
                self.rows_removed += removed;
            }
            SquashOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Fold another cycle's report into this one.
    pub fn merge(&mut self, other: &SquashReport) {
        self.keys_seen += other.keys_seen;
        self.squashed += other.squashed;
        self.cleared += other.cleared;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.rows_removed += other.rows_removed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SquashKey {
    pub ledger: String,
    pub scope: String,
    pub day: Option<NaiveDate>,
    /// Oldest unsquashed row id of the key
    pub first_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SquashOutcome {
    Squashed { removed: usize },
    Cleared { removed: usize },
    Skipped,
}

/// Runs one squash cycle over at most `limit` keys, starting after `cursor`
/// and advancing it.
pub async fn run_squash_cycle(
    pool: &SqlitePool,
    limit: usize,
    cursor: &AtomicI64,
) -> Result<SquashReport> {
    let keys = candidate_keys(pool, limit, cursor.load(Ordering::Relaxed)).await?;
    cursor.store(keys.last().map_or(0, |key| key.first_id), Ordering::Relaxed);

    let mut report = SquashReport {
        keys_seen: keys.len(),
        ..Default::default()
    };

    for key in &keys {
        match squash_key(pool, key).await {
            Ok(outcome) => {
                debug!(ledger = %key.ledger, scope = %key.scope, day = ?key.day, ?outcome, "squashed key");
                report.add(outcome);
            }
            Err(err) if err.is_transient() => {
                warn!(
                    ledger = %key.ledger,
                    scope = %key.scope,
                    day = ?key.day,
                    "squash conflict, will retry next cycle: {err}"
                );
                report.failed += 1;
            }
            Err(err) => {
                error!(
                    ledger = %key.ledger,
                    scope = %key.scope,
                    day = ?key.day,
                    "squash failed: {err}"
                );
                report.failed += 1;
            }
        }
    }

    if report.did_work() {
        info!(
            "squash cycle: {} keys, {} squashed, {} cleared, {} failed, {} rows removed",
            report.keys_seen, report.squashed, report.cleared, report.failed, report.rows_removed
        );
    }
    Ok(report)
}

/// Keys with unsquashed rows, oldest first, whose oldest row id comes after
/// `after`; wraps around to the start when that leaves room in the batch.
async fn candidate_keys(pool: &SqlitePool, limit: usize, after: i64) -> Result<Vec<SquashKey>> {
    let mut keys = keys_in_range(pool, after, i64::MAX, limit).await?;
    if keys.len() < limit && after > 0 {
        let rest = keys_in_range(pool, 0, after, limit - keys.len()).await?;
        keys.extend(rest);
    }
    Ok(keys)
}

/// Keys whose oldest unsquashed row id is in `(after, upto]`.
async fn keys_in_range(
    pool: &SqlitePool,
    after: i64,
    upto: i64,
    limit: usize,
) -> Result<Vec<SquashKey>> {
    let rows = sqlx::query(
        r#"
        SELECT ledger, scope, day, MIN(id) AS first_id
        FROM count_rows
        WHERE is_squashed = 0
        GROUP BY ledger, scope, day
        HAVING MIN(id) > ? AND MIN(id) <= ?
        ORDER BY first_id
        LIMIT ?
        "#,
    )
    .bind(after)
    .bind(upto)
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| -> Result<SquashKey> {
            Ok(SquashKey {
                ledger: r.try_get("ledger")?,
                scope: r.try_get("scope")?,
                day: r.try_get("day")?,
                first_id: r.try_get("first_id")?,
            })
        })
        .collect()
}

/// A `BEGIN IMMEDIATE` transaction on a pooled connection.
///
/// Dropped without `commit`/`rollback` (error or cancellation), the
/// connection is closed rather than returned, which rolls the transaction back.
struct ImmediateTx {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

impl ImmediateTx {
    async fn begin(pool: &SqlitePool) -> Result<Self> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn, open: true })
    }

    fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    async fn commit(mut self) -> Result<()> {
        sqlx::query("COMMIT").execute(self.conn()).await?;
        self.open = false;
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        sqlx::query("ROLLBACK").execute(self.conn()).await?;
        self.open = false;
        Ok(())
    }
}

impl Drop for ImmediateTx {
    fn drop(&mut self) {
        if self.open {
            self.conn.close_on_drop();
        }
    }
}

/// Squashes one key in its own transaction.
pub(crate) async fn squash_key(pool: &SqlitePool, key: &SquashKey) -> Result<SquashOutcome> {
    let mut tx = ImmediateTx::begin(pool).await?;

    let rows = sqlx::query(
        r#"
        SELECT id, delta, seconds, is_squashed
        FROM count_rows
        WHERE ledger = ? AND scope = ? AND day IS ?
        ORDER BY id
        "#,
    )
    .bind(key.ledger.as_str())
    .bind(key.scope.as_str())
    .bind(key.day)
    .fetch_all(tx.conn())
    .await?;

    // partial sums may leave i64 as long as the total doesn't
    let mut ids = Vec::with_capacity(rows.len());
    let mut delta: i128 = 0;
    let mut seconds: i128 = 0;
    let mut unsquashed = 0usize;
    for r in &rows {
        ids.push(r.try_get::<i64, _>("id")?);
        delta += i128::from(r.try_get::<i64, _>("delta")?);
        seconds += i128::from(r.try_get::<i64, _>("seconds")?);
        if !r.try_get::<bool, _>("is_squashed")? {
            unsquashed += 1;
        }
    }

    // lost the race: another squasher got here first
    if unsquashed == 0 {
        tx.rollback().await?;
        return Ok(SquashOutcome::Skipped);
    }

    let (delta, seconds) = match (i64::try_from(delta), i64::try_from(seconds)) {
        (Ok(delta), Ok(seconds)) => (delta, seconds),
        _ => {
            tx.rollback().await?;
            return Err(TallyError::Overflow(format!(
                "{}/{} totals (delta {delta}, seconds {seconds}) do not fit in 64 bits",
                key.ledger, key.scope
            )));
        }
    };

    for chunk in ids.chunks(DELETE_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM count_rows WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        qb.build().execute(tx.conn()).await?;
    }

    let outcome = if delta == 0 && seconds == 0 {
        SquashOutcome::Cleared { removed: ids.len() }
    } else {
        sqlx::query(
            r#"
            INSERT INTO count_rows (ledger, scope, day, delta, seconds, is_squashed)
            VALUES (?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(key.ledger.as_str())
        .bind(key.scope.as_str())
        .bind(key.day)
        .bind(delta)
        .bind(seconds)
        .execute(tx.conn())
        .await?;
        SquashOutcome::Squashed { removed: ids.len() }
    };

    tx.commit().await?;
    Ok(outcome)
}
