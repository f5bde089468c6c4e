// src/ledger/sqlite.rs
// SQLite-backed CountLedger

use std::collections::BTreeMap;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use super::query::CountQuery;
use super::squash::{run_squash_cycle, SquashReport};
use super::{CountLedger, CountRow, RecordEntry, YearMonth};
use crate::error::Result;
use crate::scope::{LedgerName, ScopeFilter, ScopeKey};

const INSERT_ROW: &str = r#"
    INSERT INTO count_rows (ledger, scope, day, delta, seconds, is_squashed)
    VALUES (?, ?, ?, ?, ?, 0)
"#;

#[derive(Clone)]
pub struct SqliteCountLedger {
    pub pool: SqlitePool,
    /// Where the next squash cycle resumes; shared by clones
    squash_cursor: Arc<AtomicI64>,
}

impl SqliteCountLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            squash_cursor: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Number of stored rows matching `query`, squashed or not.
    pub async fn row_count(&self, query: &CountQuery) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM count_rows");
        query.push_where(&mut qb);
        Ok(qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?)
    }

    /// Number of stored rows across every ledger.
    pub async fn total_rows(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM count_rows")
            .fetch_one(&self.pool)
            .await?)
    }
}

#[async_trait]
impl CountLedger for SqliteCountLedger {
    async fn record(
        &self,
        ledger: &LedgerName,
        scope: &ScopeKey,
        delta: i64,
        day: Option<NaiveDate>,
    ) -> Result<()> {
        sqlx::query(INSERT_ROW)
            .bind(ledger.as_str())
            .bind(scope.as_str())
            .bind(day)
            .bind(delta)
            .bind(0_i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_timing(
        &self,
        ledger: &LedgerName,
        scope: &ScopeKey,
        day: NaiveDate,
        count: i64,
        seconds: i64,
    ) -> Result<()> {
        sqlx::query(INSERT_ROW)
            .bind(ledger.as_str())
            .bind(scope.as_str())
            .bind(day)
            .bind(count)
            .bind(seconds)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_many(&self, entries: &[RecordEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(INSERT_ROW)
                .bind(entry.ledger.as_str())
                .bind(entry.scope.as_str())
                .bind(entry.day)
                .bind(entry.delta)
                .bind(entry.seconds)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("recorded {} count rows", entries.len());
        Ok(())
    }

    async fn sum(&self, query: &CountQuery) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COALESCE(SUM(delta), 0) FROM count_rows");
        query.push_where(&mut qb);
        Ok(qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?)
    }

    async fn day_totals(&self, query: &CountQuery) -> Result<Vec<(NaiveDate, i64)>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT day, SUM(delta) FROM count_rows");
        query.push_where(&mut qb);
        qb.push(" AND day IS NOT NULL GROUP BY day ORDER BY day");

        Ok(qb
            .build_query_as::<(NaiveDate, i64)>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn month_totals(&self, query: &CountQuery) -> Result<Vec<(YearMonth, i64)>> {
        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT substr(day, 1, 7) AS month, SUM(delta) FROM count_rows");
        query.push_where(&mut qb);
        qb.push(" AND day IS NOT NULL GROUP BY month ORDER BY month");

        let rows = qb
            .build_query_as::<(String, i64)>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(month, total)| -> Result<(YearMonth, i64)> { Ok((month.parse()?, total)) })
            .collect()
    }

    async fn scope_totals(&self, query: &CountQuery) -> Result<BTreeMap<ScopeKey, i64>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT scope, SUM(delta) FROM count_rows");
        query.push_where(&mut qb);
        qb.push(" GROUP BY scope");

        let rows = qb
            .build_query_as::<(String, i64)>()
            .fetch_all(&self.pool)
            .await?;

        let mut totals = BTreeMap::new();
        if let ScopeFilter::Exact(requested) = &query.scopes {
            for scope in requested {
                totals.insert(scope.clone(), 0);
            }
        }
        for (scope, total) in rows {
            totals.insert(ScopeKey::parse(&scope)?, total);
        }
        Ok(totals)
    }

    async fn day_averages(&self, query: &CountQuery, rounded: bool) -> Result<Vec<(NaiveDate, f64)>> {
        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT day, SUM(delta), SUM(seconds) FROM count_rows");
        query.push_where(&mut qb);
        qb.push(" AND day IS NOT NULL GROUP BY day ORDER BY day");

        let rows = qb
            .build_query_as::<(NaiveDate, i64, i64)>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter(|(_, count, _)| *count != 0)
            .map(|(day, count, seconds)| {
                let average = seconds as f64 / count as f64;
                (day, if rounded { average.round() } else { average })
            })
            .collect())
    }

    async fn rows(&self, query: &CountQuery) -> Result<Vec<CountRow>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, ledger, scope, day, delta, seconds, is_squashed FROM count_rows",
        );
        query.push_where(&mut qb);
        qb.push(" ORDER BY id");

        let rows = qb.build().fetch_all(&self.pool).await?;

        rows.iter()
            .map(|r| -> Result<CountRow> {
                Ok(CountRow {
                    id: r.try_get("id")?,
                    ledger: r.try_get("ledger")?,
                    scope: ScopeKey::parse(r.try_get::<&str, _>("scope")?)?,
                    day: r.try_get("day")?,
                    delta: r.try_get("delta")?,
                    seconds: r.try_get("seconds")?,
                    is_squashed: r.try_get("is_squashed")?,
                })
            })
            .collect()
    }

    async fn squash(&self, limit: usize) -> Result<SquashReport> {
        run_squash_cycle(&self.pool, limit, &self.squash_cursor).await
    }
}
