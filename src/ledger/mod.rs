// src/ledger/mod.rs

//! The count ledger: an append-only table of `(ledger, scope, day, delta)`
//! rows plus the squasher that compacts them.
//!
//! All reads and writes go through [`CountLedger`]; business code never
//! touches the table directly.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::error::{Result, TallyError};
use crate::scope::{LedgerName, ScopeKey};

pub mod query;
pub mod sqlite;
pub mod squash;

pub use query::CountQuery;
pub use sqlite::SqliteCountLedger;
pub use squash::SquashReport;

/// One stored ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountRow {
    pub id: i64,
    pub ledger: String,
    pub scope: ScopeKey,
    pub day: Option<NaiveDate>,
    pub delta: i64,
    pub seconds: i64,
    pub is_squashed: bool,
}

/// One row to append
#[derive(Debug, Clone)]
pub struct RecordEntry {
    pub ledger: LedgerName,
    pub scope: ScopeKey,
    pub day: Option<NaiveDate>,
    pub delta: i64,
    pub seconds: i64,
}

impl RecordEntry {
    pub fn count(ledger: LedgerName, scope: ScopeKey, delta: i64, day: Option<NaiveDate>) -> Self {
        Self {
            ledger,
            scope,
            day,
            delta,
            seconds: 0,
        }
    }
}

/// Calendar month used for month grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(day: NaiveDate) -> Self {
        Self {
            year: day.year(),
            month: day.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || TallyError::InvalidInput(format!("'{s}' is not a YYYY-MM month"));
        let (year, month) = s.split_once('-').ok_or_else(bad)?;
        let year: i32 = year.parse().map_err(|_| bad())?;
        let month: u32 = month.parse().map_err(|_| bad())?;
        if !(1..=12).contains(&month) {
            return Err(bad());
        }
        Ok(Self { year, month })
    }
}

/// Storage-agnostic counter ledger.
///
/// Appends are single inserts and never read existing state. Each query runs
/// as one statement so it sees a squash either wholly before or wholly after.
#[async_trait]
pub trait CountLedger: Send + Sync {
    /// Append one count delta.
    async fn record(
        &self,
        ledger: &LedgerName,
        scope: &ScopeKey,
        delta: i64,
        day: Option<NaiveDate>,
    ) -> Result<()>;

    /// Append one timing row: `count` events taking `seconds` in total.
    async fn record_timing(
        &self,
        ledger: &LedgerName,
        scope: &ScopeKey,
        day: NaiveDate,
        count: i64,
        seconds: i64,
    ) -> Result<()>;

    /// Append several rows atomically.
    async fn record_many(&self, entries: &[RecordEntry]) -> Result<()>;

    async fn sum(&self, query: &CountQuery) -> Result<i64>;

    /// Totals per day, ascending. Days without rows are absent.
    async fn day_totals(&self, query: &CountQuery) -> Result<Vec<(NaiveDate, i64)>>;

    /// Totals per month, ascending. Months without rows are absent.
    async fn month_totals(&self, query: &CountQuery) -> Result<Vec<(YearMonth, i64)>>;

    /// Totals per scope. Exact filters report every requested scope.
    async fn scope_totals(&self, query: &CountQuery) -> Result<BTreeMap<ScopeKey, i64>>;

    /// Average seconds per counted event, per day.
    async fn day_averages(&self, query: &CountQuery, rounded: bool) -> Result<Vec<(NaiveDate, f64)>>;

    async fn rows(&self, query: &CountQuery) -> Result<Vec<CountRow>>;

    /// Run one squash cycle over at most `limit` keys.
    async fn squash(&self, limit: usize) -> Result<SquashReport>;
}

/// A query bound to a ledger, mirroring how dashboards consume counts
#[derive(Clone)]
pub struct CountSet {
    ledger: Arc<dyn CountLedger>,
    query: CountQuery,
}

impl CountSet {
    pub fn new(ledger: Arc<dyn CountLedger>, query: CountQuery) -> Self {
        Self { ledger, query }
    }

    pub fn query(&self) -> &CountQuery {
        &self.query
    }

    pub async fn total(&self) -> Result<i64> {
        self.ledger.sum(&self.query).await
    }

    pub async fn day_totals(&self) -> Result<Vec<(NaiveDate, i64)>> {
        self.ledger.day_totals(&self.query).await
    }

    pub async fn month_totals(&self) -> Result<Vec<(YearMonth, i64)>> {
        self.ledger.month_totals(&self.query).await
    }

    pub async fn scope_totals(&self) -> Result<BTreeMap<ScopeKey, i64>> {
        self.ledger.scope_totals(&self.query).await
    }

    pub async fn day_averages(&self, rounded: bool) -> Result<Vec<(NaiveDate, f64)>> {
        self.ledger.day_averages(&self.query, rounded).await
    }
}
