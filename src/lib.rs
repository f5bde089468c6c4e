// src/lib.rs

pub mod config;
pub mod counters;
pub mod db;
pub mod error;
pub mod ledger;
pub mod scope;
pub mod tasks;

pub use error::{Result, TallyError};
pub use ledger::{CountLedger, CountQuery, CountSet, SqliteCountLedger, SquashReport, YearMonth};
pub use scope::{LedgerName, ScopeFilter, ScopeKey};
