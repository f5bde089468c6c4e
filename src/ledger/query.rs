// src/ledger/query.rs
// Query description and the shared WHERE clause builder

use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite};

use crate::scope::{LedgerName, ScopeFilter, ScopeKey, SEPARATOR};

/// Which rows of one ledger a read covers.
///
/// `since` is inclusive and `until` exclusive. Undated rows never match a
/// query that carries either bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountQuery {
    pub ledger: LedgerName,
    pub scopes: ScopeFilter,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl CountQuery {
    pub fn new(ledger: LedgerName) -> Self {
        Self {
            ledger,
            scopes: ScopeFilter::All,
            since: None,
            until: None,
        }
    }

    pub fn scopes(mut self, scopes: ScopeFilter) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn scope(self, scope: ScopeKey) -> Self {
        self.scopes(ScopeFilter::single(scope))
    }

    pub fn exact<I: IntoIterator<Item = ScopeKey>>(self, scopes: I) -> Self {
        self.scopes(ScopeFilter::exact(scopes))
    }

    pub fn prefix(self, prefix: ScopeKey) -> Self {
        self.scopes(ScopeFilter::Prefix(prefix))
    }

    pub fn since(mut self, since: NaiveDate) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: NaiveDate) -> Self {
        self.until = Some(until);
        self
    }

    pub fn window(mut self, since: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    /// Appends ` WHERE ...` for this query to `qb`.
    pub(crate) fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE ledger = ");
        qb.push_bind(self.ledger.as_str().to_string());

        match &self.scopes {
            ScopeFilter::All => {}
            ScopeFilter::Exact(scopes) if scopes.is_empty() => {
                qb.push(" AND 0");
            }
            ScopeFilter::Exact(scopes) => {
                qb.push(" AND scope IN (");
                let mut separated = qb.separated(", ");
                for scope in scopes {
                    separated.push_bind(scope.as_str().to_string());
                }
                separated.push_unseparated(")");
            }
            ScopeFilter::Prefix(prefix) => {
                // substr rather than LIKE: LIKE is case-insensitive and treats `_` as a wildcard
                let below = format!("{}{SEPARATOR}", prefix.as_str());
                qb.push(" AND (scope = ");
                qb.push_bind(prefix.as_str().to_string());
                qb.push(" OR substr(scope, 1, ");
                qb.push_bind(below.len() as i64);
                qb.push(") = ");
                qb.push_bind(below);
                qb.push(")");
            }
        }

        if let Some(since) = self.since {
            qb.push(" AND day >= ");
            qb.push_bind(since);
        }
        if let Some(until) = self.until {
            qb.push(" AND day < ");
            qb.push_bind(until);
        }
    }
}
