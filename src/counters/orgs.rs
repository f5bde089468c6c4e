// src/counters/orgs.rs

//! Per-workspace item counts. Callers pick their own item scopes (`foo:1`,
//! `tickets:O:3:0`, ...); they are stored nested under the org's own scope,
//! so one org can never see another's counts.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::ledger::{CountLedger, CountQuery};
use crate::scope::{LedgerName, ScopeKey};

pub const ITEMS: LedgerName = LedgerName::from_static("orgs.items");

#[derive(Clone)]
pub struct OrgItemCounts {
    ledger: Arc<dyn CountLedger>,
}

impl OrgItemCounts {
    pub fn new(ledger: Arc<dyn CountLedger>) -> Self {
        Self { ledger }
    }

    fn nested(org_id: i64, item: &ScopeKey) -> Result<ScopeKey> {
        ScopeKey::org(org_id).join(item.segments())
    }

    pub async fn record(&self, org_id: i64, item: &ScopeKey, delta: i64) -> Result<()> {
        let scope = Self::nested(org_id, item)?;
        self.ledger.record(&ITEMS, &scope, delta, None).await
    }

    /// Sum over exactly these item scopes.
    pub async fn sum_of(&self, org_id: i64, items: &[ScopeKey]) -> Result<i64> {
        let scopes = items
            .iter()
            .map(|item| Self::nested(org_id, item))
            .collect::<Result<Vec<_>>>()?;
        self.ledger.sum(&CountQuery::new(ITEMS).exact(scopes)).await
    }

    /// Sum over an item scope and everything below it.
    pub async fn sum_prefix(&self, org_id: i64, prefix: &ScopeKey) -> Result<i64> {
        let prefix = Self::nested(org_id, prefix)?;
        self.ledger.sum(&CountQuery::new(ITEMS).prefix(prefix)).await
    }

    /// Totals for every item scope the org has rows for, keyed by item scope.
    pub async fn scope_totals(&self, org_id: i64) -> Result<BTreeMap<ScopeKey, i64>> {
        let org = ScopeKey::org(org_id);
        let totals = self
            .ledger
            .scope_totals(&CountQuery::new(ITEMS).prefix(org.clone()))
            .await?;

        let mut items = BTreeMap::new();
        for (scope, total) in totals {
            // the org scope itself never carries item counts
            if let Some(rest) = scope.strip_prefix(&org).filter(|rest| !rest.is_empty()) {
                items.insert(ScopeKey::parse(rest)?, total);
            }
        }
        Ok(items)
    }
}
