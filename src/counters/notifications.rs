// src/counters/notifications.rs

//! Unseen notification counts per user within an org.
//!
//! Only notifications shown in the UI are counted; callers skip email-only
//! ones before calling in.

use std::sync::Arc;

use crate::error::Result;
use crate::ledger::{CountLedger, CountQuery};
use crate::scope::{LedgerName, ScopeKey};

pub const UNSEEN: LedgerName = LedgerName::from_static("notifications.unseen");

#[derive(Clone)]
pub struct NotificationCounts {
    ledger: Arc<dyn CountLedger>,
}

impl NotificationCounts {
    pub fn new(ledger: Arc<dyn CountLedger>) -> Self {
        Self { ledger }
    }

    /// Record a notification changing state. Each side is `Some(is_seen)`, or
    /// `None` when the notification doesn't exist on that side.
    pub async fn on_change(
        &self,
        org_id: i64,
        user_id: i64,
        before: Option<bool>,
        after: Option<bool>,
    ) -> Result<()> {
        let unseen = |state: Option<bool>| i64::from(state == Some(false));
        let delta = unseen(after) - unseen(before);
        if delta == 0 {
            return Ok(());
        }
        self.ledger
            .record(&UNSEEN, &ScopeKey::org_user(org_id, user_id), delta, None)
            .await
    }

    pub async fn created(&self, org_id: i64, user_id: i64) -> Result<()> {
        self.on_change(org_id, user_id, None, Some(false)).await
    }

    pub async fn seen(&self, org_id: i64, user_id: i64) -> Result<()> {
        self.on_change(org_id, user_id, Some(false), Some(true)).await
    }

    pub async fn unseen_again(&self, org_id: i64, user_id: i64) -> Result<()> {
        self.on_change(org_id, user_id, Some(true), Some(false)).await
    }

    pub async fn deleted_unseen(&self, org_id: i64, user_id: i64) -> Result<()> {
        self.on_change(org_id, user_id, Some(false), None).await
    }

    pub async fn unseen(&self, org_id: i64, user_id: i64) -> Result<i64> {
        self.ledger
            .sum(&CountQuery::new(UNSEEN).scope(ScopeKey::org_user(org_id, user_id)))
            .await
    }

    /// Unseen notifications across every user in the org.
    pub async fn unseen_in_org(&self, org_id: i64) -> Result<i64> {
        self.ledger
            .sum(&CountQuery::new(UNSEEN).prefix(ScopeKey::org(org_id)))
            .await
    }
}
