// src/counters/tickets.rs
// Ticket activity, timing and status counters

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::Result;
use crate::ledger::{CountLedger, CountQuery, CountSet, RecordEntry};
use crate::scope::{LedgerName, ScopeKey};

pub const OPENINGS: LedgerName = LedgerName::from_static("tickets.opening");
pub const ASSIGNMENTS: LedgerName = LedgerName::from_static("tickets.assignment");
pub const REPLIES: LedgerName = LedgerName::from_static("tickets.reply");
pub const FIRST_REPLY_TIMINGS: LedgerName = LedgerName::from_static("tickets.first_reply");
pub const LAST_CLOSE_TIMINGS: LedgerName = LedgerName::from_static("tickets.last_close");
pub const STATUSES: LedgerName = LedgerName::from_static("tickets.status");

/// Kinds of daily ticket activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketCountType {
    Opening,
    /// Includes tickets opened with an assignee, excludes re-assignments
    Assignment,
    Reply,
}

impl TicketCountType {
    pub fn ledger(self) -> LedgerName {
        match self {
            TicketCountType::Opening => OPENINGS,
            TicketCountType::Assignment => ASSIGNMENTS,
            TicketCountType::Reply => REPLIES,
        }
    }
}

/// Daily ticket activity by who did it and when.
///
/// Openings are tracked at org scope, assignments at user-in-org scope and
/// replies at org, team and user-in-org scope.
#[derive(Clone)]
pub struct TicketDailyCounts {
    ledger: Arc<dyn CountLedger>,
}

impl TicketDailyCounts {
    pub fn new(ledger: Arc<dyn CountLedger>) -> Self {
        Self { ledger }
    }

    pub async fn record_opening(&self, org_id: i64, day: NaiveDate) -> Result<()> {
        self.ledger
            .record(&OPENINGS, &ScopeKey::org(org_id), 1, Some(day))
            .await
    }

    pub async fn record_assignment(&self, org_id: i64, user_id: i64, day: NaiveDate) -> Result<()> {
        self.ledger
            .record(&ASSIGNMENTS, &ScopeKey::org_user(org_id, user_id), 1, Some(day))
            .await
    }

    pub async fn record_reply(
        &self,
        org_id: i64,
        user_id: i64,
        team_id: Option<i64>,
        day: NaiveDate,
    ) -> Result<()> {
        let mut entries = vec![RecordEntry::count(REPLIES, ScopeKey::org(org_id), 1, Some(day))];
        if let Some(team_id) = team_id {
            entries.push(RecordEntry::count(REPLIES, ScopeKey::team(team_id), 1, Some(day)));
        }
        entries.push(RecordEntry::count(
            REPLIES,
            ScopeKey::org_user(org_id, user_id),
            1,
            Some(day),
        ));
        self.ledger.record_many(&entries).await
    }

    pub fn by_org(
        &self,
        org_id: i64,
        kind: TicketCountType,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> CountSet {
        self.count_set(kind, [ScopeKey::org(org_id)], since, until)
    }

    pub fn by_teams(
        &self,
        team_ids: &[i64],
        kind: TicketCountType,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> CountSet {
        self.count_set(kind, team_ids.iter().map(|t| ScopeKey::team(*t)), since, until)
    }

    pub fn by_users(
        &self,
        org_id: i64,
        user_ids: &[i64],
        kind: TicketCountType,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> CountSet {
        self.count_set(
            kind,
            user_ids.iter().map(|u| ScopeKey::org_user(org_id, *u)),
            since,
            until,
        )
    }

    /// Totals keyed by user id; users without activity report zero.
    pub async fn user_totals(
        &self,
        org_id: i64,
        user_ids: &[i64],
        kind: TicketCountType,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> Result<BTreeMap<i64, i64>> {
        let totals = self
            .by_users(org_id, user_ids, kind, since, until)
            .scope_totals()
            .await?;

        Ok(user_ids
            .iter()
            .map(|u| {
                let total = totals.get(&ScopeKey::org_user(org_id, *u)).copied().unwrap_or(0);
                (*u, total)
            })
            .collect())
    }

    fn count_set<I: IntoIterator<Item = ScopeKey>>(
        &self,
        kind: TicketCountType,
        scopes: I,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> CountSet {
        let query = CountQuery::new(kind.ledger()).exact(scopes).window(since, until);
        CountSet::new(self.ledger.clone(), query)
    }
}

/// Kinds of daily ticket timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingType {
    FirstReply,
    LastClose,
}

impl TimingType {
    pub fn ledger(self) -> LedgerName {
        match self {
            TimingType::FirstReply => FIRST_REPLY_TIMINGS,
            TimingType::LastClose => LAST_CLOSE_TIMINGS,
        }
    }
}

/// Daily ticket timings at org scope
#[derive(Clone)]
pub struct TicketDailyTimings {
    ledger: Arc<dyn CountLedger>,
}

impl TicketDailyTimings {
    pub fn new(ledger: Arc<dyn CountLedger>) -> Self {
        Self { ledger }
    }

    /// Record one event of `kind` that took `seconds`.
    pub async fn record(&self, org_id: i64, kind: TimingType, day: NaiveDate, seconds: i64) -> Result<()> {
        self.ledger
            .record_timing(&kind.ledger(), &ScopeKey::org(org_id), day, 1, seconds)
            .await
    }

    pub fn by_org(
        &self,
        org_id: i64,
        kind: TimingType,
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
    ) -> CountSet {
        let query = CountQuery::new(kind.ledger())
            .scope(ScopeKey::org(org_id))
            .window(since, until);
        CountSet::new(self.ledger.clone(), query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn code(self) -> &'static str {
        match self {
            TicketStatus::Open => "O",
            TicketStatus::Closed => "C",
        }
    }
}

/// The counted attributes of one ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketState {
    pub status: TicketStatus,
    pub assignee: Option<i64>,
    pub topic_id: i64,
}

/// Current ticket counts by status, split by assignee and by topic.
///
/// Scopes are `o:{org}:{status}:assignee:{user}` (user `0` when unassigned)
/// and `o:{org}:{status}:topic:{topic}`.
#[derive(Clone)]
pub struct TicketStatusCounts {
    ledger: Arc<dyn CountLedger>,
}

impl TicketStatusCounts {
    pub fn new(ledger: Arc<dyn CountLedger>) -> Self {
        Self { ledger }
    }

    fn assignee_scope(org_id: i64, status: TicketStatus, assignee: Option<i64>) -> Result<ScopeKey> {
        ScopeKey::org(org_id)
            .join([status.code(), "assignee"])?
            .child(assignee.unwrap_or(0))
    }

    fn topic_scope(org_id: i64, status: TicketStatus, topic_id: i64) -> Result<ScopeKey> {
        ScopeKey::org(org_id).join([status.code(), "topic"])?.child(topic_id)
    }

    fn entries(org_id: i64, state: &TicketState, delta: i64) -> Result<[RecordEntry; 2]> {
        Ok([
            RecordEntry::count(
                STATUSES,
                Self::assignee_scope(org_id, state.status, state.assignee)?,
                delta,
                None,
            ),
            RecordEntry::count(
                STATUSES,
                Self::topic_scope(org_id, state.status, state.topic_id)?,
                delta,
                None,
            ),
        ])
    }

    pub async fn record_assignee(
        &self,
        org_id: i64,
        status: TicketStatus,
        assignee: Option<i64>,
        delta: i64,
    ) -> Result<()> {
        let scope = Self::assignee_scope(org_id, status, assignee)?;
        self.ledger.record(&STATUSES, &scope, delta, None).await
    }

    pub async fn record_topic(
        &self,
        org_id: i64,
        status: TicketStatus,
        topic_id: i64,
        delta: i64,
    ) -> Result<()> {
        let scope = Self::topic_scope(org_id, status, topic_id)?;
        self.ledger.record(&STATUSES, &scope, delta, None).await
    }

    /// Record a ticket changing from `before` to `after`. `None` means the
    /// ticket didn't exist (creation) or no longer exists (deletion).
    pub async fn apply(
        &self,
        org_id: i64,
        before: Option<&TicketState>,
        after: Option<&TicketState>,
    ) -> Result<()> {
        if before == after {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(4);
        if let Some(before) = before {
            entries.extend(Self::entries(org_id, before, -1)?);
        }
        if let Some(after) = after {
            entries.extend(Self::entries(org_id, after, 1)?);
        }
        self.ledger.record_many(&entries).await
    }

    /// Counts for a set of assignees (`None` means unassigned)
    pub async fn by_assignees(
        &self,
        org_id: i64,
        assignees: &[Option<i64>],
        status: TicketStatus,
    ) -> Result<BTreeMap<Option<i64>, i64>> {
        let scopes = assignees
            .iter()
            .map(|a| Self::assignee_scope(org_id, status, *a))
            .collect::<Result<Vec<_>>>()?;
        let totals = self
            .ledger
            .scope_totals(&CountQuery::new(STATUSES).exact(scopes.iter().cloned()))
            .await?;

        Ok(assignees
            .iter()
            .zip(&scopes)
            .map(|(a, scope)| (*a, totals.get(scope).copied().unwrap_or(0)))
            .collect())
    }

    /// Counts for a set of topics
    pub async fn by_topics(
        &self,
        org_id: i64,
        topic_ids: &[i64],
        status: TicketStatus,
    ) -> Result<BTreeMap<i64, i64>> {
        let scopes = topic_ids
            .iter()
            .map(|t| Self::topic_scope(org_id, status, *t))
            .collect::<Result<Vec<_>>>()?;
        let totals = self
            .ledger
            .scope_totals(&CountQuery::new(STATUSES).exact(scopes.iter().cloned()))
            .await?;

        Ok(topic_ids
            .iter()
            .zip(&scopes)
            .map(|(t, scope)| (*t, totals.get(scope).copied().unwrap_or(0)))
            .collect())
    }

    /// Count for org and status regardless of assignee
    pub async fn all(&self, org_id: i64, status: TicketStatus) -> Result<i64> {
        let prefix = ScopeKey::org(org_id).join([status.code(), "assignee"])?;
        self.ledger.sum(&CountQuery::new(STATUSES).prefix(prefix)).await
    }
}
