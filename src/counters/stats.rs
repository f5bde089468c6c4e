// src/counters/stats.rs
// Day-by-day ticket activity for dashboards

use std::collections::HashMap;

use chrono::NaiveDate;
use futures::future::try_join_all;
use serde::Serialize;

use super::tickets::{TicketCountType, TicketDailyCounts, TicketDailyTimings, TimingType};
use crate::error::{Result, TallyError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDayStats {
    pub user_id: i64,
    pub assigned: i64,
    pub replies: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTicketStats {
    pub day: NaiveDate,
    pub opened: i64,
    pub replies: i64,
    /// Mean seconds to first reply; `None` when nothing was timed that day
    pub avg_reply_secs: Option<f64>,
    pub users: Vec<UserDayStats>,
}

/// One entry per day in `[since, until)`, with quiet days reported as zeros.
pub async fn ticket_activity_report(
    counts: &TicketDailyCounts,
    timings: &TicketDailyTimings,
    org_id: i64,
    user_ids: &[i64],
    since: NaiveDate,
    until: NaiveDate,
) -> Result<Vec<DailyTicketStats>> {
    if until < since {
        return Err(TallyError::InvalidInput(format!(
            "report window ends ({until}) before it starts ({since})"
        )));
    }
    let window = (Some(since), Some(until));

    let opened: HashMap<_, _> = counts
        .by_org(org_id, TicketCountType::Opening, window.0, window.1)
        .day_totals()
        .await?
        .into_iter()
        .collect();
    let replies: HashMap<_, _> = counts
        .by_org(org_id, TicketCountType::Reply, window.0, window.1)
        .day_totals()
        .await?
        .into_iter()
        .collect();
    let reply_times: HashMap<_, _> = timings
        .by_org(org_id, TimingType::FirstReply, window.0, window.1)
        .day_averages(true)
        .await?
        .into_iter()
        .collect();

    let per_user = try_join_all(user_ids.iter().map(|user_id| async move {
        let users = std::slice::from_ref(user_id);
        let assigned = counts
            .by_users(org_id, users, TicketCountType::Assignment, window.0, window.1)
            .day_totals()
            .await?;
        let replied = counts
            .by_users(org_id, users, TicketCountType::Reply, window.0, window.1)
            .day_totals()
            .await?;
        Ok::<_, TallyError>((
            *user_id,
            assigned.into_iter().collect::<HashMap<_, _>>(),
            replied.into_iter().collect::<HashMap<_, _>>(),
        ))
    }))
    .await?;

    let report = since
        .iter_days()
        .take_while(|day| *day < until)
        .map(|day| DailyTicketStats {
            day,
            opened: opened.get(&day).copied().unwrap_or(0),
            replies: replies.get(&day).copied().unwrap_or(0),
            avg_reply_secs: reply_times.get(&day).copied(),
            users: per_user
                .iter()
                .map(|(user_id, assigned, replied)| UserDayStats {
                    user_id: *user_id,
                    assigned: assigned.get(&day).copied().unwrap_or(0),
                    replies: replied.get(&day).copied().unwrap_or(0),
                })
                .collect(),
        })
        .collect();

    Ok(report)
}
