// src/counters/mod.rs

//! Domain counters built on the ledger: ticket activity, ticket status,
//! workspace item counts and unseen notifications.
//!
//! Each facade owns its ledger names and scope layout so callers only deal
//! in ids.

pub mod notifications;
pub mod orgs;
pub mod stats;
pub mod tickets;

pub use notifications::NotificationCounts;
pub use orgs::OrgItemCounts;
pub use stats::{ticket_activity_report, DailyTicketStats, UserDayStats};
pub use tickets::{
    TicketCountType, TicketDailyCounts, TicketDailyTimings, TicketState, TicketStatus,
    TicketStatusCounts, TimingType,
};
