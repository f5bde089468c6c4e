// src/main.rs
// tally - append-only counters with periodic squashing

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use tally::config::CONFIG;
use tally::counters::{ticket_activity_report, TicketDailyCounts, TicketDailyTimings};
use tally::ledger::{CountLedger, CountQuery, SqliteCountLedger};
use tally::scope::{LedgerName, ScopeFilter, ScopeKey};
use tally::tasks::config::TaskConfig;
use tally::tasks::{run_squash_task, TaskManager};
use tally::db;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Append-only counters with periodic squashing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Migrate,

    /// Append one count (or timing) row
    Record {
        /// Ledger name (e.g. tickets.reply)
        ledger: LedgerName,

        /// Scope key (e.g. o:1:u:2)
        scope: ScopeKey,

        /// Count delta, may be negative
        #[arg(allow_hyphen_values = true)]
        delta: i64,

        /// Day the count belongs to (YYYY-MM-DD)
        #[arg(short, long)]
        day: Option<NaiveDate>,

        /// Total seconds for a timing row; requires --day
        #[arg(long)]
        seconds: Option<i64>,
    },

    /// Sum of matching counts
    Sum(QueryArgs),

    /// Totals per day
    Days(QueryArgs),

    /// Totals per month
    Months(QueryArgs),

    /// Totals per scope
    Scopes(QueryArgs),

    /// Run one squash cycle (for cron)
    Squash {
        /// Max keys to squash (default: TALLY_SQUASH_BATCH)
        #[arg(short, long)]
        batch: Option<usize>,
    },

    /// Run the squash scheduler until interrupted
    Run,

    /// Day-by-day ticket activity for an org
    Report {
        /// Org id
        org: i64,

        /// First day (inclusive)
        #[arg(long)]
        since: NaiveDate,

        /// Last day (exclusive)
        #[arg(long)]
        until: NaiveDate,

        /// Users to break down (repeatable)
        #[arg(short, long = "user")]
        users: Vec<i64>,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Ledger name
    ledger: LedgerName,

    /// Exact scope (repeatable)
    #[arg(short, long = "scope", conflicts_with = "prefix")]
    scopes: Vec<ScopeKey>,

    /// Scope prefix; matches the prefix itself and everything below it
    #[arg(short, long)]
    prefix: Option<String>,

    /// First day (inclusive)
    #[arg(long)]
    since: Option<NaiveDate>,

    /// Last day (exclusive)
    #[arg(long)]
    until: Option<NaiveDate>,
}

impl QueryArgs {
    fn to_query(&self) -> Result<CountQuery> {
        let scopes = match (&self.prefix, self.scopes.is_empty()) {
            (Some(prefix), _) => ScopeFilter::prefix(prefix)?,
            (None, false) => ScopeFilter::exact(self.scopes.iter().cloned()),
            (None, true) => ScopeFilter::All,
        };
        Ok(CountQuery::new(self.ledger.clone())
            .scopes(scopes)
            .window(self.since, self.until))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries command output
    let subscriber = FmtSubscriber::builder()
        .with_max_level(CONFIG.tracing_level())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let pool = db::connect(&CONFIG)
        .await
        .with_context(|| format!("opening {}", CONFIG.database_url))?;
    let ledger = Arc::new(SqliteCountLedger::new(pool.clone()));

    match cli.command {
        Commands::Migrate => {
            let version = db::get_schema_version(&pool).await?;
            info!("Schema up to date ({version} migrations applied)");
        }
        Commands::Record {
            ledger: name,
            scope,
            delta,
            day,
            seconds,
        } => match (seconds, day) {
            (Some(seconds), Some(day)) => {
                ledger.record_timing(&name, &scope, day, delta, seconds).await?
            }
            (Some(_), None) => bail!("--seconds requires --day"),
            (None, day) => ledger.record(&name, &scope, delta, day).await?,
        },
        Commands::Sum(args) => {
            println!("{}", ledger.sum(&args.to_query()?).await?);
        }
        Commands::Days(args) => {
            let totals = ledger.day_totals(&args.to_query()?).await?;
            print_json(&totals)?;
        }
        Commands::Months(args) => {
            let totals: Vec<(String, i64)> = ledger
                .month_totals(&args.to_query()?)
                .await?
                .into_iter()
                .map(|(month, total)| (month.to_string(), total))
                .collect();
            print_json(&totals)?;
        }
        Commands::Scopes(args) => {
            let totals = ledger.scope_totals(&args.to_query()?).await?;
            print_json(&totals)?;
        }
        Commands::Squash { batch } => {
            let config = TaskConfig::from_config(&CONFIG);
            let batch = batch.unwrap_or(config.squash_batch).max(1);
            let metrics = tally::tasks::metrics::TaskMetrics::new();
            let report = run_squash_task(ledger.as_ref(), batch, &metrics)
                .await
                .context("squash cycle failed")?;
            print_json(&report)?;
        }
        Commands::Run => {
            let config = TaskConfig::from_config(&CONFIG);
            info!("{}", config.summary());

            let mut manager = TaskManager::new(ledger.clone(), config);
            manager.start();

            tokio::signal::ctrl_c().await?;
            info!("Interrupted, stopping");
            manager.shutdown().await;
        }
        Commands::Report {
            org,
            since,
            until,
            users,
        } => {
            let counts = TicketDailyCounts::new(ledger.clone());
            let timings = TicketDailyTimings::new(ledger.clone());
            let report =
                ticket_activity_report(&counts, &timings, org, &users, since, until).await?;
            print_json(&report)?;
        }
    }

    pool.close().await;
    Ok(())
}
