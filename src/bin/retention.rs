//! `pos-retention` — the audit/retention scheduler. Runs either as a daily
//! daemon (default) or as a one-shot job for cron/k8s CronJob deployment,
//! per the same `RetentionScheduler` either way.

use anyhow::{Context, Result};
use chrono::{NaiveTime, Utc};
use clap::Parser;
use pos_backend::config::Config;
use pos_backend::db;
use pos_backend::events::EventPublisher;
use pos_backend::repo::audit::AuditRepo;
use pos_backend::repo::users::UserRepo;
use pos_backend::retention::RetentionScheduler;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pos-retention")]
struct Args {
    /// Run a single sweep and exit instead of looping forever.
    #[arg(long)]
    once: bool,

    /// UTC hour:minute the daily sweep runs at, in daemon mode.
    #[arg(long, default_value = "02:00")]
    at: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(code) => code,
        Err(err) => {
            error!(error = ?err, "pos-retention exited before a sweep could run");
            ExitCode::from(2)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let args = Args::parse();
    let config = Config::from_env()?;
    let pool = db::connect(&config.database_url).await.context("failed to connect to database")?;

    let users = UserRepo::new(pool.clone());
    let audit = AuditRepo::new(pool);
    let events = EventPublisher::new(&config.broker_brokers, config.broker_topic.clone())
        .context("failed to construct event publisher")?;
    let scheduler = RetentionScheduler::new(users, audit, events, &config);

    if args.once {
        return Ok(run_sweep(&scheduler).await);
    }

    let at = NaiveTime::parse_from_str(&args.at, "%H:%M").context("--at must be HH:MM")?;
    info!(at = %args.at, "pos-retention daemon started, sweeping once per day");
    loop {
        let sleep_for = duration_until(at);
        info!(seconds = sleep_for.as_secs(), "sleeping until next sweep");
        tokio::time::sleep(sleep_for).await;
        run_sweep(&scheduler).await;
    }
}

/// Runs one sweep, logging and returning a process exit code rather than
/// propagating the error — a single bad sweep shouldn't crash the daemon
/// loop, but a one-shot invocation needs to report it via exit status.
async fn run_sweep(scheduler: &RetentionScheduler) -> ExitCode {
    match scheduler.run_once().await {
        Ok(report) => {
            info!(warned = report.warned, hard_deleted = report.hard_deleted, "retention sweep complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = ?err, "retention sweep failed");
            ExitCode::from(1)
        }
    }
}

fn duration_until(target: NaiveTime) -> std::time::Duration {
    let now = Utc::now();
    let today_target = now.date_naive().and_time(target).and_utc();
    let next = if today_target > now {
        today_target
    } else {
        today_target + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(std::time::Duration::from_secs(60))
}
