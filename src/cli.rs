//! Command-line interface

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PoolFilter {
    Stake,
    Farm,
    All,
}

impl PoolFilter {
    pub fn includes_stake(&self) -> bool {
        matches!(self, PoolFilter::Stake | PoolFilter::All)
    }

    pub fn includes_farm(&self) -> bool {
        matches!(self, PoolFilter::Farm | PoolFilter::All)
    }

    /// Middle segment of snapshot filenames for partial runs.
    pub fn file_tag(&self) -> Option<&'static str> {
        match self {
            PoolFilter::Stake => Some("Stake"),
            PoolFilter::Farm => Some("Farm"),
            PoolFilter::All => None,
        }
    }
}

/// Snapshot tool that reconstructs stake and farm balances at historical
/// checkpoints, accrues loyalty points, assigns tiers and assembles
/// project whitelists from KYC, registration and delegation data.
#[derive(Debug, Parser)]
#[command(name = "snapshot", version)]
pub struct Args {
    /// Target token; must exist in the token registry (default: first entry)
    #[arg(short, long)]
    pub token: Option<String>,

    /// Snapshot date in dd.mm.yyyy (default: latest preferred instant)
    #[arg(short, long)]
    pub date: Option<String>,

    /// Snapshot time of day in HH:MM UTC
    #[arg(long, default_value = "13:00")]
    pub hour: String,

    /// Pool types included in the snapshot
    #[arg(short, long, value_enum, default_value_t = PoolFilter::All)]
    pub pools: PoolFilter,

    /// Combine a previously created snapshot with registration and
    /// delegation data into a project whitelist
    #[arg(long = "project-id")]
    pub project_id: Option<String>,

    /// Token registry file
    #[arg(long, default_value = "tokens.json")]
    pub tokens_file: PathBuf,

    /// Settings file
    #[arg(long, default_value = "config.json")]
    pub config_file: PathBuf,
}

/// Resolve the snapshot instant.
///
/// The requested date is pinned to the preferred time of day, UTC. Dates in
/// the future (or today before the preferred instant has passed) fall back
/// to the latest preferred instant that already happened.
pub fn resolve_snapshot_datetime(
    date: Option<&str>,
    hour: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ConfigError> {
    let time = NaiveTime::parse_from_str(hour, "%H:%M").map_err(|_| {
        ConfigError::InvalidArgument(format!("time format is wrong, expected HH:MM: '{}'", hour))
    })?;

    let mut default_instant = now.date_naive().and_time(time);
    if now.naive_utc() < default_instant {
        default_instant -= Duration::days(1);
    }
    let default_instant = Utc.from_utc_datetime(&default_instant);

    let target = match date {
        Some(raw) => {
            let cleaned = raw.replace(['"', '\''], "");
            let parsed = NaiveDate::parse_from_str(&cleaned, "%d.%m.%Y").map_err(|_| {
                ConfigError::InvalidArgument(format!(
                    "date format is wrong, expected dd.mm.yyyy: '{}'",
                    raw
                ))
            })?;
            Utc.from_utc_datetime(&parsed.and_time(time))
        }
        None => default_instant,
    };

    if target.date_naive() >= default_instant.date_naive() {
        Ok(default_instant)
    } else {
        Ok(target)
    }
}
