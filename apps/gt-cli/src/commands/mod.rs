// commands — Subcommand implementations and shared helpers.

pub mod goal;
pub mod group;
pub mod task;
pub mod user;

use chrono::{DateTime, NaiveDate, Utc};
use gt_goal::{GoalService, UserId};
use serde::Serialize;

/// What every command runs against.
pub struct Context {
    pub service: GoalService,
    actor: Option<UserId>,
}

impl Context {
    pub fn new(service: GoalService, actor: Option<UserId>) -> Self {
        Self { service, actor }
    }

    /// The `--as` user, required by commands that act on someone's behalf.
    pub fn actor(&self) -> anyhow::Result<UserId> {
        self.actor
            .ok_or_else(|| anyhow::anyhow!("this command needs --as <USER_ID>"))
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Accepts RFC 3339 timestamps or plain dates (midnight UTC).
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("expected YYYY-MM-DD or an RFC 3339 timestamp, got '{}'", s))
}
