//! When ingestion cycles fire: a fixed interval or a cron expression.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::SalesError;

#[derive(Debug, Clone)]
pub enum Trigger {
    Interval(Duration),
    Cron(Box<Schedule>),
}

impl Trigger {
    /// Time to wait from `now` until the next fire.
    ///
    /// A cron schedule with no upcoming fire time falls back to one minute so
    /// the caller never spins.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Self::Interval(d) => *d,
            Self::Cron(schedule) => schedule
                .after(&now)
                .next()
                .and_then(|next| (next - now).to_std().ok())
                .unwrap_or(Duration::from_secs(60)),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval(d) => write!(f, "every {}s", d.as_secs()),
            Self::Cron(s) => write!(f, "cron '{}'", s),
        }
    }
}

/// Parse a cron expression, auto-prepending "0 " for 5-field expressions.
///
/// The `cron` crate requires 6 fields (sec min hr dom mon dow), but users
/// typically write 5-field cron (min hr dom mon dow).
pub fn parse_cron(expr: &str) -> Result<Schedule, SalesError> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    let normalized = if parts.len() == 5 {
        format!("0 {}", expr.trim())
    } else {
        expr.trim().to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| SalesError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}
