use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::core::{AppError, Result};

/// Wall-clock reading in a tenant's own timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalClockReading {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl LocalClockReading {
    /// True once the local time has reached `cutoff` for the current local day
    pub fn has_reached(&self, cutoff: NaiveTime) -> bool {
        self.time >= cutoff
    }
}

/// Resolve an IANA timezone name such as `Australia/Brisbane`
pub fn parse_timezone(name: &str) -> Result<Tz> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidTimezone("timezone is empty".to_string()));
    }

    trimmed
        .parse::<Tz>()
        .map_err(|_| AppError::InvalidTimezone(format!("unknown IANA timezone '{}'", trimmed)))
}

/// Convert a UTC instant into the local date and time of `timezone`
pub fn local_reading(now: DateTime<Utc>, timezone: &str) -> Result<LocalClockReading> {
    let tz = parse_timezone(timezone)?;
    let local = now.with_timezone(&tz);

    Ok(LocalClockReading {
        date: local.date_naive(),
        time: local.time(),
    })
}

/// Local calendar date in `timezone` at instant `now`
pub fn local_today(now: DateTime<Utc>, timezone: &str) -> Result<NaiveDate> {
    Ok(local_reading(now, timezone)?.date)
}

/// Format timestamp as ISO 8601 UTC for API responses
pub fn format_iso8601(utc_time: DateTime<Utc>) -> String {
    utc_time.to_rfc3339()
}
