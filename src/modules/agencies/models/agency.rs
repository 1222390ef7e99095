use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::timezone::{local_reading, LocalClockReading};
use crate::core::{Currency, Result};

/// Tenant account. All plans and installments belong to exactly one agency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub id: String,
    pub name: String,
    /// IANA timezone name, e.g. `Australia/Brisbane`
    pub timezone: String,
    /// Local time of day after which the daily overdue sweep applies
    pub overdue_cutoff: NaiveTime,
    pub default_currency: Currency,
}

impl Agency {
    /// Local date and time for this agency at `now`
    pub fn local_clock(&self, now: DateTime<Utc>) -> Result<LocalClockReading> {
        local_reading(now, &self.timezone)
    }
}
