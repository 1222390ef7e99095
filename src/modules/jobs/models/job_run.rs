use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Result};

/// One execution of a batch job. Rows are only ever appended and then closed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: u64,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub records_updated: u64,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job status: {}", value)),
        }
    }
}

impl JobRun {
    /// Close a running row with its final status
    pub fn finish(
        &mut self,
        status: JobStatus,
        completed_at: DateTime<Utc>,
        records_updated: u64,
        error_message: Option<String>,
    ) -> Result<()> {
        if self.status != JobStatus::Running {
            return Err(AppError::invalid_transition(self.status, status));
        }
        if status == JobStatus::Running {
            return Err(AppError::invalid_transition(self.status, status));
        }

        self.status = status;
        self.completed_at = Some(completed_at);
        self.records_updated = records_updated;
        self.error_message = error_message;
        Ok(())
    }

    /// Still `running` after `threshold` has elapsed since it started
    pub fn is_stuck(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.status == JobStatus::Running && now - self.started_at > threshold
    }

    pub fn duration(&self) -> Option<Duration> {
        self.completed_at.map(|completed| completed - self.started_at)
    }
}
