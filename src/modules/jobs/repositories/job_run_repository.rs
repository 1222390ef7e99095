use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

use crate::core::{AppError, Result};
use crate::modules::jobs::models::{JobRun, JobStatus};

/// Append-only job run log
#[async_trait]
pub trait JobRunRepository: Send + Sync {
    /// Append a `running` row
    async fn start(
        &self,
        job_name: &str,
        started_at: DateTime<Utc>,
        metadata: &serde_json::Value,
    ) -> Result<JobRun>;

    /// Close a row previously opened by `start`
    async fn complete(&self, run: &JobRun) -> Result<()>;

    async fn find_by_id(&self, id: u64) -> Result<Option<JobRun>>;

    /// Rows of `job_name` still marked `running`, oldest first
    async fn find_running(&self, job_name: &str) -> Result<Vec<JobRun>>;

    async fn latest_successful(&self, job_name: &str) -> Result<Option<JobRun>>;
}

/// MySQL-backed job run log
pub struct MySqlJobRunRepository {
    pool: MySqlPool,
}

impl MySqlJobRunRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const JOB_RUN_COLUMNS: &str =
    "id, job_name, started_at, completed_at, status, records_updated, error_message, metadata";

#[async_trait]
impl JobRunRepository for MySqlJobRunRepository {
    async fn start(
        &self,
        job_name: &str,
        started_at: DateTime<Utc>,
        metadata: &serde_json::Value,
    ) -> Result<JobRun> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_runs (job_name, started_at, status, records_updated, metadata)
            VALUES (?, ?, 'running', 0, ?)
            "#,
        )
        .bind(job_name)
        .bind(started_at)
        .bind(serde_json::to_string(metadata)?)
        .execute(&self.pool)
        .await?;

        Ok(JobRun {
            id: result.last_insert_id(),
            job_name: job_name.to_string(),
            started_at,
            completed_at: None,
            status: JobStatus::Running,
            records_updated: 0,
            error_message: None,
            metadata: metadata.clone(),
        })
    }

    async fn complete(&self, run: &JobRun) -> Result<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE job_runs
            SET completed_at = ?, status = ?, records_updated = ?, error_message = ?, metadata = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(run.completed_at)
        .bind(run.status.as_str())
        .bind(run.records_updated)
        .bind(&run.error_message)
        .bind(serde_json::to_string(&run.metadata)?)
        .bind(run.id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::not_found(format!(
                "Running job run {} not found",
                run.id
            )));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<JobRun>> {
        let row = sqlx::query_as::<_, JobRunRow>(&format!(
            "SELECT {} FROM job_runs WHERE id = ?",
            JOB_RUN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRun::try_from).transpose()
    }

    async fn find_running(&self, job_name: &str) -> Result<Vec<JobRun>> {
        let rows = sqlx::query_as::<_, JobRunRow>(&format!(
            "SELECT {} FROM job_runs WHERE job_name = ? AND status = 'running' \
             ORDER BY started_at ASC",
            JOB_RUN_COLUMNS
        ))
        .bind(job_name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(JobRun::try_from).collect()
    }

    async fn latest_successful(&self, job_name: &str) -> Result<Option<JobRun>> {
        let row = sqlx::query_as::<_, JobRunRow>(&format!(
            "SELECT {} FROM job_runs WHERE job_name = ? AND status = 'success' \
             ORDER BY completed_at DESC LIMIT 1",
            JOB_RUN_COLUMNS
        ))
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRun::try_from).transpose()
    }
}

/// Database row representation for the job_runs table
#[derive(sqlx::FromRow)]
struct JobRunRow {
    id: u64,
    job_name: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    status: String,
    records_updated: u64,
    error_message: Option<String>,
    metadata: Option<String>,
}

impl TryFrom<JobRunRow> for JobRun {
    type Error = AppError;

    fn try_from(row: JobRunRow) -> Result<Self> {
        let status: JobStatus = row.status.parse().map_err(AppError::Internal)?;
        let metadata = match row.metadata.as_deref() {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
            _ => serde_json::Value::Null,
        };

        Ok(JobRun {
            id: row.id,
            job_name: row.job_name,
            started_at: row.started_at,
            completed_at: row.completed_at,
            status,
            records_updated: row.records_updated,
            error_message: row.error_message,
            metadata,
        })
    }
}
