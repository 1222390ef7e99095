use std::sync::Arc;

use chrono::Duration;
use tracing::warn;

use crate::core::{AppError, Clock, Result};
use crate::modules::jobs::models::{JobRun, JobStatus};
use crate::modules::jobs::repositories::JobRunRepository;

/// Inspection and manual repair of the job run log
pub struct JobRunService {
    runs: Arc<dyn JobRunRepository>,
    clock: Arc<dyn Clock>,
}

impl JobRunService {
    pub fn new(runs: Arc<dyn JobRunRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { runs, clock }
    }

    pub async fn get_run(&self, run_id: u64) -> Result<JobRun> {
        self.runs
            .find_by_id(run_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Job run {} not found", run_id)))
    }

    /// Runs of `job_name` still `running` longer than `threshold`
    pub async fn stuck_runs(&self, job_name: &str, threshold: Duration) -> Result<Vec<JobRun>> {
        let now = self.clock.now();
        let running = self.runs.find_running(job_name).await?;

        Ok(running
            .into_iter()
            .filter(|run| run.is_stuck(now, threshold))
            .collect())
    }

    /// Close a run that will never finish on its own
    pub async fn mark_failed(&self, run_id: u64, reason: &str) -> Result<JobRun> {
        let mut run = self.get_run(run_id).await?;

        if run.status != JobStatus::Running {
            return Err(AppError::invalid_transition(run.status, JobStatus::Failed));
        }

        let records_updated = run.records_updated;
        run.finish(
            JobStatus::Failed,
            self.clock.now(),
            records_updated,
            Some(format!("Marked failed: {}", reason)),
        )?;
        self.runs.complete(&run).await?;

        warn!(
            run_id = run.id,
            job = run.job_name.as_str(),
            reason = reason,
            "Job run marked failed"
        );

        Ok(run)
    }
}
