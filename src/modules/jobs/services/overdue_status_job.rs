use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::OverdueJobConfig;
use crate::core::{Clock, Result};
use crate::modules::agencies::{Agency, AgencyRepository};
use crate::modules::events::EventSink;
use crate::modules::installments::repositories::InstallmentRepository;
use crate::modules::installments::services::{InstallmentLedger, OverdueTransition};
use crate::modules::jobs::models::{JobRun, JobStatus};
use crate::modules::jobs::repositories::JobRunRepository;

pub const OVERDUE_JOB_NAME: &str = "overdue_status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverdueJobSettings {
    /// Scheduling interval; also the window in which a manual re-trigger is skipped
    pub interval: Duration,
    /// Tenants swept in parallel
    pub concurrency: usize,
    /// A `running` row older than this no longer blocks a new run
    pub stuck_after: Duration,
}

impl Default for OverdueJobSettings {
    fn default() -> Self {
        Self {
            interval: Duration::hours(1),
            concurrency: 4,
            stuck_after: Duration::minutes(90),
        }
    }
}

impl From<&OverdueJobConfig> for OverdueJobSettings {
    fn from(config: &OverdueJobConfig) -> Self {
        Self {
            interval: Duration::seconds(config.interval_secs as i64),
            concurrency: config.concurrency.max(1),
            stuck_after: Duration::seconds(config.stuck_after_secs as i64),
        }
    }
}

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum TriggerSource {
    Scheduled,
    Manual { force: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    Success,
    Failed,
    Skipped,
}

/// A tenant whose sweep could not run; other tenants are unaffected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantFailure {
    pub agency_id: String,
    pub message: String,
}

/// Result returned to whoever triggered the job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub run_id: Option<u64>,
    pub status: SummaryStatus,
    pub records_updated: u64,
    pub tenants_processed: usize,
    /// Tenants whose local time had not yet reached their cutoff
    pub tenants_skipped: usize,
    pub rows_failed: usize,
    pub errors: Vec<TenantFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl JobSummary {
    fn skipped(reason: String) -> Self {
        Self {
            run_id: None,
            status: SummaryStatus::Skipped,
            records_updated: 0,
            tenants_processed: 0,
            tenants_skipped: 0,
            rows_failed: 0,
            errors: Vec::new(),
            skip_reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TenantOutcome {
    Swept { updated: u64, rows_failed: usize },
    BeforeCutoff,
}

/// Tenant-aware sweep moving pending installments past their due date to overdue.
///
/// Each run is recorded as one `job_runs` row. Tenants are swept concurrently
/// up to `concurrency`; rows within a tenant are updated one at a time so
/// payments arriving for the same rows only ever wait on a single lock.
pub struct OverdueStatusJob {
    agencies: Arc<dyn AgencyRepository>,
    installments: Arc<dyn InstallmentRepository>,
    runs: Arc<dyn JobRunRepository>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    settings: OverdueJobSettings,
}

impl OverdueStatusJob {
    pub fn new(
        agencies: Arc<dyn AgencyRepository>,
        installments: Arc<dyn InstallmentRepository>,
        runs: Arc<dyn JobRunRepository>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        settings: OverdueJobSettings,
    ) -> Self {
        Self {
            agencies,
            installments,
            runs,
            events,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &OverdueJobSettings {
        &self.settings
    }

    /// Execute one run, or skip it if another run makes it redundant.
    ///
    /// The skip check and the `job_runs` insert are separate statements, so two
    /// triggers landing together can both open a run. Both then sweep, but
    /// `mark_overdue` only updates rows still pending, so each installment is
    /// updated and announced once.
    pub async fn run(&self, trigger: TriggerSource) -> Result<JobSummary> {
        let now = self.clock.now();

        if let Some(reason) = self.skip_reason(trigger, now).await? {
            info!(job = OVERDUE_JOB_NAME, reason = %reason, "Overdue job skipped");
            return Ok(JobSummary::skipped(reason));
        }

        let metadata = serde_json::to_value(trigger)?;
        let mut run = self.runs.start(OVERDUE_JOB_NAME, now, &metadata).await?;
        info!(job = OVERDUE_JOB_NAME, run_id = run.id, trigger = ?trigger, "Overdue job started");

        let agencies = match self.agencies.list_all().await {
            Ok(agencies) => agencies,
            Err(e) => {
                error!(run_id = run.id, error = %e, "Failed to list agencies");
                self.close_failed(&mut run, format!("Failed to list agencies: {}", e))
                    .await;
                return Err(e);
            }
        };

        let results: Vec<(String, Result<TenantOutcome>)> = stream::iter(agencies)
            .map(|agency| async move {
                let outcome = self.sweep_tenant(&agency, now).await;
                (agency.id, outcome)
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut summary = JobSummary {
            run_id: Some(run.id),
            status: SummaryStatus::Success,
            records_updated: 0,
            tenants_processed: 0,
            tenants_skipped: 0,
            rows_failed: 0,
            errors: Vec::new(),
            skip_reason: None,
        };

        for (agency_id, result) in results {
            match result {
                Ok(TenantOutcome::Swept { updated, rows_failed }) => {
                    summary.tenants_processed += 1;
                    summary.records_updated += updated;
                    summary.rows_failed += rows_failed;
                }
                Ok(TenantOutcome::BeforeCutoff) => summary.tenants_skipped += 1,
                Err(e) => {
                    error!(run_id = run.id, agency_id = %agency_id, error = %e, "Tenant sweep failed");
                    summary.errors.push(TenantFailure {
                        agency_id,
                        message: e.to_string(),
                    });
                }
            }
        }
        summary.errors.sort_by(|a, b| a.agency_id.cmp(&b.agency_id));

        let (status, error_message) = if summary.errors.is_empty() {
            (JobStatus::Success, None)
        } else {
            summary.status = SummaryStatus::Failed;
            let detail = summary
                .errors
                .iter()
                .map(|f| format!("{}: {}", f.agency_id, f.message))
                .collect::<Vec<_>>()
                .join("; ");
            (JobStatus::Failed, Some(detail))
        };

        run.metadata = serde_json::json!({
            "trigger": metadata,
            "tenants_processed": summary.tenants_processed,
            "tenants_skipped": summary.tenants_skipped,
            "rows_failed": summary.rows_failed,
            "errors": summary.errors,
        });
        run.finish(status, self.clock.now(), summary.records_updated, error_message)?;
        self.runs.complete(&run).await?;

        info!(
            run_id = run.id,
            status = %run.status,
            records_updated = summary.records_updated,
            tenants_processed = summary.tenants_processed,
            tenants_skipped = summary.tenants_skipped,
            tenant_failures = summary.errors.len(),
            rows_failed = summary.rows_failed,
            "Overdue job completed"
        );

        Ok(summary)
    }

    /// Another live run, or a recent success for an unforced manual trigger
    async fn skip_reason(
        &self,
        trigger: TriggerSource,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        for running in self.runs.find_running(OVERDUE_JOB_NAME).await? {
            if running.is_stuck(now, self.settings.stuck_after) {
                warn!(
                    run_id = running.id,
                    started_at = %running.started_at,
                    "Ignoring stuck overdue job run"
                );
                continue;
            }
            return Ok(Some(format!("Run {} is still running", running.id)));
        }

        if let TriggerSource::Manual { force: false } = trigger {
            if let Some(last) = self.runs.latest_successful(OVERDUE_JOB_NAME).await? {
                if let Some(completed_at) = last.completed_at {
                    if now - completed_at < self.settings.interval {
                        return Ok(Some(format!(
                            "Run {} succeeded at {}",
                            last.id, completed_at
                        )));
                    }
                }
            }
        }

        Ok(None)
    }

    async fn sweep_tenant(&self, agency: &Agency, now: DateTime<Utc>) -> Result<TenantOutcome> {
        let reading = agency.local_clock(now)?;
        if !reading.has_reached(agency.overdue_cutoff) {
            debug!(
                agency_id = agency.id.as_str(),
                local_time = %reading.time,
                cutoff = %agency.overdue_cutoff,
                "Before overdue cutoff"
            );
            return Ok(TenantOutcome::BeforeCutoff);
        }

        let candidates = self
            .installments
            .find_overdue_candidates(&agency.id, reading.date)
            .await?;

        let mut updated = 0u64;
        let mut rows_failed = 0usize;

        for candidate in candidates {
            let installment = match candidate {
                Ok(installment) => installment,
                Err(e) => {
                    warn!(
                        agency_id = agency.id.as_str(),
                        installment_id = e.id.as_str(),
                        error = %e.message,
                        "Skipping unreadable installment"
                    );
                    rows_failed += 1;
                    continue;
                }
            };

            if installment.agency_id != agency.id {
                warn!(
                    agency_id = agency.id.as_str(),
                    installment_id = installment.id.as_str(),
                    "Skipping installment owned by another agency"
                );
                rows_failed += 1;
                continue;
            }

            let mut update = match InstallmentLedger::transition_to_overdue(&installment, reading.date) {
                OverdueTransition::Applied(update) => update,
                OverdueTransition::NoOp(reason) => {
                    debug!(
                        installment_id = installment.id.as_str(),
                        reason = ?reason,
                        "Overdue transition not applicable"
                    );
                    continue;
                }
            };
            update.current.updated_at = now;

            match self.installments.mark_overdue(&agency.id, &update.current).await {
                Ok(true) => {
                    updated += 1;
                    self.events.emit(&update.overdue_event());
                }
                Ok(false) => debug!(
                    installment_id = installment.id.as_str(),
                    "Installment changed before overdue update"
                ),
                Err(e) => {
                    warn!(
                        agency_id = agency.id.as_str(),
                        installment_id = installment.id.as_str(),
                        error = %e,
                        "Failed to mark installment overdue"
                    );
                    rows_failed += 1;
                }
            }
        }

        info!(
            agency_id = agency.id.as_str(),
            local_date = %reading.date,
            updated = updated,
            rows_failed = rows_failed,
            "Tenant swept"
        );

        Ok(TenantOutcome::Swept {
            updated,
            rows_failed,
        })
    }

    /// Best effort: the row stays `running` (and is later reported stuck) if this fails
    async fn close_failed(&self, run: &mut JobRun, message: String) {
        let result = match run.finish(JobStatus::Failed, self.clock.now(), 0, Some(message)) {
            Ok(()) => self.runs.complete(run).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(run_id = run.id, error = %e, "Failed to close job run");
        }
    }
}
