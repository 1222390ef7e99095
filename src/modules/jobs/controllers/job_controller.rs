use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::core::error::AppError;
use crate::modules::jobs::services::{
    JobRunService, OverdueStatusJob, TriggerSource, OVERDUE_JOB_NAME,
};

#[derive(Debug, Deserialize)]
pub struct TriggerQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct MarkFailedRequest {
    pub reason: String,
}

/// Trigger the overdue sweep now
/// POST /jobs/overdue-status/run?force=true
///
/// Returns the run summary. A run that is skipped (another run in progress,
/// or a recent success without `force`) still answers 200 with status `skipped`.
pub async fn run_overdue_status(
    job: web::Data<Arc<OverdueStatusJob>>,
    query: web::Query<TriggerQuery>,
) -> Result<HttpResponse, AppError> {
    let summary = job
        .run(TriggerSource::Manual { force: query.force })
        .await?;

    Ok(HttpResponse::Ok().json(summary))
}

/// Runs left in `running` beyond the stuck threshold
/// GET /jobs/overdue-status/runs/stuck
pub async fn stuck_overdue_runs(
    job: web::Data<Arc<OverdueStatusJob>>,
    runs: web::Data<Arc<JobRunService>>,
) -> Result<HttpResponse, AppError> {
    let stuck = runs
        .stuck_runs(OVERDUE_JOB_NAME, job.settings().stuck_after)
        .await?;

    Ok(HttpResponse::Ok().json(stuck))
}

/// GET /jobs/runs/{id}
pub async fn get_run(
    runs: web::Data<Arc<JobRunService>>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AppError> {
    let run = runs.get_run(path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(run))
}

/// Manually close a stuck run
/// POST /jobs/runs/{id}/fail
pub async fn mark_run_failed(
    runs: web::Data<Arc<JobRunService>>,
    path: web::Path<u64>,
    request: web::Json<MarkFailedRequest>,
) -> Result<HttpResponse, AppError> {
    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(AppError::invalid_field("reason", "Reason is required"));
    }

    let run = runs.mark_failed(path.into_inner(), reason).await?;

    Ok(HttpResponse::Ok().json(run))
}

/// Configure job routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/jobs")
            .route("/overdue-status/run", web::post().to(run_overdue_status))
            .route("/overdue-status/runs/stuck", web::get().to(stuck_overdue_runs))
            .route("/runs/{id}", web::get().to(get_run))
            .route("/runs/{id}/fail", web::post().to(mark_run_failed)),
    );
}
