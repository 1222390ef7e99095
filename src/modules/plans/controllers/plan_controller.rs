use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::core::error::AppError;
use crate::modules::plans::models::NewPaymentPlan;
use crate::modules::plans::services::{PlanService, PlanSummary};

/// Create a plan with its installment schedule
/// POST /agencies/{agency_id}/plans
pub async fn create_plan(
    service: web::Data<Arc<PlanService>>,
    path: web::Path<String>,
    request: web::Json<NewPaymentPlan>,
) -> Result<HttpResponse, AppError> {
    let agency_id = path.into_inner();
    let snapshot = service
        .create_plan(&agency_id, request.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(PlanSummary::from_snapshot(snapshot)))
}

/// Plan with derived totals and its installments
/// GET /agencies/{agency_id}/plans/{id}
pub async fn get_plan(
    service: web::Data<Arc<PlanService>>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (agency_id, plan_id) = path.into_inner();
    let summary = service.plan_summary(&agency_id, &plan_id).await?;

    Ok(HttpResponse::Ok().json(summary))
}

/// POST /agencies/{agency_id}/plans/{id}/cancel
pub async fn cancel_plan(
    service: web::Data<Arc<PlanService>>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (agency_id, plan_id) = path.into_inner();
    let snapshot = service.cancel_plan(&agency_id, &plan_id).await?;

    Ok(HttpResponse::Ok().json(PlanSummary::from_snapshot(snapshot)))
}

/// Configure plan routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/agencies/{agency_id}/plans")
            .route("", web::post().to(create_plan))
            .route("/{id}", web::get().to(get_plan))
            .route("/{id}/cancel", web::post().to(cancel_plan)),
    );
}
