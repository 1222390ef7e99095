// HTTP handlers for installment endpoints
//
// Endpoints:
// - POST /agencies/{agency_id}/installments/{id}/payments - Record a payment

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::core::Result;
use crate::modules::installments::models::Installment;
use crate::modules::installments::services::PaymentInput;
use crate::modules::plans::models::PlanStatus;
use crate::modules::plans::services::{PaymentOutcome, PlanService};

/// Response for POST /agencies/{agency_id}/installments/{id}/payments
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub installment: Installment,
    pub previous_status: String,
    pub plan_id: String,
    pub plan_status: PlanStatus,
    pub plan_completed: bool,
    pub earned_commission: Decimal,
    pub expected_commission: Decimal,
}

impl From<PaymentOutcome> for PaymentResponse {
    fn from(outcome: PaymentOutcome) -> Self {
        let plan_completed = outcome.plan.completed_now();
        Self {
            previous_status: outcome.installment.previous.status.to_string(),
            installment: outcome.installment.current,
            plan_id: outcome.plan.plan.id,
            plan_status: outcome.plan.plan.status,
            plan_completed,
            earned_commission: outcome.plan.plan.earned_commission,
            expected_commission: outcome.plan.plan.expected_commission,
        }
    }
}

/// POST /agencies/{agency_id}/installments/{id}/payments
///
/// # Request Body
/// ```json
/// { "paid_date": "2025-03-01", "paid_amount": "1000.00", "notes": "bank transfer" }
/// ```
///
/// # Returns
/// - 200: Payment recorded, plan recomputed
/// - 400: Rejected payment; `error.field` names the offending field
///   (`status` when the installment no longer accepts payments)
/// - 404: Agency or installment not found
pub async fn record_payment(
    service: web::Data<Arc<PlanService>>,
    path: web::Path<(String, String)>,
    request: web::Json<PaymentInput>,
) -> Result<HttpResponse> {
    let (agency_id, installment_id) = path.into_inner();

    let outcome = service
        .record_payment(&agency_id, &installment_id, request.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(PaymentResponse::from(outcome)))
}

/// Configure installment routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/agencies/{agency_id}/installments")
            .route("/{id}/payments", web::post().to(record_payment)),
    );
}
