use chrono::Utc;
use rust_decimal::Decimal;

use crate::core::{AppError, Result};
use crate::modules::commissions::CommissionCalculator;
use crate::modules::events::AuditEvent;
use crate::modules::installments::models::{Installment, InstallmentStatus};
use crate::modules::plans::models::{PaymentPlan, PlanStatus};

/// Plan after recomputation, with the values it replaced
#[derive(Debug, Clone, PartialEq)]
pub struct PlanUpdate {
    pub previous_status: PlanStatus,
    pub previous_earned_commission: Decimal,
    pub plan: PaymentPlan,
}

impl PlanUpdate {
    /// True when this recomputation moved the plan into `completed`
    pub fn completed_now(&self) -> bool {
        self.previous_status != PlanStatus::Completed && self.plan.status == PlanStatus::Completed
    }

    pub fn changed(&self) -> bool {
        self.previous_status != self.plan.status
            || self.previous_earned_commission != self.plan.earned_commission
    }

    pub fn completion_event(&self) -> Option<AuditEvent> {
        self.completed_now().then(|| AuditEvent::PlanCompleted {
            agency_id: self.plan.agency_id.clone(),
            plan_id: self.plan.id.clone(),
        })
    }
}

/// Single source of truth for the derived plan fields.
///
/// Run it after every installment mutation, inside the same transaction,
/// against the installment rows as they are at that point.
pub struct PlanAggregator;

impl PlanAggregator {
    /// Recompute earned commission and completion from the full installment set.
    ///
    /// Idempotent for a given installment set. A completed plan is never
    /// moved back to active, and a cancelled plan keeps its status.
    pub fn recompute(plan: &PaymentPlan, installments: &[Installment]) -> Result<PlanUpdate> {
        if let Some(stray) = installments
            .iter()
            .find(|i| i.plan_id != plan.id || i.agency_id != plan.agency_id)
        {
            return Err(AppError::internal(format!(
                "Installment {} does not belong to plan {}",
                stray.id, plan.id
            )));
        }

        let mut updated = plan.clone();
        updated.earned_commission = CommissionCalculator::earned_commission(plan, installments);

        if plan.status == PlanStatus::Active && Self::is_settled(installments) {
            updated.status = PlanStatus::Completed;
        }

        let mut update = PlanUpdate {
            previous_status: plan.status,
            previous_earned_commission: plan.earned_commission,
            plan: updated,
        };

        if update.changed() {
            update.plan.updated_at = Utc::now();
        }

        Ok(update)
    }

    /// Every installment is paid or cancelled, and at least one is paid
    pub fn is_settled(installments: &[Installment]) -> bool {
        let all_closed = installments.iter().all(|i| {
            matches!(
                i.status,
                InstallmentStatus::Paid | InstallmentStatus::Cancelled
            )
        });
        let any_paid = installments
            .iter()
            .any(|i| i.status == InstallmentStatus::Paid);

        all_closed && any_paid
    }
}
