use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::core::{AppError, Clock, Result};
use crate::modules::agencies::{Agency, AgencyRepository};
use crate::modules::events::{AuditEvent, EventSink};
use crate::modules::installments::models::{Installment, InstallmentStatus};
use crate::modules::installments::repositories::InstallmentRepository;
use crate::modules::installments::services::{InstallmentLedger, InstallmentUpdate, PaymentInput};
use crate::modules::plans::models::{NewPaymentPlan, PaymentPlan, PlanStatus};
use crate::modules::plans::repositories::{PlanRepository, PlanSnapshot};
use crate::modules::plans::services::plan_aggregator::{PlanAggregator, PlanUpdate};

/// Result of recording a payment: the installment and plan as committed
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub installment: InstallmentUpdate,
    pub plan: PlanUpdate,
}

impl PaymentOutcome {
    pub fn events(&self) -> Vec<AuditEvent> {
        let mut events = vec![self.installment.payment_event()];
        events.extend(self.plan.completion_event());
        events
    }
}

/// Read model for a plan and its installments
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub plan: PaymentPlan,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
    pub commission_outstanding: Decimal,
    pub installment_counts: BTreeMap<String, usize>,
    pub installments: Vec<Installment>,
}

impl PlanSummary {
    pub fn from_snapshot(snapshot: PlanSnapshot) -> Self {
        let total_paid: Decimal = snapshot
            .installments
            .iter()
            .map(Installment::received_amount)
            .sum();
        let total_outstanding: Decimal = snapshot
            .installments
            .iter()
            .map(Installment::outstanding_amount)
            .sum();

        let mut installment_counts = BTreeMap::new();
        for installment in &snapshot.installments {
            *installment_counts
                .entry(installment.status.to_string())
                .or_insert(0) += 1;
        }

        Self {
            commission_outstanding: (snapshot.plan.expected_commission
                - snapshot.plan.earned_commission)
                .max(Decimal::ZERO),
            plan: snapshot.plan,
            total_paid,
            total_outstanding,
            installment_counts,
            installments: snapshot.installments,
        }
    }
}

/// Orchestrates plan setup and payment recording for one tenant at a time.
///
/// Every write goes through `PlanRepository::update_locked`, which runs the
/// ledger and `PlanAggregator::recompute` against the locked row set in one
/// transaction. Audit events are emitted only after commit.
pub struct PlanService {
    agencies: Arc<dyn AgencyRepository>,
    plans: Arc<dyn PlanRepository>,
    installments: Arc<dyn InstallmentRepository>,
    ledger: InstallmentLedger,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl PlanService {
    pub fn new(
        agencies: Arc<dyn AgencyRepository>,
        plans: Arc<dyn PlanRepository>,
        installments: Arc<dyn InstallmentRepository>,
        ledger: InstallmentLedger,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            agencies,
            plans,
            installments,
            ledger,
            events,
            clock,
        }
    }

    async fn agency(&self, agency_id: &str) -> Result<Agency> {
        self.agencies
            .find_by_id(agency_id)
            .await?
            .ok_or_else(|| AppError::not_found("Agency not found"))
    }

    /// Create a plan and its installment schedule in one transaction
    pub async fn create_plan(
        &self,
        agency_id: &str,
        request: NewPaymentPlan,
    ) -> Result<PlanSnapshot> {
        request.validate()?;
        let agency = self.agency(agency_id).await?;

        let plan = PaymentPlan::new(&agency.id, &request, agency.default_currency);
        let mut installments = request
            .installments
            .iter()
            .map(|entry| Installment::new(&plan.id, &agency.id, entry))
            .collect::<Result<Vec<_>>>()?;
        installments.sort_by_key(|i| i.sequence_number);

        self.plans
            .create_with_installments(&plan, &installments)
            .await?;

        info!(
            agency_id = agency_id,
            plan_id = plan.id.as_str(),
            installment_count = installments.len(),
            commissionable_value = %plan.currency.format_amount(plan.commissionable_value),
            expected_commission = %plan.currency.format_amount(plan.expected_commission),
            "Payment plan created"
        );

        Ok(PlanSnapshot { plan, installments })
    }

    pub async fn get_plan(&self, agency_id: &str, plan_id: &str) -> Result<PaymentPlan> {
        self.plans
            .find_by_id(agency_id, plan_id)
            .await?
            .ok_or_else(|| AppError::not_found("Payment plan not found"))
    }

    pub async fn plan_summary(&self, agency_id: &str, plan_id: &str) -> Result<PlanSummary> {
        let plan = self.get_plan(agency_id, plan_id).await?;
        let installments = self.installments.find_by_plan(agency_id, plan_id).await?;

        Ok(PlanSummary::from_snapshot(PlanSnapshot { plan, installments }))
    }

    /// Record a payment and recompute the owning plan atomically.
    ///
    /// "Today" for the future-date check is the agency's local date.
    pub async fn record_payment(
        &self,
        agency_id: &str,
        installment_id: &str,
        payment: PaymentInput,
    ) -> Result<PaymentOutcome> {
        let agency = self.agency(agency_id).await?;
        let today = agency.local_clock(self.clock.now())?.date;

        let installment = self
            .installments
            .find_by_id(agency_id, installment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Installment not found"))?;

        let ledger = &self.ledger;
        let apply = |snapshot: &PlanSnapshot| -> Result<PlanSnapshot> {
            let target = snapshot
                .installment(installment_id)
                .ok_or_else(|| AppError::not_found("Installment not found"))?;
            let update = ledger.record_payment(target, &payment, today)?;

            let installments: Vec<Installment> = snapshot
                .installments
                .iter()
                .map(|i| {
                    if i.id == update.current.id {
                        update.current.clone()
                    } else {
                        i.clone()
                    }
                })
                .collect();
            let plan_update = PlanAggregator::recompute(&snapshot.plan, &installments)?;

            Ok(PlanSnapshot {
                plan: plan_update.plan,
                installments,
            })
        };

        let (before, after) = self
            .plans
            .update_locked(agency_id, &installment.plan_id, &apply)
            .await
            .map_err(|e| {
                if e.field().is_some() {
                    warn!(
                        agency_id = agency_id,
                        installment_id = installment_id,
                        error = %e,
                        "Payment rejected"
                    );
                }
                e
            })?;

        let outcome = Self::payment_outcome(installment_id, before, after)?;
        self.events.emit_all(&outcome.events());

        info!(
            agency_id = agency_id,
            installment_id = installment_id,
            plan_id = outcome.plan.plan.id.as_str(),
            old_status = %outcome.installment.previous.status,
            new_status = %outcome.installment.current.status,
            earned_commission = %outcome.plan.plan.earned_commission,
            plan_status = %outcome.plan.plan.status,
            "Payment recorded"
        );

        Ok(outcome)
    }

    fn payment_outcome(
        installment_id: &str,
        before: PlanSnapshot,
        after: PlanSnapshot,
    ) -> Result<PaymentOutcome> {
        let previous = before
            .installment(installment_id)
            .cloned()
            .ok_or_else(|| AppError::internal("Installment missing from locked snapshot"))?;
        let current = after
            .installment(installment_id)
            .cloned()
            .ok_or_else(|| AppError::internal("Installment missing from updated snapshot"))?;

        Ok(PaymentOutcome {
            installment: InstallmentUpdate { previous, current },
            plan: PlanUpdate {
                previous_status: before.plan.status,
                previous_earned_commission: before.plan.earned_commission,
                plan: after.plan,
            },
        })
    }

    /// Cancel an active plan and every installment that is not yet terminal
    pub async fn cancel_plan(&self, agency_id: &str, plan_id: &str) -> Result<PlanSnapshot> {
        let cancel = |snapshot: &PlanSnapshot| -> Result<PlanSnapshot> {
            let mut plan = snapshot.plan.clone();
            plan.cancel()?;

            let mut installments = snapshot.installments.clone();
            for installment in installments.iter_mut() {
                if !installment.status.is_terminal() {
                    installment.cancel()?;
                }
            }

            // Earned commission follows the surviving paid rows
            let recomputed = PlanAggregator::recompute(&plan, &installments)?;
            Ok(PlanSnapshot {
                plan: recomputed.plan,
                installments,
            })
        };

        let (_, after) = self.plans.update_locked(agency_id, plan_id, &cancel).await?;

        let cancelled = after
            .installments
            .iter()
            .filter(|i| i.status == InstallmentStatus::Cancelled)
            .count();
        info!(
            agency_id = agency_id,
            plan_id = plan_id,
            cancelled_installments = cancelled,
            "Payment plan cancelled"
        );

        debug_assert_eq!(after.plan.status, PlanStatus::Cancelled);
        Ok(after)
    }
}
