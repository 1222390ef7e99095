use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{check_money_scale, AppError, Result};
use crate::modules::events::AuditEvent;
use crate::modules::installments::models::{Installment, InstallmentStatus};

/// Limits applied when a payment is recorded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerPolicy {
    /// Fraction above the installment amount a payment may reach (bank fee rounding)
    pub overpayment_tolerance: Decimal,
    /// Maximum note length in characters
    pub max_notes_len: usize,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            overpayment_tolerance: Decimal::new(10, 2),
            max_notes_len: 500,
        }
    }
}

/// Payment reported by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInput {
    pub paid_date: NaiveDate,
    pub paid_amount: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Installment before and after a ledger operation
#[derive(Debug, Clone, PartialEq)]
pub struct InstallmentUpdate {
    pub previous: Installment,
    pub current: Installment,
}

impl InstallmentUpdate {
    pub fn payment_event(&self) -> AuditEvent {
        AuditEvent::PaymentRecorded {
            agency_id: self.current.agency_id.clone(),
            installment_id: self.current.id.clone(),
            old_status: self.previous.status,
            new_status: self.current.status,
            old_amount: self.previous.paid_amount,
            new_amount: self.current.paid_amount,
        }
    }

    pub fn overdue_event(&self) -> AuditEvent {
        AuditEvent::InstallmentOverdue {
            agency_id: self.current.agency_id.clone(),
            installment_id: self.current.id.clone(),
            due_date: self.current.student_due_date,
        }
    }
}

/// Why an overdue transition did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    NotPending(InstallmentStatus),
    NotYetDue { due_date: NaiveDate, as_of: NaiveDate },
}

/// Outcome of `InstallmentLedger::transition_to_overdue`
#[derive(Debug, Clone, PartialEq)]
pub enum OverdueTransition {
    Applied(InstallmentUpdate),
    NoOp(NoOpReason),
}

impl OverdueTransition {
    pub fn is_applied(&self) -> bool {
        matches!(self, OverdueTransition::Applied(_))
    }
}

/// Per-installment payment state machine.
///
/// Operates on one installment at a time and never touches storage or the
/// owning plan; callers persist the returned installment and run
/// `PlanAggregator::recompute` in the same transaction.
#[derive(Debug, Clone, Default)]
pub struct InstallmentLedger {
    policy: LedgerPolicy,
}

impl InstallmentLedger {
    pub fn new(policy: LedgerPolicy) -> Self {
        Self { policy }
    }

    /// Largest payment accepted against `amount`
    pub fn max_payment(&self, amount: Decimal) -> Decimal {
        amount * (Decimal::ONE + self.policy.overpayment_tolerance)
    }

    /// Record a payment against a pending, partial or overdue installment.
    ///
    /// `today` is the caller's current date; a payment dated after it is
    /// rejected. The paid amount replaces any earlier partial amount. The
    /// input installment is never modified.
    pub fn record_payment(
        &self,
        installment: &Installment,
        payment: &PaymentInput,
        today: NaiveDate,
    ) -> Result<InstallmentUpdate> {
        if !installment.status.accepts_payment() {
            return Err(AppError::invalid_field(
                "status",
                format!(
                    "payments cannot be recorded on a {} installment",
                    installment.status
                ),
            ));
        }

        if payment.paid_date > today {
            return Err(AppError::invalid_field(
                "paid_date",
                format!("{} is in the future", payment.paid_date),
            ));
        }

        if payment.paid_amount <= Decimal::ZERO {
            return Err(AppError::invalid_field(
                "paid_amount",
                "must be greater than zero",
            ));
        }

        check_money_scale("paid_amount", payment.paid_amount)?;

        let max_payment = self.max_payment(installment.amount);
        if payment.paid_amount > max_payment {
            return Err(AppError::invalid_field(
                "paid_amount",
                format!(
                    "{} exceeds the maximum of {} for this installment",
                    payment.paid_amount, max_payment
                ),
            ));
        }

        if let Some(notes) = &payment.notes {
            if notes.chars().count() > self.policy.max_notes_len {
                return Err(AppError::invalid_field(
                    "notes",
                    format!("must be at most {} characters", self.policy.max_notes_len),
                ));
            }
        }

        let next_status = if payment.paid_amount >= installment.amount {
            InstallmentStatus::Paid
        } else {
            InstallmentStatus::Partial
        };

        let mut current = installment.clone();
        current.transition(next_status)?;
        current.paid_date = Some(payment.paid_date);
        current.paid_amount = Some(payment.paid_amount);
        current.notes = payment.notes.clone();

        Ok(InstallmentUpdate {
            previous: installment.clone(),
            current,
        })
    }

    /// pending -> overdue once the student due date is before `as_of`.
    ///
    /// Anything else is a no-op, not an error; batch callers expect most
    /// rows they re-check to be no-ops.
    pub fn transition_to_overdue(installment: &Installment, as_of: NaiveDate) -> OverdueTransition {
        if installment.status != InstallmentStatus::Pending {
            return OverdueTransition::NoOp(NoOpReason::NotPending(installment.status));
        }

        if installment.student_due_date >= as_of {
            return OverdueTransition::NoOp(NoOpReason::NotYetDue {
                due_date: installment.student_due_date,
                as_of,
            });
        }

        let mut current = installment.clone();
        current.status = InstallmentStatus::Overdue;
        current.updated_at = Utc::now();

        OverdueTransition::Applied(InstallmentUpdate {
            previous: installment.clone(),
            current,
        })
    }
}
