use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::modules::installments::models::InstallmentStatus;

/// Audit-worthy domain events. Persisting them is the consumer's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    PaymentRecorded {
        agency_id: String,
        installment_id: String,
        old_status: InstallmentStatus,
        new_status: InstallmentStatus,
        old_amount: Option<Decimal>,
        new_amount: Option<Decimal>,
    },
    InstallmentOverdue {
        agency_id: String,
        installment_id: String,
        due_date: NaiveDate,
    },
    PlanCompleted {
        agency_id: String,
        plan_id: String,
    },
}

impl AuditEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuditEvent::PaymentRecorded { .. } => "payment_recorded",
            AuditEvent::InstallmentOverdue { .. } => "installment_overdue",
            AuditEvent::PlanCompleted { .. } => "plan_completed",
        }
    }

    pub fn agency_id(&self) -> &str {
        match self {
            AuditEvent::PaymentRecorded { agency_id, .. }
            | AuditEvent::InstallmentOverdue { agency_id, .. }
            | AuditEvent::PlanCompleted { agency_id, .. } => agency_id,
        }
    }
}
