use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{check_money_scale, AppError, Result};

/// One scheduled payment obligation within a payment plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: String,
    pub plan_id: String,
    pub agency_id: String,
    /// 0 is the initial payment, 1..N are regular installments
    pub sequence_number: i32,
    pub amount: Decimal,
    pub is_initial_payment: bool,
    pub generates_commission: bool,
    /// When the student owes the agency
    pub student_due_date: NaiveDate,
    /// When the agency owes the college
    pub college_due_date: NaiveDate,
    pub status: InstallmentStatus,
    pub paid_date: Option<NaiveDate>,
    pub paid_amount: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Installment lifecycle.
///
/// ```text
/// draft -> pending -> {partial, paid, overdue, cancelled}
/// partial -> {partial, paid, cancelled}
/// overdue -> {partial, paid, cancelled}
/// ```
/// `paid` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Draft,
    Pending,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// Statuses whose paid amount counts towards earned commission
    pub fn counts_towards_paid(&self) -> bool {
        matches!(self, Self::Paid | Self::Partial)
    }

    /// Statuses a payment may be recorded against
    pub fn accepts_payment(&self) -> bool {
        matches!(self, Self::Pending | Self::Partial | Self::Overdue)
    }

    pub fn can_transition_to(&self, next: InstallmentStatus) -> bool {
        use InstallmentStatus::*;

        match (self, next) {
            (Draft, Pending) | (Draft, Cancelled) => true,
            (Pending, Partial | Paid | Overdue | Cancelled) => true,
            (Partial, Partial | Paid | Cancelled) => true,
            (Overdue, Partial | Paid | Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InstallmentStatus {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "partial" => Ok(Self::Partial),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid installment status: {}", value)),
        }
    }
}

/// Schedule entry supplied when a plan is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInstallment {
    pub sequence_number: i32,
    pub amount: Decimal,
    #[serde(default)]
    pub is_initial_payment: bool,
    #[serde(default = "default_generates_commission")]
    pub generates_commission: bool,
    pub student_due_date: NaiveDate,
    pub college_due_date: NaiveDate,
}

fn default_generates_commission() -> bool {
    true
}

impl Installment {
    /// Build a pending installment for `plan_id` from a schedule entry
    pub fn new(plan_id: &str, agency_id: &str, entry: &NewInstallment) -> Result<Self> {
        if entry.sequence_number < 0 {
            return Err(AppError::invalid_field(
                "sequence_number",
                format!("must not be negative, got {}", entry.sequence_number),
            ));
        }

        if entry.is_initial_payment != (entry.sequence_number == 0) {
            return Err(AppError::invalid_field(
                "is_initial_payment",
                "only sequence number 0 may be the initial payment",
            ));
        }

        if entry.amount <= Decimal::ZERO {
            return Err(AppError::invalid_field(
                "amount",
                format!("installment {} amount must be positive", entry.sequence_number),
            ));
        }

        check_money_scale("amount", entry.amount)?;

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            plan_id: plan_id.to_string(),
            agency_id: agency_id.to_string(),
            sequence_number: entry.sequence_number,
            amount: entry.amount,
            is_initial_payment: entry.is_initial_payment,
            generates_commission: entry.generates_commission,
            student_due_date: entry.student_due_date,
            college_due_date: entry.college_due_date,
            status: InstallmentStatus::Pending,
            paid_date: None,
            paid_amount: None,
            notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub(crate) fn transition(&mut self, next: InstallmentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::invalid_transition(self.status, next));
        }

        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// draft -> pending.
    ///
    /// Schedules created here start pending. Draft rows only arrive from
    /// outside writers such as a bulk import, and stay unpayable until promoted.
    pub fn activate(&mut self) -> Result<()> {
        if self.status != InstallmentStatus::Draft {
            return Err(AppError::invalid_transition(
                self.status,
                InstallmentStatus::Pending,
            ));
        }
        self.transition(InstallmentStatus::Pending)
    }

    /// Any non-terminal status -> cancelled. Payment fields are cleared.
    pub fn cancel(&mut self) -> Result<()> {
        self.transition(InstallmentStatus::Cancelled)?;
        self.paid_date = None;
        self.paid_amount = None;
        Ok(())
    }

    /// Amount received so far, zero unless paid or partial
    pub fn received_amount(&self) -> Decimal {
        if self.status.counts_towards_paid() {
            self.paid_amount.unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        }
    }

    /// Amount still owed by the student
    pub fn outstanding_amount(&self) -> Decimal {
        match self.status {
            InstallmentStatus::Cancelled | InstallmentStatus::Paid => Decimal::ZERO,
            _ => (self.amount - self.received_amount()).max(Decimal::ZERO),
        }
    }

    /// Check that payment fields agree with the status.
    ///
    /// - `paid`: paid date and amount are set and the amount covers the installment
    /// - `partial`: amount is set and strictly between zero and the installment amount
    /// - anything else: both fields are empty
    pub fn check_payment_fields(&self) -> Result<()> {
        let consistent = match self.status {
            InstallmentStatus::Paid => {
                self.paid_date.is_some()
                    && self.paid_amount.map_or(false, |paid| paid >= self.amount)
            }
            InstallmentStatus::Partial => {
                self.paid_date.is_some()
                    && self
                        .paid_amount
                        .map_or(false, |paid| paid > Decimal::ZERO && paid < self.amount)
            }
            _ => self.paid_date.is_none() && self.paid_amount.is_none(),
        };

        if consistent {
            Ok(())
        } else {
            Err(AppError::internal(format!(
                "Installment {} has payment fields inconsistent with status '{}'",
                self.id, self.status
            )))
        }
    }
}
