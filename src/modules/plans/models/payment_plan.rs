use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{check_money_scale, AppError, Currency, Result};
use crate::modules::commissions::CommissionCalculator;
use crate::modules::installments::models::NewInstallment;

/// Payment plan owed by a student for one enrollment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub id: String,
    pub agency_id: String,
    pub enrollment_id: String,
    pub currency: Currency,
    pub total_value: Decimal,
    pub materials_cost: Decimal,
    pub admin_fees: Decimal,
    pub other_fees: Decimal,
    /// Percentage in [0, 100]
    pub commission_rate_percent: Decimal,
    pub tax_inclusive: bool,
    /// Derived: total value less non-commissionable fees, floored at zero
    pub commissionable_value: Decimal,
    /// Derived from commissionable value, rate and tax flag
    pub expected_commission: Decimal,
    /// Derived from the live installment set by `PlanAggregator` only
    pub earned_commission: Decimal,
    pub status: PlanStatus,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Completed,
    Cancelled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PlanStatus {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid plan status: {}", value)),
        }
    }
}

/// Request to set up a plan together with its installment schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaymentPlan {
    pub enrollment_id: String,
    #[serde(default)]
    pub currency: Option<Currency>,
    pub total_value: Decimal,
    #[serde(default)]
    pub materials_cost: Option<Decimal>,
    #[serde(default)]
    pub admin_fees: Option<Decimal>,
    #[serde(default)]
    pub other_fees: Option<Decimal>,
    pub commission_rate_percent: Decimal,
    pub tax_inclusive: bool,
    pub start_date: NaiveDate,
    pub installments: Vec<NewInstallment>,
}

impl NewPaymentPlan {
    /// Reject input the calculator would otherwise clamp to zero
    pub fn validate(&self) -> Result<()> {
        if self.enrollment_id.trim().is_empty() {
            return Err(AppError::invalid_field("enrollment_id", "must not be empty"));
        }

        if self.total_value < Decimal::ZERO {
            return Err(AppError::invalid_field("total_value", "must not be negative"));
        }
        check_money_scale("total_value", self.total_value)?;

        let fees = [
            ("materials_cost", self.materials_cost),
            ("admin_fees", self.admin_fees),
            ("other_fees", self.other_fees),
        ];
        for (field, fee) in fees {
            let fee = fee.unwrap_or(Decimal::ZERO);
            if fee < Decimal::ZERO {
                return Err(AppError::invalid_field(field, "must not be negative"));
            }
            check_money_scale(field, fee)?;
        }

        if self.commission_rate_percent < Decimal::ZERO
            || self.commission_rate_percent > Decimal::ONE_HUNDRED
        {
            return Err(AppError::invalid_field(
                "commission_rate_percent",
                "must be between 0 and 100",
            ));
        }
        check_money_scale("commission_rate_percent", self.commission_rate_percent)?;

        if self.installments.is_empty() {
            return Err(AppError::invalid_field(
                "installments",
                "at least one installment is required",
            ));
        }

        let mut sequences: Vec<i32> = self.installments.iter().map(|i| i.sequence_number).collect();
        sequences.sort_unstable();
        if sequences.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(AppError::invalid_field(
                "installments",
                "sequence numbers must be unique",
            ));
        }

        for entry in &self.installments {
            check_money_scale("amount", entry.amount)?;
        }

        let scheduled: Decimal = self.installments.iter().map(|i| i.amount).sum();
        if scheduled != self.total_value {
            return Err(AppError::invalid_field(
                "installments",
                format!(
                    "installment amounts ({}) must sum to the total value ({})",
                    scheduled, self.total_value
                ),
            ));
        }

        Ok(())
    }
}

impl PaymentPlan {
    /// Build an active plan with its derived commission figures.
    ///
    /// Call `NewPaymentPlan::validate` first.
    pub fn new(agency_id: &str, request: &NewPaymentPlan, default_currency: Currency) -> Self {
        let materials_cost = request.materials_cost.unwrap_or(Decimal::ZERO);
        let admin_fees = request.admin_fees.unwrap_or(Decimal::ZERO);
        let other_fees = request.other_fees.unwrap_or(Decimal::ZERO);

        let commissionable_value = CommissionCalculator::commissionable_value(
            request.total_value,
            request.materials_cost,
            request.admin_fees,
            request.other_fees,
        );
        let expected_commission = CommissionCalculator::expected_commission(
            commissionable_value,
            request.commission_rate_percent / Decimal::ONE_HUNDRED,
            request.tax_inclusive,
        );

        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            agency_id: agency_id.to_string(),
            enrollment_id: request.enrollment_id.clone(),
            currency: request.currency.unwrap_or(default_currency),
            total_value: request.total_value,
            materials_cost,
            admin_fees,
            other_fees,
            commission_rate_percent: request.commission_rate_percent,
            tax_inclusive: request.tax_inclusive,
            commissionable_value,
            expected_commission,
            earned_commission: Decimal::ZERO,
            status: PlanStatus::Active,
            start_date: request.start_date,
            created_at: now,
            updated_at: now,
        }
    }

    /// Commission rate as a fraction in [0, 1]
    pub fn rate_fraction(&self) -> Decimal {
        self.commission_rate_percent / Decimal::ONE_HUNDRED
    }

    pub fn cancel(&mut self) -> Result<()> {
        if self.status != PlanStatus::Active {
            return Err(AppError::invalid_transition(self.status, PlanStatus::Cancelled));
        }

        self.status = PlanStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }
}
