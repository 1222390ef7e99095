use rust_decimal::Decimal;

use crate::core::round_money;
use crate::modules::installments::models::Installment;
use crate::modules::plans::models::PaymentPlan;

/// Divisor that backs the flat 10% tax out of a tax-exclusive value (1.10)
pub const TAX_DIVISOR: Decimal = Decimal::from_parts(110, 0, 0, false, 2);

/// Commission arithmetic over plan values. Out-of-range inputs produce zero.
pub struct CommissionCalculator;

impl CommissionCalculator {
    /// `max(total - materials - admin - other, 0)`; missing fees count as zero.
    ///
    /// Fees larger than the total clamp to zero rather than failing.
    pub fn commissionable_value(
        total_value: Decimal,
        materials_cost: Option<Decimal>,
        admin_fees: Option<Decimal>,
        other_fees: Option<Decimal>,
    ) -> Decimal {
        let fees = materials_cost.unwrap_or(Decimal::ZERO)
            + admin_fees.unwrap_or(Decimal::ZERO)
            + other_fees.unwrap_or(Decimal::ZERO);

        (total_value - fees).max(Decimal::ZERO)
    }

    /// Expected commission for a plan, rounded half away from zero to cents.
    ///
    /// Tax-exclusive values are divided by 1.10 before the rate is applied.
    /// A negative value or a rate outside [0, 1] yields zero.
    pub fn expected_commission(
        commissionable_value: Decimal,
        rate_fraction: Decimal,
        tax_inclusive: bool,
    ) -> Decimal {
        if commissionable_value < Decimal::ZERO
            || rate_fraction < Decimal::ZERO
            || rate_fraction > Decimal::ONE
        {
            return Decimal::ZERO;
        }

        let base = if tax_inclusive {
            commissionable_value
        } else {
            commissionable_value / TAX_DIVISOR
        };

        round_money(base * rate_fraction)
    }

    /// Sum of paid amounts over paid and partial installments
    pub fn total_paid(installments: &[Installment]) -> Decimal {
        installments.iter().map(Installment::received_amount).sum()
    }

    /// `round((total_paid / total_value) * expected_commission, 2)`, zero for a zero-value plan
    pub fn earned_commission(plan: &PaymentPlan, installments: &[Installment]) -> Decimal {
        Self::earned_from_paid(
            Self::total_paid(installments),
            plan.total_value,
            plan.expected_commission,
        )
    }

    pub fn earned_from_paid(
        total_paid: Decimal,
        total_value: Decimal,
        expected_commission: Decimal,
    ) -> Decimal {
        if total_value.is_zero() {
            return Decimal::ZERO;
        }

        round_money(total_paid / total_value * expected_commission)
    }
}
