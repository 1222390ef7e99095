use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::AppError;

/// Decimal places kept for every stored money amount and commission figure
pub const MONEY_SCALE: u32 = 2;

/// Round a money amount to two decimal places, half away from zero.
///
/// `Decimal::round_dp` uses banker's rounding, which would turn 1254.545 into
/// 1254.54; commission figures must round the midpoint up in magnitude.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Reject a money or rate value carrying more than `MONEY_SCALE` decimal places.
///
/// Money and rate columns store two places. Trailing zeros do not count, so
/// `1000.000` passes.
pub fn check_money_scale(field: &'static str, value: Decimal) -> crate::core::Result<()> {
    if value.normalize().scale() > MONEY_SCALE {
        return Err(AppError::invalid_field(
            field,
            format!("{} has more than {} decimal places", value, MONEY_SCALE),
        ));
    }

    Ok(())
}

/// Agency default currencies. All of them carry two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    AUD,
    NZD,
    USD,
    CAD,
    GBP,
    EUR,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::AUD => "AUD",
            Currency::NZD => "NZD",
            Currency::USD => "USD",
            Currency::CAD => "CAD",
            Currency::GBP => "GBP",
            Currency::EUR => "EUR",
        }
    }

    /// Formats an amount for display with the currency code
    pub fn format_amount(&self, amount: Decimal) -> String {
        format!("{} {:.2}", self, round_money(amount))
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::AUD
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AUD" => Ok(Currency::AUD),
            "NZD" => Ok(Currency::NZD),
            "USD" => Ok(Currency::USD),
            "CAD" => Ok(Currency::CAD),
            "GBP" => Ok(Currency::GBP),
            "EUR" => Ok(Currency::EUR),
            _ => Err(format!("Invalid currency: {}", s)),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
