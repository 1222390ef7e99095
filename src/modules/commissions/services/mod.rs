pub mod commission_calculator;

pub use commission_calculator::{CommissionCalculator, TAX_DIVISOR};
