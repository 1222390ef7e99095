pub mod services;

pub use services::CommissionCalculator;
