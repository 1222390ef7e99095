//! Commission tracking for education agencies
//!
//! Payment plans, installment payments, earned-commission aggregation and the
//! tenant-aware overdue sweep.

pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;
pub mod telemetry;

// Re-export commonly used types
pub use modules::commissions;
pub use modules::installments;
pub use modules::jobs;
pub use modules::plans;
