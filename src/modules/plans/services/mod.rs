pub mod plan_aggregator;
pub mod plan_service;

pub use plan_aggregator::{PlanAggregator, PlanUpdate};
pub use plan_service::{PaymentOutcome, PlanService, PlanSummary};
