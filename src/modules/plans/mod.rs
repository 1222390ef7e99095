// Payment plans module

pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{NewPaymentPlan, PaymentPlan, PlanStatus};
pub use repositories::{MySqlPlanRepository, PlanRepository, PlanSnapshot};
pub use services::{PlanAggregator, PlanService, PlanSummary};
