pub mod plan_repository;

pub use plan_repository::{MySqlPlanRepository, PlanMutation, PlanRepository, PlanSnapshot};
