pub mod agencies;
pub mod commissions;
pub mod events;
pub mod health;
pub mod installments;
pub mod jobs;
pub mod plans;
