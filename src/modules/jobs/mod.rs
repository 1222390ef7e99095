// Batch jobs module

pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{JobRun, JobStatus};
pub use repositories::{JobRunRepository, MySqlJobRunRepository};
pub use services::{JobRunService, JobSummary, OverdueScheduler, OverdueStatusJob, TriggerSource};
