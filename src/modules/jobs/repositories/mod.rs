pub mod job_run_repository;

pub use job_run_repository::{JobRunRepository, MySqlJobRunRepository};
