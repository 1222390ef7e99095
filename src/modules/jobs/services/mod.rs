pub mod job_run_service;
pub mod overdue_scheduler;
pub mod overdue_status_job;

pub use job_run_service::JobRunService;
pub use overdue_scheduler::OverdueScheduler;
pub use overdue_status_job::{
    JobSummary, OverdueJobSettings, OverdueStatusJob, SummaryStatus, TenantFailure,
    TriggerSource, OVERDUE_JOB_NAME,
};
