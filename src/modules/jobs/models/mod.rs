mod job_run;

pub use job_run::{JobRun, JobStatus};
