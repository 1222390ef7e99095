use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::modules::jobs::services::overdue_status_job::{
    OverdueStatusJob, SummaryStatus, TriggerSource,
};

/// Background loop triggering the overdue sweep on a fixed interval.
///
/// Runs hourly by default: each tenant is swept on the first tick after its
/// local cutoff, and ticks before the cutoff skip that tenant.
/// Spawn with `tokio::spawn(scheduler.start())` from `main`.
pub struct OverdueScheduler {
    job: Arc<OverdueStatusJob>,
    period: Duration,
}

impl OverdueScheduler {
    pub fn new(job: Arc<OverdueStatusJob>, period: Duration) -> Self {
        Self { job, period }
    }

    pub async fn start(self: Arc<Self>) {
        info!(
            interval_secs = self.period.as_secs(),
            "Starting overdue status scheduler"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            match self.job.run(TriggerSource::Scheduled).await {
                Ok(summary) if summary.status == SummaryStatus::Failed => {
                    warn!(
                        run_id = ?summary.run_id,
                        tenant_failures = summary.errors.len(),
                        "Overdue sweep finished with tenant failures"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Overdue sweep failed");
                }
            }
        }
    }
}
