// Tenant-aware overdue sweep: cutoff handling, idempotence, isolation of
// failing tenants and rows, and the job run log.

#[path = "../helpers/mod.rs"]
mod helpers;

use actix_web::{test, web, App};
use chrono::Duration;
use commission_tracker::modules::installments::models::InstallmentStatus;
use commission_tracker::modules::installments::repositories::InstallmentRepository;
use commission_tracker::modules::installments::services::PaymentInput;
use commission_tracker::modules::jobs;
use commission_tracker::modules::jobs::models::{JobRun, JobStatus};
use commission_tracker::modules::jobs::services::{
    OverdueJobSettings, SummaryStatus, TriggerSource, OVERDUE_JOB_NAME,
};
use helpers::*;
use rust_decimal_macros::dec;

/// One plan for `agency_id`: installment 1 due 2025-03-01, installment 2 due 2025-06-01
async fn seed_plan(h: &Harness, agency_id: &str) -> (String, String, String) {
    let request = plan_request(
        dec!(2000),
        dec!(10),
        true,
        vec![
            schedule_entry(1, dec!(1000), date(2025, 3, 1)),
            schedule_entry(2, dec!(1000), date(2025, 6, 1)),
        ],
    );
    let snapshot = h.plans.create_plan(agency_id, request).await.unwrap();

    (
        snapshot.plan.id.clone(),
        snapshot.installments[0].id.clone(),
        snapshot.installments[1].id.clone(),
    )
}

// 2025-03-02 07:30 UTC is 17:30 in Brisbane (UTC+10), past a 17:00 cutoff
fn after_cutoff() -> chrono::DateTime<chrono::Utc> {
    utc(2025, 3, 2, 7, 30)
}

// 2025-03-02 06:30 UTC is 16:30 in Brisbane, before a 17:00 cutoff
fn before_cutoff() -> chrono::DateTime<chrono::Utc> {
    utc(2025, 3, 2, 6, 30)
}

#[tokio::test]
async fn test_past_due_installment_goes_overdue_after_cutoff() {
    let h = Harness::new(after_cutoff());
    h.store
        .add_agency(agency("agency-a", "Australia/Brisbane", 17))
        .await;
    let (_, due, later) = seed_plan(&h, "agency-a").await;

    let summary = h.job.run(TriggerSource::Scheduled).await.unwrap();

    assert_eq!(summary.status, SummaryStatus::Success);
    assert_eq!(summary.records_updated, 1);
    assert_eq!(summary.tenants_processed, 1);
    assert!(summary.errors.is_empty());
    assert_eq!(
        h.store.installment(&due).await.status,
        InstallmentStatus::Overdue
    );
    assert_eq!(
        h.store.installment(&later).await.status,
        InstallmentStatus::Pending
    );
    assert_eq!(h.events.names(), vec!["installment_overdue"]);
}

#[tokio::test]
async fn test_before_cutoff_leaves_installment_pending() {
    let h = Harness::new(before_cutoff());
    h.store
        .add_agency(agency("agency-a", "Australia/Brisbane", 17))
        .await;
    let (_, due, _) = seed_plan(&h, "agency-a").await;

    let summary = h.job.run(TriggerSource::Scheduled).await.unwrap();

    assert_eq!(summary.status, SummaryStatus::Success);
    assert_eq!(summary.records_updated, 0);
    assert_eq!(summary.tenants_processed, 0);
    assert_eq!(summary.tenants_skipped, 1);
    assert_eq!(
        h.store.installment(&due).await.status,
        InstallmentStatus::Pending
    );
}

#[tokio::test]
async fn test_due_today_is_not_overdue() {
    // 2025-03-01 08:00 UTC is 18:00 on the due date in Brisbane
    let h = Harness::new(utc(2025, 3, 1, 8, 0));
    h.store
        .add_agency(agency("agency-a", "Australia/Brisbane", 17))
        .await;
    let (_, due, _) = seed_plan(&h, "agency-a").await;

    let summary = h.job.run(TriggerSource::Scheduled).await.unwrap();

    assert_eq!(summary.records_updated, 0);
    assert_eq!(
        h.store.installment(&due).await.status,
        InstallmentStatus::Pending
    );
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let h = Harness::new(after_cutoff());
    h.store
        .add_agency(agency("agency-a", "Australia/Brisbane", 17))
        .await;
    seed_plan(&h, "agency-a").await;
    seed_plan(&h, "agency-a").await;

    let first = h.job.run(TriggerSource::Scheduled).await.unwrap();
    h.clock.set(after_cutoff() + Duration::minutes(1));
    let second = h.job.run(TriggerSource::Scheduled).await.unwrap();

    assert_eq!(first.records_updated, 2);
    assert_eq!(second.status, SummaryStatus::Success);
    assert_eq!(second.records_updated, 0);
    assert_eq!(h.store.count_with_status(InstallmentStatus::Overdue).await, 2);
    assert_eq!(h.events.names().len(), 2);

    let runs = h.store.job_runs().await;
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == JobStatus::Success));
    assert_eq!(runs[0].records_updated, 2);
    assert_eq!(runs[1].records_updated, 0);
}

#[tokio::test]
async fn test_malformed_timezone_does_not_block_other_tenants() {
    let h = Harness::new(after_cutoff());
    h.store
        .add_agency(agency("agency-a", "Australia/Atlantis", 17))
        .await;
    h.store
        .add_agency(agency("agency-b", "Australia/Brisbane", 17))
        .await;
    let (_, a_due, _) = seed_plan(&h, "agency-a").await;
    let (_, b_due, _) = seed_plan(&h, "agency-b").await;

    let summary = h.job.run(TriggerSource::Scheduled).await.unwrap();

    assert_eq!(summary.status, SummaryStatus::Failed);
    assert_eq!(summary.tenants_processed, 1);
    assert_eq!(summary.records_updated, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].agency_id, "agency-a");
    assert!(summary.errors[0].message.contains("Australia/Atlantis"));

    assert_eq!(
        h.store.installment(&b_due).await.status,
        InstallmentStatus::Overdue
    );
    assert_eq!(
        h.store.installment(&a_due).await.status,
        InstallmentStatus::Pending
    );

    let runs = h.store.job_runs().await;
    assert_eq!(runs[0].status, JobStatus::Failed);
    assert_eq!(runs[0].records_updated, 1);
    assert!(runs[0]
        .error_message
        .as_deref()
        .unwrap_or_default()
        .starts_with("agency-a:"));
}

#[tokio::test]
async fn test_storage_failure_in_one_tenant_is_isolated() {
    let h = Harness::new(after_cutoff());
    h.store
        .add_agency(agency("agency-a", "Australia/Brisbane", 17))
        .await;
    h.store
        .add_agency(agency("agency-b", "Australia/Brisbane", 17))
        .await;
    seed_plan(&h, "agency-a").await;
    let (_, b_due, _) = seed_plan(&h, "agency-b").await;
    h.store.fail_queries_for("agency-a").await;

    let summary = h.job.run(TriggerSource::Scheduled).await.unwrap();

    assert_eq!(summary.status, SummaryStatus::Failed);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].agency_id, "agency-a");
    assert_eq!(
        h.store.installment(&b_due).await.status,
        InstallmentStatus::Overdue
    );
}

#[tokio::test]
async fn test_bad_rows_are_skipped_not_fatal() {
    let h = Harness::new(after_cutoff());
    h.store
        .add_agency(agency("agency-a", "Australia/Brisbane", 17))
        .await;
    let (_, corrupt, _) = seed_plan(&h, "agency-a").await;
    let (_, failing, _) = seed_plan(&h, "agency-a").await;
    let (_, healthy, _) = seed_plan(&h, "agency-a").await;
    h.store.corrupt_row(&corrupt).await;
    h.store.fail_updates_for(&failing).await;

    let summary = h.job.run(TriggerSource::Scheduled).await.unwrap();

    assert_eq!(summary.status, SummaryStatus::Success);
    assert_eq!(summary.records_updated, 1);
    assert_eq!(summary.rows_failed, 2);
    assert_eq!(
        h.store.installment(&healthy).await.status,
        InstallmentStatus::Overdue
    );
    assert_eq!(
        h.store.installment(&failing).await.status,
        InstallmentStatus::Pending
    );
}

#[tokio::test]
async fn test_paid_and_cancelled_plans_are_not_swept() {
    let h = Harness::new(after_cutoff());
    h.store
        .add_agency(agency("agency-a", "Australia/Brisbane", 17))
        .await;
    let (_, paid, _) = seed_plan(&h, "agency-a").await;
    let (cancelled_plan, cancelled_due, _) = seed_plan(&h, "agency-a").await;

    h.plans
        .record_payment(
            "agency-a",
            &paid,
            PaymentInput {
                paid_date: date(2025, 3, 1),
                paid_amount: dec!(1000),
                notes: None,
            },
        )
        .await
        .unwrap();
    h.plans
        .cancel_plan("agency-a", &cancelled_plan)
        .await
        .unwrap();

    let summary = h.job.run(TriggerSource::Scheduled).await.unwrap();

    assert_eq!(summary.records_updated, 0);
    assert_eq!(h.store.installment(&paid).await.status, InstallmentStatus::Paid);
    assert_eq!(
        h.store.installment(&cancelled_due).await.status,
        InstallmentStatus::Cancelled
    );
}

#[tokio::test]
async fn test_tenants_follow_their_own_cutoff() {
    // 07:30 UTC: 17:30 in Brisbane, 20:30 in Auckland (NZDT), 02:30 in Toronto
    let h = Harness::new(after_cutoff());
    h.store
        .add_agency(agency("brisbane", "Australia/Brisbane", 17))
        .await;
    h.store
        .add_agency(agency("auckland", "Pacific/Auckland", 17))
        .await;
    h.store
        .add_agency(agency("toronto", "America/Toronto", 17))
        .await;
    let (_, brisbane_due, _) = seed_plan(&h, "brisbane").await;
    let (_, auckland_due, _) = seed_plan(&h, "auckland").await;
    let (_, toronto_due, _) = seed_plan(&h, "toronto").await;

    let summary = h.job.run(TriggerSource::Scheduled).await.unwrap();

    assert_eq!(summary.tenants_processed, 2);
    assert_eq!(summary.tenants_skipped, 1);
    assert_eq!(summary.records_updated, 2);
    assert_eq!(
        h.store.installment(&brisbane_due).await.status,
        InstallmentStatus::Overdue
    );
    assert_eq!(
        h.store.installment(&auckland_due).await.status,
        InstallmentStatus::Overdue
    );
    assert_eq!(
        h.store.installment(&toronto_due).await.status,
        InstallmentStatus::Pending
    );
}

#[tokio::test]
async fn test_fatal_failure_marks_run_failed() {
    let h = Harness::new(after_cutoff());
    h.store.fail_list_agencies().await;

    assert!(h.job.run(TriggerSource::Scheduled).await.is_err());

    let runs = h.store.job_runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, JobStatus::Failed);
    assert!(runs[0].completed_at.is_some());
}

fn running_run(id: u64, started_at: chrono::DateTime<chrono::Utc>) -> JobRun {
    JobRun {
        id,
        job_name: OVERDUE_JOB_NAME.to_string(),
        started_at,
        completed_at: None,
        status: JobStatus::Running,
        records_updated: 0,
        error_message: None,
        metadata: serde_json::json!({ "trigger": "scheduled" }),
    }
}

#[tokio::test]
async fn test_live_running_row_blocks_new_run() {
    let h = Harness::new(after_cutoff());
    h.store
        .insert_job_run(running_run(1, after_cutoff() - Duration::minutes(5)))
        .await;

    let summary = h
        .job
        .run(TriggerSource::Manual { force: true })
        .await
        .unwrap();

    assert_eq!(summary.status, SummaryStatus::Skipped);
    assert!(summary.run_id.is_none());
    assert_eq!(h.store.job_runs().await.len(), 1);
}

#[tokio::test]
async fn test_stuck_row_does_not_block_and_can_be_closed() {
    let h = Harness::new(after_cutoff());
    h.store
        .insert_job_run(running_run(1, after_cutoff() - Duration::hours(3)))
        .await;

    let summary = h.job.run(TriggerSource::Scheduled).await.unwrap();
    assert_eq!(summary.status, SummaryStatus::Success);
    assert_eq!(summary.run_id, Some(2));

    let stuck = h
        .runs
        .stuck_runs(OVERDUE_JOB_NAME, h.job.settings().stuck_after)
        .await
        .unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].id, 1);

    let closed = h.runs.mark_failed(1, "worker killed").await.unwrap();
    assert_eq!(closed.status, JobStatus::Failed);
    assert!(h
        .runs
        .stuck_runs(OVERDUE_JOB_NAME, h.job.settings().stuck_after)
        .await
        .unwrap()
        .is_empty());

    assert!(h.runs.mark_failed(1, "again").await.is_err());
}

#[tokio::test]
async fn test_manual_trigger_respects_recent_success() {
    let h = Harness::with_settings(after_cutoff(), OverdueJobSettings::default());
    h.store
        .add_agency(agency("agency-a", "Australia/Brisbane", 17))
        .await;
    seed_plan(&h, "agency-a").await;

    h.job.run(TriggerSource::Scheduled).await.unwrap();

    h.clock.set(after_cutoff() + Duration::minutes(10));
    let skipped = h
        .job
        .run(TriggerSource::Manual { force: false })
        .await
        .unwrap();
    assert_eq!(skipped.status, SummaryStatus::Skipped);

    let forced = h
        .job
        .run(TriggerSource::Manual { force: true })
        .await
        .unwrap();
    assert_eq!(forced.status, SummaryStatus::Success);
    assert_eq!(forced.records_updated, 0);

    h.clock.set(after_cutoff() + Duration::hours(2));
    let later = h
        .job
        .run(TriggerSource::Manual { force: false })
        .await
        .unwrap();
    assert_eq!(later.status, SummaryStatus::Success);
}

#[tokio::test]
async fn test_overlapping_runs_mark_each_installment_once() {
    let h = Harness::new(after_cutoff());
    h.store
        .add_agency(agency("agency-a", "Australia/Brisbane", 17))
        .await;
    let (_, due, _) = seed_plan(&h, "agency-a").await;
    let stale = h.store.installment(&due).await;

    let (first, second) = tokio::join!(
        h.job.run(TriggerSource::Scheduled),
        h.job.run(TriggerSource::Manual { force: true }),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.records_updated + second.records_updated, 1);
    assert_eq!(h.events.names(), vec!["installment_overdue"]);
    assert_eq!(h.store.count_with_status(InstallmentStatus::Overdue).await, 1);
    assert!(h
        .store
        .job_runs()
        .await
        .iter()
        .all(|run| run.status != JobStatus::Running));

    // A sweep that loaded the row before another run updated it changes nothing
    assert!(!h.store.mark_overdue("agency-a", &stale).await.unwrap());
}

#[actix_web::test]
async fn test_trigger_endpoint_returns_summary() {
    let h = Harness::new(after_cutoff());
    h.store
        .add_agency(agency("agency-a", "Australia/Brisbane", 17))
        .await;
    seed_plan(&h, "agency-a").await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.job.clone()))
            .app_data(web::Data::new(h.runs.clone()))
            .service(web::scope("/api").configure(jobs::controllers::configure)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/jobs/overdue-status/run?force=true")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["records_updated"], 1);
    assert_eq!(body["tenants_processed"], 1);
    assert!(body["errors"].as_array().unwrap().is_empty());

    let req = test::TestRequest::get()
        .uri("/api/jobs/overdue-status/runs/stuck")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body.as_array().unwrap().is_empty());
}
