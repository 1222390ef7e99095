use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing_actix_web::TracingLogger;

use commission_tracker::config::Config;
use commission_tracker::core::{Clock, SystemClock};
use commission_tracker::middleware::{json_error_handler, query_error_handler, ErrorHandler, RequestId};
use commission_tracker::modules::agencies::{AgencyRepository, MySqlAgencyRepository};
use commission_tracker::modules::events::{EventSink, TracingEventSink};
use commission_tracker::modules::installments::{
    InstallmentLedger, InstallmentRepository, MySqlInstallmentRepository,
};
use commission_tracker::modules::jobs::services::OverdueJobSettings;
use commission_tracker::modules::jobs::{
    JobRunRepository, JobRunService, MySqlJobRunRepository, OverdueScheduler, OverdueStatusJob,
};
use commission_tracker::modules::plans::{MySqlPlanRepository, PlanRepository, PlanService};
use commission_tracker::modules::{health, installments, jobs, plans};
use commission_tracker::telemetry;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    telemetry::init_tracing(&config.app);

    tracing::info!("Starting commission tracker");
    tracing::info!("Environment: {}", config.app.env);
    tracing::info!("Server binding to: {}", config.server.bind_address());

    let db_pool = config
        .database
        .create_pool()
        .await
        .context("Failed to create database pool")?;

    tracing::info!(
        "Database pool initialized ({} connections)",
        config.database.pool_size
    );

    if config.database.run_migrations {
        config
            .database
            .migrate(&db_pool)
            .await
            .context("Failed to apply migrations")?;
        tracing::info!("Database migrations applied");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let agency_repo: Arc<dyn AgencyRepository> =
        Arc::new(MySqlAgencyRepository::new(db_pool.clone()));
    let plan_repo: Arc<dyn PlanRepository> = Arc::new(MySqlPlanRepository::new(db_pool.clone()));
    let installment_repo: Arc<dyn InstallmentRepository> =
        Arc::new(MySqlInstallmentRepository::new(db_pool.clone()));
    let job_run_repo: Arc<dyn JobRunRepository> =
        Arc::new(MySqlJobRunRepository::new(db_pool.clone()));

    let plan_service = Arc::new(PlanService::new(
        agency_repo.clone(),
        plan_repo,
        installment_repo.clone(),
        InstallmentLedger::new(config.payments.ledger_policy()),
        events.clone(),
        clock.clone(),
    ));
    let overdue_job = Arc::new(OverdueStatusJob::new(
        agency_repo,
        installment_repo,
        job_run_repo.clone(),
        events,
        clock.clone(),
        OverdueJobSettings::from(&config.overdue_job),
    ));
    let job_run_service = Arc::new(JobRunService::new(job_run_repo, clock));

    if config.overdue_job.enabled {
        let scheduler = Arc::new(OverdueScheduler::new(
            overdue_job.clone(),
            Duration::from_secs(config.overdue_job.interval_secs),
        ));
        tokio::spawn(scheduler.start());
    } else {
        tracing::warn!("Overdue status scheduler disabled");
    }

    let bind_address = config.server.bind_address();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(ErrorHandler)
            .wrap(RequestId)
            .wrap(TracingLogger::default())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::new(plan_service.clone()))
            .app_data(web::Data::new(overdue_job.clone()))
            .app_data(web::Data::new(job_run_service.clone()))
            .configure(health::controllers::configure)
            .service(
                web::scope("/api")
                    .configure(plans::controllers::configure)
                    .configure(installments::controllers::configure)
                    .configure(jobs::controllers::configure),
            )
    })
    .workers(config.server.workers)
    .bind(&bind_address)?
    .run();

    tracing::info!("Server started at http://{}", bind_address);

    server.await?;
    Ok(())
}
