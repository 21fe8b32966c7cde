use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use echowatch_common::Config;
use echowatch_scan::health::HealthMonitor;
use echowatch_scan::{JobController, ProviderSet, Trigger};
use echowatch_store::{migrate, JobStore, PgDirectory, RunStore};

mod handlers;

pub struct AppState {
    pub trigger: Trigger,
    pub controller: JobController,
    pub monitor: HealthMonitor,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("echowatch=info".parse()?))
        .init();

    let config = Config::api_from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    migrate(&pool).await?;

    let jobs: Arc<JobStore> = Arc::new(JobStore::new(pool.clone()));
    let runs: Arc<RunStore> = Arc::new(RunStore::new(pool.clone()));
    let directory: Arc<PgDirectory> = Arc::new(PgDirectory::new(pool.clone()));
    let providers = ProviderSet::from_config(&config);

    let state = Arc::new(AppState {
        trigger: Trigger::new(jobs.clone(), directory.clone(), providers.clone()),
        controller: JobController::new(
            jobs.clone(),
            runs.clone(),
            directory.clone(),
            providers,
        ),
        monitor: HealthMonitor::new(jobs, runs),
    });

    let app = Router::new()
        .route("/api/scan/trigger", post(handlers::trigger_scan))
        .route("/api/health/scan", get(handlers::scan_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!(addr = addr.as_str(), "Echowatch API listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
