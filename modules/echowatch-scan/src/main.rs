use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use echowatch_common::Config;
use echowatch_scan::health::HealthMonitor;
use echowatch_scan::providers::ProviderSet;
use echowatch_scan::{JobController, Trigger, TriggerAction, TriggerOpts};
use echowatch_store::{migrate, JobStore, PgDirectory, RunStore};

#[derive(Parser)]
#[command(name = "echowatch-scan", about = "One-shot visibility scan runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Trigger (or resume) a scan for one org and run it to completion.
    Run {
        /// Org to scan.
        #[arg(long)]
        org: Uuid,
        /// Bypass the daily execution window (idempotency still applies).
        #[arg(long)]
        bypass_window: bool,
        /// Release a terminal job's idempotency key and start fresh.
        #[arg(long)]
        replace: bool,
        /// Resume this job id instead of starting a new one.
        #[arg(long)]
        resume: Option<Uuid>,
    },
    /// Print the scan-health report as JSON.
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("echowatch=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = Config::scan_from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    migrate(&pool).await?;

    let jobs: Arc<JobStore> = Arc::new(JobStore::new(pool.clone()));
    let runs: Arc<RunStore> = Arc::new(RunStore::new(pool.clone()));
    let directory: Arc<PgDirectory> = Arc::new(PgDirectory::new(pool.clone()));
    let providers = ProviderSet::from_config(&config);

    match cli.command {
        Command::Run {
            org,
            bypass_window,
            replace,
            resume,
        } => {
            let trigger = Trigger::new(jobs.clone(), directory.clone(), providers.clone());
            let controller =
                JobController::new(jobs.clone(), runs.clone(), directory.clone(), providers);

            let outcome = trigger
                .trigger(
                    org,
                    TriggerOpts {
                        test: bypass_window,
                        replace,
                        resume_job_id: resume,
                    },
                )
                .await?;

            if !outcome.accepted {
                info!(
                    reason = outcome.reason.as_deref().unwrap_or("unknown"),
                    "Trigger rejected"
                );
                return Ok(());
            }

            let job_id = outcome
                .job_id
                .ok_or_else(|| anyhow::anyhow!("accepted trigger without a job id"))?;
            let stats = match outcome.action {
                TriggerAction::Resume => controller.resume(job_id).await?,
                _ => controller.run(job_id).await?,
            };

            info!(
                job_id = %job_id,
                successful = stats.successful_runs,
                total = stats.total_runs,
                "Scan finished"
            );
        }
        Command::Health => {
            let monitor = HealthMonitor::new(jobs, runs);
            let report = monitor.check().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
