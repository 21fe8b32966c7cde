//! Health monitor over in-memory repos: stuck-job detection and the wire
//! shape of the report.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use echowatch_common::{
    BatchJob, Citation, CitationKind, Extraction, JobStatus, ProviderKind, RunRecord, RunStatus,
};
use echowatch_scan::health::{CitationHealth, HealthMonitor};
use echowatch_scan::persist::{MemoryJobRepo, MemoryRunRepo};
use echowatch_scan::traits::RunRepo;

fn job(status: JobStatus, heartbeat_age_minutes: i64) -> BatchJob {
    let now = Utc::now();
    BatchJob {
        id: Uuid::new_v4(),
        org_id: Uuid::new_v4(),
        status,
        started_at: now - Duration::minutes(heartbeat_age_minutes + 5),
        last_heartbeat: now - Duration::minutes(heartbeat_age_minutes),
        completed_pairs: Vec::new(),
        idempotency_key: None,
    }
}

async fn seed_run(runs: &MemoryRunRepo, citations: Vec<Citation>) {
    let record = RunRecord {
        batch_job_id: Uuid::new_v4(),
        prompt_id: Uuid::new_v4(),
        provider: ProviderKind::OpenAi,
        status: RunStatus::Success,
        token_in: 10,
        token_out: 10,
        run_at: Utc::now(),
    };
    let extraction = Extraction {
        citations,
        ..Extraction::default()
    };
    runs.upsert_run(Uuid::new_v4(), &record, &extraction, None)
        .await
        .unwrap();
}

fn url_citation(value: &str) -> Citation {
    Citation {
        kind: CitationKind::Url,
        value: value.to_string(),
        title: None,
        domain: None,
    }
}

#[tokio::test]
async fn stale_in_progress_jobs_are_reported_stuck() {
    let jobs = Arc::new(MemoryJobRepo::new());
    let runs = Arc::new(MemoryRunRepo::new());

    let stuck = job(JobStatus::InProgress, 10);
    jobs.insert(stuck.clone());
    jobs.insert(job(JobStatus::InProgress, 0)); // alive
    jobs.insert(job(JobStatus::Completed, 60)); // terminal, not stuck

    let monitor = HealthMonitor::new(jobs, runs);
    let report = monitor.check().await.unwrap();

    assert_eq!(report.stuck_jobs.count, 1);
    assert_eq!(report.stuck_jobs.job_ids, vec![stuck.id]);
    assert!(report.stuck_jobs.details[0].elapsed_seconds >= 600);
    assert_eq!(report.overall.status, "attention");
}

#[tokio::test]
async fn empty_window_reports_no_data_and_stays_ok() {
    let monitor = HealthMonitor::new(
        Arc::new(MemoryJobRepo::new()),
        Arc::new(MemoryRunRepo::new()),
    );
    let report = monitor.check().await.unwrap();

    assert_eq!(report.citations.health, CitationHealth::NoData);
    assert_eq!(report.overall.status, "ok");
}

#[tokio::test]
async fn citation_rates_are_sampled_from_recent_runs() {
    let jobs = Arc::new(MemoryJobRepo::new());
    let runs = Arc::new(MemoryRunRepo::new());

    for _ in 0..6 {
        seed_run(&runs, vec![url_citation("https://example.com/a")]).await;
    }
    for _ in 0..6 {
        seed_run(&runs, vec![]).await;
    }

    let monitor = HealthMonitor::new(jobs, runs);
    let report = monitor.check().await.unwrap();

    assert_eq!(report.citations.extraction_rate, 0.5);
    assert_eq!(report.citations.quality_rate, 0.5);
    assert_eq!(report.citations.health, CitationHealth::Healthy);
    assert_eq!(report.overall.status, "ok");
}

#[tokio::test]
async fn report_serializes_to_the_documented_shape() {
    let jobs = Arc::new(MemoryJobRepo::new());
    jobs.insert(job(JobStatus::InProgress, 10));
    let runs = Arc::new(MemoryRunRepo::new());
    seed_run(&runs, vec![url_citation("https://example.com")]).await;

    let monitor = HealthMonitor::new(jobs, runs);
    let report = monitor.check().await.unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert!(json.get("timestamp").is_some());
    assert!(json["stuckJobs"].get("count").is_some());
    assert!(json["stuckJobs"].get("jobIds").is_some());
    assert!(json["stuckJobs"]["details"][0].get("elapsedSeconds").is_some());
    assert!(json["citations"].get("extractionRate").is_some());
    assert!(json["citations"].get("qualityRate").is_some());
    assert!(json["citations"].get("health").is_some());
    assert!(json["overall"].get("status").is_some());
}
