//! End-to-end job lifecycle over in-memory repos and scripted providers:
//! state machine transitions, partial-failure isolation, resume semantics,
//! persistence retry, cancellation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use ai_client::RetryPolicy;
use echowatch_common::{
    BatchJob, EchowatchError, Extraction, JobStatus, Org, PairKey, ProviderKind, RunRecord,
    RunStatus, SubscriptionTier,
};
use echowatch_scan::persist::{MemoryDirectory, MemoryJobRepo, MemoryRunRepo};
use echowatch_scan::providers::ProviderSet;
use echowatch_scan::testing::{make_org, make_prompt, mock_provider_set, MockBehavior, MockProvider};
use echowatch_scan::traits::{JobRepo, RunRepo};
use echowatch_scan::{BatchRunner, JobController, WorkUnit};

struct Harness {
    jobs: Arc<MemoryJobRepo>,
    runs: Arc<MemoryRunRepo>,
    org: Org,
    prompts: Vec<echowatch_common::Prompt>,
    controller: JobController,
}

fn harness(providers: ProviderSet, prompt_count: usize) -> Harness {
    harness_with_concurrency(providers, prompt_count, 2)
}

fn harness_with_concurrency(
    providers: ProviderSet,
    prompt_count: usize,
    concurrency: usize,
) -> Harness {
    let jobs = Arc::new(MemoryJobRepo::new());
    let runs = Arc::new(MemoryRunRepo::new());
    let directory = Arc::new(MemoryDirectory::new());

    let org = make_org("Acme", SubscriptionTier::Growth);
    directory.add_org(org.clone());

    let prompts: Vec<_> = (0..prompt_count)
        .map(|i| {
            let prompt = make_prompt(org.id, &format!("best crm tool {i}"));
            directory.add_prompt(prompt.clone());
            prompt
        })
        .collect();

    let controller = JobController::new(jobs.clone(), runs.clone(), directory, providers)
        .with_retry_policy(RetryPolicy::immediate())
        .with_concurrency(concurrency);

    Harness {
        jobs,
        runs,
        org,
        prompts,
        controller,
    }
}

fn queued_job(h: &Harness) -> BatchJob {
    let now = Utc::now();
    let job = BatchJob {
        id: Uuid::new_v4(),
        org_id: h.org.id,
        status: JobStatus::Queued,
        started_at: now,
        last_heartbeat: now,
        completed_pairs: Vec::new(),
        idempotency_key: Some(format!("{}-2024-06-01", h.org.id)),
    };
    h.jobs.insert(job.clone());
    job
}

async fn job_status(h: &Harness, id: Uuid) -> JobStatus {
    h.jobs.get(id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn successful_scan_runs_every_pair_and_completes() {
    let providers = mock_provider_set(
        &[ProviderKind::OpenAi, ProviderKind::Gemini],
        MockBehavior::Succeed("Acme is the leading option, ahead of HubSpot.".to_string()),
    );
    let h = harness(providers, 2);
    let job = queued_job(&h);

    let stats = h.controller.run(job.id).await.unwrap();

    assert_eq!(stats.total_runs, 4);
    assert_eq!(stats.successful_runs, 4);
    assert_eq!(job_status(&h, job.id).await, JobStatus::Completed);

    let rows = h.runs.rows();
    assert_eq!(rows.len(), 4);
    for row in &rows {
        assert_eq!(row.run.status, RunStatus::Success);
        let score = row.score.as_ref().unwrap();
        assert!(score.org_brand_present);
        assert!(score.score >= 0.0 && score.score <= 10.0);
        assert!(row.run.token_out > 0);
    }

    // Progress metadata recorded every unit.
    let finished = h.jobs.get(job.id).await.unwrap().unwrap();
    assert_eq!(finished.completed_pairs.len(), 4);
}

#[tokio::test]
async fn one_provider_failing_never_aborts_the_batch() {
    let mut providers = ProviderSet::new();
    providers.insert(
        ProviderKind::OpenAi,
        Arc::new(MockProvider::new(
            "openai",
            MockBehavior::Succeed("Acme leads.".to_string()),
        )),
    );
    providers.insert(
        ProviderKind::Gemini,
        Arc::new(MockProvider::new("gemini", MockBehavior::FailTransient)),
    );
    let h = harness(providers, 2);
    let job = queued_job(&h);

    let stats = h.controller.run(job.id).await.unwrap();

    assert_eq!(stats.successful_runs, 2);
    assert_eq!(stats.provider_errors, 2);
    assert!(stats.successful_runs >= 1);
    assert_eq!(job_status(&h, job.id).await, JobStatus::Completed);

    // The failed pairs are marked attempted so a resume won't loop on them.
    for prompt in &h.prompts {
        let row = h
            .runs
            .row(job.id, prompt.id, ProviderKind::Gemini)
            .expect("error run persisted");
        assert_eq!(row.run.status, RunStatus::Error);
        assert!(row.score.is_none());
    }
}

#[tokio::test]
async fn auth_failures_are_fatal_per_call_and_batch_continues() {
    let mut providers = ProviderSet::new();
    providers.insert(
        ProviderKind::OpenAi,
        Arc::new(MockProvider::new(
            "openai",
            MockBehavior::Succeed("Acme leads.".to_string()),
        )),
    );
    let gemini = Arc::new(MockProvider::new("gemini", MockBehavior::FailAuth));
    providers.insert(ProviderKind::Gemini, gemini.clone());
    let h = harness(providers, 1);
    let job = queued_job(&h);

    let stats = h.controller.run(job.id).await.unwrap();

    assert_eq!(stats.successful_runs, 1);
    assert_eq!(stats.provider_errors, 1);
    // No retry on 401: one call only.
    assert_eq!(gemini.calls(), 1);
    assert_eq!(job_status(&h, job.id).await, JobStatus::Completed);
}

#[tokio::test]
async fn all_units_failing_marks_the_job_failed() {
    let providers = mock_provider_set(&[ProviderKind::OpenAi], MockBehavior::FailTransient);
    let h = harness(providers, 2);
    let job = queued_job(&h);

    let stats = h.controller.run(job.id).await.unwrap();

    assert_eq!(stats.successful_runs, 0);
    assert_eq!(stats.provider_errors, 2);
    assert_eq!(job_status(&h, job.id).await, JobStatus::Failed);
}

#[tokio::test]
async fn empty_work_set_completes_trivially() {
    let providers = mock_provider_set(
        &[ProviderKind::OpenAi],
        MockBehavior::Succeed("ok".to_string()),
    );
    let h = harness(providers, 0);
    let job = queued_job(&h);

    let stats = h.controller.run(job.id).await.unwrap();

    assert_eq!(stats.total_runs, 0);
    assert_eq!(job_status(&h, job.id).await, JobStatus::Completed);
}

#[tokio::test]
async fn resume_of_a_failed_job_replaces_the_error_run() {
    // Three transient failures exhaust the first run's retry budget; the
    // fourth call (the resume) succeeds.
    let mut providers = ProviderSet::new();
    let flaky = Arc::new(MockProvider::new(
        "openai",
        MockBehavior::FlakyThenSucceed {
            failures: 3,
            text: "Acme first.".to_string(),
        },
    ));
    providers.insert(ProviderKind::OpenAi, flaky.clone());
    let h = harness(providers, 1);
    let job = queued_job(&h);

    let first = h.controller.run(job.id).await.unwrap();
    assert_eq!(first.successful_runs, 0);
    assert_eq!(job_status(&h, job.id).await, JobStatus::Failed);

    let resumed = h.controller.resume(job.id).await.unwrap();
    assert_eq!(resumed.successful_runs, 1);
    assert_eq!(job_status(&h, job.id).await, JobStatus::Completed);
    assert_eq!(flaky.calls(), 4);

    // Same key, replaced row, not a duplicate.
    let rows = h.runs.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].run.status, RunStatus::Success);
}

#[tokio::test]
async fn resume_of_a_stuck_job_replays_only_unfinished_pairs() {
    let mut providers = ProviderSet::new();
    let client = Arc::new(MockProvider::new(
        "openai",
        MockBehavior::Succeed("Acme again.".to_string()),
    ));
    providers.insert(ProviderKind::OpenAi, client.clone());
    let h = harness(providers, 2);

    // A job that died mid-run: in_progress, stale heartbeat, one pair done.
    let now = Utc::now();
    let job = BatchJob {
        id: Uuid::new_v4(),
        org_id: h.org.id,
        status: JobStatus::InProgress,
        started_at: now - Duration::minutes(20),
        last_heartbeat: now - Duration::minutes(10),
        completed_pairs: vec![PairKey {
            prompt_id: h.prompts[0].id,
            provider: ProviderKind::OpenAi,
        }],
        idempotency_key: Some(format!("{}-2024-06-01", h.org.id)),
    };
    h.jobs.insert(job.clone());
    h.runs
        .upsert_run(
            h.org.id,
            &RunRecord {
                batch_job_id: job.id,
                prompt_id: h.prompts[0].id,
                provider: ProviderKind::OpenAi,
                status: RunStatus::Success,
                token_in: 10,
                token_out: 10,
                run_at: now - Duration::minutes(11),
            },
            &Extraction::default(),
            None,
        )
        .await
        .unwrap();

    let stats = h.controller.resume(job.id).await.unwrap();

    // Only the second prompt's pair ran.
    assert_eq!(stats.total_runs, 1);
    assert_eq!(client.calls(), 1);
    assert_eq!(job_status(&h, job.id).await, JobStatus::Completed);

    let done = h.runs.successful_pairs(job.id).await.unwrap();
    assert_eq!(done.len(), 2);
}

#[tokio::test]
async fn resume_of_a_live_job_loses_the_race() {
    let providers = mock_provider_set(
        &[ProviderKind::OpenAi],
        MockBehavior::Succeed("ok".to_string()),
    );
    let h = harness(providers, 1);

    let now = Utc::now();
    let job = BatchJob {
        id: Uuid::new_v4(),
        org_id: h.org.id,
        status: JobStatus::InProgress,
        started_at: now,
        last_heartbeat: now, // fresh: somebody is alive and working
        completed_pairs: Vec::new(),
        idempotency_key: None,
    };
    h.jobs.insert(job.clone());

    let result = h.controller.resume(job.id).await;
    assert!(matches!(result, Err(EchowatchError::JobConflict)));
}

#[tokio::test]
async fn resume_rejects_unknown_and_completed_jobs() {
    let providers = mock_provider_set(
        &[ProviderKind::OpenAi],
        MockBehavior::Succeed("ok".to_string()),
    );
    let h = harness(providers, 1);

    let missing = h.controller.resume(Uuid::new_v4()).await;
    assert!(matches!(missing, Err(EchowatchError::NotFound(_))));

    let job = queued_job(&h);
    h.controller.run(job.id).await.unwrap();
    assert_eq!(job_status(&h, job.id).await, JobStatus::Completed);

    let done = h.controller.resume(job.id).await;
    assert!(matches!(done, Err(EchowatchError::InvalidState(_))));
}

#[tokio::test]
async fn run_on_a_failed_job_requires_an_explicit_resume() {
    let providers = mock_provider_set(&[ProviderKind::OpenAi], MockBehavior::FailTransient);
    let h = harness(providers, 1);
    let job = queued_job(&h);

    h.controller.run(job.id).await.unwrap();
    assert_eq!(job_status(&h, job.id).await, JobStatus::Failed);

    let rerun = h.controller.run(job.id).await;
    assert!(matches!(rerun, Err(EchowatchError::InvalidState(_))));
}

#[tokio::test]
async fn transient_write_failure_is_retried_once() {
    let providers = mock_provider_set(
        &[ProviderKind::OpenAi],
        MockBehavior::Succeed("Acme.".to_string()),
    );
    let h = harness(providers, 1);
    let job = queued_job(&h);

    h.runs.fail_next_upserts(1);
    let stats = h.controller.run(job.id).await.unwrap();

    assert_eq!(stats.successful_runs, 1);
    assert_eq!(stats.persistence_failures, 0);
    assert_eq!(h.runs.rows().len(), 1);
}

#[tokio::test]
async fn persistent_write_failure_drops_the_unit_not_the_batch() {
    let providers = mock_provider_set(
        &[ProviderKind::OpenAi],
        MockBehavior::Succeed("Acme.".to_string()),
    );
    // Serialize units so the two injected failures land on one unit.
    let h = harness_with_concurrency(providers, 2, 1);

    let job = queued_job(&h);
    h.runs.fail_next_upserts(2);
    let stats = h.controller.run(job.id).await.unwrap();

    assert_eq!(stats.persistence_failures, 1);
    assert_eq!(stats.successful_runs, 1);
    assert_eq!(job_status(&h, job.id).await, JobStatus::Completed);
    // The dropped unit left no row and no progress entry, so a resume would
    // pick it up, but the batch itself finished.
    assert_eq!(h.runs.rows().len(), 1);
}

#[tokio::test]
async fn externally_failed_job_stops_dispatching_new_units() {
    let mut providers = ProviderSet::new();
    let client = Arc::new(MockProvider::new(
        "openai",
        MockBehavior::Succeed("ok".to_string()),
    ));
    providers.insert(ProviderKind::OpenAi, client.clone());

    let jobs = Arc::new(MemoryJobRepo::new());
    let runs = Arc::new(MemoryRunRepo::new());
    let org = make_org("Acme", SubscriptionTier::Growth);

    // Operator marked the job failed before the fan-out got to its units.
    let now = Utc::now();
    let job = BatchJob {
        id: Uuid::new_v4(),
        org_id: org.id,
        status: JobStatus::Failed,
        started_at: now,
        last_heartbeat: now,
        completed_pairs: Vec::new(),
        idempotency_key: None,
    };
    jobs.insert(job.clone());

    let runner = BatchRunner::new(jobs.clone(), runs.clone(), providers)
        .with_retry_policy(RetryPolicy::immediate());
    let work_set: Vec<WorkUnit> = (0..3)
        .map(|i| WorkUnit {
            prompt: make_prompt(org.id, &format!("q{i}")),
            provider: ProviderKind::OpenAi,
        })
        .collect();

    let stats = runner.run_batch(&job, &org, work_set).await;

    assert_eq!(stats.cancelled, 3);
    assert_eq!(client.calls(), 0);
    assert!(runs.rows().is_empty());
}
