//! Execution fan-out — bounded-concurrency scan of (prompt × provider) pairs.
//!
//! The defining property of this stage is partial-failure isolation: one
//! provider's failure never aborts the batch. Every attempted pair lands a
//! run row (error runs included, so a resume never loops on a permanently
//! broken pair), then heartbeats the job.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use ai_client::{with_retry, RetryPolicy};
use echowatch_common::{
    BatchJob, Extraction, JobStatus, Org, PairKey, Prompt, ProviderKind, RunRecord, RunStatus,
};

use crate::extract::{extract, Gazetteer};
use crate::providers::ProviderSet;
use crate::score;
use crate::traits::{JobRepo, RunRepo};

/// Concurrency cap on outbound provider calls. Bounds request rate against
/// rate-limited APIs and memory for in-flight responses.
pub const MAX_CONCURRENT_PROVIDER_CALLS: usize = 6;

// ---------------------------------------------------------------------------
// WorkUnit + ScanStats
// ---------------------------------------------------------------------------

/// One unit of scan work, carrying the prompt text it needs.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub prompt: Prompt,
    pub provider: ProviderKind,
}

impl WorkUnit {
    pub fn pair(&self) -> PairKey {
        PairKey {
            prompt_id: self.prompt.id,
            provider: self.provider,
        }
    }
}

/// Aggregate counts for one batch run. This is all the dashboard ever sees;
/// raw provider errors stay in the logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub total_runs: u32,
    pub successful_runs: u32,
    pub provider_errors: u32,
    pub persistence_failures: u32,
    pub cancelled: u32,
}

enum UnitOutcome {
    Success,
    ProviderFailed,
    PersistFailed,
    Cancelled,
}

// ---------------------------------------------------------------------------
// BatchRunner
// ---------------------------------------------------------------------------

pub struct BatchRunner {
    jobs: Arc<dyn JobRepo>,
    runs: Arc<dyn RunRepo>,
    providers: ProviderSet,
    retry: RetryPolicy,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(jobs: Arc<dyn JobRepo>, runs: Arc<dyn RunRepo>, providers: ProviderSet) -> Self {
        Self {
            jobs,
            runs,
            providers,
            retry: RetryPolicy::default(),
            concurrency: MAX_CONCURRENT_PROVIDER_CALLS,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run every unit through call → extract → score → persist → heartbeat,
    /// at most `concurrency` provider calls in flight.
    pub async fn run_batch(&self, job: &BatchJob, org: &Org, work_set: Vec<WorkUnit>) -> ScanStats {
        let gazetteer = Gazetteer::for_org(org);
        let total = work_set.len();
        info!(job_id = %job.id, org_id = %org.id, units = total, "Scan fan-out starting");

        let outcomes: Vec<UnitOutcome> = stream::iter(work_set.into_iter().map(|unit| {
            let gazetteer = &gazetteer;
            async move { self.execute_unit(job, org, gazetteer, unit).await }
        }))
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        let mut stats = ScanStats {
            total_runs: total as u32,
            ..ScanStats::default()
        };
        for outcome in outcomes {
            match outcome {
                UnitOutcome::Success => stats.successful_runs += 1,
                UnitOutcome::ProviderFailed => stats.provider_errors += 1,
                UnitOutcome::PersistFailed => stats.persistence_failures += 1,
                UnitOutcome::Cancelled => stats.cancelled += 1,
            }
        }

        info!(
            job_id = %job.id,
            successful = stats.successful_runs,
            provider_errors = stats.provider_errors,
            persistence_failures = stats.persistence_failures,
            cancelled = stats.cancelled,
            "Scan fan-out complete"
        );
        stats
    }

    async fn execute_unit(
        &self,
        job: &BatchJob,
        org: &Org,
        gazetteer: &Gazetteer,
        unit: WorkUnit,
    ) -> UnitOutcome {
        let pair = unit.pair();

        // Cancellation check between units: an externally-failed job stops
        // dispatching. In-flight calls are left to finish on their own.
        match self.jobs.get(job.id).await {
            Ok(Some(current)) if current.status == JobStatus::Failed => {
                info!(job_id = %job.id, provider = %unit.provider, "Job cancelled, skipping unit");
                return UnitOutcome::Cancelled;
            }
            Ok(_) => {}
            Err(e) => {
                // A read hiccup is no reason to drop the unit.
                warn!(job_id = %job.id, error = %e, "Cancellation check failed, continuing");
            }
        }

        let now = Utc::now();
        let (run, extraction, score) = match self.call_provider(&unit).await {
            Ok(completion) => {
                let extraction = extract(&completion.text, gazetteer);
                let score = score::score(&extraction);
                let run = RunRecord {
                    batch_job_id: job.id,
                    prompt_id: unit.prompt.id,
                    provider: unit.provider,
                    status: RunStatus::Success,
                    token_in: completion.token_in,
                    token_out: completion.token_out,
                    run_at: now,
                };
                (run, extraction, Some(score))
            }
            Err(reason) => {
                warn!(
                    job_id = %job.id,
                    provider = %unit.provider,
                    prompt_id = %unit.prompt.id,
                    error = reason.as_str(),
                    "Provider call failed, recording error run"
                );
                let run = RunRecord {
                    batch_job_id: job.id,
                    prompt_id: unit.prompt.id,
                    provider: unit.provider,
                    status: RunStatus::Error,
                    token_in: 0,
                    token_out: 0,
                    run_at: now,
                };
                (run, Extraction::default(), None)
            }
        };

        // One persistence retry, then give up on the unit without touching
        // its siblings.
        let mut persisted = false;
        for attempt in 0..2 {
            match self
                .runs
                .upsert_run(org.id, &run, &extraction, score.as_ref())
                .await
            {
                Ok(()) => {
                    persisted = true;
                    break;
                }
                Err(e) if attempt == 0 => {
                    warn!(job_id = %job.id, provider = %unit.provider, error = %e, "Run write failed, retrying once");
                }
                Err(e) => {
                    error!(job_id = %job.id, provider = %unit.provider, error = %e, "Run write failed permanently");
                }
            }
        }
        if !persisted {
            return UnitOutcome::PersistFailed;
        }

        // The pair is durably attempted: prove liveness and record progress.
        if let Err(e) = self.jobs.heartbeat(job.id, &pair).await {
            warn!(job_id = %job.id, error = %e, "Heartbeat failed (non-fatal)");
        }

        match run.status {
            RunStatus::Success => UnitOutcome::Success,
            RunStatus::Error => UnitOutcome::ProviderFailed,
        }
    }

    /// Provider call with the retry combinator wrapped around it. A missing
    /// client (provider disabled between work-set build and execution) is an
    /// immediate unit error.
    async fn call_provider(&self, unit: &WorkUnit) -> Result<ai_client::Completion, String> {
        let Some(client) = self.providers.get(unit.provider) else {
            return Err(format!("no configured client for {}", unit.provider));
        };

        with_retry(&self.retry, client.name(), || {
            client.execute(&unit.prompt.text)
        })
        .await
        .map_err(|e| e.to_string())
    }
}
