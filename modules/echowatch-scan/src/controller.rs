//! Batch job controller — owns the per-tenant job lifecycle.
//!
//! State machine: queued → in_progress → {completed | failed}. Terminal
//! states are final; a resume continues the SAME job id, replaying only the
//! pairs without a successful run. Every transition is an optimistic update,
//! so concurrent starts/resumes race safely: one caller wins, the loser
//! observes a conflict.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use ai_client::RetryPolicy;
use echowatch_common::{BatchJob, EchowatchError, JobStatus, Org, PairKey};

use crate::fanout::{BatchRunner, ScanStats, WorkUnit};
use crate::providers::ProviderSet;
use crate::traits::{Directory, JobRepo, RunRepo};

/// An in_progress job whose heartbeat is older than this is observably stuck
/// and eligible for resume.
pub const STALENESS_MINUTES: i64 = 5;

pub fn staleness_threshold() -> Duration {
    Duration::minutes(STALENESS_MINUTES)
}

pub struct JobController {
    jobs: Arc<dyn JobRepo>,
    runs: Arc<dyn RunRepo>,
    directory: Arc<dyn Directory>,
    providers: ProviderSet,
    runner: BatchRunner,
}

impl JobController {
    pub fn new(
        jobs: Arc<dyn JobRepo>,
        runs: Arc<dyn RunRepo>,
        directory: Arc<dyn Directory>,
        providers: ProviderSet,
    ) -> Self {
        let runner = BatchRunner::new(jobs.clone(), runs.clone(), providers.clone());
        Self {
            jobs,
            runs,
            directory,
            providers,
            runner,
        }
    }

    /// Override the provider retry policy (tests use near-zero backoff).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.runner = self.runner.with_retry_policy(retry);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.runner = self.runner.with_concurrency(concurrency);
        self
    }

    /// Start a freshly created (queued) job and drive it to a terminal state.
    pub async fn run(&self, job_id: uuid::Uuid) -> Result<ScanStats, EchowatchError> {
        self.execute(job_id, false).await
    }

    /// Re-enter an existing job, replaying only its unfinished pairs.
    /// `NotFound` if the job does not exist, `InvalidState` if it already
    /// completed.
    pub async fn resume(&self, job_id: uuid::Uuid) -> Result<ScanStats, EchowatchError> {
        self.execute(job_id, true).await
    }

    async fn execute(&self, job_id: uuid::Uuid, resuming: bool) -> Result<ScanStats, EchowatchError> {
        let job = self
            .jobs
            .get(job_id)
            .await
            .map_err(|e| EchowatchError::Database(e.to_string()))?
            .ok_or_else(|| EchowatchError::NotFound(format!("job {job_id}")))?;

        self.claim(&job, resuming).await?;

        let (org, work_set) = self.build_work_set(&job).await?;
        info!(
            job_id = %job.id,
            org = org.name.as_str(),
            remaining = work_set.len(),
            resuming,
            "Job claimed"
        );

        let stats = self.runner.run_batch(&job, &org, work_set).await;
        self.complete(job_id, &stats).await?;
        Ok(stats)
    }

    /// Take ownership of the job row. Exactly one of two concurrent callers
    /// succeeds; the loser gets `JobConflict`.
    async fn claim(&self, job: &BatchJob, resuming: bool) -> Result<(), EchowatchError> {
        let claimed = match job.status {
            JobStatus::Queued => self
                .jobs
                .transition_if(job.id, JobStatus::Queued, JobStatus::InProgress)
                .await
                .map_err(|e| EchowatchError::Database(e.to_string()))?,
            // A live in_progress job cannot be claimed; only a stale one.
            JobStatus::InProgress => self
                .jobs
                .reclaim_if_stale(job.id, staleness_threshold())
                .await
                .map_err(|e| EchowatchError::Database(e.to_string()))?,
            JobStatus::Failed if resuming => self
                .jobs
                .transition_if(job.id, JobStatus::Failed, JobStatus::InProgress)
                .await
                .map_err(|e| EchowatchError::Database(e.to_string()))?,
            JobStatus::Completed => {
                return Err(EchowatchError::InvalidState(format!(
                    "job {} already completed",
                    job.id
                )))
            }
            JobStatus::Failed => {
                return Err(EchowatchError::InvalidState(format!(
                    "job {} failed; resume it explicitly",
                    job.id
                )))
            }
        };

        if !claimed {
            return Err(EchowatchError::JobConflict);
        }
        Ok(())
    }

    /// Full work-set (active prompts × tier-enabled providers) minus pairs
    /// that already have a successful run for this job id. This subtraction
    /// is what gives at-most-once-success-per-pair across resumes.
    async fn build_work_set(&self, job: &BatchJob) -> Result<(Org, Vec<WorkUnit>), EchowatchError> {
        let org = self
            .directory
            .get_org(job.org_id)
            .await
            .map_err(|e| EchowatchError::Database(e.to_string()))?
            .ok_or_else(|| EchowatchError::Validation(format!("unknown org: {}", job.org_id)))?;

        let prompts = self
            .directory
            .active_prompts(org.id)
            .await
            .map_err(|e| EchowatchError::Database(e.to_string()))?;
        let enabled = self.providers.enabled_for(&org);

        let done: HashSet<PairKey> = self
            .runs
            .successful_pairs(job.id)
            .await
            .map_err(|e| EchowatchError::Database(e.to_string()))?
            .into_iter()
            .collect();

        let work_set: Vec<WorkUnit> = prompts
            .iter()
            .flat_map(|prompt| {
                enabled.iter().map(|&provider| WorkUnit {
                    prompt: prompt.clone(),
                    provider,
                })
            })
            .filter(|unit| !done.contains(&unit.pair()))
            .collect();

        Ok((org, work_set))
    }

    /// Terminal transition. Completed when anything succeeded or there was
    /// nothing to do; failed when a non-empty work-set produced zero
    /// successes. Losing the transition means the job was failed externally
    /// mid-run; leave it that way.
    async fn complete(&self, job_id: uuid::Uuid, stats: &ScanStats) -> Result<(), EchowatchError> {
        // "Any unit succeeded" is judged at job scope: a resume replaying only
        // a broken remainder must not fail a job with earlier successes.
        let any_success = if stats.successful_runs > 0 {
            true
        } else {
            !self
                .runs
                .successful_pairs(job_id)
                .await
                .map_err(|e| EchowatchError::Database(e.to_string()))?
                .is_empty()
        };

        let terminal = if stats.total_runs == 0 || any_success {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };

        let transitioned = self
            .jobs
            .transition_if(job_id, JobStatus::InProgress, terminal)
            .await
            .map_err(|e| EchowatchError::Database(e.to_string()))?;

        if transitioned {
            info!(job_id = %job_id, status = %terminal, "Job finished");
        } else {
            warn!(job_id = %job_id, "Terminal transition lost; job was closed externally");
        }
        Ok(())
    }
}
