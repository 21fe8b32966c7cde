//! Repository seams for the scan pipeline.
//!
//! The controller, trigger, fan-out, and health monitor speak only these
//! traits. Production wires the Postgres stores (see `persist.rs`); tests
//! wire the in-memory implementations. The optimistic-concurrency contract
//! (`transition_if`, `reclaim_if_stale`, unique-key `create`) is part of the
//! trait, not a database policy.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use echowatch_common::{
    BatchJob, Extraction, JobStatus, Org, PairKey, Prompt, RunRecord, ScoreRecord,
};
use echowatch_store::RunSample;

// =============================================================================
// JobRepo
// =============================================================================

#[async_trait]
pub trait JobRepo: Send + Sync {
    /// Insert a job. False when the idempotency key is already held.
    async fn create(&self, job: &BatchJob) -> Result<bool>;

    async fn get(&self, id: Uuid) -> Result<Option<BatchJob>>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<BatchJob>>;

    /// Optimistic status transition. True iff this caller won the race.
    async fn transition_if(&self, id: Uuid, expected: JobStatus, next: JobStatus) -> Result<bool>;

    /// Re-claim an in_progress job with a stale heartbeat. True iff this
    /// caller observed the stale timestamp first.
    async fn reclaim_if_stale(&self, id: Uuid, staleness: Duration) -> Result<bool>;

    /// Bump the heartbeat and append a finished pair to progress metadata.
    async fn heartbeat(&self, id: Uuid, pair: &PairKey) -> Result<()>;

    /// Free the idempotency key so a replace trigger can create a new job.
    async fn release_idempotency_key(&self, id: Uuid) -> Result<()>;

    /// In-progress jobs whose heartbeat is older than `staleness`.
    async fn stale_in_progress(&self, staleness: Duration) -> Result<Vec<BatchJob>>;
}

// =============================================================================
// RunRepo
// =============================================================================

#[async_trait]
pub trait RunRepo: Send + Sync {
    /// Atomic write of run + artifacts, replace-on-conflict, plus usage
    /// counter increments. `score` is None for error runs.
    async fn upsert_run(
        &self,
        org_id: Uuid,
        run: &RunRecord,
        extraction: &Extraction,
        score: Option<&ScoreRecord>,
    ) -> Result<()>;

    async fn successful_pairs(&self, batch_job_id: Uuid) -> Result<Vec<PairKey>>;

    /// Recent runs for health sampling.
    async fn recent(&self, since: DateTime<Utc>) -> Result<Vec<RunSample>>;
}

// =============================================================================
// Directory
// =============================================================================

/// Tenant reference data, owned by external CRUD surfaces and only read here.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_org(&self, id: Uuid) -> Result<Option<Org>>;

    async fn active_prompts(&self, org_id: Uuid) -> Result<Vec<Prompt>>;
}
