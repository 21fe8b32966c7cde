//! JobRepo/RunRepo/Directory implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use echowatch_common::{
    BatchJob, Extraction, JobStatus, Org, PairKey, Prompt, ProviderKind, RunRecord, RunStatus,
    ScoreRecord,
};
use echowatch_store::{JobStore, PgDirectory, RunSample, RunStore};

use crate::traits::{Directory, JobRepo, RunRepo};

// ---------------------------------------------------------------------------
// Postgres adapters (production)
// ---------------------------------------------------------------------------

#[async_trait]
impl JobRepo for JobStore {
    async fn create(&self, job: &BatchJob) -> Result<bool> {
        JobStore::create(self, job).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<BatchJob>> {
        JobStore::get(self, id).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<BatchJob>> {
        JobStore::find_by_idempotency_key(self, key).await
    }

    async fn transition_if(&self, id: Uuid, expected: JobStatus, next: JobStatus) -> Result<bool> {
        JobStore::transition_if(self, id, expected, next).await
    }

    async fn reclaim_if_stale(&self, id: Uuid, staleness: Duration) -> Result<bool> {
        JobStore::reclaim_if_stale(self, id, staleness).await
    }

    async fn heartbeat(&self, id: Uuid, pair: &PairKey) -> Result<()> {
        JobStore::heartbeat(self, id, pair).await
    }

    async fn release_idempotency_key(&self, id: Uuid) -> Result<()> {
        JobStore::release_idempotency_key(self, id).await
    }

    async fn stale_in_progress(&self, staleness: Duration) -> Result<Vec<BatchJob>> {
        JobStore::stale_in_progress(self, staleness).await
    }
}

#[async_trait]
impl RunRepo for RunStore {
    async fn upsert_run(
        &self,
        org_id: Uuid,
        run: &RunRecord,
        extraction: &Extraction,
        score: Option<&ScoreRecord>,
    ) -> Result<()> {
        RunStore::upsert_run(self, org_id, run, extraction, score).await
    }

    async fn successful_pairs(&self, batch_job_id: Uuid) -> Result<Vec<PairKey>> {
        RunStore::successful_pairs(self, batch_job_id).await
    }

    async fn recent(&self, since: DateTime<Utc>) -> Result<Vec<RunSample>> {
        RunStore::recent(self, since).await
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn get_org(&self, id: Uuid) -> Result<Option<Org>> {
        PgDirectory::get_org(self, id).await
    }

    async fn active_prompts(&self, org_id: Uuid) -> Result<Vec<Prompt>> {
        PgDirectory::active_prompts(self, org_id).await
    }
}

// ---------------------------------------------------------------------------
// MemoryJobRepo (tests — no database required)
// ---------------------------------------------------------------------------

/// In-memory job repository with the same race semantics as the Postgres
/// store: unique idempotency keys, compare-and-set transitions. Thread-safe.
#[derive(Default)]
pub struct MemoryJobRepo {
    jobs: Mutex<HashMap<Uuid, BatchJob>>,
}

impl MemoryJobRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all jobs (for test assertions).
    pub fn jobs(&self) -> Vec<BatchJob> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    /// Seed a job directly, bypassing the unique-key check.
    pub fn insert(&self, job: BatchJob) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }
}

#[async_trait]
impl JobRepo for MemoryJobRepo {
    async fn create(&self, job: &BatchJob) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(ref key) = job.idempotency_key {
            let held = jobs
                .values()
                .any(|j| j.idempotency_key.as_deref() == Some(key.as_str()));
            if held {
                return Ok(false);
            }
        }
        jobs.insert(job.id, job.clone());
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> Result<Option<BatchJob>> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<BatchJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .find(|j| j.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn transition_if(&self, id: Uuid, expected: JobStatus, next: JobStatus) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status == expected => {
                job.status = next;
                job.last_heartbeat = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reclaim_if_stale(&self, id: Uuid, staleness: Duration) -> Result<bool> {
        let cutoff = Utc::now() - staleness;
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::InProgress && job.last_heartbeat < cutoff => {
                job.last_heartbeat = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn heartbeat(&self, id: Uuid, pair: &PairKey) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            job.last_heartbeat = Utc::now();
            job.completed_pairs.push(*pair);
        }
        Ok(())
    }

    async fn release_idempotency_key(&self, id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            job.idempotency_key = None;
        }
        Ok(())
    }

    async fn stale_in_progress(&self, staleness: Duration) -> Result<Vec<BatchJob>> {
        let cutoff = Utc::now() - staleness;
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.status == JobStatus::InProgress && j.last_heartbeat < cutoff)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryRunRepo (tests — no database required)
// ---------------------------------------------------------------------------

/// One stored run with its artifacts, for test assertions.
#[derive(Debug, Clone)]
pub struct StoredRun {
    pub org_id: Uuid,
    pub run: RunRecord,
    pub extraction: Extraction,
    pub score: Option<ScoreRecord>,
}

/// In-memory run repository with replace-on-conflict semantics and an
/// injectable write-failure counter for persistence-retry tests.
#[derive(Default)]
pub struct MemoryRunRepo {
    rows: Mutex<HashMap<(Uuid, Uuid, ProviderKind), StoredRun>>,
    fail_upserts: AtomicU32,
}

impl MemoryRunRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` upserts fail with a synthetic database error.
    pub fn fail_next_upserts(&self, n: u32) {
        self.fail_upserts.store(n, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<StoredRun> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn row(&self, batch_job_id: Uuid, prompt_id: Uuid, provider: ProviderKind) -> Option<StoredRun> {
        self.rows
            .lock()
            .unwrap()
            .get(&(batch_job_id, prompt_id, provider))
            .cloned()
    }
}

#[async_trait]
impl RunRepo for MemoryRunRepo {
    async fn upsert_run(
        &self,
        org_id: Uuid,
        run: &RunRecord,
        extraction: &Extraction,
        score: Option<&ScoreRecord>,
    ) -> Result<()> {
        let remaining = self.fail_upserts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_upserts.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("synthetic write failure"));
        }

        let key = (run.batch_job_id, run.prompt_id, run.provider);
        self.rows.lock().unwrap().insert(
            key,
            StoredRun {
                org_id,
                run: run.clone(),
                extraction: extraction.clone(),
                score: score.cloned(),
            },
        );
        Ok(())
    }

    async fn successful_pairs(&self, batch_job_id: Uuid) -> Result<Vec<PairKey>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.run.batch_job_id == batch_job_id && r.run.status == RunStatus::Success)
            .map(|r| PairKey {
                prompt_id: r.run.prompt_id,
                provider: r.run.provider,
            })
            .collect())
    }

    async fn recent(&self, since: DateTime<Utc>) -> Result<Vec<RunSample>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.run.run_at >= since)
            .map(|r| RunSample {
                status: r.run.status,
                citations: r.extraction.citations.clone(),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemoryDirectory (tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryDirectory {
    orgs: Mutex<HashMap<Uuid, Org>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_org(&self, org: Org) {
        self.orgs.lock().unwrap().insert(org.id, org);
    }

    pub fn add_prompt(&self, prompt: Prompt) {
        self.prompts.lock().unwrap().push(prompt);
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get_org(&self, id: Uuid) -> Result<Option<Org>> {
        Ok(self.orgs.lock().unwrap().get(&id).cloned())
    }

    async fn active_prompts(&self, org_id: Uuid) -> Result<Vec<Prompt>> {
        Ok(self
            .prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.org_id == org_id && p.active)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Arc blankets — let tests share a repo for assertions
// ---------------------------------------------------------------------------

#[async_trait]
impl<R: JobRepo + ?Sized> JobRepo for Arc<R> {
    async fn create(&self, job: &BatchJob) -> Result<bool> {
        (**self).create(job).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<BatchJob>> {
        (**self).get(id).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<BatchJob>> {
        (**self).find_by_idempotency_key(key).await
    }

    async fn transition_if(&self, id: Uuid, expected: JobStatus, next: JobStatus) -> Result<bool> {
        (**self).transition_if(id, expected, next).await
    }

    async fn reclaim_if_stale(&self, id: Uuid, staleness: Duration) -> Result<bool> {
        (**self).reclaim_if_stale(id, staleness).await
    }

    async fn heartbeat(&self, id: Uuid, pair: &PairKey) -> Result<()> {
        (**self).heartbeat(id, pair).await
    }

    async fn release_idempotency_key(&self, id: Uuid) -> Result<()> {
        (**self).release_idempotency_key(id).await
    }

    async fn stale_in_progress(&self, staleness: Duration) -> Result<Vec<BatchJob>> {
        (**self).stale_in_progress(staleness).await
    }
}

#[async_trait]
impl<R: RunRepo + ?Sized> RunRepo for Arc<R> {
    async fn upsert_run(
        &self,
        org_id: Uuid,
        run: &RunRecord,
        extraction: &Extraction,
        score: Option<&ScoreRecord>,
    ) -> Result<()> {
        (**self).upsert_run(org_id, run, extraction, score).await
    }

    async fn successful_pairs(&self, batch_job_id: Uuid) -> Result<Vec<PairKey>> {
        (**self).successful_pairs(batch_job_id).await
    }

    async fn recent(&self, since: DateTime<Utc>) -> Result<Vec<RunSample>> {
        (**self).recent(since).await
    }
}

#[async_trait]
impl<D: Directory + ?Sized> Directory for Arc<D> {
    async fn get_org(&self, id: Uuid) -> Result<Option<Org>> {
        (**self).get_org(id).await
    }

    async fn active_prompts(&self, org_id: Uuid) -> Result<Vec<Prompt>> {
        (**self).active_prompts(org_id).await
    }
}
