//! JobStore — the batch_jobs table. The single point of mutable shared state
//! per tenant-day; every status change goes through an optimistic UPDATE so
//! concurrent triggers race safely.

use anyhow::Result;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use echowatch_common::{BatchJob, JobStatus, PairKey};

const JOB_COLUMNS: &str =
    "id, org_id, status, started_at, last_heartbeat, completed_pairs, idempotency_key";

#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new job row. Returns false when another job already holds the
    /// idempotency key; the caller lost the trigger race, not an error.
    pub async fn create(&self, job: &BatchJob) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO batch_jobs (id, org_id, status, started_at, last_heartbeat, completed_pairs, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (idempotency_key) WHERE idempotency_key IS NOT NULL DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(job.org_id)
        .bind(job.status.as_str())
        .bind(job.started_at)
        .bind(job.last_heartbeat)
        .bind(serde_json::to_value(&job.completed_pairs)?)
        .bind(&job.idempotency_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<BatchJob>> {
        let row = sqlx::query_as::<_, BatchJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM batch_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<BatchJob>> {
        let row = sqlx::query_as::<_, BatchJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM batch_jobs WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// The optimistic transition: exactly one of two concurrent callers
    /// observes rows_affected == 1 and owns the new state.
    pub async fn transition_if(
        &self,
        id: Uuid,
        expected: JobStatus,
        next: JobStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs
            SET status = $3, last_heartbeat = $4
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Re-claim an in_progress job whose heartbeat went stale. The heartbeat
    /// guard plays the role of the status guard in `transition_if`: only one
    /// of two concurrent resumes sees the stale timestamp.
    pub async fn reclaim_if_stale(&self, id: Uuid, staleness: Duration) -> Result<bool> {
        let cutoff = Utc::now() - staleness;
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs
            SET last_heartbeat = $3
            WHERE id = $1 AND status = 'in_progress' AND last_heartbeat < $2
            "#,
        )
        .bind(id)
        .bind(cutoff)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record one finished unit of work: bump the heartbeat and append the
    /// pair to the progress metadata.
    pub async fn heartbeat(&self, id: Uuid, pair: &PairKey) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE batch_jobs
            SET last_heartbeat = $2,
                completed_pairs = completed_pairs || $3::jsonb
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(serde_json::to_value(pair)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Free the idempotency key so a replace trigger can create a fresh job
    /// for the same tenant-day. The old row keeps its history.
    pub async fn release_idempotency_key(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE batch_jobs SET idempotency_key = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Jobs that look dead: in_progress with a heartbeat older than the
    /// staleness threshold. Read-only; used by the health monitor.
    pub async fn stale_in_progress(&self, staleness: Duration) -> Result<Vec<BatchJob>> {
        let cutoff = Utc::now() - staleness;
        let rows = sqlx::query_as::<_, BatchJob>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM batch_jobs
            WHERE status = 'in_progress' AND last_heartbeat < $1
            ORDER BY last_heartbeat ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
