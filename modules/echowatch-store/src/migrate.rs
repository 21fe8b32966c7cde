//! Idempotent schema migration. Every binary runs this at boot.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

/// Apply the scan-pipeline schema. Safe to run repeatedly.
///
/// `orgs` and `prompts` are owned by the dashboard's CRUD surfaces; their DDL
/// lives here so a fresh environment boots without a separate provisioning
/// step.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS orgs (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            domain TEXT NOT NULL,
            brand_names JSONB NOT NULL DEFAULT '[]'::jsonb,
            tier TEXT NOT NULL DEFAULT 'starter',
            utc_offset_minutes INT NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS prompts (
            id UUID PRIMARY KEY,
            org_id UUID NOT NULL REFERENCES orgs(id),
            text TEXT NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS batch_jobs (
            id UUID PRIMARY KEY,
            org_id UUID NOT NULL,
            status TEXT NOT NULL,
            started_at TIMESTAMPTZ NOT NULL,
            last_heartbeat TIMESTAMPTZ NOT NULL,
            completed_pairs JSONB NOT NULL DEFAULT '[]'::jsonb,
            idempotency_key TEXT
        )
        "#,
        // One logical batch per tenant-day. NULL keys (released by a replace
        // trigger) never collide.
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS batch_jobs_idempotency_key
            ON batch_jobs (idempotency_key)
            WHERE idempotency_key IS NOT NULL
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS batch_jobs_status_heartbeat
            ON batch_jobs (status, last_heartbeat)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            batch_job_id UUID NOT NULL,
            prompt_id UUID NOT NULL,
            provider TEXT NOT NULL,
            status TEXT NOT NULL,
            score DOUBLE PRECISION,
            org_brand_present BOOLEAN,
            org_brand_prominence INT,
            competitors_count INT,
            brands_json JSONB,
            competitors_json JSONB,
            citations_json JSONB,
            token_in BIGINT NOT NULL DEFAULT 0,
            token_out BIGINT NOT NULL DEFAULT 0,
            run_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (batch_job_id, prompt_id, provider)
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS runs_run_at ON runs (run_at)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS usage_counters (
            org_id UUID NOT NULL,
            day DATE NOT NULL,
            runs_executed BIGINT NOT NULL DEFAULT 0,
            tokens_in BIGINT NOT NULL DEFAULT 0,
            tokens_out BIGINT NOT NULL DEFAULT 0,
            PRIMARY KEY (org_id, day)
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Schema migration complete");
    Ok(())
}
