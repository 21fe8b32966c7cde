//! RunStore — the runs table plus usage counters.
//!
//! One transaction per unit of work: the run row and its extraction/score
//! payload land atomically, keyed by (batch_job_id, prompt_id, provider).
//! A second write for the same key replaces the row (resume semantics);
//! usage counters only ever increment.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use echowatch_common::{
    Citation, Extraction, PairKey, ProviderKind, RunRecord, RunStatus, ScoreRecord, UsageCounters,
};

#[derive(Clone)]
pub struct RunStore {
    pool: PgPool,
}

impl RunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write one run with its artifacts and bump the org's usage counters,
    /// atomically. `score` is None for error runs.
    pub async fn upsert_run(
        &self,
        org_id: Uuid,
        run: &RunRecord,
        extraction: &Extraction,
        score: Option<&ScoreRecord>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO runs (
                batch_job_id, prompt_id, provider, status,
                score, org_brand_present, org_brand_prominence, competitors_count,
                brands_json, competitors_json, citations_json,
                token_in, token_out, run_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (batch_job_id, prompt_id, provider) DO UPDATE SET
                status = EXCLUDED.status,
                score = EXCLUDED.score,
                org_brand_present = EXCLUDED.org_brand_present,
                org_brand_prominence = EXCLUDED.org_brand_prominence,
                competitors_count = EXCLUDED.competitors_count,
                brands_json = EXCLUDED.brands_json,
                competitors_json = EXCLUDED.competitors_json,
                citations_json = EXCLUDED.citations_json,
                token_in = EXCLUDED.token_in,
                token_out = EXCLUDED.token_out,
                run_at = EXCLUDED.run_at
            "#,
        )
        .bind(run.batch_job_id)
        .bind(run.prompt_id)
        .bind(run.provider.as_str())
        .bind(run.status.as_str())
        .bind(score.map(|s| s.score))
        .bind(score.map(|s| s.org_brand_present))
        .bind(score.and_then(|s| s.org_brand_prominence.map(|p| p as i32)))
        .bind(score.map(|s| s.competitor_count as i32))
        .bind(serde_json::to_value(&extraction.brand_mentions)?)
        .bind(serde_json::to_value(&extraction.competitor_mentions)?)
        .bind(serde_json::to_value(&extraction.citations)?)
        .bind(run.token_in)
        .bind(run.token_out)
        .bind(run.run_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO usage_counters (org_id, day, runs_executed, tokens_in, tokens_out)
            VALUES ($1, $2, 1, $3, $4)
            ON CONFLICT (org_id, day) DO UPDATE SET
                runs_executed = usage_counters.runs_executed + 1,
                tokens_in = usage_counters.tokens_in + EXCLUDED.tokens_in,
                tokens_out = usage_counters.tokens_out + EXCLUDED.tokens_out
            "#,
        )
        .bind(org_id)
        .bind(run.run_at.date_naive())
        .bind(run.token_in)
        .bind(run.token_out)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Pairs already executed successfully for a job. A resume replays only
    /// the remainder of the work-set.
    pub async fn successful_pairs(&self, batch_job_id: Uuid) -> Result<Vec<PairKey>> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT prompt_id, provider FROM runs
            WHERE batch_job_id = $1 AND status = 'success'
            "#,
        )
        .bind(batch_job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(prompt_id, provider)| {
                ProviderKind::parse(&provider).map(|provider| PairKey {
                    prompt_id,
                    provider,
                })
            })
            .collect())
    }

    /// Recent run rows for health sampling. Returns only what the citation
    /// checks need.
    pub async fn recent(&self, since: DateTime<Utc>) -> Result<Vec<RunSample>> {
        let rows = sqlx::query_as::<_, RunSample>(
            r#"
            SELECT status, citations_json FROM runs
            WHERE run_at >= $1
            ORDER BY run_at DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn usage_for(&self, org_id: Uuid, day: NaiveDate) -> Result<Option<UsageCounters>> {
        let row = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT runs_executed, tokens_in, tokens_out FROM usage_counters
            WHERE org_id = $1 AND day = $2
            "#,
        )
        .bind(org_id)
        .bind(day)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(runs_executed, tokens_in, tokens_out)| UsageCounters {
            org_id,
            day,
            runs_executed,
            tokens_in,
            tokens_out,
        }))
    }
}

// ---------------------------------------------------------------------------
// RunSample
// ---------------------------------------------------------------------------

/// One sampled run row, trimmed to the fields the health monitor reads.
#[derive(Debug, Clone)]
pub struct RunSample {
    pub status: RunStatus,
    pub citations: Vec<Citation>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RunSample {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        let status_str: String = row.try_get("status")?;
        let status = RunStatus::parse(&status_str).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: format!("unknown run status: {status_str}").into(),
        })?;

        let citations_value: Option<serde_json::Value> = row.try_get("citations_json")?;
        let citations = match citations_value {
            Some(value) => {
                serde_json::from_value(value).map_err(|e| sqlx::Error::ColumnDecode {
                    index: "citations_json".to_string(),
                    source: Box::new(e),
                })?
            }
            None => Vec::new(),
        };

        Ok(RunSample { status, citations })
    }
}
