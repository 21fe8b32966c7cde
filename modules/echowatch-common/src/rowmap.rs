//! `sqlx::FromRow` implementations for the shared row types. These live with
//! the types (rather than in echowatch-store) to satisfy the orphan rule.

use crate::types::{BatchJob, JobStatus, Org, PairKey, Prompt, SubscriptionTier};

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for Org {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        let tier_str: String = row.try_get("tier")?;
        let tier = SubscriptionTier::parse(&tier_str).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "tier".to_string(),
            source: format!("unknown subscription tier: {tier_str}").into(),
        })?;

        let brands_value: serde_json::Value = row.try_get("brand_names")?;
        let brand_names: Vec<String> =
            serde_json::from_value(brands_value).map_err(|e| sqlx::Error::ColumnDecode {
                index: "brand_names".to_string(),
                source: Box::new(e),
            })?;

        Ok(Org {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            domain: row.try_get("domain")?,
            brand_names,
            tier,
            utc_offset_minutes: row.try_get("utc_offset_minutes")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for Prompt {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        Ok(Prompt {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            text: row.try_get("text")?,
            active: row.try_get("active")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for BatchJob {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        use sqlx::Row;

        let status_str: String = row.try_get("status")?;
        let status = JobStatus::parse(&status_str).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: format!("unknown job status: {status_str}").into(),
        })?;

        let pairs_value: serde_json::Value = row.try_get("completed_pairs")?;
        let completed_pairs: Vec<PairKey> =
            serde_json::from_value(pairs_value).map_err(|e| sqlx::Error::ColumnDecode {
                index: "completed_pairs".to_string(),
                source: Box::new(e),
            })?;

        Ok(BatchJob {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            status,
            started_at: row.try_get("started_at")?,
            last_heartbeat: row.try_get("last_heartbeat")?,
            completed_pairs,
            idempotency_key: row.try_get("idempotency_key")?,
        })
    }
}
