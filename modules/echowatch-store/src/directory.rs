//! Read-side access to tenant reference data. The rows are owned by the
//! dashboard's CRUD surfaces; nothing here creates or mutates them.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use echowatch_common::{Org, Prompt};

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_org(&self, id: Uuid) -> Result<Option<Org>> {
        let row = sqlx::query_as::<_, Org>(
            r#"
            SELECT id, name, domain, brand_names, tier, utc_offset_minutes
            FROM orgs WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn active_prompts(&self, org_id: Uuid) -> Result<Vec<Prompt>> {
        let rows = sqlx::query_as::<_, Prompt>(
            r#"
            SELECT id, org_id, text, active FROM prompts
            WHERE org_id = $1 AND active = TRUE
            ORDER BY id
            "#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
