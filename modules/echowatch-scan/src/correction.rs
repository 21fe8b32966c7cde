//! Manual correction path.
//!
//! Operators can fix a run's extraction (a missed brand variant, a bogus
//! citation) but never its score: the score is recomputed from the corrected
//! extraction by the one scoring function and the row is replaced through
//! the normal upsert. Every correction is logged with before/after scores.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use echowatch_common::{EchowatchError, Extraction, RunRecord, RunStatus, ScoreRecord};

use crate::score;
use crate::traits::RunRepo;

/// Replace a run's artifacts with corrected extraction input. Returns the
/// recomputed score record.
pub async fn apply_correction(
    runs: &dyn RunRepo,
    org_id: Uuid,
    original: &RunRecord,
    corrected: &Extraction,
) -> Result<ScoreRecord, EchowatchError> {
    if original.status != RunStatus::Success {
        return Err(EchowatchError::InvalidState(
            "only successful runs can be corrected".to_string(),
        ));
    }

    let rescored = score::score(corrected);

    let run = RunRecord {
        run_at: Utc::now(),
        ..original.clone()
    };
    runs.upsert_run(org_id, &run, corrected, Some(&rescored))
        .await
        .map_err(|e| EchowatchError::Database(e.to_string()))?;

    info!(
        batch_job_id = %run.batch_job_id,
        prompt_id = %run.prompt_id,
        provider = %run.provider,
        new_score = rescored.score,
        "Manual correction applied, score recomputed"
    );
    Ok(rescored)
}
