//! HTTP handlers. The dashboard only ever sees the response envelope:
//! aggregate counts on success, a reason string on rejection, never raw
//! provider errors.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use echowatch_common::EchowatchError;
use echowatch_scan::{ScanStats, TriggerAction, TriggerOpts};

use crate::AppState;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub org_id: Uuid,
    #[serde(default)]
    pub test: bool,
    #[serde(default)]
    pub replace: bool,
    #[serde(default)]
    pub resume_job_id: Option<Uuid>,
    /// "resume" to re-enter the job named by `resumeJobId`.
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<TriggerData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerData {
    pub successful_runs: u32,
    pub total_runs: u32,
}

impl TriggerResponse {
    fn ok(stats: &ScanStats) -> Self {
        Self {
            success: true,
            data: Some(TriggerData {
                successful_runs: stats.successful_runs,
                total_runs: stats.total_runs,
            }),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn trigger_scan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TriggerRequest>,
) -> impl IntoResponse {
    if request.action.as_deref() == Some("resume") && request.resume_job_id.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(TriggerResponse::err("resume requires resumeJobId")),
        );
    }

    let opts = TriggerOpts {
        test: request.test,
        replace: request.replace,
        resume_job_id: request.resume_job_id,
    };

    let outcome = match state.trigger.trigger(request.org_id, opts).await {
        Ok(outcome) => outcome,
        Err(EchowatchError::Validation(msg)) => {
            return (StatusCode::BAD_REQUEST, Json(TriggerResponse::err(msg)));
        }
        Err(e) => {
            error!(error = %e, "Trigger failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TriggerResponse::err("internal error")),
            );
        }
    };

    if !outcome.accepted {
        let reason = outcome.reason.unwrap_or_else(|| "not accepted".to_string());
        return (StatusCode::CONFLICT, Json(TriggerResponse::err(reason)));
    }

    let Some(job_id) = outcome.job_id else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(TriggerResponse::err("internal error")),
        );
    };

    info!(org_id = %request.org_id, job_id = %job_id, "Scan accepted, running");
    let result = match outcome.action {
        TriggerAction::Resume => state.controller.resume(job_id).await,
        _ => state.controller.run(job_id).await,
    };

    match result {
        Ok(stats) => (StatusCode::OK, Json(TriggerResponse::ok(&stats))),
        Err(EchowatchError::JobConflict) => (
            StatusCode::CONFLICT,
            Json(TriggerResponse::err(
                "another runner claimed this scan first",
            )),
        ),
        Err(EchowatchError::InvalidState(msg)) => {
            (StatusCode::CONFLICT, Json(TriggerResponse::err(msg)))
        }
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Scan run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TriggerResponse::err("scan failed")),
            )
        }
    }
}

pub async fn scan_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.monitor.check().await {
        Ok(report) => (StatusCode::OK, Json(serde_json::to_value(report).unwrap_or_default())),
        Err(e) => {
            error!(error = %e, "Health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "health check failed"})),
            )
        }
    }
}
