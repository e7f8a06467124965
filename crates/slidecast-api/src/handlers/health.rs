//! Health check handler.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use slidecast_worker::ToolReadiness;

use crate::state::AppState;

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub checks: Vec<CheckStatus>,
    pub jobs: ExecutorStatus,
}

/// Readiness of one external tool.
#[derive(Debug, Serialize)]
pub struct CheckStatus {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckStatus {
    fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "ok".to_string(),
            error: None,
        }
    }

    fn error(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "error".to_string(),
            error: Some(msg.into()),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

impl From<ToolReadiness> for CheckStatus {
    fn from(tool: ToolReadiness) -> Self {
        if tool.ready {
            Self::ok(tool.name)
        } else {
            Self::error(tool.name, tool.error.unwrap_or_else(|| "unavailable".to_string()))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExecutorStatus {
    pub running: usize,
    pub queued: usize,
}

/// Health check endpoint. Re-probes every conversion tool.
///
/// Responds 503 with the same body when any tool is unavailable.
pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let start = Instant::now();
    let checks: Vec<CheckStatus> = state
        .service
        .probe_readiness()
        .await
        .into_iter()
        .map(CheckStatus::from)
        .collect();
    let all_ok = checks.iter().all(CheckStatus::is_ok);

    tracing::debug!(
        latency_ms = start.elapsed().as_millis() as u64,
        healthy = all_ok,
        "Tool probes finished"
    );

    let response = HealthResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        checks,
        jobs: ExecutorStatus {
            running: state.executor.running_jobs(),
            queued: state.executor.queued_jobs(),
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
