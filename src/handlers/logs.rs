use crate::models::errors::RelayError;
use crate::services::audit_log::LogEntry;
use crate::AppState;
use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub success: bool,
    pub entries: Vec<LogEntry>,
}

/// Recent audit entries, newest first
pub async fn list_logs(
    State(app_state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, RelayError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let entries = app_state.audit_log.read(limit).await?;

    Ok(Json(LogsResponse {
        success: true,
        entries,
    }))
}

pub async fn clear_logs(
    State(app_state): State<AppState>,
) -> Result<Json<serde_json::Value>, RelayError> {
    app_state.audit_log.clear().await?;
    tracing::info!("Audit log cleared");

    Ok(Json(serde_json::json!({ "success": true })))
}
