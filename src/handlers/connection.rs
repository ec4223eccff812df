use crate::models::upload::ConnectionCheck;
use crate::services::audit_log::Severity;
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::Json};

/// Probe the configured SFTP server without writing a file
pub async fn test_connection(
    State(app_state): State<AppState>,
) -> (StatusCode, Json<ConnectionCheck>) {
    let check = app_state.relay.test_connection().await;

    if check.success {
        app_state
            .audit_log
            .record("SFTP connection test successful", Severity::Success)
            .await;
        (StatusCode::OK, Json(check))
    } else {
        app_state
            .audit_log
            .record(format!("SFTP connection test failed: {}", check.message), Severity::Error)
            .await;
        (StatusCode::BAD_GATEWAY, Json(check))
    }
}
