use crate::services::credential_store::CredentialStore;
use crate::AppState;
use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Whether the relay has enough settings to be considered set up
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub configured: bool,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub fn status(credentials: &CredentialStore) -> StatusReport {
    StatusReport {
        configured: credentials.config().is_configured(),
        version: VERSION,
        timestamp: Utc::now(),
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub status: &'static str,
    pub plugin_version: &'static str,
    pub sftp_configured: bool,
    pub timestamp: String,
}

pub async fn get_status(State(app_state): State<AppState>) -> Json<StatusResponse> {
    let report = status(&app_state.credentials);

    Json(StatusResponse {
        success: true,
        status: "active",
        plugin_version: report.version,
        sftp_configured: report.configured,
        timestamp: report.timestamp.to_rfc3339(),
    })
}
