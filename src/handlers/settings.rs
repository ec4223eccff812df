use crate::services::audit_log::Severity;
use crate::services::credential_store::{CredentialStore, SftpSettingsUpdate};
use crate::AppState;
use axum::{extract::State, response::Json};
use serde::Serialize;

/// Current SFTP settings as shown to operators, without the password
#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password_set: bool,
    pub remote_path: String,
    pub sftp_configured: bool,
}

impl SettingsView {
    fn from_store(credentials: &CredentialStore) -> Self {
        let config = credentials.config();
        Self {
            sftp_configured: config.is_configured(),
            password_set: !config.password.is_empty(),
            host: config.host,
            port: config.port,
            username: config.username,
            remote_path: config.remote_path,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub success: bool,
    pub settings: SettingsView,
}

pub async fn get_settings(State(app_state): State<AppState>) -> Json<SettingsResponse> {
    Json(SettingsResponse {
        success: true,
        settings: SettingsView::from_store(&app_state.credentials),
    })
}

/// Settings save; a blank password keeps the stored one.
///
/// Changes live in memory until restart, environment values apply again
/// afterwards.
pub async fn update_settings(
    State(app_state): State<AppState>,
    Json(update): Json<SftpSettingsUpdate>,
) -> Json<SettingsResponse> {
    let password_changed = update
        .password
        .as_deref()
        .is_some_and(|password| !password.is_empty());

    app_state.credentials.save(update);

    let settings = SettingsView::from_store(&app_state.credentials);
    app_state
        .audit_log
        .record(
            format!(
                "SFTP settings updated: {}@{}:{}{}",
                settings.username,
                settings.host,
                settings.port,
                if password_changed { " (password changed)" } else { "" }
            ),
            Severity::Info,
        )
        .await;

    Json(SettingsResponse {
        success: true,
        settings,
    })
}
