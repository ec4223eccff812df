use crate::handlers::gate::ClientAddress;
use crate::handlers::payload::{
    buffer_body, decode_base64_content, parse_multipart, BodyKind, JsonUploadPayload,
};
use crate::models::errors::RelayError;
use crate::models::upload::UploadRequest;
use crate::services::audit_log::Severity;
use crate::AppState;
use axum::{
    extract::{Extension, Request, State},
    response::Json,
};
use chrono::Utc;
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub filename: String,
    pub remote_path: String,
    pub timestamp: String,
    pub duration_ms: u64,
}

/// Receive a spreadsheet export and relay it to the SFTP server
pub async fn upload_file(
    State(app_state): State<AppState>,
    Extension(ClientAddress(client)): Extension<ClientAddress>,
    request: Request,
) -> Result<Json<UploadResponse>, RelayError> {
    let started = Instant::now();
    let request_id = Uuid::new_v4();

    app_state
        .audit_log
        .record(format!("Upload request received from {}", client), Severity::Info)
        .await;

    let upload = match decode_upload(&app_state, request, &client).await {
        Ok(upload) => upload,
        Err(error) => {
            app_state
                .audit_log
                .record(
                    format!(
                        "Upload rejected from {} ({}ms): {}",
                        client,
                        started.elapsed().as_millis(),
                        error
                    ),
                    Severity::Error,
                )
                .await;
            return Err(error);
        }
    };

    tracing::debug!(
        %request_id,
        "Decoded upload {} ({} bytes) from {}",
        upload.filename,
        upload.size(),
        upload.source_address
    );

    let result = app_state
        .relay
        .upload(&upload.raw_content, &upload.filename)
        .await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match result.into_result() {
        Ok(result) => {
            app_state
                .audit_log
                .record(
                    format!(
                        "File uploaded successfully: {} to {} ({}ms, {}) from {}",
                        result.filename,
                        result.remote_path,
                        duration_ms,
                        result.method.as_deref().unwrap_or("unknown"),
                        client
                    ),
                    Severity::Success,
                )
                .await;

            tracing::info!(%request_id, "Upload from {} completed in {}ms", client, duration_ms);

            Ok(Json(UploadResponse {
                success: true,
                message: "File uploaded successfully".to_string(),
                filename: result.filename,
                remote_path: result.remote_path,
                timestamp: Utc::now().to_rfc3339(),
                duration_ms,
            }))
        }
        Err(error) => {
            app_state
                .audit_log
                .record(
                    format!("Upload failed from {} ({}ms): {}", client, duration_ms, error),
                    Severity::Error,
                )
                .await;

            if error.is_transport_failure() {
                tracing::error!(%request_id, "SFTP relay failed for {}: {}", client, error);
            } else {
                tracing::warn!(%request_id, "Upload from {} not relayed: {}", client, error);
            }
            Err(error)
        }
    }
}

/// JSON base64 content first, then a multipart `file` field
async fn decode_upload(
    app_state: &AppState,
    request: Request,
    client: &str,
) -> Result<UploadRequest, RelayError> {
    let kind = BodyKind::from_headers(request.headers());
    let body = buffer_body(
        request.into_body(),
        app_state.config.max_body_size(),
        app_state.config.max_file_size,
    )
    .await?;

    let (content, filename) = match kind {
        BodyKind::Json => {
            let payload: JsonUploadPayload = serde_json::from_slice(&body)
                .map_err(|e| RelayError::decode_failed(format!("Invalid JSON body: {}", e)))?;

            match payload.file_content.filter(|content| !content.is_empty()) {
                Some(encoded) => (decode_base64_content(&encoded)?, payload.filename),
                None => (Vec::new(), None),
            }
        }
        BodyKind::Multipart { boundary } => {
            let form = parse_multipart(body, &boundary).await?;
            match form.file {
                Some(file) => (file.data.to_vec(), file.filename),
                None => (Vec::new(), None),
            }
        }
        BodyKind::UrlEncoded | BodyKind::Other => (Vec::new(), None),
    };

    if content.is_empty() {
        return Err(RelayError::NoContentProvided);
    }

    if content.len() > app_state.config.max_file_size {
        return Err(RelayError::payload_too_large(app_state.config.max_file_size));
    }

    let filename = filename
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| UploadRequest::default_filename(Utc::now()));

    Ok(UploadRequest::new(content, filename, client))
}
