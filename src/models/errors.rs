use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error("SFTP configuration incomplete. Please check relay settings.")]
    ConfigIncomplete,

    #[error("Invalid file type. Allowed: {allowed}")]
    InvalidFileType { allowed: String },

    #[error("Invalid upload payload: {message}")]
    DecodeFailure { message: String },

    #[error("Could not connect to SFTP server at {host}:{port}: {message}")]
    ConnectionFailure {
        host: String,
        port: u16,
        message: String,
    },

    #[error("SFTP authentication failed for user: {username}")]
    AuthFailure { username: String },

    #[error("Could not initialize SFTP subsystem: {message}")]
    SubsystemInitFailure { message: String },

    #[error("Failed to write file to SFTP. Check remote path permissions. ({message})")]
    WriteFailure { message: String },

    #[error("SFTP transport error: {message}")]
    Transport { message: String },

    #[error("Too many requests. Please try again later.")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("{message}")]
    ApiKeyInvalidOrMissing { message: String },

    #[error("No file content provided")]
    NoContentProvided,

    #[error("Upload exceeds the maximum of {max} bytes")]
    PayloadTooLarge { max: usize },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

/// JSON body returned for every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
}

impl RelayError {
    /// Stable machine-readable code for logs and clients
    pub fn error_code(&self) -> &'static str {
        match self {
            RelayError::ConfigIncomplete => "CONFIG_INCOMPLETE",
            RelayError::InvalidFileType { .. } => "INVALID_FILE_TYPE",
            RelayError::DecodeFailure { .. } => "DECODE_FAILED",
            RelayError::ConnectionFailure { .. } => "CONNECTION_FAILED",
            RelayError::AuthFailure { .. } => "SFTP_AUTH_FAILED",
            RelayError::SubsystemInitFailure { .. } => "SUBSYSTEM_INIT_FAILED",
            RelayError::WriteFailure { .. } => "WRITE_FAILED",
            RelayError::Transport { .. } => "TRANSPORT_ERROR",
            RelayError::RateLimitExceeded { .. } => "RATE_LIMITED",
            RelayError::ApiKeyInvalidOrMissing { .. } => "FORBIDDEN",
            RelayError::NoContentProvided => "NO_CONTENT",
            RelayError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            RelayError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Client mistakes map to 4xx, relay and upstream failures to 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidFileType { .. }
            | RelayError::DecodeFailure { .. }
            | RelayError::NoContentProvided => StatusCode::BAD_REQUEST,
            RelayError::ApiKeyInvalidOrMissing { .. } => StatusCode::FORBIDDEN,
            RelayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            RelayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::ConfigIncomplete
            | RelayError::ConnectionFailure { .. }
            | RelayError::AuthFailure { .. }
            | RelayError::SubsystemInitFailure { .. }
            | RelayError::WriteFailure { .. }
            | RelayError::Transport { .. }
            | RelayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the failure happened while talking to the SFTP server
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            RelayError::ConnectionFailure { .. }
                | RelayError::AuthFailure { .. }
                | RelayError::SubsystemInitFailure { .. }
                | RelayError::WriteFailure { .. }
                | RelayError::Transport { .. }
        )
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(self.to_error_response())).into_response();

        if let RelayError::RateLimitExceeded {
            retry_after_seconds,
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

// Convenience functions for creating specific errors
impl RelayError {
    pub fn invalid_file_type(allowed: &[&str]) -> Self {
        RelayError::InvalidFileType {
            allowed: allowed.join(", "),
        }
    }

    pub fn decode_failed(message: impl Into<String>) -> Self {
        RelayError::DecodeFailure {
            message: message.into(),
        }
    }

    pub fn connection_failed(
        host: impl Into<String>,
        port: u16,
        message: impl Into<String>,
    ) -> Self {
        RelayError::ConnectionFailure {
            host: host.into(),
            port,
            message: message.into(),
        }
    }

    pub fn auth_failed(username: impl Into<String>) -> Self {
        RelayError::AuthFailure {
            username: username.into(),
        }
    }

    pub fn subsystem_failed(message: impl Into<String>) -> Self {
        RelayError::SubsystemInitFailure {
            message: message.into(),
        }
    }

    pub fn write_failed(message: impl Into<String>) -> Self {
        RelayError::WriteFailure {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        RelayError::Transport {
            message: message.into(),
        }
    }

    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        RelayError::RateLimitExceeded {
            retry_after_seconds,
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        RelayError::ApiKeyInvalidOrMissing {
            message: message.into(),
        }
    }

    pub fn payload_too_large(max: usize) -> Self {
        RelayError::PayloadTooLarge { max }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        RelayError::Internal {
            message: message.into(),
        }
    }
}
