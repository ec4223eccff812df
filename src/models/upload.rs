use crate::models::errors::RelayError;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// A decoded upload waiting to be relayed
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub raw_content: Vec<u8>,
    pub filename: String,
    pub source_address: String,
    pub received_at: DateTime<Utc>,
}

impl UploadRequest {
    pub fn new(
        raw_content: Vec<u8>,
        filename: impl Into<String>,
        source_address: impl Into<String>,
    ) -> Self {
        Self {
            raw_content,
            filename: filename.into(),
            source_address: source_address.into(),
            received_at: Utc::now(),
        }
    }

    /// Name used when the client did not send one
    pub fn default_filename(now: DateTime<Utc>) -> String {
        format!("export_{}.csv", now.format("%Y-%m-%d_%H%M%S"))
    }

    pub fn size(&self) -> usize {
        self.raw_content.len()
    }
}

/// Outcome of a single relay attempt
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub success: bool,
    pub filename: String,
    pub remote_path: String,
    pub method: Option<String>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<RelayError>,
}

impl UploadResult {
    pub fn succeeded(filename: String, remote_path: String, method: &str) -> Self {
        Self {
            success: true,
            filename,
            remote_path,
            method: Some(method.to_string()),
            error: None,
        }
    }

    pub fn failed(filename: String, error: RelayError) -> Self {
        Self {
            success: false,
            filename,
            remote_path: String::new(),
            method: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<Self, RelayError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

fn serialize_error<S>(error: &Option<RelayError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(error) => serializer.serialize_some(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Result of probing the configured SFTP server without writing anything
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionCheck {
    pub success: bool,
    pub message: String,
    pub method: Option<String>,
}
