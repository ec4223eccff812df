use crate::models::errors::RelayError;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap};
use futures_util::stream;
use multer::Multipart;
use serde::Deserialize;
use std::collections::HashMap;

/// How a request body is encoded, from its Content-Type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    UrlEncoded,
    Multipart { boundary: String },
    Other,
}

impl BodyKind {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(content_type) = headers
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
        else {
            return BodyKind::Other;
        };

        let Ok(parsed) = content_type.parse::<mime::Mime>() else {
            return BodyKind::Other;
        };

        let (type_, subtype) = (parsed.type_(), parsed.subtype());

        if type_ == mime::APPLICATION && subtype == mime::JSON {
            BodyKind::Json
        } else if type_ == mime::APPLICATION && subtype == mime::WWW_FORM_URLENCODED {
            BodyKind::UrlEncoded
        } else if type_ == mime::MULTIPART && subtype == mime::FORM_DATA {
            match multer::parse_boundary(content_type) {
                Ok(boundary) => BodyKind::Multipart { boundary },
                Err(_) => BodyKind::Other,
            }
        } else if parsed.suffix().is_some_and(|suffix| suffix == mime::JSON) {
            BodyKind::Json
        } else {
            BodyKind::Other
        }
    }
}

/// Buffers a request body of at most `limit` bytes.
///
/// Hitting the limit is `PayloadTooLarge` (reported against `max_file_size`);
/// any other read failure, such as a client hanging up mid-body, is a decode
/// failure.
pub async fn buffer_body(
    body: Body,
    limit: usize,
    max_file_size: usize,
) -> Result<Bytes, RelayError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        if exceeded_length_limit(&e) {
            RelayError::payload_too_large(max_file_size)
        } else {
            tracing::debug!("Failed to read request body: {}", e);
            RelayError::decode_failed(format!("Failed to read request body: {}", e))
        }
    })
}

fn exceeded_length_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if e.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// JSON body sent by the spreadsheet export script
#[derive(Debug, Default, Deserialize)]
pub struct JsonUploadPayload {
    /// Base64 encoded file
    pub file_content: Option<String>,
    pub filename: Option<String>,
    /// Client-side export time, informational only
    pub timestamp: Option<String>,
    pub api_key: Option<String>,
}

/// File part of a multipart upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Default)]
pub struct MultipartForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

/// Parses a fully buffered multipart body
pub async fn parse_multipart(body: Bytes, boundary: &str) -> Result<MultipartForm, RelayError> {
    let stream = stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = Multipart::new(stream, boundary);
    let mut form = MultipartForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::debug!("Failed to read multipart field: {}", e);
        RelayError::decode_failed(format!("Malformed multipart data: {}", e))
    })? {
        let name = field.name().map(|s| s.to_string()).unwrap_or_default();

        if name == "file" {
            let filename = field.file_name().map(|s| s.to_string());
            let data = field.bytes().await.map_err(|e| {
                RelayError::decode_failed(format!("Failed to read file data: {}", e))
            })?;
            form.file = Some(UploadedFile { filename, data });
        } else if !name.is_empty() {
            let value = field.text().await.map_err(|e| {
                RelayError::decode_failed(format!("Failed to read form field {}: {}", name, e))
            })?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

/// Decodes the base64 `file_content` of a JSON upload
pub fn decode_base64_content(encoded: &str) -> Result<Vec<u8>, RelayError> {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

    let compact: String = encoded.split_whitespace().collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|_| RelayError::decode_failed("Invalid base64 file content"))
}
