use crate::handlers::payload::{buffer_body, parse_multipart, BodyKind};
use crate::models::errors::RelayError;
use crate::services::audit_log::Severity;
use crate::services::authenticator::{
    first_presented_key, AuthOutcome, API_KEY_FIELD, API_KEY_HEADER,
};
use crate::services::rate_limiter::identifier_from_ip;
use crate::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

/// Source address of the caller, attached by the gate for handlers
#[derive(Debug, Clone)]
pub struct ClientAddress(pub String);

#[derive(Deserialize)]
struct KeyParams {
    api_key: Option<String>,
}

/// Rate limit, then API key check, for every protected route
pub async fn require_api_key(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let client = client_address(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
        app_state.config.trust_forwarded_for,
    );

    if let Err(error) = app_state.rate_limiter.check_rate_limit(&client).await {
        app_state
            .audit_log
            .record(format!("Rate limit exceeded from {}", client), Severity::Error)
            .await;
        return error.into_response();
    }

    let (mut parts, body) = request.into_parts();
    let body_limit = app_state.config.max_body_size();
    let max_file_size = app_state.config.max_file_size;

    let buffered = if declared_length(&parts.headers).is_some_and(|len| len > body_limit) {
        Err(RelayError::payload_too_large(max_file_size))
    } else {
        buffer_body(body, body_limit, max_file_size).await
    };

    let bytes = match buffered {
        Ok(bytes) => bytes,
        Err(error) => {
            app_state
                .audit_log
                .record(
                    format!(
                        "Request body rejected from {} ({}ms): {}",
                        client,
                        started.elapsed().as_millis(),
                        error
                    ),
                    Severity::Error,
                )
                .await;
            return error.into_response();
        }
    };

    let presented = presented_key(&parts, &bytes).await;

    match app_state.authenticator.check(presented.as_deref()) {
        AuthOutcome::Granted => {}
        AuthOutcome::NotConfigured => {
            app_state
                .audit_log
                .record("API key not configured", Severity::Error)
                .await;
            return forbidden();
        }
        AuthOutcome::Missing => {
            tracing::warn!("No API key provided in request from {}", client);
            return forbidden();
        }
        AuthOutcome::Invalid => {
            app_state
                .audit_log
                .record(format!("Invalid API key from {}", client), Severity::Error)
                .await;
            return forbidden();
        }
    }

    parts.extensions.insert(ClientAddress(client));
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn forbidden() -> Response {
    RelayError::forbidden("Invalid or missing API key").into_response()
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// Forwarded address when trusted and valid, else the peer address
pub fn client_address(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_forwarded_for: bool,
) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());

        if let Some(ip) = forwarded {
            return identifier_from_ip(ip);
        }
    }

    connect_info
        .map(|ConnectInfo(addr)| identifier_from_ip(addr.ip()))
        .unwrap_or_else(|| "0.0.0.0".to_string())
}

/// Header, then JSON body, then form field (body or query string)
async fn presented_key(parts: &Parts, body: &Bytes) -> Option<String> {
    let header_key = parts
        .headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    if let Some(key) = first_presented_key([header_key]) {
        return Some(key);
    }

    let kind = BodyKind::from_headers(&parts.headers);

    let json_key = match kind {
        BodyKind::Json => serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|value| value.get(API_KEY_FIELD)?.as_str().map(str::to_string)),
        _ => None,
    };

    if let Some(key) = first_presented_key([json_key]) {
        return Some(key);
    }

    let form_key = match kind {
        BodyKind::UrlEncoded => serde_urlencoded::from_bytes::<KeyParams>(body)
            .ok()
            .and_then(|params| params.api_key),
        BodyKind::Multipart { boundary } => parse_multipart(body.clone(), &boundary)
            .await
            .ok()
            .and_then(|mut form| form.fields.remove(API_KEY_FIELD)),
        _ => None,
    };

    let query_key = parts
        .uri
        .query()
        .and_then(|query| serde_urlencoded::from_str::<KeyParams>(query).ok())
        .and_then(|params| params.api_key);

    first_presented_key([form_key, query_key])
}
