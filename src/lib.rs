// Library exports for testing and external use

pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use models::errors::RelayError;
use services::{
    audit_log::AuditLog,
    authenticator::ApiKeyAuthenticator,
    credential_store::{CredentialStore, SecretCipher},
    rate_limiter::{RateLimitConfig, RateLimiter},
    sftp_transport::{RusshTransport, SftpTransport},
    upload_relay::UploadRelay,
};
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utils::config::AppConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub credentials: Arc<CredentialStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub authenticator: Arc<ApiKeyAuthenticator>,
    pub relay: Arc<UploadRelay>,
    pub audit_log: Arc<AuditLog>,
}

impl AppState {
    pub fn from_config(config: AppConfig) -> Result<Self, RelayError> {
        Self::with_transport(config, Arc::new(RusshTransport::new()))
    }

    pub fn with_transport(
        config: AppConfig,
        transport: Arc<dyn SftpTransport>,
    ) -> Result<Self, RelayError> {
        let cipher = SecretCipher::new(&config.site_secret, &config.site_salt);
        let credentials = Arc::new(CredentialStore::new(config.sftp.clone(), cipher));
        let audit_log = Arc::new(AuditLog::new(&config.audit_log_path)?);

        let rate_limiter = RateLimiter::with_config(RateLimitConfig {
            max_requests: config.rate_limit_max_requests,
            window_duration: config.rate_limit_window(),
        });

        Ok(Self {
            authenticator: Arc::new(ApiKeyAuthenticator::new(config.api_key.clone())),
            relay: Arc::new(UploadRelay::new(credentials.clone(), transport)),
            rate_limiter: Arc::new(rate_limiter),
            credentials,
            audit_log,
            config: Arc::new(config),
        })
    }
}

/// All routes, with the API key gate applied to everything under `/api`
pub fn build_router(app_state: AppState) -> Router {
    let config = app_state.config.clone();

    let api = Router::new()
        .route("/upload", post(handlers::upload::upload_file))
        .route("/status", get(handlers::status::get_status))
        .route(
            "/logs",
            get(handlers::logs::list_logs).delete(handlers::logs::clear_logs),
        )
        .route("/test-connection", post(handlers::connection::test_connection))
        .route(
            "/settings",
            get(handlers::settings::get_settings).put(handlers::settings::update_settings),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            handlers::gate::require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api)
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.request_timeout_seconds,
                )))
                .layer(cors_layer(&config.cors_origins)),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(allowed))
}
