// Relay services, constructed once at startup and shared through AppState

pub mod audit_log;
pub mod authenticator;
pub mod credential_store;
pub mod rate_limiter;
pub mod sftp_transport;
pub mod upload_relay;
