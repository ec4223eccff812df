#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

use sheet_sftp_relay::{
    build_router,
    models::errors::RelayError,
    services::{
        credential_store::SecretCipher,
        sftp_transport::{RemoteSession, SftpEndpoint, SftpTransport},
    },
    utils::config::{AppConfig, SftpSettings},
    AppState,
};

pub const TEST_API_KEY: &str = "test-api-key-0123456789";
pub const TEST_SECRET: &str = "test-site-secret";
pub const TEST_SALT: &str = "test-salt";

/// Files written through the in-memory transport
#[derive(Clone, Default)]
pub struct MemoryTransport {
    pub files: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

struct MemorySession {
    files: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

#[async_trait]
impl SftpTransport for MemoryTransport {
    fn method(&self) -> &'static str {
        "memory"
    }

    async fn connect(
        &self,
        _endpoint: &SftpEndpoint,
    ) -> Result<Box<dyn RemoteSession>, RelayError> {
        Ok(Box::new(MemorySession {
            files: self.files.clone(),
        }))
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn authenticate(&mut self, _username: &str, _password: &str) -> Result<(), RelayError> {
        Ok(())
    }

    async fn open_subsystem(&mut self) -> Result<(), RelayError> {
        Ok(())
    }

    async fn write(&mut self, remote_file: &str, content: &[u8]) -> Result<(), RelayError> {
        self.files
            .lock()
            .unwrap()
            .push((remote_file.to_string(), content.to_vec()));
        Ok(())
    }

    async fn close(&mut self) {}
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub transport: MemoryTransport,
    _log_dir: TempDir,
}

/// Complete SFTP settings with an encrypted password
pub fn sftp_settings() -> SftpSettings {
    SftpSettings {
        host: "sftp.test.local".to_string(),
        port: 2222,
        username: "relay".to_string(),
        password_encrypted: SecretCipher::new(TEST_SECRET, TEST_SALT).encrypt("s3cret"),
        remote_path: "/incoming".to_string(),
        ..SftpSettings::default()
    }
}

pub fn test_config(log_dir: &TempDir) -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        api_key: Some(TEST_API_KEY.to_string()),
        audit_log_path: log_dir.path().join("sync.log").to_string_lossy().into_owned(),
        site_secret: TEST_SECRET.to_string(),
        site_salt: TEST_SALT.to_string(),
        sftp: sftp_settings(),
        ..AppConfig::default()
    }
}

/// Setup a test application backed by the in-memory transport
pub fn setup_test_app() -> TestApp {
    setup_with(|_| {})
}

pub fn setup_with(customize: impl FnOnce(&mut AppConfig)) -> TestApp {
    let log_dir = TempDir::new().unwrap();
    let mut config = test_config(&log_dir);
    customize(&mut config);

    let transport = MemoryTransport::default();
    let state = AppState::with_transport(config, Arc::new(transport.clone()))
        .expect("Failed to build app state");

    TestApp {
        router: build_router(state.clone()),
        state,
        transport,
        _log_dir: log_dir,
    }
}

/// Setup with the real russh transport, for connection failure paths
pub fn setup_with_real_transport(customize: impl FnOnce(&mut AppConfig)) -> TestApp {
    let log_dir = TempDir::new().unwrap();
    let mut config = test_config(&log_dir);
    customize(&mut config);

    let state = AppState::from_config(config).expect("Failed to build app state");

    TestApp {
        router: build_router(state.clone()),
        state,
        transport: MemoryTransport::default(),
        _log_dir: log_dir,
    }
}

pub async fn send(app: &TestApp, request: Request<Body>) -> (axum::http::StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

/// Lines currently in the audit log file
pub fn audit_lines(app: &TestApp) -> Vec<String> {
    std::fs::read_to_string(app.state.audit_log.path())
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Build a multipart/form-data body with the given fields and one file part
pub fn multipart_body(
    boundary: &str,
    fields: &[(&str, &str)],
    file: Option<(&str, &[u8])>,
) -> Vec<u8> {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    if let Some((filename, content)) = file {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: text/csv\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}
