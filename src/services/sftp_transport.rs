//! SFTP transport seam.
//!
//! The relay only needs to connect, authenticate with a password, open the
//! SFTP subsystem and write one file. [`RusshTransport`] is the production
//! adapter; tests plug in their own.

use crate::models::errors::RelayError;
use async_trait::async_trait;
use russh::client;
use russh::keys::{HashAlg, PublicKey};
use russh::Disconnect;
use russh_sftp::client::SftpSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Where and how to reach the SFTP server
#[derive(Debug, Clone)]
pub struct SftpEndpoint {
    pub host: String,
    pub port: u16,
    pub host_key_fingerprint: Option<String>,
    pub connect_timeout: Duration,
}

#[async_trait]
pub trait SftpTransport: Send + Sync {
    /// Identifier reported back to callers as the upload method
    fn method(&self) -> &'static str;

    async fn connect(&self, endpoint: &SftpEndpoint) -> Result<Box<dyn RemoteSession>, RelayError>;
}

/// One open SSH connection
#[async_trait]
pub trait RemoteSession: Send {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), RelayError>;

    async fn open_subsystem(&mut self) -> Result<(), RelayError>;

    /// Writes `content` to `remote_file`, replacing any existing file
    async fn write(&mut self, remote_file: &str, content: &[u8]) -> Result<(), RelayError>;

    async fn close(&mut self);
}

/// Transport backed by russh and russh-sftp
#[derive(Debug, Clone, Default)]
pub struct RusshTransport;

impl RusshTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SftpTransport for RusshTransport {
    fn method(&self) -> &'static str {
        "russh"
    }

    async fn connect(&self, endpoint: &SftpEndpoint) -> Result<Box<dyn RemoteSession>, RelayError> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(endpoint.connect_timeout),
            ..Default::default()
        });

        let handler = HostKeyCheck {
            expected_fingerprint: endpoint.host_key_fingerprint.clone(),
        };

        tracing::debug!("Connecting to SFTP server {}:{}", endpoint.host, endpoint.port);

        let connect = client::connect(config, (endpoint.host.as_str(), endpoint.port), handler);
        let handle = match tokio::time::timeout(endpoint.connect_timeout, connect).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                return Err(RelayError::connection_failed(
                    &endpoint.host,
                    endpoint.port,
                    e.to_string(),
                ))
            }
            Err(_) => {
                return Err(RelayError::connection_failed(
                    &endpoint.host,
                    endpoint.port,
                    format!("timed out after {}s", endpoint.connect_timeout.as_secs()),
                ))
            }
        };

        Ok(Box::new(RusshSession {
            handle,
            sftp: None,
        }))
    }
}

struct HostKeyCheck {
    expected_fingerprint: Option<String>,
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let Some(expected) = self.expected_fingerprint.as_deref() else {
            return Ok(true);
        };

        let actual = server_public_key.fingerprint(HashAlg::Sha256).to_string();
        let matches = actual == expected || actual.strip_prefix("SHA256:") == Some(expected);
        if !matches {
            tracing::warn!("SFTP host key mismatch: expected {}, got {}", expected, actual);
        }
        Ok(matches)
    }
}

struct RusshSession {
    handle: client::Handle<HostKeyCheck>,
    sftp: Option<SftpSession>,
}

#[async_trait]
impl RemoteSession for RusshSession {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), RelayError> {
        let auth = self
            .handle
            .authenticate_password(username, password)
            .await
            .map_err(|e| RelayError::transport(format!("password authentication: {}", e)))?;

        if auth.success() {
            Ok(())
        } else {
            Err(RelayError::auth_failed(username))
        }
    }

    async fn open_subsystem(&mut self) -> Result<(), RelayError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| RelayError::subsystem_failed(e.to_string()))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| RelayError::subsystem_failed(e.to_string()))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| RelayError::subsystem_failed(e.to_string()))?;

        self.sftp = Some(sftp);
        Ok(())
    }

    async fn write(&mut self, remote_file: &str, content: &[u8]) -> Result<(), RelayError> {
        let sftp = self
            .sftp
            .as_ref()
            .ok_or_else(|| RelayError::subsystem_failed("SFTP subsystem not opened"))?;

        let mut file = sftp
            .create(remote_file)
            .await
            .map_err(|e| RelayError::write_failed(e.to_string()))?;

        file.write_all(content)
            .await
            .map_err(|e| RelayError::write_failed(e.to_string()))?;
        file.shutdown()
            .await
            .map_err(|e| RelayError::write_failed(e.to_string()))?;

        Ok(())
    }

    async fn close(&mut self) {
        if let Some(sftp) = self.sftp.take() {
            if let Err(e) = sftp.close().await {
                tracing::debug!("Error closing SFTP session: {}", e);
            }
        }

        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::debug!("Error disconnecting SSH session: {}", e);
        }
    }
}
