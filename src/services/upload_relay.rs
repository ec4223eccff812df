use crate::models::errors::RelayError;
use crate::models::upload::{ConnectionCheck, UploadResult};
use crate::services::credential_store::{CredentialStore, SftpConfig};
use crate::services::sftp_transport::{RemoteSession, SftpEndpoint, SftpTransport};
use regex::Regex;
use std::sync::{Arc, LazyLock};

/// Spreadsheet formats accepted for relay
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "xls"];

static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9\-_.]").expect("valid filename pattern"));
static REPEATED_DOTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.+").expect("valid dot pattern"));

/// Reduces a client-supplied name to a safe single path component
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let replaced = DISALLOWED_CHARS.replace_all(base, "_");
    REPEATED_DOTS.replace_all(&replaced, ".").into_owned()
}

pub fn is_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Ensures the remote directory ends with exactly one `/`
pub fn normalize_remote_dir(remote_path: &str) -> String {
    format!("{}/", remote_path.trim_end_matches('/'))
}

/// Pushes uploaded spreadsheets to the configured SFTP server
pub struct UploadRelay {
    credentials: Arc<CredentialStore>,
    transport: Arc<dyn SftpTransport>,
}

impl UploadRelay {
    pub fn new(credentials: Arc<CredentialStore>, transport: Arc<dyn SftpTransport>) -> Self {
        Self {
            credentials,
            transport,
        }
    }

    pub fn method(&self) -> &'static str {
        self.transport.method()
    }

    /// Host and username are set, regardless of the password
    pub fn is_configured(&self) -> bool {
        self.credentials.config().is_configured()
    }

    /// Relays one file. Every failure is folded into the result.
    pub async fn upload(&self, content: &[u8], filename: &str) -> UploadResult {
        let sanitized = sanitize_filename(filename);

        match self.try_upload(content, &sanitized).await {
            Ok(remote_file) => {
                tracing::info!(
                    "Relayed {} ({} bytes) to {} via {}",
                    sanitized,
                    content.len(),
                    remote_file,
                    self.method()
                );
                UploadResult::succeeded(sanitized, remote_file, self.method())
            }
            Err(error) => {
                tracing::warn!("Relay of {} failed: {}", sanitized, error);
                UploadResult::failed(sanitized, error)
            }
        }
    }

    async fn try_upload(&self, content: &[u8], filename: &str) -> Result<String, RelayError> {
        let config = self.complete_config()?;

        if !is_allowed_extension(filename) {
            return Err(RelayError::invalid_file_type(&ALLOWED_EXTENSIONS));
        }

        let remote_file = format!("{}{}", normalize_remote_dir(&config.remote_path), filename);

        let mut session = self.open_session(&config).await?;
        let written = session.write(&remote_file, content).await;
        session.close().await;
        written?;

        Ok(remote_file)
    }

    /// Connects, authenticates and opens the subsystem without writing
    pub async fn test_connection(&self) -> ConnectionCheck {
        let outcome = async {
            let config = self.complete_config()?;
            let mut session = self.open_session(&config).await?;
            session.close().await;
            Ok::<_, RelayError>(())
        }
        .await;

        match outcome {
            Ok(()) => ConnectionCheck {
                success: true,
                message: format!("Connection successful! (using {})", self.method()),
                method: Some(self.method().to_string()),
            },
            Err(error) => ConnectionCheck {
                success: false,
                message: error.to_string(),
                method: None,
            },
        }
    }

    fn complete_config(&self) -> Result<SftpConfig, RelayError> {
        let config = self.credentials.config();
        if config.is_complete() {
            Ok(config)
        } else {
            Err(RelayError::ConfigIncomplete)
        }
    }

    async fn open_session(
        &self,
        config: &SftpConfig,
    ) -> Result<Box<dyn RemoteSession>, RelayError> {
        let endpoint = SftpEndpoint {
            host: config.host.clone(),
            port: config.port,
            host_key_fingerprint: config.host_key_fingerprint.clone(),
            connect_timeout: self.credentials.connect_timeout(),
        };

        let mut session = self.transport.connect(&endpoint).await?;

        let ready = async {
            session.authenticate(&config.username, &config.password).await?;
            session.open_subsystem().await
        }
        .await;

        match ready {
            Ok(()) => Ok(session),
            Err(error) => {
                session.close().await;
                Err(error)
            }
        }
    }
}
