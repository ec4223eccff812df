use std::{env, fmt, time::Duration};

/// Salt mixed into the site secret when deriving the password encryption key
pub const DEFAULT_SITE_SALT: &str = "sheet-sftp-relay/password";

#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub cors_origins: Vec<String>,
    pub request_timeout_seconds: u64,
    pub api_key: Option<String>,
    pub audit_log_path: String,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_seconds: u64,
    pub trust_forwarded_for: bool,
    pub site_secret: String,
    pub site_salt: String,
    pub sftp: SftpSettings,
}

/// SFTP settings as stored, with the password still encrypted
#[derive(Clone, PartialEq)]
pub struct SftpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password_encrypted: String,
    pub remote_path: String,
    pub host_key_fingerprint: Option<String>,
    pub connect_timeout_seconds: u64,
}

impl Default for SftpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password_encrypted: String::new(),
            remote_path: "/".to_string(),
            host_key_fingerprint: None,
            connect_timeout_seconds: 30,
        }
    }
}

impl SftpSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_file_size: 10 * 1024 * 1024, // 10MB
            cors_origins: vec!["*".to_string()],
            request_timeout_seconds: 60,
            api_key: None,
            audit_log_path: "logs/sync.log".to_string(),
            rate_limit_max_requests: 60,
            rate_limit_window_seconds: 60,
            trust_forwarded_for: false,
            site_secret: String::new(),
            site_salt: DEFAULT_SITE_SALT.to_string(),
            sftp: SftpSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }

        if let Some(port) = parse_var::<u16>("PORT") {
            config.port = port;
        }

        if let Some(size) = parse_var::<usize>("MAX_FILE_SIZE") {
            config.max_file_size = size;
        }

        if let Ok(origins) = env::var("CORS_ORIGINS") {
            config.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Some(timeout) = parse_var::<u64>("REQUEST_TIMEOUT_SECONDS") {
            config.request_timeout_seconds = timeout;
        }

        if let Ok(key) = env::var("API_KEY") {
            if !key.trim().is_empty() {
                config.api_key = Some(key.trim().to_string());
            }
        }

        if let Ok(path) = env::var("AUDIT_LOG_PATH") {
            config.audit_log_path = path;
        }

        if let Some(max) = parse_var::<u32>("RATE_LIMIT_MAX_REQUESTS") {
            config.rate_limit_max_requests = max;
        }

        if let Some(window) = parse_var::<u64>("RATE_LIMIT_WINDOW_SECONDS") {
            config.rate_limit_window_seconds = window;
        }

        // Only safe behind a proxy that overwrites the header
        if let Some(trust) = parse_var::<bool>("TRUST_FORWARDED_FOR") {
            config.trust_forwarded_for = trust;
        }

        if let Ok(secret) = env::var("SITE_SECRET") {
            config.site_secret = secret;
        }

        if let Ok(salt) = env::var("SITE_SALT") {
            config.site_salt = salt;
        }

        config.sftp = SftpSettings::from_env();
        config
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds)
    }

    /// Largest request body accepted, leaving room for base64 expansion
    pub fn max_body_size(&self) -> usize {
        self.max_file_size / 3 * 4 + 64 * 1024
    }
}

impl SftpSettings {
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(host) = env::var("SFTP_HOST") {
            settings.host = host.trim().to_string();
        }

        if let Some(port) = parse_var::<u16>("SFTP_PORT") {
            if port > 0 {
                settings.port = port;
            }
        }

        if let Ok(username) = env::var("SFTP_USERNAME") {
            settings.username = username.trim().to_string();
        }

        if let Ok(password) = env::var("SFTP_PASSWORD_ENC") {
            settings.password_encrypted = password.trim().to_string();
        }

        if let Ok(path) = env::var("SFTP_REMOTE_PATH") {
            if !path.trim().is_empty() {
                settings.remote_path = path.trim().to_string();
            }
        }

        if let Ok(fingerprint) = env::var("SFTP_HOST_KEY_FINGERPRINT") {
            if !fingerprint.trim().is_empty() {
                settings.host_key_fingerprint = Some(fingerprint.trim().to_string());
            }
        }

        if let Some(timeout) = parse_var::<u64>("SFTP_CONNECT_TIMEOUT_SECONDS") {
            settings.connect_timeout_seconds = timeout;
        }

        settings
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse::<T>().ok())
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_file_size", &self.max_file_size)
            .field("cors_origins", &self.cors_origins)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("api_key", &redact(self.api_key.as_deref().unwrap_or_default()))
            .field("audit_log_path", &self.audit_log_path)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("rate_limit_window_seconds", &self.rate_limit_window_seconds)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("site_secret", &redact(&self.site_secret))
            .field("sftp", &self.sftp)
            .finish()
    }
}

impl fmt::Debug for SftpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password_encrypted", &redact(&self.password_encrypted))
            .field("remote_path", &self.remote_path)
            .field("host_key_fingerprint", &self.host_key_fingerprint)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_relay_contract() {
        let config = AppConfig::default();
        assert_eq!(config.rate_limit_max_requests, 60);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
        assert_eq!(config.sftp.port, 22);
        assert_eq!(config.sftp.remote_path, "/");
        assert_eq!(config.sftp.connect_timeout(), Duration::from_secs(30));
        assert!(config.api_key.is_none());
        assert!(!config.trust_forwarded_for);
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let mut config = AppConfig::default();
        config.api_key = Some("super-secret-key".to_string());
        config.site_secret = "site-secret".to_string();
        config.sftp.password_encrypted = "c2VjcmV0".to_string();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-key"));
        assert!(!debug.contains("site-secret"));
        assert!(!debug.contains("c2VjcmV0"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_body_limit_covers_base64_expansion() {
        let config = AppConfig {
            max_file_size: 3 * 1024,
            ..AppConfig::default()
        };
        assert!(config.max_body_size() >= 4 * 1024);
    }
}
