//! SFTP connection settings with the password encrypted at rest.
//!
//! Stored passwords are `base64(iv || AES-256-CBC(password))` where the key
//! is `SHA-256(site_secret || site_salt)`. Anything that fails to decrypt is
//! treated as an unset password.

use crate::utils::config::SftpSettings;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::RwLock;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;

/// Symmetric cipher for the stored SFTP password
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl SecretCipher {
    pub fn new(site_secret: &str, site_salt: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(site_secret.as_bytes());
        hasher.update(site_salt.as_bytes());
        Self {
            key: hasher.finalize().into(),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut stored = Vec::with_capacity(IV_LEN + ciphertext.len());
        stored.extend_from_slice(&iv);
        stored.extend_from_slice(&ciphertext);
        BASE64.encode(stored)
    }

    /// Returns an empty string for anything that is not a valid ciphertext
    pub fn decrypt(&self, stored: &str) -> String {
        let Ok(data) = BASE64.decode(stored.trim()) else {
            return String::new();
        };

        if data.len() <= IV_LEN {
            return String::new();
        }

        let (iv, ciphertext) = data.split_at(IV_LEN);
        let mut iv_block = [0u8; IV_LEN];
        iv_block.copy_from_slice(iv);

        Aes256CbcDec::new(&self.key.into(), &iv_block.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .ok()
            .and_then(|plaintext| String::from_utf8(plaintext).ok())
            .unwrap_or_default()
    }
}

/// Decrypted connection parameters handed to the relay
#[derive(Clone, PartialEq)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub remote_path: String,
    pub host_key_fingerprint: Option<String>,
}

impl SftpConfig {
    /// Everything needed to attempt an upload is present
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }

    /// Lighter check used by the status endpoint, password not required
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty()
    }
}

impl fmt::Debug for SftpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "<unset>" } else { "<redacted>" })
            .field("remote_path", &self.remote_path)
            .field("host_key_fingerprint", &self.host_key_fingerprint)
            .finish()
    }
}

/// Fields accepted by a settings save; `None` leaves a field unchanged
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SftpSettingsUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    /// Plaintext; an empty value keeps the stored password
    pub password: Option<String>,
    pub remote_path: Option<String>,
}

impl fmt::Debug for SftpSettingsUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpSettingsUpdate")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("remote_path", &self.remote_path)
            .finish()
    }
}

pub struct CredentialStore {
    settings: RwLock<SftpSettings>,
    cipher: SecretCipher,
}

impl CredentialStore {
    pub fn new(settings: SftpSettings, cipher: SecretCipher) -> Self {
        Self {
            settings: RwLock::new(settings),
            cipher,
        }
    }

    /// Current settings with the password decrypted
    pub fn config(&self) -> SftpConfig {
        let settings = self.snapshot();
        let password = if settings.password_encrypted.is_empty() {
            String::new()
        } else {
            let password = self.cipher.decrypt(&settings.password_encrypted);
            if password.is_empty() {
                tracing::warn!("Stored SFTP password could not be decrypted, treating it as unset");
            }
            password
        };

        SftpConfig {
            host: settings.host,
            port: settings.port,
            username: settings.username,
            password,
            remote_path: settings.remote_path,
            host_key_fingerprint: settings.host_key_fingerprint,
        }
    }

    pub fn snapshot(&self) -> SftpSettings {
        match self.settings.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        self.snapshot().connect_timeout()
    }

    /// Applies a settings save, encrypting any new password
    pub fn save(&self, update: SftpSettingsUpdate) {
        let mut settings = match self.settings.write() {
            Ok(settings) => settings,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(host) = update.host {
            settings.host = host.trim().to_string();
        }
        if let Some(port) = update.port.filter(|port| *port > 0) {
            settings.port = port;
        }
        if let Some(username) = update.username {
            settings.username = username.trim().to_string();
        }
        if let Some(password) = update.password.filter(|password| !password.is_empty()) {
            settings.password_encrypted = self.cipher.encrypt(&password);
        }
        if let Some(remote_path) = update.remote_path {
            settings.remote_path = if remote_path.trim().is_empty() {
                "/".to_string()
            } else {
                remote_path.trim().to_string()
            };
        }

        tracing::info!(
            "SFTP settings updated for {}@{}:{}",
            settings.username,
            settings.host,
            settings.port
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new("site-secret-for-tests", "fixed-salt")
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let cipher = cipher();
        for password in ["hunter2", "pässwörd with spaces", "x", "0123456789abcdef"] {
            let stored = cipher.encrypt(password);
            assert_ne!(stored, password);
            assert_eq!(cipher.decrypt(&stored), password);
        }
    }

    #[test]
    fn test_random_iv_changes_ciphertext() {
        let cipher = cipher();
        assert_ne!(cipher.encrypt("same"), cipher.encrypt("same"));
    }

    #[test]
    fn test_corrupt_ciphertext_decrypts_to_empty() {
        let cipher = cipher();
        let stored = cipher.encrypt("hunter2");

        assert_eq!(cipher.decrypt("not base64 at all!"), "");
        assert_eq!(cipher.decrypt(""), "");
        // Legacy plain base64 passwords are too short to carry an IV
        assert_eq!(cipher.decrypt(&BASE64.encode("hunter2")), "");

        let mut raw = BASE64.decode(&stored).unwrap();
        raw.truncate(IV_LEN + 5);
        assert_eq!(cipher.decrypt(&BASE64.encode(&raw)), "");
    }

    #[test]
    fn test_wrong_key_does_not_reveal_plaintext() {
        let stored = cipher().encrypt("hunter2");
        let other = SecretCipher::new("another-secret", "fixed-salt");
        assert_ne!(other.decrypt(&stored), "hunter2");
    }

    #[test]
    fn test_config_decrypts_password() {
        let cipher = cipher();
        let settings = SftpSettings {
            host: "sftp.example.com".to_string(),
            username: "deploy".to_string(),
            password_encrypted: cipher.encrypt("hunter2"),
            ..SftpSettings::default()
        };
        let store = CredentialStore::new(settings, cipher);

        let config = store.config();
        assert_eq!(config.password, "hunter2");
        assert!(config.is_complete());
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_undecryptable_password_is_absent() {
        let settings = SftpSettings {
            host: "sftp.example.com".to_string(),
            username: "deploy".to_string(),
            password_encrypted: "Z2FyYmFnZQ==".to_string(),
            ..SftpSettings::default()
        };
        let store = CredentialStore::new(settings, cipher());

        let config = store.config();
        assert_eq!(config.password, "");
        assert!(!config.is_complete());
        assert!(config.is_configured());
    }

    #[test]
    fn test_save_keeps_password_when_blank() {
        let store = CredentialStore::new(SftpSettings::default(), cipher());

        store.save(SftpSettingsUpdate {
            host: Some(" sftp.example.com ".to_string()),
            username: Some("deploy".to_string()),
            password: Some("hunter2".to_string()),
            ..SftpSettingsUpdate::default()
        });
        assert_eq!(store.config().password, "hunter2");

        store.save(SftpSettingsUpdate {
            password: Some(String::new()),
            remote_path: Some("".to_string()),
            ..SftpSettingsUpdate::default()
        });

        let config = store.config();
        assert_eq!(config.host, "sftp.example.com");
        assert_eq!(config.password, "hunter2");
        assert_eq!(config.remote_path, "/");
    }
}
