//! Prints the encrypted form of an SFTP password for `SFTP_PASSWORD_ENC`.
//!
//! Reads the password from the first line of stdin and encrypts it with the
//! key derived from `SITE_SECRET` and `SITE_SALT`.

use anyhow::{bail, Context, Result};
use sheet_sftp_relay::services::credential_store::SecretCipher;
use sheet_sftp_relay::utils::config::AppConfig;
use std::io::{self, BufRead};

fn main() -> Result<()> {
    let config = AppConfig::from_env();

    if config.site_secret.is_empty() {
        bail!("SITE_SECRET must be set to encrypt a password");
    }

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("No password given on stdin");
    }

    let cipher = SecretCipher::new(&config.site_secret, &config.site_salt);
    println!("{}", cipher.encrypt(password));

    Ok(())
}
