//! Prints a new random API key for the `API_KEY` setting.
//!
//! Running it again produces a different key; deploying the new value
//! revokes the old one.

use sheet_sftp_relay::services::authenticator::generate_api_key;

fn main() {
    println!("{}", generate_api_key());
}
