use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use subtle::ConstantTimeEq;

/// Header checked first when looking for a presented key
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Body and form field name carrying the key
pub const API_KEY_FIELD: &str = "api_key";

/// Length of keys produced by [`generate_api_key`]
pub const GENERATED_KEY_LENGTH: usize = 32;

/// Why a presented key was accepted or refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted,
    NotConfigured,
    Missing,
    Invalid,
}

impl AuthOutcome {
    pub fn is_granted(self) -> bool {
        self == AuthOutcome::Granted
    }
}

/// Validates API keys against the configured key
#[derive(Clone)]
pub struct ApiKeyAuthenticator {
    stored_key: Option<String>,
}

impl ApiKeyAuthenticator {
    pub fn new(stored_key: Option<String>) -> Self {
        Self {
            stored_key: stored_key.filter(|key| !key.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.stored_key.is_some()
    }

    /// True iff the presented key equals the stored key exactly
    pub fn verify(&self, presented_key: &str) -> bool {
        self.check(Some(presented_key)).is_granted()
    }

    pub fn check(&self, presented_key: Option<&str>) -> AuthOutcome {
        let Some(stored) = self.stored_key.as_deref() else {
            return AuthOutcome::NotConfigured;
        };

        let presented = match presented_key {
            Some(key) if !key.is_empty() => key,
            _ => return AuthOutcome::Missing,
        };

        // Lengths leak through ct_eq, contents do not
        if bool::from(stored.as_bytes().ct_eq(presented.as_bytes())) {
            AuthOutcome::Granted
        } else {
            AuthOutcome::Invalid
        }
    }
}

/// Picks the first non-empty key from the sources in priority order
pub fn first_presented_key<I, S>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    candidates
        .into_iter()
        .flatten()
        .map(|key| key.as_ref().to_string())
        .find(|key| !key.is_empty())
}

/// Fresh random alphanumeric key for `API_KEY`
pub fn generate_api_key() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(GENERATED_KEY_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "Zq4mX8vR2kT9wL1pN6sB3yH7cJ5dF0gA";

    #[test]
    fn test_exact_key_is_accepted() {
        let auth = ApiKeyAuthenticator::new(Some(KEY.to_string()));
        assert!(auth.verify(KEY));
        assert_eq!(auth.check(Some(KEY)), AuthOutcome::Granted);
    }

    #[test]
    fn test_near_misses_are_rejected() {
        let auth = ApiKeyAuthenticator::new(Some(KEY.to_string()));

        assert!(!auth.verify(&KEY[..KEY.len() - 1]));
        assert!(!auth.verify(&KEY[1..]));
        assert!(!auth.verify(&format!("{}x", KEY)));
        assert!(!auth.verify(&KEY.to_lowercase()));
        assert!(!auth.verify(&KEY.to_uppercase()));
        assert_eq!(auth.check(Some("wrong")), AuthOutcome::Invalid);
    }

    #[test]
    fn test_empty_key_always_fails() {
        let auth = ApiKeyAuthenticator::new(Some(KEY.to_string()));
        assert!(!auth.verify(""));
        assert_eq!(auth.check(None), AuthOutcome::Missing);
        assert_eq!(auth.check(Some("")), AuthOutcome::Missing);
    }

    #[test]
    fn test_unconfigured_key_denies_everything() {
        let auth = ApiKeyAuthenticator::new(None);
        assert!(!auth.is_configured());
        assert!(!auth.verify(KEY));
        assert_eq!(auth.check(Some(KEY)), AuthOutcome::NotConfigured);

        let empty = ApiKeyAuthenticator::new(Some(String::new()));
        assert!(!empty.is_configured());
        assert!(!empty.verify(""));
    }

    #[test]
    fn test_first_presented_key_priority() {
        assert_eq!(
            first_presented_key([Some("header"), Some("body"), Some("form")]),
            Some("header".to_string())
        );
        assert_eq!(
            first_presented_key([Some(""), Some("body"), Some("form")]),
            Some("body".to_string())
        );
        assert_eq!(
            first_presented_key([None, Some(""), Some("form")]),
            Some("form".to_string())
        );
        assert_eq!(first_presented_key::<_, &str>([None, None, None]), None);
    }

    #[test]
    fn test_generated_keys_are_usable() {
        let key = generate_api_key();
        assert_eq!(key.len(), GENERATED_KEY_LENGTH);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, generate_api_key());

        let auth = ApiKeyAuthenticator::new(Some(key.clone()));
        assert!(auth.verify(&key));
    }
}
