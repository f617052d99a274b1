//! API key authentication for the issue operation.
//!
//! Two keys may be valid at once (current and previous) so keys can be
//! rotated without downtime.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand_core::{OsRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{config::ApiKeyConfig, error::AuthError};

/// Scheme prefix of the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Length of keys produced by [`generate_api_key`] by default.
pub const DEFAULT_API_KEY_LENGTH: usize = 48;

/// The set of accepted API keys.
#[derive(Clone)]
pub struct ApiKeySet {
    current: Zeroizing<String>,
    previous: Option<Zeroizing<String>>,
}

impl ApiKeySet {
    /// Creates a key set. An empty or `"NONE"` previous key is ignored.
    #[must_use]
    pub fn new(current: impl Into<String>, previous: Option<&str>) -> Self {
        let previous = previous
            .filter(|key| !key.is_empty() && *key != crate::config::NONE_SENTINEL)
            .map(|key| Zeroizing::new(key.to_owned()));
        Self { current: Zeroizing::new(current.into()), previous }
    }

    /// Returns whether a previous key is accepted.
    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    /// Returns whether `provided` is one of the accepted keys.
    ///
    /// Every candidate is compared in constant time and all candidates are
    /// always checked, so timing reveals neither which key matched nor how
    /// much of a key matched.
    #[must_use]
    pub fn contains(&self, provided: &str) -> bool {
        let provided = provided.as_bytes();
        let mut matched = self.current.as_bytes().ct_eq(provided);
        if let Some(previous) = &self.previous {
            matched |= previous.as_bytes().ct_eq(provided);
        }
        matched.into()
    }
}

impl From<&ApiKeyConfig> for ApiKeySet {
    fn from(config: &ApiKeyConfig) -> Self {
        Self::new(config.current(), config.previous())
    }
}

impl std::fmt::Debug for ApiKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeySet")
            .field("current", &"[redacted]")
            .field("previous", &self.previous.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Extracts the key from a `Bearer <key>` header value.
///
/// The key is returned exactly as presented; surrounding whitespace is part
/// of it and will not match a configured key.
///
/// # Errors
///
/// Returns [`AuthError::MalformedHeader`] if the scheme is not `Bearer` or
/// the key is empty.
pub fn parse_bearer(header: &str) -> Result<&str, AuthError> {
    let key = header.strip_prefix(BEARER_PREFIX).ok_or(AuthError::MalformedHeader)?;
    if key.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(key)
}

/// Stateless API key checker.
#[derive(Debug, Clone)]
pub struct ApiKeyAuthenticator {
    keys: ApiKeySet,
}

impl ApiKeyAuthenticator {
    /// Creates an authenticator for the given key set.
    #[must_use]
    pub fn new(keys: ApiKeySet) -> Self {
        Self { keys }
    }

    /// Checks a bare API key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownKey`] if the key is not accepted.
    pub fn authenticate(&self, provided: &str) -> Result<(), AuthError> {
        if self.keys.contains(provided) { Ok(()) } else { Err(AuthError::UnknownKey) }
    }

    /// Checks the value of an `Authorization` header.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredentials`] when no header is given,
    /// [`AuthError::MalformedHeader`] when it is not `Bearer <key>`, and
    /// [`AuthError::UnknownKey`] when the key is not accepted.
    #[tracing::instrument(skip_all)]
    pub fn authenticate_header(&self, header: Option<&str>) -> Result<(), AuthError> {
        let header = header.ok_or(AuthError::MissingCredentials)?;
        let key = parse_bearer(header)?;
        self.authenticate(key).inspect_err(|_| {
            tracing::warn!("API key rejected");
        })
    }
}

impl From<&ApiKeyConfig> for ApiKeyAuthenticator {
    fn from(config: &ApiKeyConfig) -> Self {
        Self::new(ApiKeySet::from(config))
    }
}

/// Generates a random URL-safe API key of `length` characters.
///
/// Drawn from the OS random source and encoded as unpadded base64url.
#[must_use]
pub fn generate_api_key(length: usize) -> Zeroizing<String> {
    let mut bytes = Zeroizing::new(vec![0u8; length]);
    OsRng.fill_bytes(&mut bytes);
    let mut encoded = Zeroizing::new(URL_SAFE_NO_PAD.encode(&*bytes));
    encoded.truncate(length);
    encoded
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn rotating() -> ApiKeyAuthenticator {
        ApiKeyAuthenticator::new(ApiKeySet::new("k2", Some("k1")))
    }

    #[rstest]
    #[case::current("k2")]
    #[case::previous("k1")]
    fn test_rotation_accepts_both_keys(#[case] key: &str) {
        assert!(rotating().authenticate(key).is_ok());
    }

    #[rstest]
    #[case::other("k3")]
    #[case::prefix("k")]
    #[case::longer("k22")]
    #[case::empty("")]
    fn test_unknown_keys_rejected(#[case] key: &str) {
        assert_eq!(rotating().authenticate(key), Err(AuthError::UnknownKey));
    }

    #[rstest]
    #[case::sentinel(Some("NONE"))]
    #[case::empty(Some(""))]
    #[case::absent(None)]
    fn test_no_previous_key(#[case] previous: Option<&str>) {
        let keys = ApiKeySet::new("k2", previous);
        assert!(!keys.has_previous());

        let auth = ApiKeyAuthenticator::new(keys);
        assert!(auth.authenticate("k2").is_ok());
        assert_eq!(auth.authenticate("NONE"), Err(AuthError::UnknownKey));
        assert_eq!(auth.authenticate(""), Err(AuthError::UnknownKey));
    }

    #[test]
    fn test_authenticate_header() {
        let auth = rotating();
        assert!(auth.authenticate_header(Some("Bearer k2")).is_ok());
        assert_eq!(auth.authenticate_header(None), Err(AuthError::MissingCredentials));
        assert_eq!(auth.authenticate_header(Some("k2")), Err(AuthError::MalformedHeader));
        assert_eq!(auth.authenticate_header(Some("Basic k2")), Err(AuthError::MalformedHeader));
        assert_eq!(auth.authenticate_header(Some("Bearer ")), Err(AuthError::MalformedHeader));
        assert_eq!(auth.authenticate_header(Some("Bearer k9")), Err(AuthError::UnknownKey));
    }

    #[test]
    fn test_parse_bearer_keeps_key_verbatim() {
        assert_eq!(parse_bearer("Bearer  abc ").unwrap(), " abc ");
    }

    #[rstest]
    #[case::padded("Bearer  k2  ")]
    #[case::leading("Bearer  k2")]
    #[case::trailing("Bearer k2 ")]
    #[case::tab("Bearer k2\t")]
    fn test_whitespace_around_key_rejected(#[case] header: &str) {
        assert_eq!(rotating().authenticate_header(Some(header)), Err(AuthError::UnknownKey));
    }

    #[test]
    fn test_from_config() {
        let config = ApiKeyConfig::builder().current("k2").previous("NONE").build().unwrap();
        let auth = ApiKeyAuthenticator::from(&config);
        assert!(auth.authenticate("k2").is_ok());
        assert!(auth.authenticate("NONE").is_err());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let debug = format!("{:?}", ApiKeySet::new("super-secret", Some("old-secret")));
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("old-secret"));
    }

    #[rstest]
    #[case::default(DEFAULT_API_KEY_LENGTH)]
    #[case::short(8)]
    #[case::odd(31)]
    fn test_generate_api_key_length(#[case] length: usize) {
        let key = generate_api_key(length);
        assert_eq!(key.len(), length);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_generate_api_key_unique() {
        assert_ne!(*generate_api_key(48), *generate_api_key(48));
    }
}
