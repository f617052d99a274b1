//! Service configuration.
//!
//! [`ServiceConfig`] is the single explicit configuration structure the core
//! consumes. Loading it (environment variables, files, secrets managers) is
//! the transport layer's job; the core never reads the process environment.
//!
//! Every section can be built with a validating builder or deserialized with
//! serde. Deserialized configs are validated when handed to
//! [`TokenService::new`](crate::service::TokenService::new).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use jwt_service_authn::config::{ApiKeyConfig, ReplayConfig, ServiceConfig};
//!
//! let config = ServiceConfig::builder()
//!     .api_keys(ApiKeyConfig::builder().current("k2").previous("k1").build()?)
//!     .issuer("https://auth.internal")
//!     .default_expiration("15m")
//!     .replay(ReplayConfig::builder().enabled(true).ttl(Duration::from_secs(300)).build())
//!     .build()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{fmt, time::Duration};

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::{
    error::ConfigError,
    issuer::parse_relative_duration,
    replay::{DEFAULT_REPLAY_TTL, MIN_REPLAY_TTL, sweep_interval},
    validation::validate_kid,
};

/// Value of `previous` that means "no previous key".
pub const NONE_SENTINEL: &str = "NONE";

/// Default key id placed in token headers and the JWKS document.
pub const DEFAULT_KEY_ID: &str = "default";

/// Default token lifetime applied when the caller supplies no `exp`.
pub const DEFAULT_EXPIRATION: &str = "1h";

fn default_key_id() -> String {
    DEFAULT_KEY_ID.to_owned()
}

fn default_expiration_value() -> String {
    DEFAULT_EXPIRATION.to_owned()
}

fn default_replay_ttl() -> Duration {
    DEFAULT_REPLAY_TTL
}

/// Accepted API keys for the issue endpoint.
///
/// During a rotation both `current` and `previous` are accepted. A `previous`
/// that is empty or equal to [`NONE_SENTINEL`] counts as absent.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyConfig {
    pub(crate) current: Zeroizing<String>,
    #[serde(default)]
    pub(crate) previous: Option<Zeroizing<String>>,
}

#[bon::bon]
impl ApiKeyConfig {
    /// Creates a new API key configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyApiKey`] if `current` is empty.
    #[builder]
    pub fn new(
        #[builder(into)] current: String,
        #[builder(into)] previous: Option<String>,
    ) -> Result<Self, ConfigError> {
        let config =
            Self { current: Zeroizing::new(current), previous: previous.map(Zeroizing::new) };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the current key is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyApiKey`] if `current` is empty or blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.current.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(())
    }

    /// Returns the current API key.
    #[must_use]
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Returns the previous API key, treating empty and `"NONE"` as absent.
    #[must_use]
    pub fn previous(&self) -> Option<&str> {
        self.previous
            .as_deref()
            .map(String::as_str)
            .filter(|key| !key.is_empty() && *key != NONE_SENTINEL)
    }
}

impl fmt::Debug for ApiKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyConfig")
            .field("current", &"[redacted]")
            .field("previous", &self.previous().map(|_| "[redacted]"))
            .finish()
    }
}

/// Signing key configuration.
///
/// Keys are Ed25519 (PKCS#8 / SPKI PEM) or RSA of at least 2048 bits
/// (PKCS#8 or PKCS#1 private PEM, SPKI or PKCS#1 public PEM); the key type
/// selects EdDSA or RS256. See [`SigningIdentity::resolve`](crate::keys::SigningIdentity::resolve)
/// for how the fields combine.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyConfig {
    #[serde(default)]
    pub(crate) private_key_pem: Option<Zeroizing<String>>,
    #[serde(default)]
    pub(crate) public_key_pem: Option<String>,
    #[serde(default = "default_key_id")]
    pub(crate) key_id: String,
    #[serde(default)]
    pub(crate) verify_only: bool,
}

#[bon::bon]
impl KeyConfig {
    /// Creates a new key configuration.
    ///
    /// # Optional Fields
    ///
    /// * `private_key_pem` - Ed25519 or RSA private key PEM. Absent outside verify-only mode means an
    ///   ephemeral key is generated at startup.
    /// * `public_key_pem` - Public key PEM of the same type. Derived from the private key when absent.
    /// * `key_id` - Key id (default: [`DEFAULT_KEY_ID`]).
    /// * `verify_only` - Hold no private key and refuse to issue (default: false).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKeyId`] if the key id is malformed.
    #[builder]
    pub fn new(
        #[builder(into)] private_key_pem: Option<String>,
        #[builder(into)] public_key_pem: Option<String>,
        #[builder(into)] key_id: Option<String>,
        #[builder(default)] verify_only: bool,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            private_key_pem: private_key_pem.map(Zeroizing::new),
            public_key_pem,
            key_id: key_id.unwrap_or_else(default_key_id),
            verify_only,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the key id format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKeyId`] if the key id is malformed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_kid(&self.key_id).map_err(|e| ConfigError::InvalidKeyId(e.to_string()))
    }

    /// Returns the key id.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns whether the service runs without a private key.
    #[must_use]
    pub fn verify_only(&self) -> bool {
        self.verify_only
    }

    /// Returns whether a private key PEM is configured.
    #[must_use]
    pub fn has_private_key(&self) -> bool {
        self.private_key_pem.is_some()
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self { private_key_pem: None, public_key_pem: None, key_id: default_key_id(), verify_only: false }
    }
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "[redacted]"))
            .field("public_key_pem", &self.public_key_pem.is_some())
            .field("key_id", &self.key_id)
            .field("verify_only", &self.verify_only)
            .finish()
    }
}

/// Replay cache configuration.
#[derive(Debug, Clone, bon::Builder, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayConfig {
    /// Track consumed `jti` values and reject second presentations.
    #[serde(default)]
    #[builder(default)]
    pub enabled: bool,

    /// Upper bound on how long a consumed `jti` is remembered.
    #[serde(with = "humantime_serde", default = "default_replay_ttl")]
    #[builder(default = DEFAULT_REPLAY_TTL)]
    pub ttl: Duration,

    /// Reject tokens without a `jti` while the cache is enabled.
    ///
    /// Forced on whenever binding enforcement is enabled.
    #[serde(default)]
    #[builder(default)]
    pub require_jti: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { enabled: false, ttl: DEFAULT_REPLAY_TTL, require_jti: false }
    }
}

impl ReplayConfig {
    /// Checks the TTL against [`MIN_REPLAY_TTL`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidReplayTtl`] if the TTL is too short.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl < MIN_REPLAY_TTL {
            return Err(ConfigError::InvalidReplayTtl { min: MIN_REPLAY_TTL, got: self.ttl });
        }
        Ok(())
    }

    /// Returns how often the background sweep runs for this TTL.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        sweep_interval(self.ttl)
    }
}

/// Complete configuration for [`TokenService`](crate::service::TokenService).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub(crate) api_keys: ApiKeyConfig,
    #[serde(default)]
    pub(crate) keys: KeyConfig,
    #[serde(default = "default_expiration_value")]
    pub(crate) default_expiration: String,
    #[serde(default)]
    pub(crate) issuer: Option<String>,
    #[serde(default)]
    pub(crate) audience: Option<String>,
    #[serde(default)]
    pub(crate) enforce_binding: bool,
    #[serde(default)]
    pub(crate) replay: ReplayConfig,
    #[serde(with = "humantime_serde", default)]
    pub(crate) leeway: Duration,
}

#[bon::bon]
impl ServiceConfig {
    /// Creates a new service configuration, validating every section.
    ///
    /// # Arguments
    ///
    /// * `api_keys` - Accepted API keys for issuance.
    ///
    /// # Optional Fields
    ///
    /// * `keys` - Signing key configuration (default: ephemeral key).
    /// * `default_expiration` - Lifetime applied when the caller gives no `exp`. Either a
    ///   number of seconds (`"3600"`) or a duration (`"1h"`). Default: [`DEFAULT_EXPIRATION`].
    /// * `issuer` - Default `iss` for issued tokens and expected `iss` on verify.
    /// * `audience` - Default `aud` for issued tokens and expected `aud` on verify.
    /// * `enforce_binding` - Check `method`/`url`/`body_sha256` claims on verify.
    /// * `replay` - Replay cache settings.
    /// * `leeway` - Clock skew tolerance for `exp`/`nbf` (default: none).
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found by [`validate`](Self::validate).
    #[builder]
    pub fn new(
        api_keys: ApiKeyConfig,
        #[builder(default)] keys: KeyConfig,
        #[builder(into)] default_expiration: Option<String>,
        #[builder(into)] issuer: Option<String>,
        #[builder(into)] audience: Option<String>,
        #[builder(default)] enforce_binding: bool,
        #[builder(default)] replay: ReplayConfig,
        #[builder(default)] leeway: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            api_keys,
            keys,
            default_expiration: default_expiration.unwrap_or_else(default_expiration_value),
            issuer,
            audience,
            enforce_binding,
            replay,
            leeway,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_keys.validate()?;
        self.keys.validate()?;
        self.default_expiration()?;
        self.replay.validate()?;
        Ok(())
    }

    /// Returns the API key configuration.
    #[must_use]
    pub fn api_keys(&self) -> &ApiKeyConfig {
        &self.api_keys
    }

    /// Returns the signing key configuration.
    #[must_use]
    pub fn keys(&self) -> &KeyConfig {
        &self.keys
    }

    /// Returns the default token lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDefaultExpiration`] if the configured value
    /// is neither a number of seconds nor a duration.
    pub fn default_expiration(&self) -> Result<Duration, ConfigError> {
        parse_relative_duration(&self.default_expiration)
            .ok_or_else(|| ConfigError::InvalidDefaultExpiration(self.default_expiration.clone()))
    }

    /// Returns the configured issuer.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// Returns the configured audience.
    #[must_use]
    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    /// Returns whether binding claims are enforced on verify.
    #[must_use]
    pub fn enforce_binding(&self) -> bool {
        self.enforce_binding
    }

    /// Returns the replay cache configuration.
    #[must_use]
    pub fn replay(&self) -> &ReplayConfig {
        &self.replay
    }

    /// Returns the clock skew tolerance.
    #[must_use]
    pub fn leeway(&self) -> Duration {
        self.leeway
    }
}
