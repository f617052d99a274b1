//! Token issuance.
//!
//! [`TokenIssuer`] turns caller-supplied [`ClaimsInput`] into a signed
//! [`Claims`] set. Time claims and the token id are always derived here;
//! any `iat`, `exp`, `nbf` or `jti` smuggled in through extension claims is
//! dropped.

use std::{sync::Arc, time::Duration};

use fail::fail_point;
use jsonwebtoken::Header;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    config::{DEFAULT_EXPIRATION, ServiceConfig},
    error::{ConfigError, IssueError, SigningError, ValidationError},
    jwt::{Audience, Claims, RESERVED_CLAIMS},
    keys::SigningIdentity,
};

/// Claim names with a typed field in [`Claims`]; never taken from the
/// extension map.
const TYPED_CLAIMS: &[&str] = &["sub", "iss", "aud", "method", "url", "body_sha256"];

/// Parses a relative duration.
///
/// A string of ASCII digits is a number of seconds. Anything else is parsed
/// as a human-readable duration (`"30m"`, `"1h"`, `"2days"`).
#[must_use]
pub fn parse_relative_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse().ok().map(Duration::from_secs);
    }
    humantime::parse_duration(value).ok()
}

/// A time claim as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TimeInput {
    /// Absolute time in seconds since the Unix epoch.
    Timestamp(u64),
    /// Duration relative to issuance, e.g. `"1h"`.
    Relative(String),
}

impl TimeInput {
    /// Resolves to an absolute timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTime`] naming `claim` if a relative
    /// value cannot be parsed.
    pub fn resolve(&self, now: u64, claim: &'static str) -> Result<u64, ValidationError> {
        match self {
            Self::Timestamp(ts) => Ok(*ts),
            Self::Relative(value) => parse_relative_duration(value)
                .map(|offset| now.saturating_add(offset.as_secs()))
                .ok_or_else(|| ValidationError::invalid_time(claim, value.as_str())),
        }
    }
}

impl From<u64> for TimeInput {
    fn from(ts: u64) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<&str> for TimeInput {
    fn from(value: &str) -> Self {
        Self::Relative(value.to_owned())
    }
}

impl From<String> for TimeInput {
    fn from(value: String) -> Self {
        Self::Relative(value)
    }
}

/// Claims requested by the caller of the issue operation.
///
/// Deserializes from the issue request body. Unknown fields become
/// extension claims.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, bon::Builder)]
pub struct ClaimsInput {
    /// Subject; required and non-empty.
    #[serde(default)]
    #[builder(into)]
    pub sub: Option<String>,
    /// Expiration; absolute or relative.
    #[serde(default)]
    #[builder(into)]
    pub exp: Option<TimeInput>,
    /// Not before; absolute or relative.
    #[serde(default)]
    #[builder(into)]
    pub nbf: Option<TimeInput>,
    /// Token id; generated when absent.
    #[serde(default)]
    #[builder(into)]
    pub jti: Option<String>,
    /// Issuer; falls back to the configured issuer.
    #[serde(default)]
    #[builder(into)]
    pub iss: Option<String>,
    /// Audience; falls back to the configured audience.
    #[serde(default)]
    #[builder(into)]
    pub aud: Option<Audience>,
    /// HTTP method to bind the token to.
    #[serde(default)]
    #[builder(into)]
    pub method: Option<String>,
    /// URL to bind the token to.
    #[serde(default)]
    #[builder(into)]
    pub url: Option<String>,
    /// Body digest to bind the token to.
    #[serde(default)]
    #[builder(into)]
    pub body_sha256: Option<String>,
    /// Extension claims.
    #[serde(flatten)]
    #[builder(default)]
    pub extra: Map<String, Value>,
}

/// A signed token together with the claims it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedToken {
    /// Compact JWT.
    pub token: String,
    /// The signed claims.
    pub claims: Claims,
}

/// Issues signed tokens.
pub struct TokenIssuer {
    identity: Arc<SigningIdentity>,
    default_expiration: Duration,
    issuer: Option<String>,
    audience: Option<String>,
}

#[bon::bon]
impl TokenIssuer {
    /// Creates an issuer.
    ///
    /// # Arguments
    ///
    /// * `identity` - Signing key; issuance fails with [`SigningError::Disabled`] if it holds
    ///   no private key.
    ///
    /// # Optional Fields
    ///
    /// * `default_expiration` - Lifetime when the caller gives no `exp` (default: 1 hour).
    /// * `issuer` - Default `iss`.
    /// * `audience` - Default `aud`.
    #[builder]
    pub fn new(
        identity: Arc<SigningIdentity>,
        default_expiration: Option<Duration>,
        #[builder(into)] issuer: Option<String>,
        #[builder(into)] audience: Option<String>,
    ) -> Self {
        let default_expiration = default_expiration
            .or_else(|| parse_relative_duration(DEFAULT_EXPIRATION))
            .unwrap_or(Duration::from_secs(3600));
        Self { identity, default_expiration, issuer, audience }
    }

    /// Creates an issuer from the service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDefaultExpiration`] if the configured
    /// default expiration cannot be parsed.
    pub fn from_config(
        identity: Arc<SigningIdentity>,
        config: &ServiceConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::builder()
            .identity(identity)
            .default_expiration(config.default_expiration()?)
            .maybe_issuer(config.issuer())
            .maybe_audience(config.audience())
            .build())
    }

    /// Returns the lifetime applied when the caller gives no `exp`.
    #[must_use]
    pub fn default_expiration(&self) -> Duration {
        self.default_expiration
    }

    /// Builds the claim set for `input` without signing it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if `sub` is missing or a time claim cannot
    /// be resolved.
    pub fn build_claims(&self, input: ClaimsInput, now: u64) -> Result<Claims, ValidationError> {
        let ClaimsInput { sub, exp, nbf, jti, iss, aud, method, url, body_sha256, mut extra } =
            input;

        let sub = sub
            .filter(|sub| !sub.trim().is_empty())
            .ok_or_else(ValidationError::missing_subject)?;

        for name in RESERVED_CLAIMS {
            if extra.remove(*name).is_some() {
                tracing::debug!(claim = *name, "dropped reserved claim from extension claims");
            }
        }
        for name in TYPED_CLAIMS {
            extra.remove(*name);
        }

        let exp = match exp {
            Some(exp) => exp.resolve(now, "exp")?,
            None => now.saturating_add(self.default_expiration.as_secs()),
        };
        let nbf = nbf.map(|nbf| nbf.resolve(now, "nbf")).transpose()?;

        let jti = jti
            .filter(|jti| !jti.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Claims {
            sub,
            iat: now,
            exp: Some(exp),
            nbf,
            jti: Some(jti),
            iss: iss.or_else(|| self.issuer.clone()),
            aud: aud.or_else(|| self.audience.clone().map(Audience::Single)),
            method,
            url,
            body_sha256,
            extra,
        })
    }

    /// Issues a signed token.
    ///
    /// Never touches the replay cache: a `jti` is only consumed when the
    /// token is verified.
    ///
    /// # Errors
    ///
    /// Returns [`IssueError::Signing`] with [`SigningError::Disabled`] when no
    /// private key is loaded (checked before the input is looked at),
    /// [`IssueError::Validation`] for bad input, and [`IssueError::Signing`]
    /// if encoding fails.
    #[tracing::instrument(skip(self, input), fields(kid = %self.identity.key_id()))]
    pub fn issue(&self, input: ClaimsInput, now: u64) -> Result<SignedToken, IssueError> {
        let encoding_key = self.identity.encoding_key()?;
        let claims = self.build_claims(input, now)?;

        fail_point!("issuer-before-sign", |_| {
            Err(SigningError::internal("injected failure before signing").into())
        });

        let mut header = Header::new(self.identity.algorithm());
        header.kid = Some(self.identity.key_id().to_owned());

        let token = jsonwebtoken::encode(&header, &claims, encoding_key)
            .map_err(SigningError::from)?;

        tracing::info!(sub = %claims.sub, jti = ?claims.jti, exp = ?claims.exp, "token issued");
        Ok(SignedToken { token, claims })
    }
}
