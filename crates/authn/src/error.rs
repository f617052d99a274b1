//! Error types for the token lifecycle engine.
//!
//! Errors are split by the stage that produces them:
//!
//! - [`ConfigError`] - bad or missing key material and settings; fatal at startup
//! - [`AuthError`] - the API key presented to the issue endpoint was rejected
//! - [`ValidationError`] - the issuance input is malformed
//! - [`SigningError`] - issuance is disabled or the signing key is unusable
//! - [`VerificationError`] - a presented token failed one of the verification stages
//!
//! Every `Display` string here is safe to return to a caller. None of them
//! include key material or cache contents.

use std::time::Duration;

use thiserror::Error;

use crate::binding::BindingField;

/// Configuration errors detected while building the service.
///
/// These are never produced per request. A service that fails with a
/// `ConfigError` must not start serving traffic.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`; new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configured private key could not be parsed.
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// The configured public key could not be parsed.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The configured public key is not the public half of the private key.
    #[error("Configured public key does not match the private key")]
    KeyMismatch,

    /// Verify-only mode was requested without any key to verify against.
    #[error("Verify-only mode requires a public key")]
    MissingPublicKey,

    /// The configured key id is empty or contains unsupported characters.
    #[error("Invalid key id: {0}")]
    InvalidKeyId(String),

    /// The current API key is empty.
    #[error("Current API key must not be empty")]
    EmptyApiKey,

    /// The default expiration is neither a number of seconds nor a duration.
    #[error("Invalid default expiration: '{0}'")]
    InvalidDefaultExpiration(String),

    /// The replay cache TTL is below the supported minimum.
    #[error("Replay TTL must be at least {min:?}, got {got:?}")]
    InvalidReplayTtl {
        /// Smallest accepted TTL.
        min: Duration,
        /// TTL that was configured.
        got: Duration,
    },

    /// Key pair generation or export failed.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),
}

/// API key authentication failures.
///
/// All variants map to the same external status (401). They stay separate so
/// logs and tests can tell a missing header apart from a wrong key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// No `Authorization` header was presented.
    #[error("Missing Authorization header")]
    MissingCredentials,

    /// The header is not of the form `Bearer <key>`.
    #[error("Malformed Authorization header")]
    MalformedHeader,

    /// The key is neither the current nor the previous API key.
    #[error("API key not recognized")]
    UnknownKey,
}

/// Malformed issuance input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// `sub` is missing or empty.
    #[error("sub is required")]
    MissingSubject,

    /// A time claim could not be resolved to an epoch timestamp.
    #[error("Invalid {claim} value: '{value}'")]
    InvalidTime {
        /// Claim name (`exp` or `nbf`).
        claim: &'static str,
        /// Value that failed to parse.
        value: String,
    },

    /// The request body is not a valid claims object.
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

impl ValidationError {
    /// Creates a `MissingSubject` error.
    #[must_use]
    pub fn missing_subject() -> Self {
        Self::MissingSubject
    }

    /// Creates an `InvalidTime` error for the given claim.
    #[must_use]
    pub fn invalid_time(claim: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidTime { claim, value: value.into() }
    }

    /// Creates an `InvalidBody` error.
    #[must_use]
    pub fn invalid_body(message: impl Into<String>) -> Self {
        Self::InvalidBody(message.into())
    }
}

/// Token signing failures.
///
/// The full error is logged server-side; callers only ever see a generic
/// message.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SigningError {
    /// The service holds no private key (verify-only mode).
    #[error("Token issuance is disabled: no private key is loaded")]
    Disabled,

    /// The JWT library rejected the key or claims.
    #[error("Failed to sign token: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    /// Any other internal failure while signing.
    #[error("Internal signing error: {0}")]
    Internal(String),
}

impl SigningError {
    /// Creates an `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Failure of [`TokenIssuer::issue`](crate::issuer::TokenIssuer::issue).
#[derive(Debug, Error)]
pub enum IssueError {
    /// The input was rejected (HTTP 400).
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Signing failed or is disabled (HTTP 500).
    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// Reason a token failed the signature and claims stage.
///
/// Every kind is reported to callers as `"signature/claims invalid"`; the
/// kind itself is kept for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ClaimsFailure {
    /// The token could not be decoded.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// The header algorithm is forbidden or not accepted.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The header `kid` does not name the configured key.
    #[error("Unknown key id: {0}")]
    UnknownKey(String),

    /// The signature does not verify.
    #[error("Invalid signature")]
    Signature,

    /// `exp` is in the past.
    #[error("Token expired")]
    Expired,

    /// `nbf` is in the future.
    #[error("Token not yet valid")]
    NotYetValid,

    /// `iss` is absent or differs from the expected issuer.
    #[error("Invalid issuer: {0}")]
    Issuer(String),

    /// `aud` is absent or does not contain the expected audience.
    #[error("Invalid audience: {0}")]
    Audience(String),
}

impl From<jsonwebtoken::errors::Error> for ClaimsFailure {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => ClaimsFailure::Signature,
            ErrorKind::ExpiredSignature => ClaimsFailure::Expired,
            ErrorKind::ImmatureSignature => ClaimsFailure::NotYetValid,
            ErrorKind::InvalidIssuer => ClaimsFailure::Issuer("issuer validation failed".into()),
            ErrorKind::InvalidAudience => {
                ClaimsFailure::Audience("audience validation failed".into())
            },
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                ClaimsFailure::UnsupportedAlgorithm("algorithm not accepted".into())
            },
            ErrorKind::InvalidToken => ClaimsFailure::Malformed("invalid JWT structure".into()),
            _ => ClaimsFailure::Malformed(format!("JWT error: {err}")),
        }
    }
}

/// Token verification failures, one per verification stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum VerificationError {
    /// Stage 1: signature, algorithm, time bounds, issuer or audience.
    #[error("signature/claims invalid")]
    Claims(ClaimsFailure),

    /// Stage 2: the token binds a field the caller did not supply.
    #[error("{0} missing from verification context")]
    MissingBinding(BindingField),

    /// Stage 2: the caller's request does not match a bound field.
    #[error("{0} mismatch")]
    BindingMismatch(BindingField),

    /// Stage 3: a `jti` is required but the token has none.
    #[error("jti required")]
    MissingJti,

    /// Stage 3: the token's `jti` was already consumed.
    #[error("replay detected")]
    Replay,
}

impl VerificationError {
    /// Returns the stage-1 failure kind, if this is a claims failure.
    #[must_use]
    pub fn claims_failure(&self) -> Option<&ClaimsFailure> {
        match self {
            Self::Claims(kind) => Some(kind),
            _ => None,
        }
    }
}

impl From<ClaimsFailure> for VerificationError {
    fn from(kind: ClaimsFailure) -> Self {
        Self::Claims(kind)
    }
}

/// Result type alias for verification.
pub type Result<T> = std::result::Result<T, VerificationError>;
