//! # JWT Service Authentication
//!
//! Token lifecycle engine for service-to-service authentication: issues
//! short-lived, asymmetrically signed JWTs to API-key holders and verifies them for
//! relying services.
//!
//! This crate provides:
//! - **Issuance**: API key check, claim derivation, signing ([`issuer`])
//! - **Verification**: signature and claims, request binding, replay detection ([`jwt`])
//! - **Key material**: configured Ed25519 or RSA keys, ephemeral Ed25519 keys, JWKS publication
//! - **Service layer**: transport-agnostic operations returning status + JSON ([`service`])
//!
//! ## Features
//!
//! - Tokens are pinned to the configured key's algorithm (EdDSA or RS256); `none` and
//!   symmetric algorithms are always rejected
//! - Two API keys may be valid at once for zero-downtime rotation
//! - Single-use tokens via an atomic `jti` replay cache with background sweeping
//! - Time is always injected, so expiry and eviction are deterministic in tests
//!
//! ## Example
//!
//! ```
//! use jwt_service_authn::{
//!     TokenService,
//!     config::{ApiKeyConfig, ServiceConfig},
//! };
//! use serde_json::json;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::builder()
//!     .api_keys(ApiKeyConfig::builder().current("k2").build()?)
//!     .build()?;
//! let service = TokenService::new(config)?;
//!
//! let issued = service.issue(Some("Bearer k2"), &json!({ "sub": "billing-worker" }));
//! assert_eq!(issued.status, 200);
//!
//! let verified = service.verify(&json!({ "token": issued.body["token"] }));
//! assert_eq!(verified.body["payload"]["sub"], "billing-worker");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// API key authentication.
pub mod api_key;
/// Request binding checks.
pub mod binding;
/// Time sources.
pub mod clock;
/// Service configuration.
pub mod config;
/// Error types.
pub mod error;
/// Token issuance.
pub mod issuer;
/// JWKS publication.
pub mod jwks;
/// JWT claims and verification.
pub mod jwt;
/// Signing key material.
pub mod keys;
/// Replay detection.
pub mod replay;
/// Service layer.
pub mod service;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
/// JWT header validation.
pub mod validation;

// Re-export key types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServiceConfig;
pub use error::{AuthError, ConfigError, Result, SigningError, ValidationError, VerificationError};
pub use issuer::{ClaimsInput, SignedToken, TokenIssuer};
pub use jwt::{Claims, TokenVerifier};
pub use keys::{PublicKey, SigningIdentity};
pub use replay::{InMemoryReplayCache, ReplayStore, ReplaySweeper};
pub use service::{ServiceResponse, TokenService};
pub use validation::{
    ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm, validate_key_algorithm,
};
