//! JWT claims and verification.
//!
//! [`TokenVerifier`] runs the verification pipeline. Each stage
//! short-circuits on the first failure:
//!
//! ```text
//! token ─┬─ 1. signature & claims  (alg pinned to the key, kid, exp/nbf, iss/aud)
//!        ├─ 2. request binding     (method / url / body_sha256; when enforced)
//!        └─ 3. replay detection    (jti consumed at most once; when the cache is on)
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use jwt_service_authn::{
//!     issuer::{ClaimsInput, TokenIssuer},
//!     jwt::TokenVerifier,
//!     keys::SigningIdentity,
//! };
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = Arc::new(SigningIdentity::generate("doc-key")?);
//! let issuer = TokenIssuer::builder().identity(Arc::clone(&identity)).build();
//! let verifier = TokenVerifier::builder().identity(identity).build();
//!
//! let now = 1_700_000_000;
//! let signed = issuer.issue(ClaimsInput::builder().sub("svc-a").build(), now)?;
//! let claims = verifier.verify(&signed.token, None, now)?;
//! assert_eq!(claims.sub, "svc-a");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use std::{sync::Arc, time::Duration};

use jsonwebtoken::{Header, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    binding::{VerificationContext, check_bindings},
    config::ServiceConfig,
    error::{ClaimsFailure, VerificationError},
    keys::SigningIdentity,
    replay::{DEFAULT_REPLAY_TTL, ReplayStore},
    validation::{validate_algorithm, validate_key_algorithm, validate_kid},
};

/// Claims that are always derived server-side and never taken from caller
/// extension claims.
pub const RESERVED_CLAIMS: &[&str] = &["iat", "exp", "nbf", "jti"];

/// The `aud` claim: a single audience or a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single audience.
    Single(String),
    /// Several audiences.
    Multiple(Vec<String>),
}

impl Audience {
    /// Returns whether `audience` is among the values.
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::Single(value) => value == audience,
            Self::Multiple(values) => values.iter().any(|value| value == audience),
        }
    }
}

impl From<String> for Audience {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<&str> for Audience {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

/// Signed claim set.
///
/// Issued tokens carry, for example:
///
/// ```json
/// {
///   "sub": "billing-worker",
///   "iat": 1700000000,
///   "exp": 1700003600,
///   "jti": "6f1c0a52-3f7e-4f43-9d7b-0f8b8c6f2c11",
///   "iss": "https://auth.internal",
///   "aud": "ledger",
///   "method": "POST",
///   "url": "https://ledger.internal/v1/entries",
///   "body_sha256": "9f86d08188…",
///   "entitlement_id": "ent-42"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject.
    pub sub: String,
    /// Issued at (seconds since epoch).
    pub iat: u64,
    /// Expiration time (seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Not before (seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    /// Unique token id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    /// Bound HTTP method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Bound request URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Bound request body digest (hex SHA-256).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_sha256: Option<String>,
    /// Caller-supplied extension claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Returns whether the token carries any request-binding claim.
    #[must_use]
    pub fn has_binding(&self) -> bool {
        self.method.is_some() || self.url.is_some() || self.body_sha256.is_some()
    }
}

/// Decode the JWT header without verification.
///
/// # Errors
///
/// Returns [`ClaimsFailure::Malformed`] if the header cannot be decoded.
pub fn decode_jwt_header(token: &str) -> Result<Header, ClaimsFailure> {
    decode_header(token)
        .map_err(|e| ClaimsFailure::Malformed(format!("Failed to decode JWT header: {e}")))
}

/// Validate time bounds, issuer and audience of verified claims.
///
/// `leeway` widens both time bounds. When an expected issuer or audience is
/// given, a token that omits the claim is rejected just like one that carries
/// a different value.
///
/// # Errors
///
/// Returns the first failing [`ClaimsFailure`].
pub fn validate_claims(
    claims: &Claims,
    now: u64,
    leeway: u64,
    expected_issuer: Option<&str>,
    expected_audience: Option<&str>,
) -> Result<(), ClaimsFailure> {
    if let Some(exp) = claims.exp
        && exp.saturating_add(leeway) <= now
    {
        return Err(ClaimsFailure::Expired);
    }

    if let Some(nbf) = claims.nbf
        && nbf > now.saturating_add(leeway)
    {
        return Err(ClaimsFailure::NotYetValid);
    }

    if let Some(expected) = expected_issuer {
        match claims.iss.as_deref() {
            Some(iss) if iss == expected => {},
            Some(iss) => {
                return Err(ClaimsFailure::Issuer(format!("expected '{expected}', got '{iss}'")));
            },
            None => return Err(ClaimsFailure::Issuer("iss claim missing".into())),
        }
    }

    if let Some(expected) = expected_audience {
        match &claims.aud {
            Some(aud) if aud.contains(expected) => {},
            Some(_) => {
                return Err(ClaimsFailure::Audience(format!("'{expected}' not in aud claim")));
            },
            None => return Err(ClaimsFailure::Audience("aud claim missing".into())),
        }
    }

    Ok(())
}

/// Multi-stage token verifier.
///
/// Holds no mutable state of its own; the replay store is the only shared
/// mutable resource and does its own locking.
pub struct TokenVerifier {
    identity: Arc<SigningIdentity>,
    issuer: Option<String>,
    audience: Option<String>,
    enforce_binding: bool,
    replay: Option<Arc<dyn ReplayStore>>,
    replay_ttl: Duration,
    require_jti: bool,
    leeway: Duration,
    validation: Validation,
}

#[bon::bon]
impl TokenVerifier {
    /// Creates a verifier.
    ///
    /// # Arguments
    ///
    /// * `identity` - Key material; only the public half is used.
    ///
    /// # Optional Fields
    ///
    /// * `issuer` / `audience` - Expected `iss` / `aud`. Unchecked when absent.
    /// * `enforce_binding` - Run the request-binding stage (default: false).
    /// * `replay` - Replay store; the replay stage is skipped without one.
    /// * `replay_ttl` - Upper bound on how long a `jti` is remembered.
    /// * `require_jti` - Reject tokens without `jti` in the replay stage. Forced on when
    ///   `enforce_binding` is set.
    /// * `leeway` - Clock skew tolerance for `exp`/`nbf` (default: none).
    #[builder]
    pub fn new(
        identity: Arc<SigningIdentity>,
        #[builder(into)] issuer: Option<String>,
        #[builder(into)] audience: Option<String>,
        #[builder(default)] enforce_binding: bool,
        replay: Option<Arc<dyn ReplayStore>>,
        #[builder(default = DEFAULT_REPLAY_TTL)] replay_ttl: Duration,
        #[builder(default)] require_jti: bool,
        #[builder(default)] leeway: Duration,
    ) -> Self {
        // Signature only: time bounds and iss/aud are checked against the
        // caller's `now` in `validate_claims`.
        let algorithm = identity.algorithm();
        let mut validation = Validation::new(algorithm);
        validation.algorithms = vec![algorithm];
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            identity,
            issuer,
            audience,
            enforce_binding,
            replay,
            replay_ttl,
            require_jti: require_jti || enforce_binding,
            leeway,
            validation,
        }
    }

    /// Creates a verifier from the service configuration.
    #[must_use]
    pub fn from_config(
        identity: Arc<SigningIdentity>,
        config: &ServiceConfig,
        replay: Option<Arc<dyn ReplayStore>>,
    ) -> Self {
        Self::builder()
            .identity(identity)
            .maybe_issuer(config.issuer())
            .maybe_audience(config.audience())
            .enforce_binding(config.enforce_binding())
            .maybe_replay(replay)
            .replay_ttl(config.replay().ttl)
            .require_jti(config.replay().require_jti)
            .leeway(config.leeway())
            .build()
    }

    /// Returns whether tokens without a `jti` are rejected by the replay stage.
    #[must_use]
    pub fn requires_jti(&self) -> bool {
        self.require_jti
    }

    /// Returns whether the replay stage runs.
    #[must_use]
    pub fn replay_enabled(&self) -> bool {
        self.replay.is_some()
    }

    /// Verify a token.
    ///
    /// # Arguments
    ///
    /// * `token` - The compact JWT
    /// * `context` - The request the token is presented with, for binding checks
    /// * `now` - Current time in seconds since epoch
    ///
    /// # Errors
    ///
    /// Returns the [`VerificationError`] of the first failing stage. A token
    /// rejected in stage 1 never reaches the binding or replay stages, so an
    /// expired token does not consume its `jti`.
    #[tracing::instrument(skip(self, token, context))]
    pub fn verify(
        &self,
        token: &str,
        context: Option<&VerificationContext>,
        now: u64,
    ) -> Result<Claims, VerificationError> {
        let claims = self.verify_signature_and_claims(token, now).inspect_err(|kind| {
            tracing::debug!(reason = %kind, "token rejected at signature/claims stage");
        })?;

        if self.enforce_binding {
            check_bindings(&claims, context).inspect_err(|e| {
                tracing::debug!(reason = %e, "token rejected at binding stage");
            })?;
        }

        if let Some(replay) = &self.replay {
            self.check_replay(replay.as_ref(), &claims, now)?;
        }

        tracing::debug!(sub = %claims.sub, jti = ?claims.jti, "token verified");
        Ok(claims)
    }

    /// Run stage 1 only: algorithm, kid, signature, time bounds, iss/aud.
    ///
    /// # Errors
    ///
    /// Returns the first failing [`ClaimsFailure`].
    pub fn verify_signature_and_claims(
        &self,
        token: &str,
        now: u64,
    ) -> Result<Claims, ClaimsFailure> {
        let header = decode_jwt_header(token)?;

        let alg_str = format!("{:?}", header.alg);
        validate_algorithm(&alg_str)?;
        validate_key_algorithm(header.alg, self.identity.algorithm())?;

        if let Some(kid) = header.kid.as_deref() {
            validate_kid(kid)?;
            if kid != self.identity.key_id() {
                return Err(ClaimsFailure::UnknownKey(kid.to_owned()));
            }
        }

        let token_data = decode::<Claims>(token, self.identity.decoding_key(), &self.validation)?;
        let claims = token_data.claims;

        validate_claims(
            &claims,
            now,
            self.leeway.as_secs(),
            self.issuer.as_deref(),
            self.audience.as_deref(),
        )?;

        Ok(claims)
    }

    fn check_replay(
        &self,
        replay: &dyn ReplayStore,
        claims: &Claims,
        now: u64,
    ) -> Result<(), VerificationError> {
        let Some(jti) = claims.jti.as_deref().filter(|jti| !jti.is_empty()) else {
            if self.require_jti {
                tracing::debug!("token rejected: jti required");
                return Err(VerificationError::MissingJti);
            }
            return Ok(());
        };

        // Remember the jti until the token stops verifying, capped at the TTL.
        let ttl_deadline = now.saturating_add(self.replay_ttl.as_secs());
        let expires_at = claims.exp.map_or(ttl_deadline, |exp| {
            exp.saturating_add(self.leeway.as_secs()).min(ttl_deadline)
        });

        replay.check_and_mark(jti, expires_at, now).inspect_err(|_| {
            tracing::warn!(jti, sub = %claims.sub, "replay detected");
        })
    }
}
