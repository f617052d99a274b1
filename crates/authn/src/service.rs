//! Transport-agnostic service layer.
//!
//! [`TokenService`] wires configuration, keys, the API key check, the issuer,
//! the verifier and the replay cache together, and maps every per-request
//! outcome to a [`ServiceResponse`] (an HTTP-style status plus JSON body). An
//! HTTP layer only has to forward the `Authorization` header and the parsed
//! JSON body.
//!
//! | Operation | Success            | Failures                                  |
//! |-----------|--------------------|-------------------------------------------|
//! | issue     | `200 {token}`      | 400 bad input, 401 bad API key, 500 signing |
//! | verify    | `200 {valid, payload}` | 400 no token, 401 `{valid: false, error}` |
//! | jwks      | `200 {keys}`       |                                           |
//! | health    | `200 {status}`     |                                           |

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    api_key::ApiKeyAuthenticator,
    binding::VerificationContext,
    clock::{Clock, SystemClock},
    config::ServiceConfig,
    error::{ConfigError, IssueError, ValidationError},
    issuer::{ClaimsInput, TokenIssuer},
    jwks::Jwks,
    jwt::TokenVerifier,
    keys::SigningIdentity,
    replay::{InMemoryReplayCache, ReplayStore, ReplaySweeper},
};

/// Error body for rejected API keys. The specific reason is only logged.
const UNAUTHORIZED: &str = "unauthorized";

/// Error body for signing failures. The specific reason is only logged.
const SIGNING_FAILED: &str = "token signing failed";

/// Status code and JSON body of a service operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResponse {
    /// HTTP-equivalent status code.
    pub status: u16,
    /// JSON body.
    pub body: Value,
}

impl ServiceResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self { status, body: json!({ "error": message.into() }) }
    }

    fn invalid(status: u16, message: impl Into<String>) -> Self {
        Self { status, body: json!({ "valid": false, "error": message.into() }) }
    }

    /// Returns whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The token service.
///
/// Cheap to share behind an `Arc`; every operation takes `&self`.
pub struct TokenService {
    identity: Arc<SigningIdentity>,
    authenticator: ApiKeyAuthenticator,
    issuer: TokenIssuer,
    verifier: TokenVerifier,
    replay: Option<Arc<dyn ReplayStore>>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl TokenService {
    /// Creates a service using wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the key
    /// material cannot be loaded.
    pub fn new(config: ServiceConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a service with an injected clock.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_clock(config: ServiceConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        Self::with_replay_store(config, clock, None)
    }

    /// Creates a service with an injected clock and replay store.
    ///
    /// `replay_store` replaces the default in-memory cache, e.g. with one
    /// shared between instances. It is only used when replay detection is
    /// enabled in `config`.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_replay_store(
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
        replay_store: Option<Arc<dyn ReplayStore>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let identity = Arc::new(SigningIdentity::resolve(config.keys())?);
        let authenticator = ApiKeyAuthenticator::from(config.api_keys());
        let issuer = TokenIssuer::from_config(Arc::clone(&identity), &config)?;

        let replay = config.replay().enabled.then(|| {
            replay_store
                .unwrap_or_else(|| Arc::new(InMemoryReplayCache::new()) as Arc<dyn ReplayStore>)
        });
        let verifier = TokenVerifier::from_config(Arc::clone(&identity), &config, replay.clone());

        tracing::info!(
            key_id = identity.key_id(),
            can_sign = identity.can_sign(),
            enforce_binding = config.enforce_binding(),
            replay_enabled = replay.is_some(),
            require_jti = verifier.requires_jti(),
            "token service initialized"
        );

        Ok(Self { identity, authenticator, issuer, verifier, replay, clock, config })
    }

    /// Returns the signing identity.
    #[must_use]
    pub fn identity(&self) -> &Arc<SigningIdentity> {
        &self.identity
    }

    /// Returns the replay store, if replay detection is enabled.
    #[must_use]
    pub fn replay_store(&self) -> Option<&Arc<dyn ReplayStore>> {
        self.replay.as_ref()
    }

    /// Returns the configuration the service was built from.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Issue operation.
    ///
    /// `authorization` is the raw `Authorization` header; `body` is the
    /// claims input.
    #[tracing::instrument(skip_all)]
    pub fn issue(&self, authorization: Option<&str>, body: &Value) -> ServiceResponse {
        if let Err(err) = self.authenticator.authenticate_header(authorization) {
            tracing::info!(reason = %err, "issue rejected: API key authentication failed");
            return ServiceResponse::error(401, UNAUTHORIZED);
        }

        let input = match parse_claims_input(body) {
            Ok(input) => input,
            Err(err) => return ServiceResponse::error(400, err.to_string()),
        };

        match self.issuer.issue(input, self.clock.now()) {
            Ok(signed) => ServiceResponse::ok(json!({ "token": signed.token })),
            Err(IssueError::Validation(err)) => {
                tracing::debug!(reason = %err, "issue rejected: invalid input");
                ServiceResponse::error(400, err.to_string())
            },
            Err(IssueError::Signing(err)) => {
                tracing::error!(error = %err, "token signing failed");
                ServiceResponse::error(500, SIGNING_FAILED)
            },
        }
    }

    /// Verify operation.
    ///
    /// `body` is `{ "token": "...", "context": { ... } }` with an optional
    /// context.
    #[tracing::instrument(skip_all)]
    pub fn verify(&self, body: &Value) -> ServiceResponse {
        let Some(token) = body.get("token").and_then(Value::as_str) else {
            return ServiceResponse::invalid(400, "token is required");
        };

        let context = match body.get("context").filter(|context| !context.is_null()) {
            Some(context) => match serde_json::from_value::<VerificationContext>(context.clone()) {
                Ok(context) => Some(context),
                Err(err) => {
                    return ServiceResponse::invalid(400, format!("invalid context: {err}"));
                },
            },
            None => None,
        };

        match self.verifier.verify(token, context.as_ref(), self.clock.now()) {
            Ok(claims) => match serde_json::to_value(&claims) {
                Ok(payload) => ServiceResponse::ok(json!({ "valid": true, "payload": payload })),
                Err(err) => {
                    tracing::error!(error = %err, "failed to serialize verified claims");
                    ServiceResponse::invalid(500, "internal error")
                },
            },
            Err(err) => {
                tracing::info!(reason = %err, kind = ?err.claims_failure(), "token rejected");
                ServiceResponse::invalid(401, err.to_string())
            },
        }
    }

    /// The published key set.
    #[must_use]
    pub fn key_set(&self) -> Jwks {
        Jwks::from_identity(&self.identity)
    }

    /// JWKS operation.
    #[must_use]
    pub fn jwks(&self) -> ServiceResponse {
        match serde_json::to_value(self.key_set()) {
            Ok(body) => ServiceResponse::ok(body),
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize JWKS");
                ServiceResponse::error(500, "internal error")
            },
        }
    }

    /// Health operation.
    #[must_use]
    pub fn health(&self) -> ServiceResponse {
        ServiceResponse::ok(json!({ "status": "ok" }))
    }

    /// Starts the background sweeper for the replay cache.
    ///
    /// Returns `None` when replay detection is disabled. The sweep interval
    /// is derived from the configured TTL.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn spawn_replay_sweeper(&self) -> Option<ReplaySweeper> {
        let store = self.replay.as_ref()?;
        Some(ReplaySweeper::spawn(
            Arc::clone(store),
            Arc::clone(&self.clock),
            self.config.replay().sweep_interval(),
        ))
    }
}

fn parse_claims_input(body: &Value) -> Result<ClaimsInput, ValidationError> {
    if !body.is_object() {
        return Err(ValidationError::invalid_body("expected a JSON object"));
    }
    serde_json::from_value(body.clone()).map_err(|e| ValidationError::invalid_body(e.to_string()))
}
