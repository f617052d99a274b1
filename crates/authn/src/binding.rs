//! Request binding.
//!
//! A token may carry `method`, `url` and `body_sha256` claims that tie it to
//! one specific request. When binding enforcement is on, the verifier checks
//! every bound claim against the [`VerificationContext`] the caller presents.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{error::VerificationError, jwt::Claims};

/// A bindable request attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingField {
    /// HTTP method.
    Method,
    /// Request URL.
    Url,
    /// Hex SHA-256 of the request body.
    BodySha256,
}

impl BindingField {
    /// Claim name of the field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::Url => "url",
            Self::BodySha256 => "body_sha256",
        }
    }
}

impl fmt::Display for BindingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request a token is presented with.
///
/// `body_sha256` takes precedence over `body` when both are supplied. The raw
/// body is also accepted as `body_raw` in JSON; unknown fields are rejected so
/// a misspelled field cannot silently drop a binding value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct VerificationContext {
    /// HTTP method of the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub method: Option<String>,
    /// URL of the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub url: Option<String>,
    /// Hex SHA-256 of the request body, if the caller already computed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub body_sha256: Option<String>,
    /// Raw request body, hashed here when `body_sha256` is absent.
    #[serde(default, alias = "body_raw", skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub body: Option<String>,
}

impl VerificationContext {
    /// Body digest: the supplied one, else the hash of the raw body.
    #[must_use]
    pub fn body_digest(&self) -> Option<String> {
        self.body_sha256
            .clone()
            .or_else(|| self.body.as_deref().map(|body| sha256_hex(body.as_bytes())))
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Checks every binding claim present in `claims` against `context`.
///
/// Methods compare ASCII case-insensitively and URLs exactly. A digest the
/// caller supplies is compared verbatim; one computed here from the raw body
/// is lowercase hex and matches the claim regardless of its hex case.
/// Unbound fields are not inspected.
///
/// # Errors
///
/// Returns [`VerificationError::MissingBinding`] if a bound field has no
/// context value and [`VerificationError::BindingMismatch`] if it differs.
pub fn check_bindings(
    claims: &Claims,
    context: Option<&VerificationContext>,
) -> Result<(), VerificationError> {
    if !claims.has_binding() {
        return Ok(());
    }

    let empty = VerificationContext::default();
    let context = context.unwrap_or(&empty);

    if let Some(expected) = claims.method.as_deref() {
        let actual = context
            .method
            .as_deref()
            .ok_or(VerificationError::MissingBinding(BindingField::Method))?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(VerificationError::BindingMismatch(BindingField::Method));
        }
    }

    if let Some(expected) = claims.url.as_deref() {
        let actual =
            context.url.as_deref().ok_or(VerificationError::MissingBinding(BindingField::Url))?;
        if actual != expected {
            return Err(VerificationError::BindingMismatch(BindingField::Url));
        }
    }

    if let Some(expected) = claims.body_sha256.as_deref() {
        let matches = match (context.body_sha256.as_deref(), context.body.as_deref()) {
            (Some(supplied), _) => supplied == expected,
            (None, Some(body)) => sha256_hex(body.as_bytes()).eq_ignore_ascii_case(expected),
            (None, None) => {
                return Err(VerificationError::MissingBinding(BindingField::BodySha256));
            },
        };
        if !matches {
            return Err(VerificationError::BindingMismatch(BindingField::BodySha256));
        }
    }

    Ok(())
}
