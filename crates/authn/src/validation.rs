//! JWT header validation.
//!
//! This module provides security checks for the token header, ensuring only
//! approved asymmetric algorithms are accepted and that key ids are
//! well-formed before anything else looks at them.
//!
//! # Security
//!
//! - Strict algorithm checks to prevent algorithm substitution attacks
//! - Only EdDSA (Ed25519 keys) and RS256 (RSA keys) are accepted
//! - The verifier further pins tokens to the algorithm of its configured key
//! - Symmetric algorithms and "none" are always rejected

use jsonwebtoken::Algorithm;

use crate::error::ClaimsFailure;

/// Forbidden JWT algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: symmetric; a verifier holding only the public
///   key could be tricked into using it as an HMAC secret
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted JWT algorithms.
///
/// One per supported key type. A given verifier accepts only the one matching
/// its key; see [`validate_key_algorithm`].
pub const ACCEPTED_ALGORITHMS: &[&str] = &["EdDSA", "RS256"];

/// Maximum length of a key id.
pub const MAX_KID_LENGTH: usize = 128;

/// Validate a JWT algorithm name against the security policy.
///
/// # Errors
///
/// Returns [`ClaimsFailure::UnsupportedAlgorithm`] if the algorithm is
/// forbidden or not in [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use jwt_service_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("EdDSA").is_ok());
/// assert!(validate_algorithm("RS256").is_ok());
/// assert!(validate_algorithm("ES256").is_err());
/// assert!(validate_algorithm("HS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), ClaimsFailure> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(ClaimsFailure::UnsupportedAlgorithm(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(ClaimsFailure::UnsupportedAlgorithm(format!(
            "Algorithm '{alg}' is not in accepted list (EdDSA, RS256)"
        )));
    }

    Ok(())
}

/// Check that a token's algorithm is the one the configured key signs with.
///
/// Stops an RS256 token from being checked against an Ed25519 key and the
/// reverse.
///
/// # Errors
///
/// Returns [`ClaimsFailure::UnsupportedAlgorithm`] on a mismatch.
pub fn validate_key_algorithm(
    alg: Algorithm,
    key_algorithm: Algorithm,
) -> Result<(), ClaimsFailure> {
    if alg != key_algorithm {
        return Err(ClaimsFailure::UnsupportedAlgorithm(format!(
            "Algorithm '{alg:?}' does not match the configured key ({key_algorithm:?})"
        )));
    }
    Ok(())
}

/// Validate the format of a key id.
///
/// A kid must be 1 to [`MAX_KID_LENGTH`] characters of ASCII alphanumerics,
/// `.`, `_`, `:` or `-`. Applied both to the configured key id and to the
/// `kid` header of presented tokens.
///
/// # Errors
///
/// Returns [`ClaimsFailure::Malformed`] describing the problem.
pub fn validate_kid(kid: &str) -> Result<(), ClaimsFailure> {
    if kid.is_empty() {
        return Err(ClaimsFailure::Malformed("kid must not be empty".into()));
    }

    if kid.len() > MAX_KID_LENGTH {
        return Err(ClaimsFailure::Malformed(format!(
            "kid exceeds {MAX_KID_LENGTH} characters"
        )));
    }

    if let Some(bad) =
        kid.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-')))
    {
        return Err(ClaimsFailure::Malformed(format!("kid contains invalid character {bad:?}")));
    }

    Ok(())
}
