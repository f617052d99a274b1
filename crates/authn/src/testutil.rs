//! Shared test utilities.
//!
//! Helpers for building throwaway signing identities, signing arbitrary claim
//! sets, and crafting unsigned JWT strings for attack testing. Feature-gated
//! behind `testutil` so none of it ships in production builds.
//!
//! ```toml
//! [dev-dependencies]
//! jwt-service-authn = { path = "../authn", features = ["testutil"] }
//! ```

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::Header;

use crate::{config::KeyConfig, keys::SigningIdentity};

/// A fixed 2048-bit RSA private key, PKCS#8 PEM.
pub const RSA_PRIVATE_PKCS8_PEM: &str = include_str!("../tests/fixtures/rsa_private_pkcs8.pem");

/// The same RSA private key as [`RSA_PRIVATE_PKCS8_PEM`], PKCS#1 PEM.
pub const RSA_PRIVATE_PKCS1_PEM: &str = include_str!("../tests/fixtures/rsa_private_pkcs1.pem");

/// The public half of [`RSA_PRIVATE_PKCS8_PEM`], SPKI PEM.
pub const RSA_PUBLIC_PEM: &str = include_str!("../tests/fixtures/rsa_public.pem");

/// Creates a fresh, signing-capable identity under `kid`.
///
/// # Panics
///
/// Panics if `kid` is not a valid key id.
pub fn test_identity(kid: &str) -> Arc<SigningIdentity> {
    Arc::new(SigningIdentity::generate(kid).expect("test identity"))
}

/// Creates a signing-capable RS256 identity from [`RSA_PRIVATE_PKCS8_PEM`].
///
/// # Panics
///
/// Panics if `kid` is not a valid key id.
pub fn test_rsa_identity(kid: &str) -> Arc<SigningIdentity> {
    let config = KeyConfig::builder()
        .private_key_pem(RSA_PRIVATE_PKCS8_PEM)
        .key_id(kid)
        .build()
        .expect("rsa key config");
    Arc::new(SigningIdentity::resolve(&config).expect("rsa identity"))
}

/// Signs an arbitrary JSON claim set with `identity`, bypassing the issuer.
///
/// Useful for tokens the issuer would never produce: no `jti`, foreign
/// `iss`, list-valued `aud` and so on. The header carries the identity's kid
/// and algorithm.
///
/// # Panics
///
/// Panics if the identity cannot sign.
pub fn sign_raw_claims(identity: &SigningIdentity, claims: &serde_json::Value) -> String {
    let mut header = Header::new(identity.algorithm());
    header.kid = Some(identity.key_id().to_owned());
    let key = identity.encoding_key().expect("identity holds a private key");
    jsonwebtoken::encode(&header, claims, key).expect("Failed to encode test JWT")
}

/// Creates a raw JWT string from arbitrary header and payload JSON.
///
/// The result is `{header_b64}.{payload_b64}.` with an empty signature, for
/// testing rejection of `alg: "none"` and similar forgeries.
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &serde_json::Value, payload_json: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// Asserts that a `Result<T, VerificationError>` is an `Err` of the given
/// [`VerificationError`](crate::error::VerificationError) variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use jwt_service_authn::assert_verification_error;
/// use jwt_service_authn::error::VerificationError;
///
/// let result: Result<(), VerificationError> = Err(VerificationError::Replay);
/// assert_verification_error!(result, Replay);
/// ```
#[macro_export]
macro_rules! assert_verification_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::VerificationError::$variant { .. })),
            "expected VerificationError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::VerificationError::$variant { .. })),
            "{}: expected VerificationError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}
