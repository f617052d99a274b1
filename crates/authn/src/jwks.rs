//! JSON Web Key Set publication.
//!
//! Exposes the verification key so other services can verify tokens
//! without calling back into this one. Ed25519 keys are published as OKP
//! keys (RFC 8037), RSA keys with their modulus and exponent.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::VerifyingKey;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    keys::{PublicKey, SigningIdentity, rsa_components},
};

/// Intended use of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUse {
    /// Signature verification.
    Sig,
}

/// A public key in JWK form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type: `"OKP"` or `"RSA"`.
    pub kty: String,
    /// Curve, `"Ed25519"` for OKP keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// Raw OKP public key, base64url without padding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// RSA modulus, base64url without padding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA public exponent, base64url without padding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// Key id.
    pub kid: String,
    /// Key use.
    #[serde(rename = "use")]
    pub use_field: KeyUse,
    /// Algorithm: `"EdDSA"` or `"RS256"`.
    pub alg: String,
}

impl Jwk {
    /// Builds the JWK for an identity's public key.
    #[must_use]
    pub fn from_identity(identity: &SigningIdentity) -> Self {
        let mut jwk = Self {
            kty: String::new(),
            crv: None,
            x: None,
            n: None,
            e: None,
            kid: identity.key_id().to_owned(),
            use_field: KeyUse::Sig,
            alg: format!("{:?}", identity.algorithm()),
        };
        match identity.public_key() {
            PublicKey::Ed25519(key) => {
                jwk.kty = "OKP".to_owned();
                jwk.crv = Some("Ed25519".to_owned());
                jwk.x = Some(URL_SAFE_NO_PAD.encode(key.as_bytes()));
            },
            PublicKey::Rsa(key) => {
                let (n, e) = rsa_components(key);
                jwk.kty = "RSA".to_owned();
                jwk.n = Some(n);
                jwk.e = Some(e);
            },
        }
        jwk
    }

    /// Decodes the public key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPublicKey`] if the key type is not
    /// supported or its parameters are missing or invalid.
    pub fn to_public_key(&self) -> Result<PublicKey, ConfigError> {
        match (self.kty.as_str(), self.crv.as_deref()) {
            ("OKP", Some("Ed25519")) => {
                let bytes: [u8; 32] = decode_param("x", self.x.as_deref())?
                    .try_into()
                    .map_err(|_| ConfigError::InvalidPublicKey("JWK x must be 32 bytes".into()))?;
                VerifyingKey::from_bytes(&bytes)
                    .map(PublicKey::Ed25519)
                    .map_err(|e| ConfigError::InvalidPublicKey(format!("JWK x: {e}")))
            },
            ("RSA", _) => {
                let n = BigUint::from_bytes_be(&decode_param("n", self.n.as_deref())?);
                let e = BigUint::from_bytes_be(&decode_param("e", self.e.as_deref())?);
                RsaPublicKey::new(n, e)
                    .map(PublicKey::Rsa)
                    .map_err(|e| ConfigError::InvalidPublicKey(format!("JWK RSA key: {e}")))
            },
            (kty, crv) => Err(ConfigError::InvalidPublicKey(format!(
                "unsupported JWK {kty}/{}",
                crv.unwrap_or("-")
            ))),
        }
    }
}

fn decode_param(name: &str, value: Option<&str>) -> Result<Vec<u8>, ConfigError> {
    let value =
        value.ok_or_else(|| ConfigError::InvalidPublicKey(format!("JWK {name} missing")))?;
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| ConfigError::InvalidPublicKey(format!("JWK {name}: {e}")))
}

/// A JSON Web Key Set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys.
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// The key set publishing a single identity.
    #[must_use]
    pub fn from_identity(identity: &SigningIdentity) -> Self {
        Self { keys: vec![Jwk::from_identity(identity)] }
    }

    /// Finds a key by id.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid == kid)
    }
}
