//! Security-focused verification tests.
//!
//! These tests check the verifier's resistance to common JWT attack vectors:
//! algorithm substitution, algorithm confusion, expired and future tokens,
//! foreign keys, tampered payloads and malformed JWT structures.
#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use jwt_service_authn::{
    error::{ClaimsFailure, VerificationError},
    issuer::{ClaimsInput, TokenIssuer},
    jwt::{TokenVerifier, decode_jwt_header},
    keys::SigningIdentity,
    testutil::{craft_raw_jwt, test_rsa_identity},
    validation::validate_algorithm,
};
use rstest::rstest;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const NOW: u64 = 1_700_000_000;
const KID: &str = "sec-key";

fn identity() -> Arc<SigningIdentity> {
    Arc::new(SigningIdentity::generate(KID).expect("identity"))
}

fn pair() -> (TokenIssuer, TokenVerifier, Arc<SigningIdentity>) {
    let identity = identity();
    let issuer = TokenIssuer::builder().identity(Arc::clone(&identity)).build();
    let verifier = TokenVerifier::builder().identity(Arc::clone(&identity)).build();
    (issuer, verifier, identity)
}

fn issue(issuer: &TokenIssuer) -> String {
    issuer.issue(ClaimsInput::builder().sub("svc-a").build(), NOW).expect("issue").token
}

fn expect_claims_failure(result: Result<impl std::fmt::Debug, VerificationError>) -> ClaimsFailure {
    match result {
        Err(VerificationError::Claims(kind)) => kind,
        other => panic!("expected a claims failure, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Algorithm substitution
// ---------------------------------------------------------------------------

#[rstest]
#[case::lowercase("none")]
#[case::capitalized("None")]
#[case::upper("NONE")]
fn test_alg_none_rejected(#[case] alg: &str) {
    let (_, verifier, _) = pair();
    let token = craft_raw_jwt(
        &json!({"alg": alg, "typ": "JWT", "kid": KID}),
        &json!({"sub": "attacker", "iat": NOW, "exp": NOW + 3600}),
    );

    let kind = expect_claims_failure(verifier.verify(&token, None, NOW));
    assert!(
        matches!(kind, ClaimsFailure::Malformed(_) | ClaimsFailure::UnsupportedAlgorithm(_)),
        "got {kind:?}"
    );
}

#[rstest]
#[case::hs256(Algorithm::HS256)]
#[case::hs384(Algorithm::HS384)]
#[case::hs512(Algorithm::HS512)]
fn test_hmac_with_public_key_as_secret_rejected(#[case] alg: Algorithm) {
    let (_, verifier, identity) = pair();

    // Classic confusion attack: HMAC keyed with the published public key.
    let mut header = Header::new(alg);
    header.kid = Some(KID.into());
    let public_pem = identity.public_key_pem().expect("pem");
    let key = EncodingKey::from_secret(public_pem.as_bytes());
    let token = jsonwebtoken::encode(&header, &json!({"sub": "attacker", "iat": NOW}), &key)
        .expect("encode");

    let kind = expect_claims_failure(verifier.verify(&token, None, NOW));
    assert!(
        matches!(kind, ClaimsFailure::UnsupportedAlgorithm(ref msg) if msg.contains("not allowed for security reasons")),
        "got {kind:?}"
    );
}

#[test]
fn test_hmac_with_rsa_public_pem_as_secret_rejected() {
    let identity = test_rsa_identity(KID);
    let verifier = TokenVerifier::builder().identity(Arc::clone(&identity)).build();

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(KID.into());
    let public_pem = identity.public_key_pem().expect("pem");
    let key = EncodingKey::from_secret(public_pem.as_bytes());
    let token = jsonwebtoken::encode(&header, &json!({"sub": "attacker", "iat": NOW}), &key)
        .expect("encode");

    let kind = expect_claims_failure(verifier.verify(&token, None, NOW));
    assert!(matches!(kind, ClaimsFailure::UnsupportedAlgorithm(_)), "got {kind:?}");
}

#[rstest]
#[case::rs256("RS256", "does not match the configured key")]
#[case::es256("ES256", "not in accepted list")]
#[case::ps256("PS256", "not in accepted list")]
fn test_other_asymmetric_algorithms_rejected_before_signature_check(
    #[case] alg: &str,
    #[case] reason: &str,
) {
    let (_, verifier, _) = pair();
    let token = craft_raw_jwt(
        &json!({"alg": alg, "typ": "JWT", "kid": KID}),
        &json!({"sub": "attacker", "iat": NOW}),
    );

    let kind = expect_claims_failure(verifier.verify(&token, None, NOW));
    assert!(
        matches!(kind, ClaimsFailure::UnsupportedAlgorithm(ref msg) if msg.contains(reason)),
        "got {kind:?}"
    );
}

#[test]
fn test_eddsa_token_rejected_by_rsa_verifier() {
    let (issuer, _, _) = pair();
    let verifier = TokenVerifier::builder().identity(test_rsa_identity(KID)).build();

    let kind = expect_claims_failure(verifier.verify(&issue(&issuer), None, NOW));
    assert!(matches!(kind, ClaimsFailure::UnsupportedAlgorithm(_)), "got {kind:?}");
}

#[test]
fn test_validate_algorithm_policy() {
    for alg in ["EdDSA", "RS256"] {
        assert!(validate_algorithm(alg).is_ok(), "{alg} should be accepted");
    }
    for alg in ["none", "HS256", "RS512", "ES256", "PS256", ""] {
        assert!(validate_algorithm(alg).is_err(), "{alg} should be rejected");
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[test]
fn test_token_from_foreign_key_with_same_kid_rejected() {
    let (_, verifier, _) = pair();
    let foreign = TokenIssuer::builder().identity(identity()).build();

    let kind = expect_claims_failure(verifier.verify(&issue(&foreign), None, NOW));
    assert_eq!(kind, ClaimsFailure::Signature);
}

#[test]
fn test_unknown_kid_rejected() {
    let (_, verifier, _) = pair();
    let other = Arc::new(SigningIdentity::generate("other-key").expect("identity"));
    let foreign = TokenIssuer::builder().identity(other).build();

    let kind = expect_claims_failure(verifier.verify(&issue(&foreign), None, NOW));
    assert_eq!(kind, ClaimsFailure::UnknownKey("other-key".into()));
}

#[test]
fn test_malformed_kid_rejected() {
    let (_, verifier, _) = pair();
    let token = craft_raw_jwt(
        &json!({"alg": "EdDSA", "typ": "JWT", "kid": "../../etc/passwd"}),
        &json!({"sub": "attacker", "iat": NOW}),
    );

    let kind = expect_claims_failure(verifier.verify(&token, None, NOW));
    assert!(matches!(kind, ClaimsFailure::Malformed(_)), "got {kind:?}");
}

#[test]
fn test_verify_only_identity_verifies_but_cannot_sign() {
    let (issuer, _, identity) = pair();
    let verify_only = Arc::new(
        SigningIdentity::verify_only(KID, identity.public_key().clone()).expect("identity"),
    );
    let verifier = TokenVerifier::builder().identity(Arc::clone(&verify_only)).build();

    let claims = verifier.verify(&issue(&issuer), None, NOW).expect("verify");
    assert_eq!(claims.sub, "svc-a");
    assert!(!verify_only.can_sign());
}

// ---------------------------------------------------------------------------
// Tampering
// ---------------------------------------------------------------------------

#[test]
fn test_tampered_payload_rejected() {
    let (issuer, verifier, _) = pair();
    let token = issue(&issuer);

    let parts: Vec<&str> = token.split('.').collect();
    let mut payload: serde_json::Value =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).expect("b64")).expect("json");
    payload["sub"] = json!("admin");
    let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).expect("json"));
    let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

    let kind = expect_claims_failure(verifier.verify(&forged, None, NOW));
    assert_eq!(kind, ClaimsFailure::Signature);
}

#[test]
fn test_stripped_signature_rejected() {
    let (issuer, verifier, _) = pair();
    let token = issue(&issuer);
    let unsigned = format!("{}.", token.rsplit_once('.').expect("dot").0);

    assert!(verifier.verify(&unsigned, None, NOW).is_err());
}

// ---------------------------------------------------------------------------
// Time bounds
// ---------------------------------------------------------------------------

#[test]
fn test_expired_token_rejected() {
    let (issuer, verifier, _) = pair();
    let signed =
        issuer.issue(ClaimsInput::builder().sub("svc").exp(NOW - 1).build(), NOW).expect("issue");

    let kind = expect_claims_failure(verifier.verify(&signed.token, None, NOW));
    assert_eq!(kind, ClaimsFailure::Expired);
}

#[test]
fn test_token_valid_until_exp() {
    let (issuer, verifier, _) = pair();
    let signed =
        issuer.issue(ClaimsInput::builder().sub("svc").exp("10s").build(), NOW).expect("issue");

    assert!(verifier.verify(&signed.token, None, NOW + 9).is_ok());
    let kind = expect_claims_failure(verifier.verify(&signed.token, None, NOW + 10));
    assert_eq!(kind, ClaimsFailure::Expired);
}

#[test]
fn test_future_nbf_rejected() {
    let (issuer, verifier, _) = pair();
    let signed =
        issuer.issue(ClaimsInput::builder().sub("svc").nbf("5m").build(), NOW).expect("issue");

    let kind = expect_claims_failure(verifier.verify(&signed.token, None, NOW));
    assert_eq!(kind, ClaimsFailure::NotYetValid);
    assert!(verifier.verify(&signed.token, None, NOW + 300).is_ok());
}

// ---------------------------------------------------------------------------
// Malformed structures
// ---------------------------------------------------------------------------

#[rstest]
#[case::empty("")]
#[case::one_part("abc")]
#[case::two_parts("abc.def")]
#[case::four_parts("a.b.c.d")]
#[case::bad_base64("!!!.@@@.###")]
#[case::json_not_object("bnVsbA.bnVsbA.")]
fn test_malformed_jwt_rejected(#[case] token: &str) {
    let (_, verifier, _) = pair();
    expect_claims_failure(verifier.verify(token, None, NOW));
}

#[test]
fn test_decode_jwt_header_reads_kid() {
    let (issuer, _, _) = pair();
    let header = decode_jwt_header(&issue(&issuer)).expect("header");
    assert_eq!(header.kid.as_deref(), Some(KID));
    assert_eq!(header.alg, Algorithm::EdDSA);
}

#[test]
fn test_missing_sub_in_signed_token_rejected() {
    let (_, verifier, identity) = pair();

    // Signed by the right key but missing the required `sub`.
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(KID.into());
    let key = identity.encoding_key().expect("key");
    let token = jsonwebtoken::encode(&header, &json!({"iat": NOW}), key).expect("encode");

    let kind = expect_claims_failure(verifier.verify(&token, None, NOW));
    assert!(matches!(kind, ClaimsFailure::Malformed(_)), "got {kind:?}");
}
