//! Fuzz target for token verification.
//!
//! Feeds arbitrary strings as tokens, with and without a binding context,
//! to a verifier with every stage enabled. Every result must be `Ok(...)` or
//! `Err(VerificationError)`; panics and hangs are bugs.

#![no_main]

use std::sync::{Arc, LazyLock};

use jwt_service_authn::{
    binding::VerificationContext,
    jwt::{TokenVerifier, decode_jwt_header},
    keys::SigningIdentity,
    replay::{InMemoryReplayCache, ReplayStore},
    validation::{validate_algorithm, validate_kid},
};
use libfuzzer_sys::fuzz_target;

const NOW: u64 = 1_700_000_000;

static VERIFIER: LazyLock<Option<TokenVerifier>> = LazyLock::new(|| {
    let identity = Arc::new(SigningIdentity::generate("fuzz-key").ok()?);
    Some(
        TokenVerifier::builder()
            .identity(identity)
            .issuer("https://auth.internal")
            .audience("fuzz")
            .enforce_binding(true)
            .replay(Arc::new(InMemoryReplayCache::new()) as Arc<dyn ReplayStore>)
            .build(),
    )
});

fuzz_target!(|data: &[u8]| {
    // Tokens are always UTF-8 strings.
    let Ok(token) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(header) = decode_jwt_header(token) {
        let _ = validate_algorithm(&format!("{:?}", header.alg));
        if let Some(kid) = header.kid.as_deref() {
            let _ = validate_kid(kid);
        }
    }

    let Some(verifier) = VERIFIER.as_ref() else {
        return;
    };

    let _ = verifier.verify(token, None, NOW);

    let context = VerificationContext::builder().method("POST").body(token).build();
    let _ = verifier.verify(token, Some(&context), NOW);
});
