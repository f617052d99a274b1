//! Fuzz target for issue request bodies.
//!
//! Arbitrary JSON is fed to the issue operation of a service. Every outcome
//! must be a well-formed response; a token that was issued must verify.

#![no_main]

use std::sync::LazyLock;

use jwt_service_authn::{
    TokenService,
    config::{ApiKeyConfig, ServiceConfig},
};
use libfuzzer_sys::fuzz_target;

static SERVICE: LazyLock<Option<TokenService>> = LazyLock::new(|| {
    let api_keys = ApiKeyConfig::builder().current("fuzz-key").build().ok()?;
    let config = ServiceConfig::builder().api_keys(api_keys).build().ok()?;
    TokenService::new(config).ok()
});

fuzz_target!(|data: &[u8]| {
    let Ok(body) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Some(service) = SERVICE.as_ref() else {
        return;
    };

    let response = service.issue(Some("Bearer fuzz-key"), &body);
    assert!(matches!(response.status, 200 | 400), "unexpected status {}", response.status);

    if response.status == 200 {
        let verified = service.verify(&serde_json::json!({ "token": response.body["token"] }));
        // Caller-supplied exp/nbf may legitimately make the token invalid right now.
        assert!(matches!(verified.status, 200 | 401));
    }
});
