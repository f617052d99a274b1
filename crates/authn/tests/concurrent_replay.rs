//! Concurrency tests for single-use tokens.
//!
//! Many verifications of the same token race on the replay cache; exactly
//! one may win.
#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use std::{
    sync::{Arc, Barrier},
    time::Duration,
};

use jwt_service_authn::{
    Clock, ManualClock, TokenService,
    config::{ApiKeyConfig, ReplayConfig, ServiceConfig},
    error::VerificationError,
    issuer::{ClaimsInput, TokenIssuer},
    jwt::TokenVerifier,
    keys::SigningIdentity,
    replay::{InMemoryReplayCache, ReplayStore},
};
use serde_json::json;
use tokio::task::JoinSet;

const NOW: u64 = 1_700_000_000;

fn replay_service() -> Arc<TokenService> {
    let config = ServiceConfig::builder()
        .api_keys(ApiKeyConfig::builder().current("k2").build().expect("api keys"))
        .replay(ReplayConfig::builder().enabled(true).build())
        .build()
        .expect("config");
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(NOW));
    Arc::new(TokenService::with_clock(config, clock).expect("service"))
}

#[test]
fn test_two_threads_one_success() {
    let service = replay_service();
    let response = service.issue(Some("Bearer k2"), &json!({"sub": "u"}));
    let body = json!({"token": response.body["token"]});

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let body = body.clone();
            std::thread::spawn(move || {
                barrier.wait();
                service.verify(&body).status
            })
        })
        .collect();

    let mut statuses: Vec<u16> = handles.into_iter().map(|h| h.join().expect("join")).collect();
    statuses.sort_unstable();
    assert_eq!(statuses, vec![200, 401]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_tasks_one_success() {
    let identity = Arc::new(SigningIdentity::generate("race").expect("identity"));
    let issuer = TokenIssuer::builder().identity(Arc::clone(&identity)).build();
    let cache = Arc::new(InMemoryReplayCache::new());
    let verifier = Arc::new(
        TokenVerifier::builder()
            .identity(identity)
            .replay(Arc::clone(&cache) as Arc<dyn ReplayStore>)
            .build(),
    );

    let token = issuer.issue(ClaimsInput::builder().sub("u").build(), NOW).expect("issue").token;

    let mut set = JoinSet::new();
    for _ in 0..32 {
        let verifier = Arc::clone(&verifier);
        let token = token.clone();
        set.spawn(async move { verifier.verify(&token, None, NOW) });
    }

    let mut successes = 0;
    let mut replays = 0;
    while let Some(result) = set.join_next().await {
        match result.expect("task") {
            Ok(_) => successes += 1,
            Err(VerificationError::Replay) => replays += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(replays, 31);
    assert_eq!(cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_tokens_all_succeed_concurrently() {
    let identity = Arc::new(SigningIdentity::generate("race").expect("identity"));
    let issuer = TokenIssuer::builder().identity(Arc::clone(&identity)).build();
    let cache = Arc::new(InMemoryReplayCache::new());
    let verifier = Arc::new(
        TokenVerifier::builder()
            .identity(identity)
            .replay(Arc::clone(&cache) as Arc<dyn ReplayStore>)
            .replay_ttl(Duration::from_secs(60))
            .build(),
    );

    let mut set = JoinSet::new();
    for i in 0..64 {
        let token = issuer
            .issue(ClaimsInput::builder().sub(format!("svc-{i}")).build(), NOW)
            .expect("issue")
            .token;
        let verifier = Arc::clone(&verifier);
        set.spawn(async move { verifier.verify(&token, None, NOW).is_ok() });
    }

    while let Some(result) = set.join_next().await {
        assert!(result.expect("task"));
    }
    assert_eq!(cache.len(), 64);
    assert_eq!(cache.sweep(NOW + 60), 64);
}
