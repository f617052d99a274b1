//! JWT replay prevention via JTI (JWT ID) tracking.
//!
//! When enabled, the verifier records every `jti` it accepts. A second
//! presentation of the same `jti` before its entry expires is rejected.
//!
//! # Usage
//!
//! ```
//! use jwt_service_authn::replay::{InMemoryReplayCache, ReplayStore};
//!
//! let cache = InMemoryReplayCache::new();
//! assert!(cache.check_and_mark("jti-1", 1_060, 1_000).is_ok());
//! assert!(cache.check_and_mark("jti-1", 1_060, 1_010).is_err());
//! ```
//!
//! # Design
//!
//! - **Atomic**: [`ReplayStore::check_and_mark`] checks and inserts under one lock, so two
//!   concurrent presentations of one `jti` cannot both succeed.
//! - **Per-entry expiry**: Each entry carries an absolute expiry. Expired entries never count as
//!   seen, whether or not they have been swept yet.
//! - **Sweeping**: [`ReplaySweeper`] removes expired entries on a fixed interval so memory stays
//!   bounded by the number of unexpired tokens.

use std::{collections::HashMap, sync::Arc, time::Duration};

use fail::fail_point;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{clock::Clock, error::VerificationError};

/// Default time a `jti` is remembered (10 minutes).
pub const DEFAULT_REPLAY_TTL: Duration = Duration::from_secs(600);

/// Smallest accepted replay TTL.
pub const MIN_REPLAY_TTL: Duration = Duration::from_secs(1);

/// Lower bound on the sweep interval.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on the sweep interval.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sweep interval for a given TTL: half the TTL, clamped to
/// [`MIN_SWEEP_INTERVAL`]..=[`MAX_SWEEP_INTERVAL`].
#[must_use]
pub fn sweep_interval(ttl: Duration) -> Duration {
    (ttl / 2).clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL)
}

/// Storage for consumed token ids.
///
/// All times are seconds since the Unix epoch. An entry with
/// `expires_at <= now` is treated as absent.
pub trait ReplayStore: Send + Sync {
    /// Records `jti` as seen until `expires_at`, replacing any previous entry.
    fn put(&self, jti: &str, expires_at: u64);

    /// Returns whether `jti` has an unexpired entry.
    fn contains_unexpired(&self, jti: &str, now: u64) -> bool;

    /// Atomically checks `jti` and marks it as seen.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::Replay`] if `jti` already has an unexpired
    /// entry. The existing entry is left untouched.
    fn check_and_mark(&self, jti: &str, expires_at: u64, now: u64)
    -> Result<(), VerificationError>;

    /// Removes every expired entry and returns how many were removed.
    fn sweep(&self, now: u64) -> usize;

    /// Number of entries held, including expired ones not yet swept.
    fn len(&self) -> usize;

    /// Returns whether the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory replay cache.
///
/// # Thread Safety
///
/// `InMemoryReplayCache` is `Send + Sync` and safe for concurrent use from
/// multiple threads and async tasks. Operations hold the lock only for a map
/// lookup or insert.
#[derive(Debug, Default)]
pub struct InMemoryReplayCache {
    /// JTI -> expiry (seconds since epoch).
    seen: Mutex<HashMap<String, u64>>,
}

impl InMemoryReplayCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplayStore for InMemoryReplayCache {
    fn put(&self, jti: &str, expires_at: u64) {
        self.seen.lock().insert(jti.to_owned(), expires_at);
    }

    fn contains_unexpired(&self, jti: &str, now: u64) -> bool {
        self.seen.lock().get(jti).is_some_and(|&expires_at| expires_at > now)
    }

    fn check_and_mark(
        &self,
        jti: &str,
        expires_at: u64,
        now: u64,
    ) -> Result<(), VerificationError> {
        let mut seen = self.seen.lock();

        if seen.get(jti).is_some_and(|&existing| existing > now) {
            return Err(VerificationError::Replay);
        }

        fail_point!("replay-before-insert");

        seen.insert(jti.to_owned(), expires_at);
        Ok(())
    }

    fn sweep(&self, now: u64) -> usize {
        let mut seen = self.seen.lock();
        let before = seen.len();
        seen.retain(|_, &mut expires_at| expires_at > now);
        before - seen.len()
    }

    fn len(&self) -> usize {
        self.seen.lock().len()
    }
}

/// Background task that periodically sweeps a [`ReplayStore`].
///
/// The task stops when [`shutdown`](Self::shutdown) is awaited, when the
/// token from [`cancel_token`](Self::cancel_token) is cancelled, or when the
/// sweeper is dropped.
pub struct ReplaySweeper {
    cancel_token: CancellationToken,
    handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ReplaySweeper {
    /// Spawns the sweep task.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn spawn(store: Arc<dyn ReplayStore>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so the first sweep
            // happens one full interval after startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("replay sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = store.sweep(clock.now());
                        if removed > 0 {
                            tracing::debug!(removed, remaining = store.len(), "replay cache swept");
                        }
                    }
                }
            }
        });

        tracing::debug!(interval = ?interval, "replay sweeper started");
        Self { cancel_token, handle: Mutex::new(Some(handle)) }
    }

    /// Token that stops the sweep task when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Stops the sweep task and waits for it to finish.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "replay sweeper task panicked");
        }
    }
}

impl Drop for ReplaySweeper {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
