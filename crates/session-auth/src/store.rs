//! In-memory bearer token store
//!
//! Maps each token to its absolute expiry (unix milliseconds). A single
//! `std::sync::Mutex` guards the whole map: every operation is a short,
//! synchronous critical section with no I/O, so no operation here ever
//! suspends or blocks on anything but the lock itself.
//!
//! Expired entries are removed lazily: by `verify` when it encounters one,
//! and by a full sweep on every `create`. A host that wants a bound on stale
//! entries without new logins can also call `sweep()` on a timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::codec;
use crate::metrics;

/// Token lifetime when none is configured.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Source of the current time in unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Process-wide token registry. Construct once and share via `Arc`.
pub struct TokenStore {
    tokens: Mutex<HashMap<String, u64>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenStore {
    /// Create an empty store whose `create()` issues tokens valid for `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            default_ttl,
            clock,
        }
    }

    /// TTL applied by `create()`.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a new token with the default TTL.
    pub fn create(&self) -> String {
        self.create_with_ttl(self.default_ttl)
    }

    /// Issue a new token valid for `ttl`, then purge every expired entry.
    ///
    /// No upper bound is enforced on `ttl`. A zero TTL yields a token that
    /// is already expired.
    pub fn create_with_ttl(&self, ttl: Duration) -> String {
        let token = codec::generate_token();
        let now = self.clock.now_millis();
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expires = now.saturating_add(ttl_millis);

        let purged = {
            let mut tokens = self.lock();
            tokens.insert(token.clone(), expires);
            purge_expired(&mut tokens, now)
        };

        metrics::record_token_issued();
        metrics::record_tokens_expired(purged);
        debug!(ttl_secs = ttl.as_secs(), purged, "issued bearer token");
        token
    }

    /// Whether `token` is present and unexpired.
    ///
    /// An expired entry is deleted on the way out, so a second call for the
    /// same token also returns false.
    pub fn verify(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }

        let now = self.clock.now_millis();
        let mut tokens = self.lock();
        match tokens.get(token) {
            None => false,
            Some(&expires) if now < expires => true,
            Some(_) => {
                tokens.remove(token);
                drop(tokens);
                metrics::record_tokens_expired(1);
                debug!("bearer token expired on read");
                false
            }
        }
    }

    /// Remove `token` if present. Never fails.
    pub fn revoke(&self, token: &str) {
        let removed = self.lock().remove(token).is_some();
        if removed {
            metrics::record_token_revoked();
            debug!("bearer token revoked");
        }
    }

    /// Purge every expired entry and return how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let purged = purge_expired(&mut self.lock(), now);
        metrics::record_tokens_expired(purged);
        purged
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Every critical section is a single map operation, so a panic while
    // holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TTL)
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("tokens", &self.len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

fn purge_expired(tokens: &mut HashMap<String, u64>, now: u64) -> usize {
    let before = tokens.len();
    tokens.retain(|_, expires| now < *expires);
    before - tokens.len()
}

/// Clock that only moves when told to. Lets hosts test expiry without
/// sleeping.
#[derive(Debug)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self(AtomicU64::new(start_millis))
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.0.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
