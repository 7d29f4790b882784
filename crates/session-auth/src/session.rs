//! Per-request session mapping
//!
//! The host's session middleware owns persistence (cookie, store, expiry).
//! It places a `Session` into request extensions before the handler runs
//! and reads it back afterwards; clones share the same underlying map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

/// Session key holding the same-origin login flag.
pub const AUTHENTICATED_KEY: &str = "authenticated";

#[derive(Debug, Default)]
struct SessionState {
    entries: HashMap<String, Value>,
    modified: bool,
}

/// Shared handle over one request's session entries.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

impl Session {
    /// Empty, unmodified session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Session loaded from the host's store. Starts unmodified.
    pub fn from_entries(entries: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                entries,
                modified: false,
            })),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().entries.get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut state = self.lock();
        state.entries.insert(key.into(), value.into());
        state.modified = true;
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut state = self.lock();
        let removed = state.entries.remove(key);
        if removed.is_some() {
            state.modified = true;
        }
        removed
    }

    /// Drop every entry, not just the login flag.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.modified = true;
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Whether any mutation happened since the session was loaded.
    pub fn is_modified(&self) -> bool {
        self.lock().modified
    }

    /// Copy of the entries, for the host to persist.
    pub fn entries(&self) -> HashMap<String, Value> {
        self.lock().entries.clone()
    }

    /// The login flag; absent or non-boolean reads as false.
    pub fn is_authenticated(&self) -> bool {
        matches!(self.get(AUTHENTICATED_KEY), Some(Value::Bool(true)))
    }

    pub(crate) fn set_authenticated(&self) {
        self.insert(AUTHENTICATED_KEY, true);
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
