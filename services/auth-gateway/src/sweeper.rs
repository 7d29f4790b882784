//! Periodic token and session sweep
//!
//! `TokenStore` only purges expired tokens when a new one is created or an
//! expired one is read, and the session layer only purges on write. On a
//! quiet deployment that can leave stale entries in memory indefinitely;
//! this task bounds their lifetime to one interval.

use std::sync::Arc;
use std::time::Duration;

use session_auth::TokenStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::metrics;
use crate::session::SessionLayer;

/// Spawn the sweep loop. It exits once `shutdown` flips to `true` or its
/// sender is dropped.
pub fn spawn(
    store: Arc<TokenStore>,
    sessions: SessionLayer,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "token sweep enabled");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = store.sweep();
                    let remaining = store.len();
                    metrics::set_active_tokens(remaining);
                    let purged_sessions = sessions.purge_expired().await;
                    debug!(purged, remaining, purged_sessions, "token sweep");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("token sweep stopped");
                        break;
                    }
                }
            }
        }
    })
}
