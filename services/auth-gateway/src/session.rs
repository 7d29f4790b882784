//! Signed-cookie session middleware
//!
//! Session data lives in process memory keyed by a random id. The cookie
//! carries `<id>.<hex HMAC-SHA256(secret, id)>`; a cookie whose signature
//! does not verify, or whose id is unknown, starts a fresh empty session.
//!
//! Each stored session expires `ttl` after it was last written, and the
//! cookie carries a matching `Max-Age`. Expired entries are dropped when
//! read, purged on every write, and by `purge_expired()` from the sweeper.
//!
//! The middleware inserts a `session_auth::Session` into request extensions
//! before the handler runs and persists it afterwards:
//! - modified and non-empty: stored, cookie (re)issued
//! - modified and now empty: dropped from the store, cookie expired
//! - unmodified: left alone, no Set-Cookie

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use common::Secret;
use hmac::{Hmac, Mac};
use serde_json::Value;
use session_auth::Session;
use sha2::Sha256;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

struct StoredSession {
    entries: HashMap<String, Value>,
    saved_at: Instant,
}

/// Shared session store and cookie settings.
#[derive(Clone)]
pub struct SessionLayer {
    sessions: Arc<Mutex<HashMap<String, StoredSession>>>,
    secret: Arc<Secret<String>>,
    cookie_name: Arc<str>,
    ttl: Duration,
}

impl SessionLayer {
    pub fn new(secret: Secret<String>, cookie_name: &str, ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            secret: Arc::new(secret),
            cookie_name: Arc::from(cookie_name),
            ttl,
        }
    }

    /// Number of server-side sessions held, expired or not.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Drop every session older than the TTL and return how many went.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, stored| stored.saved_at.elapsed() < self.ttl);
        before - sessions.len()
    }

    async fn load(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        if sessions.get(id)?.saved_at.elapsed() >= self.ttl {
            sessions.remove(id);
            debug!("session expired");
            return None;
        }
        sessions
            .get(id)
            .map(|stored| Session::from_entries(stored.entries.clone()))
    }

    async fn save(&self, id: String, entries: HashMap<String, Value>) {
        let mut sessions = self.sessions.lock().await;
        // Lazy cleanup: reclaim sessions whose cookie was abandoned
        sessions.retain(|_, stored| stored.saved_at.elapsed() < self.ttl);
        sessions.insert(
            id,
            StoredSession {
                entries,
                saved_at: Instant::now(),
            },
        );
    }

    fn mac(&self, id: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose().as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(id.as_bytes());
        mac
    }

    fn sign(&self, id: &str) -> String {
        let signature = hex::encode(self.mac(id).finalize().into_bytes());
        format!("{id}.{signature}")
    }

    /// Session id from a signed cookie value, if the signature verifies.
    fn verify(&self, cookie: &str) -> Option<String> {
        let (id, signature) = cookie.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;
        self.mac(id).verify_slice(&signature).ok()?;
        Some(id.to_owned())
    }

    fn cookie_value<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == &*self.cookie_name)
            .map(|(_, value)| value)
    }

    fn set_cookie(&self, value: &str, expire: bool) -> Option<HeaderValue> {
        let cookie = if expire {
            format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", self.cookie_name)
        } else {
            format!(
                "{}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
                self.cookie_name,
                self.ttl.as_secs()
            )
        };
        HeaderValue::from_str(&cookie)
            .inspect_err(|e| warn!(error = %e, "failed to build session cookie"))
            .ok()
    }
}

/// Axum middleware: load the session, run the handler, persist the session.
pub async fn session_middleware(
    State(layer): State<SessionLayer>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_id = layer
        .cookie_value(request.headers())
        .and_then(|value| layer.verify(value));

    let (session_id, session) = match cookie_id {
        Some(id) => match layer.load(&id).await {
            Some(session) => (Some(id), session),
            None => (None, Session::new()),
        },
        None => (None, Session::new()),
    };

    request.extensions_mut().insert(session.clone());
    let mut response = next.run(request).await;

    if !session.is_modified() {
        return response;
    }

    let set_cookie = if session.is_empty() {
        if let Some(id) = &session_id {
            layer.sessions.lock().await.remove(id);
            debug!("session discarded");
        }
        layer.set_cookie("", true)
    } else {
        let id = session_id.unwrap_or_else(session_auth::generate_token);
        let cookie = layer.sign(&id);
        layer.save(id, session.entries()).await;
        layer.set_cookie(&cookie, false)
    };

    if let Some(value) = set_cookie {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}
