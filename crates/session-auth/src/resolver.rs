//! Dual-mode authentication resolution
//!
//! A request is authenticated when it presents a valid bearer token OR its
//! session carries the login flag. The token is checked first only to
//! short-circuit; a missing or invalid token never masks a valid session.

use std::sync::Arc;

use axum::http::{HeaderMap, Uri};
use tracing::debug;

use crate::extract::extract_token;
use crate::session::Session;
use crate::store::TokenStore;

/// Answers "is this request authenticated?" and mutates login state.
#[derive(Debug, Clone)]
pub struct Authenticator {
    store: Arc<TokenStore>,
}

impl Authenticator {
    pub fn new(store: Arc<TokenStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// `session` is `None` when the host attached no session to the request;
    /// that reads the same as an empty one.
    pub fn is_authenticated(
        &self,
        headers: &HeaderMap,
        uri: &Uri,
        session: Option<&Session>,
    ) -> bool {
        if let Some(token) = extract_token(headers, uri)
            && self.store.verify(&token)
        {
            debug!(mode = "token", "request authenticated");
            return true;
        }

        let authenticated = session.is_some_and(Session::is_authenticated);
        if authenticated {
            debug!(mode = "session", "request authenticated");
        }
        authenticated
    }

    /// Mark the session as logged in. Issues no token.
    pub fn login(&self, session: &Session) {
        session.set_authenticated();
        debug!("session marked authenticated");
    }

    /// Clear the whole session, then revoke any token presented with the
    /// request, whether or not it was still valid.
    pub fn logout(&self, headers: &HeaderMap, uri: &Uri, session: Option<&Session>) {
        if let Some(session) = session {
            session.clear();
        }
        if let Some(token) = extract_token(headers, uri) {
            self.store.revoke(&token);
        }
        debug!("logged out");
    }

    /// Issue a bearer token for a cross-origin client with the store's default TTL.
    pub fn issue_token(&self) -> String {
        self.store.create()
    }
}
