//! Login requirement for protected routes
//!
//! `AccessGuard` decides per request between three terminal outcomes:
//! - Allow: the wrapped service runs and its response is returned unchanged
//! - Redirect: 302 to the login page, only for browser callers when enabled
//! - Deny: `AuthError::Unauthorized` (401)
//!
//! A browser caller is one whose `Accept` header contains `text/html`
//! (case-insensitive) or whose path ends with `/html`.
//!
//! `RequireLoginLayer` wraps any tower service (an axum handler or route)
//! and returns a new service that runs the check before delegating.

use std::task::{Context, Poll};

use axum::http::{HeaderMap, Request, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};
use tracing::debug;

use crate::error::AuthError;
use crate::metrics;
use crate::resolver::Authenticator;
use crate::session::Session;

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Redirect target (login page).
    Redirect(String),
    Deny,
}

impl Decision {
    fn label(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Redirect(_) => "redirect",
            Decision::Deny => "deny",
        }
    }

    /// Response for a non-`Allow` decision; `None` when the request may proceed.
    pub fn rejection(self) -> Option<Response> {
        match self {
            Decision::Allow => None,
            Decision::Redirect(location) => {
                Some((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
            }
            Decision::Deny => Some(AuthError::Unauthorized.into_response()),
        }
    }
}

/// Guard configuration for one protected route or group of routes.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    authenticator: Authenticator,
    path_prefix: String,
    redirect_on_unauthenticated: bool,
}

impl AccessGuard {
    /// Redirecting guard. `path_prefix` may be empty; surrounding slashes are ignored.
    pub fn new(authenticator: Authenticator, path_prefix: impl Into<String>) -> Self {
        Self {
            authenticator,
            path_prefix: path_prefix.into().trim_matches('/').to_owned(),
            redirect_on_unauthenticated: true,
        }
    }

    /// When disabled, every unauthenticated request gets a 401, browsers included.
    pub fn redirect_on_unauthenticated(mut self, enabled: bool) -> Self {
        self.redirect_on_unauthenticated = enabled;
        self
    }

    /// `/{prefix}/login`, or `/login` when no prefix is configured.
    pub fn login_location(&self) -> String {
        if self.path_prefix.is_empty() {
            "/login".to_owned()
        } else {
            format!("/{}/login", self.path_prefix)
        }
    }

    pub fn decide(&self, headers: &HeaderMap, uri: &Uri, session: Option<&Session>) -> Decision {
        let decision = if self.authenticator.is_authenticated(headers, uri, session) {
            Decision::Allow
        } else if self.redirect_on_unauthenticated && wants_html(headers, uri) {
            Decision::Redirect(self.login_location())
        } else {
            Decision::Deny
        };

        metrics::record_guard_decision(decision.label());
        if decision != Decision::Allow {
            debug!(
                path = uri.path(),
                decision = decision.label(),
                "unauthenticated request"
            );
        }
        decision
    }

    /// Tower layer applying this guard.
    pub fn layer(&self) -> RequireLoginLayer {
        RequireLoginLayer {
            guard: self.clone(),
        }
    }
}

fn wants_html(headers: &HeaderMap, uri: &Uri) -> bool {
    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("text/html"));
    accepts_html || uri.path().ends_with("/html")
}

/// Layer producing `RequireLogin` services.
#[derive(Debug, Clone)]
pub struct RequireLoginLayer {
    guard: AccessGuard,
}

impl<S> Layer<S> for RequireLoginLayer {
    type Service = RequireLogin<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireLogin {
            inner,
            guard: self.guard.clone(),
        }
    }
}

/// A service that only reaches `inner` for authenticated requests.
///
/// The session is read from request extensions; a missing `Session` reads as
/// an empty one.
#[derive(Debug, Clone)]
pub struct RequireLogin<S> {
    inner: S,
    guard: AccessGuard,
}

impl<S, B> Service<Request<B>> for RequireLogin<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let decision = self.guard.decide(
            request.headers(),
            request.uri(),
            request.extensions().get::<Session>(),
        );

        if let Some(rejection) = decision.rejection() {
            return Box::pin(async move { Ok(rejection) });
        }

        // Call the instance that was driven to readiness, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(request).await.map(IntoResponse::into_response) })
    }
}
