//! HTTP routes
//!
//! Endpoints (nested under `/{path_prefix}` when one is configured):
//! - GET  /login         login form (public)
//! - POST /login         check admin key, set session flag, issue bearer token
//! - POST /logout        clear session, revoke presented token
//! - GET  /admin/health  protected, browsers redirected to login
//! - GET  /admin/html    protected, browsers redirected to login
//! - GET  /admin/stats   protected, always 401 when unauthenticated
//!
//! `/health` and `/metrics` stay at the root regardless of prefix.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Form, Router};
use common::Secret;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use session_auth::{AccessGuard, Authenticator, Session};
use tracing::{info, warn};

use crate::metrics;
use crate::session::{SessionLayer, session_middleware};

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Authenticator,
    pub admin_key: Arc<Secret<String>>,
    pub sessions: SessionLayer,
    pub path_prefix: String,
    pub prometheus: PrometheusHandle,
    pub started_at: Instant,
}

/// Build the axum router with all routes and shared state.
///
/// The session middleware wraps every prefixed route so the guard and the
/// login/logout handlers all see the request's `Session`. A concurrency
/// limit based on `max_connections` covers the whole router.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    let guard = AccessGuard::new(state.authenticator.clone(), state.path_prefix.clone());

    let browser_routes = Router::new()
        .route("/admin/health", get(admin_health))
        .route("/admin/html", get(admin_html))
        .route_layer(guard.layer());

    let api_routes = Router::new()
        .route("/admin/stats", get(admin_stats))
        .route_layer(guard.redirect_on_unauthenticated(false).layer());

    let app_routes = Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
        .merge(browser_routes)
        .merge(api_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.sessions.clone(),
            session_middleware,
        ));

    let router = if state.path_prefix.is_empty() {
        app_routes
    } else {
        Router::new().nest(&format!("/{}", state.path_prefix), app_routes)
    };

    router
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn prefixed(state: &AppState, path: &str) -> String {
    if state.path_prefix.is_empty() {
        path.to_owned()
    } else {
        format!("/{}{path}", state.path_prefix)
    }
}

/// GET /login: minimal form posting back to /login.
async fn login_page(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        r#"<!doctype html>
<html><head><title>Login</title></head>
<body>
<form method="post" action="{}">
<input type="password" name="admin_key" autofocus>
<button type="submit">Log in</button>
</form>
</body></html>"#,
        prefixed(&state, "/login")
    ))
}

#[derive(Deserialize)]
struct LoginForm {
    admin_key: String,
}

/// POST /login: same-origin clients get the session flag, cross-origin
/// clients use the returned bearer token.
async fn login(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Form(form): Form<LoginForm>,
) -> Response {
    if !state.admin_key.matches(form.admin_key.as_bytes()) {
        metrics::record_login(false);
        warn!("login rejected: invalid admin key");
        return json_response(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({ "success": false, "message": "Invalid admin key" }),
        );
    }

    state.authenticator.login(&session);
    let token = state.authenticator.issue_token();
    metrics::record_login(true);
    info!("admin logged in");

    json_response(
        StatusCode::OK,
        serde_json::json!({ "success": true, "token": token }),
    )
}

/// POST /logout: always succeeds, even without a session or token.
async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    state.authenticator.logout(&headers, &uri, Some(&session));
    info!("admin logged out");
    json_response(StatusCode::OK, serde_json::json!({ "success": true }))
}

/// GET /admin/health: used by clients to probe their own login state.
async fn admin_health(State(state): State<AppState>) -> Response {
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "authenticated": true,
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        }),
    )
}

/// GET /admin/html: browser landing page for logged-in admins.
async fn admin_html(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        r#"<!doctype html>
<html><head><title>Admin</title></head>
<body>
<p>Logged in.</p>
<form method="post" action="{}"><button type="submit">Log out</button></form>
</body></html>"#,
        prefixed(&state, "/logout")
    ))
}

/// GET /admin/stats: token and session counts for API clients.
async fn admin_stats(State(state): State<AppState>) -> Response {
    // Expired tokens linger until something purges them
    state.authenticator.store().sweep();
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "active_tokens": state.authenticator.store().len(),
            "sessions": state.sessions.len().await,
        }),
    )
}

/// Public liveness endpoint.
async fn health_handler(State(state): State<AppState>) -> Response {
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        }),
    )
}

/// Prometheus metrics endpoint: returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use session_auth::{ManualClock, TokenStore};
    use std::time::Duration;
    use tower::ServiceExt;

    const ADMIN_KEY: &str = "correct-horse";
    const SESSION_TTL: Duration = Duration::from_secs(3600);

    /// Create a PrometheusHandle for tests without installing a global recorder.
    fn test_prometheus_handle() -> PrometheusHandle {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle()
    }

    fn test_state(prefix: &str) -> AppState {
        AppState {
            authenticator: Authenticator::new(Arc::new(TokenStore::default())),
            admin_key: Arc::new(Secret::new(ADMIN_KEY.to_string())),
            sessions: SessionLayer::new(
                Secret::new("test-secret".to_string()),
                "session",
                SESSION_TTL,
            ),
            path_prefix: prefix.to_string(),
            prometheus: test_prometheus_handle(),
            started_at: Instant::now(),
        }
    }

    fn login_request(uri: &str, key: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("admin_key={key}")))
            .unwrap()
    }

    fn get_request(uri: &str, headers: &[(header::HeaderName, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// Log in and return (session cookie pair, bearer token).
    async fn log_in(app: &Router, prefix: &str) -> (String, String) {
        let response = app
            .clone()
            .oneshot(login_request(&format!("{prefix}/login"), ADMIN_KEY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_owned();
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        let token = json["token"].as_str().unwrap().to_owned();
        (cookie, token)
    }

    #[tokio::test]
    async fn login_issues_session_cookie_and_token() {
        let state = test_state("");
        let store = state.authenticator.store().clone();
        let app = build_router(state, 100);

        let (cookie, token) = log_in(&app, "").await;
        assert!(cookie.starts_with("session="));
        assert_eq!(token.len(), 64);
        assert!(store.verify(&token));
    }

    #[tokio::test]
    async fn login_with_wrong_key_is_rejected() {
        let app = build_router(test_state(""), 100);
        let response = app
            .oneshot(login_request("/login", "wrong"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let json = json_body(response).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn session_cookie_unlocks_protected_route() {
        let app = build_router(test_state(""), 100);
        let (cookie, _token) = log_in(&app, "").await;

        let response = app
            .oneshot(get_request("/admin/health", &[(header::COOKIE, cookie.as_str())]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["authenticated"], true);
    }

    #[tokio::test]
    async fn bearer_token_unlocks_protected_route_without_cookie() {
        let app = build_router(test_state(""), 100);
        let (_cookie, token) = log_in(&app, "").await;

        let bearer = format!("Bearer {token}");
        let response = app
            .clone()
            .oneshot(get_request("/admin/stats", &[(header::AUTHORIZATION, bearer.as_str())]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["active_tokens"], 1);
        assert_eq!(json["sessions"], 1);

        let response = app
            .oneshot(get_request(&format!("/admin/stats?token={token}"), &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unauthenticated_browser_is_redirected_under_prefix() {
        let app = build_router(test_state("app"), 100);
        let response = app
            .oneshot(get_request(
                "/app/admin/health",
                &[(header::ACCEPT, "text/html,application/xhtml+xml")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/app/login");
    }

    #[tokio::test]
    async fn html_path_redirects_without_accept_header() {
        let app = build_router(test_state(""), 100);
        let response = app
            .oneshot(get_request("/admin/html", &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn unauthenticated_json_client_gets_401() {
        let app = build_router(test_state("app"), 100);
        let response = app
            .oneshot(get_request(
                "/app/admin/health",
                &[(header::ACCEPT, "application/json")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["detail"], "Unauthorized");
    }

    #[tokio::test]
    async fn non_redirecting_route_rejects_browsers_with_401() {
        let app = build_router(test_state(""), 100);
        let response = app
            .oneshot(get_request("/admin/stats", &[(header::ACCEPT, "text/html")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::LOCATION).is_none());
    }

    #[tokio::test]
    async fn logout_clears_session_and_revokes_token() {
        let state = test_state("");
        let store = state.authenticator.store().clone();
        let app = build_router(state, 100);
        let (cookie, token) = log_in(&app, "").await;

        let bearer = format!("Bearer {token}");
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/logout")
                    .header(header::COOKIE, cookie.as_str())
                    .header(header::AUTHORIZATION, &bearer)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.contains("Max-Age=0"));
        assert!(!store.verify(&token));

        let response = app
            .oneshot(get_request(
                "/admin/health",
                &[(header::COOKIE, cookie.as_str()), (header::ACCEPT, "application/json")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_without_credentials_succeeds() {
        let app = build_router(test_state(""), 100);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/logout?token=never-issued")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["success"], true);
    }

    #[tokio::test]
    async fn public_routes_stay_at_root_under_prefix() {
        let app = build_router(test_state("app"), 100);

        let response = app
            .clone()
            .oneshot(get_request("/health", &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");

        let response = app
            .clone()
            .oneshot(get_request("/metrics", &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(get_request("/app/login", &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stats_ignore_expired_tokens() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let mut state = test_state("");
        state.authenticator = Authenticator::new(Arc::new(TokenStore::with_clock(
            Duration::from_secs(3600),
            clock.clone(),
        )));
        let store = state.authenticator.store().clone();
        let app = build_router(state, 100);

        store.create();
        clock.advance(Duration::from_secs(1800));
        let (_cookie, token) = log_in(&app, "").await;
        clock.advance(Duration::from_secs(1800));
        assert_eq!(store.len(), 2, "first token expired but not yet purged");

        let bearer = format!("Bearer {token}");
        let response = app
            .oneshot(get_request("/admin/stats", &[(header::AUTHORIZATION, bearer.as_str())]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["active_tokens"], 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn discarded_login_sessions_are_reclaimed_after_ttl() {
        let state = test_state("");
        let sessions = state.sessions.clone();
        let app = build_router(state, 100);

        for _ in 0..50 {
            log_in(&app, "").await;
        }
        assert_eq!(sessions.len().await, 50);

        tokio::time::advance(SESSION_TTL).await;
        log_in(&app, "").await;
        assert_eq!(sessions.len().await, 1);
    }
}
