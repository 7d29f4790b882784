//! Error types for request authentication

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// The single domain error: no valid session or token.
///
/// Never retried. The guard either turns it into a login redirect or
/// surfaces it as a 401.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthorized,
}

impl AuthError {
    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            serde_json::json!({ "detail": self.to_string() }).to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_displays_plain_message() {
        assert_eq!(AuthError::Unauthorized.to_string(), "Unauthorized");
        assert_eq!(
            AuthError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn unauthorized_renders_401_json() {
        let response = AuthError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "application/json"
        );
        let body = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "Unauthorized");
    }
}
