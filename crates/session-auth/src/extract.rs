//! Bearer token extraction from inbound requests
//!
//! Transport contract: `Authorization: Bearer <token>` or `?token=<token>`.
//! The header always wins. No cookie or other header is consulted.

use std::collections::HashMap;

use axum::extract::Query;
use axum::http::{HeaderMap, Uri, header};

const BEARER_PREFIX: &str = "Bearer ";
const TOKEN_QUERY_PARAM: &str = "token";

/// Pull zero or one candidate token from the request.
///
/// A header starting with the exact prefix `"Bearer "` yields the remainder,
/// even when empty. Any other `Authorization` value falls through to the
/// `token` query parameter (percent-decoded; the last occurrence wins).
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
    {
        return Some(token.to_owned());
    }

    let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params.remove(TOKEN_QUERY_PARAM)
}
