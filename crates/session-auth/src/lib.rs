//! Dual-mode authentication guard
//!
//! Authenticates HTTP requests through either a server-side session flag
//! (same-origin deployments) or a bearer token (cross-origin deployments),
//! and gates protected routes behind a login requirement. The crate has no
//! dependency on the gateway binary and owns no global state: the token
//! store is constructed once by the host and shared via `Arc`.
//!
//! Request flow:
//! 1. Host session middleware inserts a `Session` into request extensions
//! 2. `extract::extract_token()` pulls a candidate from header or query
//! 3. `Authenticator::is_authenticated()` checks the `TokenStore`, then the session
//! 4. `AccessGuard` (as a tower layer) allows, redirects, or rejects with 401

pub mod codec;
pub mod error;
pub mod extract;
pub mod guard;
pub mod metrics;
pub mod resolver;
pub mod session;
pub mod store;

pub use codec::{generate_secret, generate_token};
pub use error::AuthError;
pub use extract::extract_token;
pub use guard::{AccessGuard, Decision, RequireLogin, RequireLoginLayer};
pub use resolver::Authenticator;
pub use session::{AUTHENTICATED_KEY, Session};
pub use store::{Clock, DEFAULT_TOKEN_TTL, ManualClock, SystemClock, TokenStore};
