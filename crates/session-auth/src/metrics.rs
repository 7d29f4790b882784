//! Auth counters emitted through the `metrics` facade
//!
//! - `auth_tokens_issued_total` (counter)
//! - `auth_tokens_revoked_total` (counter)
//! - `auth_tokens_expired_total` (counter): lazy expiry and sweeps combined
//! - `auth_guard_decisions_total` (counter): label `decision`
//!
//! Without an installed recorder these calls are no-ops.

pub fn record_token_issued() {
    metrics::counter!("auth_tokens_issued_total").increment(1);
}

pub fn record_token_revoked() {
    metrics::counter!("auth_tokens_revoked_total").increment(1);
}

pub fn record_tokens_expired(count: usize) {
    if count > 0 {
        metrics::counter!("auth_tokens_expired_total").increment(count as u64);
    }
}

/// `decision` is one of "allow", "redirect", "deny".
pub fn record_guard_decision(decision: &'static str) {
    metrics::counter!("auth_guard_decisions_total", "decision" => decision).increment(1);
}
