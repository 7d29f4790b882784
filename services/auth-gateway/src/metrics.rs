//! Prometheus metrics exposition
//!
//! Serves the `auth_*` counters emitted by `session_auth` alongside the
//! gateway's own:
//!
//! - `gateway_logins_total` (counter): label `outcome` ("success" / "rejected")
//! - `gateway_active_tokens` (gauge): store size after each background sweep

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// The handle's `render()` method produces the Prometheus text exposition format
/// suitable for serving on a `/metrics` endpoint.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record an admin login attempt.
pub fn record_login(success: bool) {
    let outcome = if success { "success" } else { "rejected" };
    metrics::counter!("gateway_logins_total", "outcome" => outcome).increment(1);
}

pub fn set_active_tokens(count: usize) {
    metrics::gauge!("gateway_active_tokens").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_login(true);
        record_login(false);
        set_active_tokens(3);
    }

    #[test]
    fn record_login_renders_outcome_label() {
        // build_recorder() avoids the process-wide singleton install_recorder() claims
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_login(true);
        record_login(false);
        set_active_tokens(7);

        let output = handle.render();
        assert!(output.contains("gateway_logins_total"), "got: {output}");
        assert!(output.contains("outcome=\"success\""), "got: {output}");
        assert!(output.contains("outcome=\"rejected\""), "got: {output}");
        assert!(output.contains("gateway_active_tokens"), "got: {output}");
    }
}
