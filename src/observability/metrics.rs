//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_http_responses_total` (counter): responses by status
//! - `gateway_sessions_active` (gauge): upgraded sessions currently open
//! - `gateway_commands_total` (counter): channel commands by command, result
//! - `gateway_broadcasts_total` (counter): broadcast frames queued
//! - `gateway_broadcasts_dropped_total` (counter): broadcast frames dropped on a full session queue
//! - `gateway_quote_fetch_duration_seconds` (histogram): upstream latency
//! - `gateway_quote_fetch_failures_total` (counter): upstream failures by reason
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library code
//!   and tests can call these helpers unconditionally
//! - Prometheus exposition runs on its own listener, separate from the
//!   public port

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const HTTP_RESPONSES_TOTAL: &str = "gateway_http_responses_total";
pub const SESSIONS_ACTIVE: &str = "gateway_sessions_active";
pub const COMMANDS_TOTAL: &str = "gateway_commands_total";
pub const BROADCASTS_TOTAL: &str = "gateway_broadcasts_total";
pub const BROADCASTS_DROPPED_TOTAL: &str = "gateway_broadcasts_dropped_total";
pub const QUOTE_FETCH_DURATION_SECONDS: &str = "gateway_quote_fetch_duration_seconds";
pub const QUOTE_FETCH_FAILURES_TOTAL: &str = "gateway_quote_fetch_failures_total";

/// Install the global Prometheus recorder with an HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_http_response(status: u16) {
    metrics::counter!(HTTP_RESPONSES_TOTAL, "status" => status.to_string()).increment(1);
}

pub fn record_command(command: &'static str, recognized: bool) {
    let result = if recognized { "success" } else { "unrecognized" };
    metrics::counter!(COMMANDS_TOTAL, "command" => command, "result" => result).increment(1);
}

pub fn record_broadcast(sessions: usize) {
    metrics::counter!(BROADCASTS_TOTAL).increment(sessions as u64);
}

pub fn record_broadcast_dropped() {
    metrics::counter!(BROADCASTS_DROPPED_TOTAL).increment(1);
}

pub fn record_quote_fetch(started: Instant) {
    metrics::histogram!(QUOTE_FETCH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

pub fn record_quote_fetch_failure(reason: &'static str) {
    metrics::counter!(QUOTE_FETCH_FAILURES_TOTAL, "reason" => reason).increment(1);
}

pub fn session_opened() {
    metrics::gauge!(SESSIONS_ACTIVE).increment(1.0);
}

pub fn session_closed() {
    metrics::gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_harmless() {
        record_http_response(200);
        record_command("add", true);
        record_broadcast(3);
        record_broadcast_dropped();
        record_quote_fetch(Instant::now());
        record_quote_fetch_failure("timeout");
        session_opened();
        session_closed();
    }

    #[test]
    fn local_recorder_renders_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            record_command("remove", true);
            record_http_response(404);
        });
        let output = handle.render();
        assert!(output.contains(COMMANDS_TOTAL));
        assert!(output.contains(r#"status="404""#));
    }

    #[test]
    fn metric_names_are_snake_case() {
        for name in [
            HTTP_RESPONSES_TOTAL,
            SESSIONS_ACTIVE,
            COMMANDS_TOTAL,
            BROADCASTS_TOTAL,
            BROADCASTS_DROPPED_TOTAL,
            QUOTE_FETCH_DURATION_SECONDS,
            QUOTE_FETCH_FAILURES_TOTAL,
        ] {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{name}");
        }
    }
}
