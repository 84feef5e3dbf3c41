//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_dispatch_total` (counter): dispatches by decision
//! - `gateway_dispatch_duration_seconds` (histogram): dispatch latency
//! - `gateway_policy_denials_total` (counter): denials by policy kind, reason
//!   and WAF rule (empty for non-WAF denials)
//! - `gateway_internal_errors_total` (counter): dispatches that hit an internal error
//! - `gateway_rate_limit_evictions_total` (counter): idle buckets dropped
//! - `gateway_config_reloads_total` (counter): reload attempts by outcome
//! - `gateway_routes` / `gateway_policies` (gauges): configured entities
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so the engine and its
//!   tests never depend on the exporter
//! - Labels are low-cardinality: never route ids, paths or client addresses.
//!   WAF rule names come from the fixed built-in rule set

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::dispatch::{DenyReason, PolicyTrace, RouteDecision, Verdict};

/// Install the Prometheus recorder and its scrape listener on `addr`.
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_dispatch(decision: &RouteDecision, latency: Duration) {
    ::metrics::counter!("gateway_dispatch_total", "decision" => decision.label()).increment(1);
    ::metrics::histogram!("gateway_dispatch_duration_seconds").record(latency.as_secs_f64());
}

pub fn record_policy_trace(trace: &[PolicyTrace]) {
    for entry in trace {
        if let Verdict::Denied(reason) = &entry.verdict {
            ::metrics::counter!(
                "gateway_policy_denials_total",
                "kind" => entry.kind.as_str(),
                "reason" => reason.as_str(),
                "rule" => rule_label(reason)
            )
            .increment(1);
        }
    }
}

/// The WAF rule behind a `Blocked` denial, empty for every other reason.
fn rule_label(reason: &DenyReason) -> String {
    match reason {
        DenyReason::Blocked { rule } => rule.clone(),
        _ => String::new(),
    }
}

pub fn record_internal_error() {
    ::metrics::counter!("gateway_internal_errors_total").increment(1);
}

pub fn record_evictions(count: usize) {
    ::metrics::counter!("gateway_rate_limit_evictions_total").increment(count as u64);
}

pub fn record_config_reload(success: bool) {
    let outcome = if success { "applied" } else { "rejected" };
    ::metrics::counter!("gateway_config_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_config_size(routes: usize, policies: usize) {
    ::metrics::gauge!("gateway_routes").set(routes as f64);
    ::metrics::gauge!("gateway_policies").set(policies as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_label_only_for_blocked() {
        let blocked = DenyReason::Blocked {
            rule: "sql-injection".into(),
        };
        assert_eq!(rule_label(&blocked), "sql-injection");
        assert_eq!(rule_label(&DenyReason::Unauthorized), "");
        assert_eq!(rule_label(&DenyReason::RateLimited), "");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let trace = vec![PolicyTrace {
            policy_id: "waf".into(),
            kind: crate::security::PolicyKind::Waf,
            verdict: Verdict::Denied(DenyReason::Blocked { rule: "xss".into() }),
        }];
        record_policy_trace(&trace);
    }
}
