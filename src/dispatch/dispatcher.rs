//! Per-request entry point.
//!
//! # Data Flow
//! ```text
//! GatewayRequest
//!     → SnapshotCell::load (routes and policies of one generation)
//!     → RouteSnapshot::resolve
//!         → none: Deny(NotFound), policies never run
//!     → PolicySnapshot::evaluate
//!         → Allow: Forward { route_id, target, annotations }
//!         → Deny(reason)
//!     → metrics + DispatchRecord → RecordSink
//! ```
//!
//! # Design Decisions
//! - Stateless beyond the shared snapshot cell
//! - A panic inside resolution or evaluation becomes `Deny(Internal)`; the
//!   caller's loop keeps running and nothing is ever allowed by accident

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::dispatch::{Decision, DenyReason, GatewayRequest, PolicyTrace, RouteDecision};
use crate::observability::metrics;
use crate::observability::{DispatchRecord, RecordSink};
use crate::security::CredentialVerifier;
use crate::snapshot::SnapshotCell;

pub struct Dispatcher {
    engine: Arc<SnapshotCell>,
    verifier: Arc<dyn CredentialVerifier>,
    sink: Arc<dyn RecordSink>,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<SnapshotCell>,
        verifier: Arc<dyn CredentialVerifier>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            engine,
            verifier,
            sink,
        }
    }

    /// Decide what happens to `request`.
    pub fn dispatch(&self, request: &GatewayRequest) -> RouteDecision {
        let started = Instant::now();

        let outcome = catch_unwind(AssertUnwindSafe(|| self.decide(request)));
        let (route_id, trace, decision) = match outcome {
            Ok(outcome) => outcome,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::error!(
                    request_id = request.request_id.as_deref().unwrap_or("-"),
                    method = %request.method,
                    path = %request.path,
                    query = request.raw_query.as_deref().unwrap_or(""),
                    panic = %detail,
                    "Internal error during dispatch, denying request"
                );
                metrics::record_internal_error();
                (None, Vec::new(), RouteDecision::deny(DenyReason::Internal))
            }
        };

        let latency = started.elapsed();
        metrics::record_dispatch(&decision, latency);
        metrics::record_policy_trace(&trace);

        self.sink.emit(DispatchRecord {
            timestamp: Utc::now(),
            request_id: request.request_id.clone(),
            method: request.method,
            path: request.path.clone(),
            route_id,
            policies: trace,
            decision: decision.clone(),
            latency_us: u64::try_from(latency.as_micros()).unwrap_or(u64::MAX),
        });

        decision
    }

    fn decide(&self, request: &GatewayRequest) -> (Option<String>, Vec<PolicyTrace>, RouteDecision) {
        let engine = self.engine.load();
        let Some(route) = engine
            .routes
            .resolve(request.method, &request.path, &request.context)
        else {
            tracing::debug!(method = %request.method, path = %request.path, "No route matched");
            return (None, Vec::new(), RouteDecision::deny(DenyReason::NotFound));
        };

        let evaluation =
            engine
                .policies
                .evaluate(self.verifier.as_ref(), &route.route, request, Instant::now());
        let decision = match evaluation.decision {
            Decision::Allow { annotations } => RouteDecision::Forward {
                route_id: route.route.id.clone(),
                target: route.route.target.clone(),
                annotations,
            },
            Decision::Deny(reason) => RouteDecision::deny(reason),
        };
        (Some(route.route.id.clone()), evaluation.trace, decision)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let engine = self.engine.load();
        f.debug_struct("Dispatcher")
            .field("routes", &engine.routes.len())
            .field("policies", &engine.policies.len())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
