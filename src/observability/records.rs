//! Dispatch records for the log-analytics pipeline.
//!
//! The engine builds one [`DispatchRecord`] per dispatch and hands it to a
//! [`RecordSink`]. It never stores records itself.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::dispatch::{PolicyTrace, RouteDecision};
use crate::routing::HttpMethod;

/// Structured outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRecord {
    pub timestamp: DateTime<Utc>,
    pub request_id: Option<String>,
    pub method: HttpMethod,
    pub path: String,
    pub route_id: Option<String>,
    /// Policies evaluated, in order.
    pub policies: Vec<PolicyTrace>,
    pub decision: RouteDecision,
    pub latency_us: u64,
}

/// Consumer of dispatch records. Called on the request path; must not block.
pub trait RecordSink: Send + Sync {
    fn emit(&self, record: DispatchRecord);
}

/// Emits each record as a structured `tracing` event on the `dispatch` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn emit(&self, record: DispatchRecord) {
        let policies = serde_json::to_string(&record.policies).unwrap_or_default();
        tracing::info!(
            target: "dispatch",
            timestamp = %record.timestamp.to_rfc3339(),
            request_id = record.request_id.as_deref().unwrap_or("-"),
            method = %record.method,
            path = %record.path,
            route_id = record.route_id.as_deref().unwrap_or("-"),
            decision = record.decision.label(),
            policies = %policies,
            latency_us = record.latency_us,
            "Request dispatched"
        );
    }
}

/// Forwards records to an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DispatchRecord>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RecordSink for ChannelSink {
    fn emit(&self, record: DispatchRecord) {
        if self.tx.send(record).is_err() {
            tracing::trace!("Dispatch record receiver dropped");
        }
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn emit(&self, _record: DispatchRecord) {}
}
