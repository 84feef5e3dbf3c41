//! Decisions produced by policy evaluation and dispatch.

use std::fmt;

use serde::Serialize;

use crate::security::PolicyKind;

/// Why a request was rejected. These are routine outcomes, not faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// No route matched.
    NotFound,
    Unauthorized,
    RateLimited,
    /// A WAF rule matched.
    Blocked { rule: String },
    /// Engine invariant violation. Always denies.
    Internal,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NotFound => "not_found",
            DenyReason::Unauthorized => "unauthorized",
            DenyReason::RateLimited => "rate_limited",
            DenyReason::Blocked { .. } => "blocked",
            DenyReason::Internal => "internal",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Blocked { rule } => write!(f, "blocked ({rule})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Response headers accumulated by annotating policies, in order.
pub type Annotations = Vec<(String, String)>;

/// Outcome of the policy chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow { annotations: Annotations },
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// What one policy did to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Annotated,
    Denied(DenyReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyTrace {
    pub policy_id: String,
    pub kind: PolicyKind,
    pub verdict: Verdict,
}

/// Policy chain result: the decision plus every policy evaluated, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    pub trace: Vec<PolicyTrace>,
}

/// Final verdict returned by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RouteDecision {
    Forward {
        route_id: String,
        target: String,
        annotations: Annotations,
    },
    Deny {
        reason: DenyReason,
    },
}

impl RouteDecision {
    pub fn deny(reason: DenyReason) -> Self {
        RouteDecision::Deny { reason }
    }

    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            RouteDecision::Deny { reason } => Some(reason),
            RouteDecision::Forward { .. } => None,
        }
    }

    /// Short label for logs and metrics: `forward` or the deny reason.
    pub fn label(&self) -> &'static str {
        match self {
            RouteDecision::Forward { .. } => "forward",
            RouteDecision::Deny { reason } => reason.as_str(),
        }
    }
}
