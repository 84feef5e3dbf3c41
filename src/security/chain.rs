//! Ordered security policy evaluation.
//!
//! # Responsibilities
//! - Own the configured policies and their compiled rules
//! - Select the enabled policies whose scope matches a request path
//! - Run them in priority order and stop at the first denial
//!
//! # Data Flow
//! ```text
//! evaluate(route, request):
//!     → load PolicySnapshot (one per evaluation)
//!     → enabled && scope.matches(path), sorted by (priority, seq)
//!     → auth → principal
//!     → ratelimit → RateLimiter::allow("{policy}:{client}")
//!     → waf → Blocked { rule }
//!     → cors → annotations
//!     → Allow { annotations } | Deny(reason)
//! ```
//!
//! # Design Decisions
//! - Policies are the other half of the route table's `SnapshotCell`: one
//!   writer lock for both, whole-snapshot swaps
//! - Evaluation lives on `PolicySnapshot`, so the dispatcher can run it
//!   against the same generation it resolved the route from
//! - Disabled policies are filtered before any rule runs, so their limiters
//!   never gain buckets

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::dispatch::{Decision, DenyReason, Evaluation, GatewayRequest, PolicyTrace, Verdict};
use crate::error::{EngineError, EngineResult, Entity, ValidationError};
use crate::routing::{PathPattern, Route, TrailingWildcard};
use crate::security::auth::CredentialVerifier;
use crate::security::policy::{PolicyKind, PolicyRule, SecurityPolicy};
use crate::security::rate_limit::RateLimiter;
use crate::snapshot::SnapshotCell;

/// Default idle period before a rate-limit bucket is evicted.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(300);

/// A validated policy with its compiled scope and rule.
#[derive(Debug)]
pub struct CompiledPolicy {
    pub policy: SecurityPolicy,
    pub scope: PathPattern,
    pub rule: PolicyRule,
    /// Insertion order. Breaks priority ties.
    pub seq: u64,
}

impl CompiledPolicy {
    pub fn compile(
        policy: SecurityPolicy,
        seq: u64,
        trailing: TrailingWildcard,
        idle_ttl: Duration,
        previous: Option<&PolicyRule>,
    ) -> Result<Self, ValidationError> {
        if policy.id.trim().is_empty() {
            return Err(ValidationError::new("id", "must not be empty"));
        }
        let scope = PathPattern::compile_with(&policy.scope, trailing)
            .map_err(|e| ValidationError::new("scope", e))?;
        let rule = PolicyRule::compile(policy.kind, &policy.config, idle_ttl, previous)
            .map_err(|e| ValidationError::new("config", e))?;
        Ok(Self {
            policy,
            scope,
            rule,
            seq,
        })
    }
}

/// Immutable view of the policy set, kept in evaluation order.
#[derive(Debug, Default)]
pub struct PolicySnapshot {
    policies: Vec<Arc<CompiledPolicy>>,
}

impl PolicySnapshot {
    pub(crate) fn new(mut policies: Vec<Arc<CompiledPolicy>>) -> Self {
        policies.sort_by_key(|p| (p.policy.priority, p.seq));
        Self { policies }
    }

    /// Enabled policies scoped to `path`, in evaluation order.
    pub fn applicable<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Arc<CompiledPolicy>> + 'a {
        self.policies
            .iter()
            .filter(move |p| p.policy.enabled && p.scope.matches(path))
    }

    pub fn policies(&self) -> impl Iterator<Item = &SecurityPolicy> {
        self.policies.iter().map(|p| &p.policy)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Live buckets across every rate-limit policy.
    pub fn rate_limit_buckets(&self) -> usize {
        self.policies
            .iter()
            .filter_map(|p| p.rule.limiter())
            .map(|limiter| limiter.len())
            .sum()
    }

    fn find(&self, id: &str) -> Option<&Arc<CompiledPolicy>> {
        self.policies.iter().find(|p| p.policy.id == id)
    }

    /// Run the applicable policies in order, stopping at the first denial.
    pub fn evaluate(
        &self,
        verifier: &dyn CredentialVerifier,
        route: &Route,
        request: &GatewayRequest,
        now: Instant,
    ) -> Evaluation {
        let mut annotations = Vec::new();
        let mut trace = Vec::new();
        let mut principal: Option<String> = None;

        for compiled in self.applicable(&request.path) {
            let policy = &compiled.policy;
            let outcome = match &compiled.rule {
                PolicyRule::Auth(auth) => {
                    let verified = auth
                        .credential(&request.context)
                        .and_then(|credential| verifier.verify(&auth.issuer, credential));
                    match verified {
                        Some(subject) => {
                            principal = Some(subject);
                            Ok(Verdict::Passed)
                        }
                        None => Err(DenyReason::Unauthorized),
                    }
                }
                PolicyRule::RateLimit(limiter) => {
                    let key = rate_limit_key(&policy.id, principal.as_deref(), request);
                    if limiter.allow(&key, now) {
                        Ok(Verdict::Passed)
                    } else {
                        Err(DenyReason::RateLimited)
                    }
                }
                PolicyRule::Waf(waf) => match waf.inspect(request) {
                    Some(rule) => Err(DenyReason::Blocked {
                        rule: rule.name().to_string(),
                    }),
                    None => Ok(Verdict::Passed),
                },
                PolicyRule::Cors(cors) => {
                    annotations.extend(cors.annotations(&request.context));
                    Ok(Verdict::Annotated)
                }
            };

            match outcome {
                Ok(verdict) => trace.push(PolicyTrace {
                    policy_id: policy.id.clone(),
                    kind: policy.kind,
                    verdict,
                }),
                Err(reason) => {
                    tracing::debug!(
                        route_id = %route.id,
                        policy_id = %policy.id,
                        kind = %policy.kind,
                        reason = %reason,
                        "Policy denied request"
                    );
                    trace.push(PolicyTrace {
                        policy_id: policy.id.clone(),
                        kind: policy.kind,
                        verdict: Verdict::Denied(reason.clone()),
                    });
                    return Evaluation {
                        decision: Decision::Deny(reason),
                        trace,
                    };
                }
            }
        }

        Evaluation {
            decision: Decision::Allow { annotations },
            trace,
        }
    }

    /// Compile a replacement policy set. Limiters of policies that keep their
    /// id and quota carry over from this snapshot.
    pub fn rebuild(
        &self,
        policies: Vec<SecurityPolicy>,
        trailing: TrailingWildcard,
        idle_ttl: Duration,
    ) -> Result<PolicySnapshot, Vec<ValidationError>> {
        let compiled = compile_all(policies, trailing, idle_ttl, |id| self.find(id).map(|p| &p.rule))?;
        Ok(PolicySnapshot::new(compiled))
    }
}

/// Filter for policy listings. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PolicyFilter {
    pub kind: Option<PolicyKind>,
    /// Case-insensitive substring of the scope pattern.
    pub scope: Option<String>,
}

impl PolicyFilter {
    pub fn matches(&self, policy: &SecurityPolicy) -> bool {
        if self.kind.is_some_and(|kind| kind != policy.kind) {
            return false;
        }
        match &self.scope {
            Some(needle) if !needle.is_empty() => policy
                .scope
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub total: usize,
    pub enabled: usize,
}

/// Policy counts, overall and per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PolicyStats {
    pub total: usize,
    pub enabled: usize,
    pub by_kind: BTreeMap<String, KindStats>,
}

/// Concurrent policy store and evaluator.
pub struct PolicyChain {
    cell: Arc<SnapshotCell>,
    verifier: Arc<dyn CredentialVerifier>,
    trailing: TrailingWildcard,
    idle_ttl: Duration,
}

impl PolicyChain {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        trailing: TrailingWildcard,
        idle_ttl: Duration,
    ) -> Self {
        Self::with_cell(Arc::new(SnapshotCell::new()), verifier, trailing, idle_ttl)
    }

    /// A chain publishing into `cell`, next to whatever else shares it.
    pub fn with_cell(
        cell: Arc<SnapshotCell>,
        verifier: Arc<dyn CredentialVerifier>,
        trailing: TrailingWildcard,
        idle_ttl: Duration,
    ) -> Self {
        Self {
            cell,
            verifier,
            trailing,
            idle_ttl,
        }
    }

    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.cell.load().policies.clone()
    }

    pub fn evaluate(&self, route: &Route, request: &GatewayRequest) -> Evaluation {
        self.evaluate_at(&self.snapshot(), route, request, Instant::now())
    }

    /// Evaluate against a given snapshot and clock reading.
    pub fn evaluate_at(
        &self,
        snapshot: &PolicySnapshot,
        route: &Route,
        request: &GatewayRequest,
        now: Instant,
    ) -> Evaluation {
        snapshot.evaluate(self.verifier.as_ref(), route, request, now)
    }

    pub fn get(&self, id: &str) -> Option<SecurityPolicy> {
        self.snapshot().find(id).map(|p| p.policy.clone())
    }

    /// Policies matching `filter`, in evaluation order.
    pub fn list(&self, filter: &PolicyFilter) -> Vec<SecurityPolicy> {
        self.snapshot()
            .policies()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The limiter behind a rate-limit policy.
    pub fn limiter(&self, id: &str) -> Option<Arc<RateLimiter>> {
        self.snapshot().find(id)?.rule.limiter().cloned()
    }

    pub fn stats(&self) -> PolicyStats {
        let mut stats = PolicyStats::default();
        for kind in PolicyKind::ALL {
            stats.by_kind.insert(kind.to_string(), KindStats::default());
        }
        for policy in self.snapshot().policies() {
            let entry = stats.by_kind.entry(policy.kind.to_string()).or_default();
            entry.total += 1;
            stats.total += 1;
            if policy.enabled {
                entry.enabled += 1;
                stats.enabled += 1;
            }
        }
        stats
    }

    /// Drop idle buckets from every limiter. Returns how many were removed.
    pub fn evict_idle(&self, now: Instant) -> usize {
        self.snapshot()
            .policies
            .iter()
            .filter_map(|p| p.rule.limiter())
            .map(|limiter| limiter.evict_idle(now))
            .sum()
    }

    /// Add a new policy. Fails if the id is taken.
    pub fn insert(&self, policy: SecurityPolicy) -> EngineResult<SecurityPolicy> {
        self.mutate(|policies, next_seq, chain| {
            if policies.iter().any(|p| p.policy.id == policy.id) {
                return Err(ValidationError::new(
                    "id",
                    format!("policy '{}' already exists", policy.id),
                )
                .into());
            }
            chain.push_new(policies, next_seq, policy)
        })
    }

    /// Replace an existing policy, keeping its insertion order. An unchanged
    /// rate-limit quota keeps its buckets.
    pub fn update(&self, policy: SecurityPolicy) -> EngineResult<SecurityPolicy> {
        self.mutate(|policies, _, chain| {
            let pos = policies
                .iter()
                .position(|p| p.policy.id == policy.id)
                .ok_or_else(|| EngineError::not_found(Entity::Policy, &policy.id))?;
            chain.replace_at(policies, pos, policy)
        })
    }

    /// Update when present, insert otherwise, under one writer lock.
    pub fn upsert(&self, policy: SecurityPolicy) -> EngineResult<SecurityPolicy> {
        self.mutate(|policies, next_seq, chain| {
            match policies.iter().position(|p| p.policy.id == policy.id) {
                Some(pos) => chain.replace_at(policies, pos, policy),
                None => chain.push_new(policies, next_seq, policy),
            }
        })
    }

    pub fn remove(&self, id: &str) -> EngineResult<SecurityPolicy> {
        self.mutate(|policies, _, _| {
            let pos = policies
                .iter()
                .position(|p| p.policy.id == id)
                .ok_or_else(|| EngineError::not_found(Entity::Policy, id))?;
            Ok(policies.remove(pos).policy.clone())
        })
    }

    /// Toggle a policy. The compiled rule, limiter included, is carried over.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> EngineResult<SecurityPolicy> {
        self.mutate(|policies, _, _| {
            let pos = policies
                .iter()
                .position(|p| p.policy.id == id)
                .ok_or_else(|| EngineError::not_found(Entity::Policy, id))?;
            let existing = &policies[pos];
            let mut policy = existing.policy.clone();
            policy.enabled = enabled;
            let stored = policy.clone();
            policies[pos] = Arc::new(CompiledPolicy {
                policy,
                scope: existing.scope.clone(),
                rule: existing.rule.clone(),
                seq: existing.seq,
            });
            Ok(stored)
        })
    }

    /// Swap in a whole new policy set. Nothing is applied unless every policy
    /// compiles. Limiters of policies that keep their id and quota survive.
    pub fn replace_all(&self, policies: Vec<SecurityPolicy>) -> Result<(), Vec<ValidationError>> {
        self.cell.publish(|current, seq| {
            let next = current.policies.rebuild(policies, self.trailing, self.idle_ttl)?;
            seq.policies = next.len() as u64;
            Ok((current.with_policies(next), ()))
        })
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Vec<Arc<CompiledPolicy>>, &mut u64, &Self) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.cell.publish(|current, seq| {
            let mut policies = current.policies.policies.clone();
            let result = f(&mut policies, &mut seq.policies, self)?;
            Ok((current.with_policies(PolicySnapshot::new(policies)), result))
        })
    }

    fn push_new(
        &self,
        policies: &mut Vec<Arc<CompiledPolicy>>,
        next_seq: &mut u64,
        policy: SecurityPolicy,
    ) -> EngineResult<SecurityPolicy> {
        let compiled = CompiledPolicy::compile(policy, *next_seq, self.trailing, self.idle_ttl, None)?;
        *next_seq += 1;
        let stored = compiled.policy.clone();
        policies.push(Arc::new(compiled));
        Ok(stored)
    }

    fn replace_at(
        &self,
        policies: &mut [Arc<CompiledPolicy>],
        pos: usize,
        policy: SecurityPolicy,
    ) -> EngineResult<SecurityPolicy> {
        let existing = &policies[pos];
        let compiled = CompiledPolicy::compile(
            policy,
            existing.seq,
            self.trailing,
            self.idle_ttl,
            Some(&existing.rule),
        )?;
        let stored = compiled.policy.clone();
        policies[pos] = Arc::new(compiled);
        Ok(stored)
    }
}

impl std::fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyChain")
            .field("policies", &self.len())
            .field("trailing", &self.trailing)
            .field("idle_ttl", &self.idle_ttl)
            .finish()
    }
}

/// Validate a full policy set, collecting every error. Insertion order is
/// input order.
pub fn compile_all<'a>(
    policies: Vec<SecurityPolicy>,
    trailing: TrailingWildcard,
    idle_ttl: Duration,
    previous: impl Fn(&str) -> Option<&'a PolicyRule>,
) -> Result<Vec<Arc<CompiledPolicy>>, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut compiled = Vec::with_capacity(policies.len());

    for (i, policy) in policies.into_iter().enumerate() {
        let parent = format!("policies[{i}]");
        if !seen.insert(policy.id.clone()) {
            errors.push(
                ValidationError::new("id", format!("duplicate policy id '{}'", policy.id)).within(&parent),
            );
            continue;
        }
        let prior = previous(&policy.id);
        match CompiledPolicy::compile(policy, i as u64, trailing, idle_ttl, prior) {
            Ok(policy) => compiled.push(Arc::new(policy)),
            Err(e) => errors.push(e.within(&parent)),
        }
    }

    if errors.is_empty() {
        Ok(compiled)
    } else {
        Err(errors)
    }
}

/// `"{policy_id}:{client}"`, where client is the authenticated principal,
/// else the client IP, else `anonymous`.
fn rate_limit_key(policy_id: &str, principal: Option<&str>, request: &GatewayRequest) -> String {
    match (principal, request.client_ip) {
        (Some(principal), _) => format!("{policy_id}:{principal}"),
        (None, Some(ip)) => format!("{policy_id}:{ip}"),
        (None, None) => format!("{policy_id}:anonymous"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{HttpMethod, MethodSet};
    use crate::security::auth::StaticVerifier;

    fn chain() -> PolicyChain {
        let verifier = StaticVerifier::new().with_token("auth-server", "good-token", "alice");
        PolicyChain::new(Arc::new(verifier), TrailingWildcard::default(), DEFAULT_IDLE_TTL)
    }

    fn route() -> Route {
        Route::new("/api/payment/**", MethodSet::All, "lb://payment").with_id("pay")
    }

    fn request() -> GatewayRequest {
        GatewayRequest::new(HttpMethod::Post, "/api/payment/checkout")
            .client_ip("10.0.0.1".parse().unwrap())
    }

    fn authed() -> GatewayRequest {
        request().header("Authorization", "Bearer good-token")
    }

    #[test]
    fn test_no_policies_allows() {
        let eval = chain().evaluate(&route(), &request());
        assert_eq!(eval.decision, Decision::Allow { annotations: vec![] });
        assert!(eval.trace.is_empty());
    }

    #[test]
    fn test_auth_denial_short_circuits_rate_limit() {
        let chain = chain();
        chain
            .insert(SecurityPolicy::new(PolicyKind::Auth, "/api/**", "issuer=auth-server").with_id("jwt").with_priority(1))
            .unwrap();
        chain
            .insert(SecurityPolicy::new(PolicyKind::RateLimit, "/api/payment/**", "10req/s").with_id("rl").with_priority(2))
            .unwrap();

        let eval = chain.evaluate(&route(), &request());
        assert_eq!(eval.decision, Decision::Deny(DenyReason::Unauthorized));
        assert_eq!(eval.trace.len(), 1);

        let limiter = chain.limiter("rl").unwrap();
        assert_eq!(limiter.calls(), 0);
        assert!(limiter.is_empty());

        let eval = chain.evaluate(&route(), &authed());
        assert!(eval.decision.is_allow());
        assert_eq!(limiter.calls(), 1);
    }

    #[test]
    fn test_rate_limit_keyed_by_principal_or_ip() {
        let chain = chain();
        chain
            .insert(SecurityPolicy::new(PolicyKind::Auth, "/api/**", "issuer=auth-server").with_id("jwt"))
            .unwrap();
        chain
            .insert(SecurityPolicy::new(PolicyKind::RateLimit, "/api/**", "1req/s").with_id("rl").with_priority(1))
            .unwrap();

        let now = Instant::now();
        let snapshot = chain.snapshot();
        let first = chain.evaluate_at(&snapshot, &route(), &authed(), now);
        assert!(first.decision.is_allow());
        let second = chain.evaluate_at(&snapshot, &route(), &authed(), now);
        assert_eq!(second.decision, Decision::Deny(DenyReason::RateLimited));

        let limiter = chain.limiter("rl").unwrap();
        assert_eq!(limiter.len(), 1);
        assert_eq!(rate_limit_key("rl", None, &request()), "rl:10.0.0.1");
        assert_eq!(
            rate_limit_key("rl", None, &GatewayRequest::new(HttpMethod::Get, "/")),
            "rl:anonymous"
        );
    }

    #[test]
    fn test_priority_then_insertion_order() {
        let chain = chain();
        chain
            .insert(SecurityPolicy::new(PolicyKind::Cors, "/**", "allow-origin=*").with_id("late").with_priority(5))
            .unwrap();
        chain
            .insert(SecurityPolicy::new(PolicyKind::Waf, "/**", "block-xss").with_id("first").with_priority(1))
            .unwrap();
        chain
            .insert(SecurityPolicy::new(PolicyKind::Waf, "/**", "block-sql-injection").with_id("second").with_priority(1))
            .unwrap();

        let eval = chain.evaluate(&route(), &request());
        let order: Vec<_> = eval.trace.iter().map(|t| t.policy_id.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "late"]);
        assert_eq!(eval.trace[2].verdict, Verdict::Annotated);
        assert_eq!(
            eval.decision,
            Decision::Allow {
                annotations: vec![("access-control-allow-origin".into(), "*".into())]
            }
        );
    }

    #[test]
    fn test_waf_blocks_with_rule_name() {
        let chain = chain();
        chain
            .insert(SecurityPolicy::new(PolicyKind::Waf, "/api/**", "block-sql-injection").with_id("waf"))
            .unwrap();
        let req = request().query_string("id=1'%20or%201=1");
        let eval = chain.evaluate(&route(), &req);
        assert_eq!(
            eval.decision,
            Decision::Deny(DenyReason::Blocked {
                rule: "sql-injection".into()
            })
        );
    }

    #[test]
    fn test_out_of_scope_and_disabled_policies_skipped() {
        let chain = chain();
        chain
            .insert(SecurityPolicy::new(PolicyKind::Auth, "/admin/**", "issuer=auth-server").with_id("admin"))
            .unwrap();
        chain
            .insert(SecurityPolicy::new(PolicyKind::RateLimit, "/api/**", "1req/s").with_id("rl").disabled())
            .unwrap();

        for _ in 0..3 {
            assert!(chain.evaluate(&route(), &request()).decision.is_allow());
        }
        let limiter = chain.limiter("rl").unwrap();
        assert_eq!(limiter.calls(), 0);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_disable_applies_to_next_evaluation_only() {
        let chain = chain();
        chain
            .insert(SecurityPolicy::new(PolicyKind::Auth, "/api/**", "issuer=auth-server").with_id("jwt"))
            .unwrap();

        let in_flight = chain.snapshot();
        chain.set_enabled("jwt", false).unwrap();

        let old = chain.evaluate_at(&in_flight, &route(), &request(), Instant::now());
        assert_eq!(old.decision, Decision::Deny(DenyReason::Unauthorized));
        assert!(chain.evaluate(&route(), &request()).decision.is_allow());
    }

    #[test]
    fn test_toggle_and_same_quota_update_keep_limiter() {
        let chain = chain();
        chain
            .insert(SecurityPolicy::new(PolicyKind::RateLimit, "/api/**", "5req/s").with_id("rl"))
            .unwrap();
        let before = chain.limiter("rl").unwrap();

        chain.set_enabled("rl", false).unwrap();
        chain.set_enabled("rl", true).unwrap();
        assert!(Arc::ptr_eq(&before, &chain.limiter("rl").unwrap()));

        let renamed = chain.get("rl").unwrap().with_name("payments");
        chain.update(renamed).unwrap();
        assert!(Arc::ptr_eq(&before, &chain.limiter("rl").unwrap()));

        let mut faster = chain.get("rl").unwrap();
        faster.config = "50req/s".into();
        chain.update(faster).unwrap();
        assert!(!Arc::ptr_eq(&before, &chain.limiter("rl").unwrap()));
    }

    #[test]
    fn test_concurrent_upserts_of_new_id_all_succeed() {
        let chain = Arc::new(chain());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let chain = chain.clone();
                std::thread::spawn(move || {
                    chain.upsert(SecurityPolicy::new(PolicyKind::Waf, "/**", "block-xss").with_id("same"))
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_mutation_errors() {
        let chain = chain();
        chain
            .insert(SecurityPolicy::new(PolicyKind::Cors, "/**", "allow-origin=*").with_id("cors"))
            .unwrap();

        let dup = chain.insert(SecurityPolicy::new(PolicyKind::Cors, "/**", "allow-origin=*").with_id("cors"));
        assert!(matches!(dup, Err(EngineError::Validation(e)) if e.field == "id"));

        let bad_scope = chain.insert(SecurityPolicy::new(PolicyKind::Waf, "api/**", "block-xss"));
        assert!(matches!(bad_scope, Err(EngineError::Validation(e)) if e.field == "scope"));

        let bad_config = chain.insert(SecurityPolicy::new(PolicyKind::RateLimit, "/**", "lots"));
        assert!(matches!(bad_config, Err(EngineError::Validation(e)) if e.field == "config"));

        assert!(matches!(chain.remove("missing"), Err(EngineError::NotFound { .. })));
        assert!(matches!(chain.set_enabled("missing", true), Err(EngineError::NotFound { .. })));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_list_filter_and_stats() {
        let chain = chain();
        chain
            .insert(SecurityPolicy::new(PolicyKind::Auth, "/api/**", "issuer=auth-server").with_id("a"))
            .unwrap();
        chain
            .insert(SecurityPolicy::new(PolicyKind::RateLimit, "/api/Payment/**", "10req/s").with_id("b").disabled())
            .unwrap();
        chain
            .insert(SecurityPolicy::new(PolicyKind::Waf, "/web/**", "block-xss").with_id("c"))
            .unwrap();

        let payment = PolicyFilter {
            kind: None,
            scope: Some("payment".into()),
        };
        let ids: Vec<_> = chain.list(&payment).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["b"]);

        let waf = PolicyFilter {
            kind: Some(PolicyKind::Waf),
            scope: None,
        };
        assert_eq!(chain.list(&waf).len(), 1);
        assert_eq!(chain.list(&PolicyFilter::default()).len(), 3);

        let stats = chain.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.enabled, 2);
        assert_eq!(stats.by_kind["ratelimit"], KindStats { total: 1, enabled: 0 });
        assert_eq!(stats.by_kind["cors"], KindStats::default());
    }

    #[test]
    fn test_replace_all_is_atomic() {
        let chain = chain();
        chain
            .insert(SecurityPolicy::new(PolicyKind::RateLimit, "/api/**", "5req/s").with_id("rl"))
            .unwrap();
        let limiter = chain.limiter("rl").unwrap();

        let errors = chain
            .replace_all(vec![
                SecurityPolicy::new(PolicyKind::Waf, "/**", "block-nothing").with_id("x"),
                SecurityPolicy::new(PolicyKind::Waf, "//", "block-xss").with_id("y"),
            ])
            .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "policies[0].config");
        assert_eq!(errors[1].field, "policies[1].scope");
        assert_eq!(chain.len(), 1);

        chain
            .replace_all(vec![
                SecurityPolicy::new(PolicyKind::Cors, "/**", "allow-origin=*").with_id("cors"),
                SecurityPolicy::new(PolicyKind::RateLimit, "/api/**", "5req/s").with_id("rl"),
            ])
            .unwrap();
        assert_eq!(chain.len(), 2);
        assert!(Arc::ptr_eq(&limiter, &chain.limiter("rl").unwrap()));
    }

    #[test]
    fn test_evict_idle_sweeps_all_limiters() {
        let chain = PolicyChain::new(
            Arc::new(StaticVerifier::new()),
            TrailingWildcard::default(),
            Duration::from_secs(1),
        );
        chain
            .insert(SecurityPolicy::new(PolicyKind::RateLimit, "/**", "5req/s").with_id("rl"))
            .unwrap();

        let start = Instant::now();
        let snapshot = chain.snapshot();
        chain.evaluate_at(&snapshot, &route(), &request(), start);
        assert_eq!(chain.evict_idle(start), 0);
        assert_eq!(chain.evict_idle(start + Duration::from_secs(2)), 1);
    }
}
