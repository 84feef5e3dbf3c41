//! Gateway facade.
//!
//! # Responsibilities
//! - Own one snapshot cell, the route table and policy chain writing into it
//!   and the dispatcher reading from it
//! - Expose configuration mutations, queries and the runtime entry point
//!
//! # Design Decisions
//! - No process-wide state: independent gateways (e.g. one per tenant) can
//!   live side by side
//! - Bulk replacement validates routes and policies together and publishes
//!   both halves in one store, or neither
//! - Issuers are fixed at construction; a reload that changes them is
//!   reported, not applied

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::GatewayConfig;
use crate::dispatch::{Dispatcher, GatewayRequest, RequestContext, RouteDecision};
use crate::error::{EngineResult, ValidationError};
use crate::observability::metrics;
use crate::observability::RecordSink;
use crate::routing::{table, Explanation, HttpMethod, Route, RouteSnapshot, RouteTable, TrailingWildcard};
use crate::security::{
    CredentialVerifier, PolicyChain, PolicyFilter, PolicyStats, SecurityPolicy, StaticVerifier,
};
use crate::snapshot::{EngineSnapshot, SnapshotCell};

/// Point-in-time counts for status endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub routes: usize,
    pub enabled_routes: usize,
    pub policies: usize,
    pub enabled_policies: usize,
    pub rate_limit_buckets: usize,
}

pub struct Gateway {
    engine: Arc<SnapshotCell>,
    routes: Arc<RouteTable>,
    policies: Arc<PolicyChain>,
    dispatcher: Dispatcher,
    trailing: TrailingWildcard,
    idle_ttl: Duration,
}

impl Gateway {
    pub fn new(
        trailing: TrailingWildcard,
        idle_ttl: Duration,
        verifier: Arc<dyn CredentialVerifier>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let engine = Arc::new(SnapshotCell::new());
        let routes = Arc::new(RouteTable::with_cell(engine.clone(), trailing));
        let policies = Arc::new(PolicyChain::with_cell(engine.clone(), verifier.clone(), trailing, idle_ttl));
        let dispatcher = Dispatcher::new(engine.clone(), verifier, sink);
        Self {
            engine,
            routes,
            policies,
            dispatcher,
            trailing,
            idle_ttl,
        }
    }

    /// Build a gateway from a configuration file's contents.
    pub fn from_config(
        config: &GatewayConfig,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, Vec<ValidationError>> {
        let verifier = Arc::new(StaticVerifier::from_issuers(&config.issuers));
        let gateway = Self::new(
            config.matching.trailing_wildcard,
            Duration::from_secs(config.rate_limit.idle_ttl_secs.max(1)),
            verifier,
            sink,
        );
        gateway.replace_config(config.routes.clone(), config.policies.clone())?;
        Ok(gateway)
    }

    // ----- runtime -----

    pub fn dispatch(&self, request: &GatewayRequest) -> RouteDecision {
        self.dispatcher.dispatch(request)
    }

    // ----- route mutations -----

    pub fn create_route(&self, route: Route) -> EngineResult<Route> {
        let created = self.routes.insert(route)?;
        tracing::info!(route_id = %created.id, path = %created.path, "Route created");
        Ok(created)
    }

    pub fn update_route(&self, route: Route) -> EngineResult<Route> {
        let updated = self.routes.update(route)?;
        tracing::info!(route_id = %updated.id, path = %updated.path, "Route updated");
        Ok(updated)
    }

    pub fn upsert_route(&self, route: Route) -> EngineResult<Route> {
        self.routes.upsert(route)
    }

    pub fn delete_route(&self, id: &str) -> EngineResult<Route> {
        let removed = self.routes.remove(id)?;
        tracing::info!(route_id = %id, "Route deleted");
        Ok(removed)
    }

    pub fn set_route_enabled(&self, id: &str, enabled: bool) -> EngineResult<Route> {
        let route = self.routes.set_enabled(id, enabled)?;
        tracing::info!(route_id = %id, enabled, "Route toggled");
        Ok(route)
    }

    pub fn duplicate_route(&self, id: &str) -> EngineResult<Route> {
        let copy = self.routes.duplicate(id)?;
        tracing::info!(source_id = %id, route_id = %copy.id, "Route duplicated");
        Ok(copy)
    }

    // ----- policy mutations -----

    pub fn create_policy(&self, policy: SecurityPolicy) -> EngineResult<SecurityPolicy> {
        let created = self.policies.insert(policy)?;
        tracing::info!(policy_id = %created.id, kind = %created.kind, scope = %created.scope, "Policy created");
        Ok(created)
    }

    pub fn update_policy(&self, policy: SecurityPolicy) -> EngineResult<SecurityPolicy> {
        let updated = self.policies.update(policy)?;
        tracing::info!(policy_id = %updated.id, kind = %updated.kind, "Policy updated");
        Ok(updated)
    }

    pub fn upsert_policy(&self, policy: SecurityPolicy) -> EngineResult<SecurityPolicy> {
        self.policies.upsert(policy)
    }

    pub fn delete_policy(&self, id: &str) -> EngineResult<SecurityPolicy> {
        let removed = self.policies.remove(id)?;
        tracing::info!(policy_id = %id, "Policy deleted");
        Ok(removed)
    }

    pub fn set_policy_enabled(&self, id: &str, enabled: bool) -> EngineResult<SecurityPolicy> {
        let policy = self.policies.set_enabled(id, enabled)?;
        tracing::info!(policy_id = %id, enabled, "Policy toggled");
        Ok(policy)
    }

    /// Replace every route and policy at once. Nothing changes unless the
    /// whole set validates.
    pub fn replace_config(
        &self,
        routes: Vec<Route>,
        policies: Vec<SecurityPolicy>,
    ) -> Result<(), Vec<ValidationError>> {
        let (route_count, policy_count) = self.engine.publish(|current, seq| {
            let mut errors = Vec::new();
            let compiled_routes = table::compile_all(routes, self.trailing)
                .map_err(|route_errors| errors.extend(route_errors))
                .ok();
            let next_policies = current
                .policies
                .rebuild(policies, self.trailing, self.idle_ttl)
                .map_err(|policy_errors| errors.extend(policy_errors))
                .ok();
            let (Some(compiled_routes), Some(next_policies)) = (compiled_routes, next_policies) else {
                return Err(errors);
            };

            seq.routes = compiled_routes.len() as u64;
            seq.policies = next_policies.len() as u64;
            let next = EngineSnapshot::new(RouteSnapshot::new(compiled_routes), next_policies);
            let counts = (next.routes.len(), next.policies.len());
            Ok((next, counts))
        })?;

        metrics::record_config_size(route_count, policy_count);
        tracing::info!(routes = route_count, policies = policy_count, "Configuration applied");
        Ok(())
    }

    /// Apply a reloaded configuration file.
    pub fn apply_config(&self, config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
        if config.matching.trailing_wildcard != self.trailing {
            tracing::warn!("matching.trailing_wildcard changed; restart to apply");
        }
        let result = self.replace_config(config.routes.clone(), config.policies.clone());
        metrics::record_config_reload(result.is_ok());
        result
    }

    // ----- queries -----

    pub fn get_route(&self, id: &str) -> Option<Route> {
        self.routes.get(id)
    }

    pub fn list_routes(&self) -> Vec<Route> {
        self.routes.list()
    }

    pub fn get_policy(&self, id: &str) -> Option<SecurityPolicy> {
        self.policies.get(id)
    }

    pub fn list_policies(&self, filter: &PolicyFilter) -> Vec<SecurityPolicy> {
        self.policies.list(filter)
    }

    pub fn explain_resolution(&self, method: HttpMethod, path: &str, ctx: &RequestContext) -> Explanation {
        self.routes.explain(method, path, ctx)
    }

    pub fn policy_stats(&self) -> PolicyStats {
        self.policies.stats()
    }

    pub fn status(&self) -> GatewayStatus {
        let engine = self.engine.load();
        GatewayStatus {
            routes: engine.routes.len(),
            enabled_routes: engine.routes.routes().filter(|r| r.enabled).count(),
            policies: engine.policies.len(),
            enabled_policies: engine.policies.policies().filter(|p| p.enabled).count(),
            rate_limit_buckets: engine.policies.rate_limit_buckets(),
        }
    }

    // ----- housekeeping -----

    /// Drop idle rate-limit buckets.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let evicted = self.policies.evict_idle(now);
        if evicted > 0 {
            metrics::record_evictions(evicted);
            tracing::debug!(evicted, "Evicted idle rate-limit buckets");
        }
        evicted
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn policies(&self) -> &Arc<PolicyChain> {
        &self.policies
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let engine = self.engine.load();
        f.debug_struct("Gateway")
            .field("routes", &engine.routes.len())
            .field("policies", &engine.policies.len())
            .field("trailing", &self.trailing)
            .finish()
    }
}
