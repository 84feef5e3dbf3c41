//! Route storage and resolution.
//!
//! # Responsibilities
//! - Own the configured routes
//! - Validate and compile routes before they reach the live table
//! - Resolve a request to the single best route, or none
//!
//! # Design Decisions
//! - Readers load an immutable `RouteSnapshot` from the shared
//!   `SnapshotCell`; a resolution sees one snapshot from start to finish
//! - Writers hold the cell's writer lock, rebuild the route half and swap it
//!   in with a single store
//! - No match is a normal outcome, not an error

use std::sync::Arc;

use chrono::Utc;

use crate::dispatch::RequestContext;
use crate::error::{EngineError, EngineResult, Entity, ValidationError};
use crate::routing::condition::Condition;
use crate::routing::explain::{Candidate, Explanation, Specificity};
use crate::routing::index::RouteIndex;
use crate::routing::pattern::{PathPattern, TrailingWildcard};
use crate::routing::route::{generate_id, HttpMethod, MethodSet, Route};
use crate::snapshot::SnapshotCell;

/// A validated route with its compiled pattern and condition.
#[derive(Debug)]
pub struct CompiledRoute {
    pub route: Route,
    pub pattern: PathPattern,
    pub condition: Option<Condition>,
    /// Creation order. Earlier wins the final tie-break.
    pub seq: u64,
}

impl CompiledRoute {
    pub fn compile(route: Route, seq: u64, trailing: TrailingWildcard) -> Result<Self, ValidationError> {
        if route.id.trim().is_empty() {
            return Err(ValidationError::new("id", "must not be empty"));
        }
        if route.target.trim().is_empty() {
            return Err(ValidationError::new("target", "must not be empty"));
        }
        if let MethodSet::Only(methods) = &route.methods {
            if methods.is_empty() {
                return Err(ValidationError::new("methods", "must name at least one method"));
            }
        }
        let pattern = PathPattern::compile_with(&route.path, trailing)
            .map_err(|e| ValidationError::new("path", e))?;
        let condition = route
            .condition_expr()
            .map(Condition::compile)
            .transpose()
            .map_err(|e| ValidationError::new("condition", e))?;

        Ok(Self {
            route,
            pattern,
            condition,
            seq,
        })
    }

    pub fn specificity(&self) -> Specificity {
        Specificity {
            wildcard_count: self.pattern.wildcard_count(),
            trailing_wildcard: self.pattern.has_rest(),
            literal_prefix_len: self.pattern.literal_prefix_len(),
            created_seq: self.seq,
        }
    }

    fn condition_holds(&self, ctx: &RequestContext) -> bool {
        self.condition.as_ref().map_or(true, |c| c.evaluate(ctx))
    }
}

/// Immutable view of the route table.
#[derive(Debug, Default)]
pub struct RouteSnapshot {
    /// Creation order.
    routes: Vec<Arc<CompiledRoute>>,
    index: RouteIndex,
}

impl RouteSnapshot {
    pub(crate) fn new(routes: Vec<Arc<CompiledRoute>>) -> Self {
        let index = RouteIndex::build(&routes);
        Self { routes, index }
    }

    /// Enabled routes whose method set and path pattern match.
    fn candidates<'a>(
        &'a self,
        method: HttpMethod,
        path: &'a str,
    ) -> impl Iterator<Item = &'a Arc<CompiledRoute>> + 'a {
        self.index
            .candidates(path)
            .filter_map(move |i| {
                let route = self.routes.get(i);
                if route.is_none() {
                    tracing::error!(position = i, "Route index points past snapshot");
                }
                route
            })
            .filter(move |r| {
                r.route.enabled && r.route.methods.contains(method) && r.pattern.matches(path)
            })
    }

    /// Select the best matching route.
    pub fn resolve(
        &self,
        method: HttpMethod,
        path: &str,
        ctx: &RequestContext,
    ) -> Option<Arc<CompiledRoute>> {
        self.candidates(method, path)
            .filter(|r| r.condition_holds(ctx))
            .min_by_key(|r| r.specificity())
            .cloned()
    }

    pub fn explain(&self, method: HttpMethod, path: &str, ctx: &RequestContext) -> Explanation {
        let candidates = self
            .candidates(method, path)
            .map(|r| Candidate::from_route(r, r.condition_holds(ctx)))
            .collect();
        Explanation::from_candidates(candidates)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().map(|r| &r.route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.routes.iter().position(|r| r.route.id == id)
    }
}

/// Concurrent route store.
pub struct RouteTable {
    cell: Arc<SnapshotCell>,
    trailing: TrailingWildcard,
}

impl RouteTable {
    /// A table publishing into its own cell.
    pub fn new(trailing: TrailingWildcard) -> Self {
        Self::with_cell(Arc::new(SnapshotCell::new()), trailing)
    }

    /// A table publishing into `cell`, next to whatever else shares it.
    pub fn with_cell(cell: Arc<SnapshotCell>, trailing: TrailingWildcard) -> Self {
        Self { cell, trailing }
    }

    /// Current snapshot. Stays valid while writers publish newer ones.
    pub fn snapshot(&self) -> Arc<RouteSnapshot> {
        self.cell.load().routes.clone()
    }

    pub fn resolve(
        &self,
        method: HttpMethod,
        path: &str,
        ctx: &RequestContext,
    ) -> Option<Arc<CompiledRoute>> {
        self.snapshot().resolve(method, path, ctx)
    }

    pub fn explain(&self, method: HttpMethod, path: &str, ctx: &RequestContext) -> Explanation {
        self.snapshot().explain(method, path, ctx)
    }

    pub fn get(&self, id: &str) -> Option<Route> {
        let snapshot = self.snapshot();
        snapshot.position(id).map(|i| snapshot.routes[i].route.clone())
    }

    /// All routes in creation order.
    pub fn list(&self) -> Vec<Route> {
        self.snapshot().routes().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a new route. Fails if the id is taken.
    pub fn insert(&self, route: Route) -> EngineResult<Route> {
        self.mutate(|routes, next_seq, trailing| {
            if routes.iter().any(|r| r.route.id == route.id) {
                return Err(ValidationError::new("id", format!("route '{}' already exists", route.id)).into());
            }
            push_new(routes, next_seq, route, trailing)
        })
    }

    /// Replace an existing route, keeping its creation time and order.
    pub fn update(&self, route: Route) -> EngineResult<Route> {
        self.mutate(|routes, _, trailing| {
            let pos = routes
                .iter()
                .position(|r| r.route.id == route.id)
                .ok_or_else(|| EngineError::not_found(Entity::Route, &route.id))?;
            replace_at(routes, pos, route, trailing)
        })
    }

    /// Update when present, insert otherwise. Lookup and write happen under
    /// one writer lock.
    pub fn upsert(&self, route: Route) -> EngineResult<Route> {
        self.mutate(|routes, next_seq, trailing| {
            match routes.iter().position(|r| r.route.id == route.id) {
                Some(pos) => replace_at(routes, pos, route, trailing),
                None => push_new(routes, next_seq, route, trailing),
            }
        })
    }

    pub fn remove(&self, id: &str) -> EngineResult<Route> {
        self.mutate(|routes, _, _| {
            let pos = routes
                .iter()
                .position(|r| r.route.id == id)
                .ok_or_else(|| EngineError::not_found(Entity::Route, id))?;
            Ok(routes.remove(pos).route.clone())
        })
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> EngineResult<Route> {
        self.mutate(|routes, _, _| {
            let pos = routes
                .iter()
                .position(|r| r.route.id == id)
                .ok_or_else(|| EngineError::not_found(Entity::Route, id))?;
            let existing = &routes[pos];
            let mut route = existing.route.clone();
            route.enabled = enabled;
            route.updated_at = Utc::now();
            let stored = route.clone();
            routes[pos] = Arc::new(CompiledRoute {
                route,
                pattern: existing.pattern.clone(),
                condition: existing.condition.clone(),
                seq: existing.seq,
            });
            Ok(stored)
        })
    }

    /// Copy a route under a fresh id. The copy is the newest route.
    pub fn duplicate(&self, id: &str) -> EngineResult<Route> {
        self.mutate(|routes, next_seq, trailing| {
            let source = routes
                .iter()
                .find(|r| r.route.id == id)
                .ok_or_else(|| EngineError::not_found(Entity::Route, id))?;
            let now = Utc::now();
            let mut copy = source.route.clone();
            copy.id = generate_id();
            copy.created_at = now;
            copy.updated_at = now;
            push_new(routes, next_seq, copy, trailing)
        })
    }

    /// Swap in a whole new route set. Nothing is applied unless every route compiles.
    pub fn replace_all(&self, routes: Vec<Route>) -> Result<(), Vec<ValidationError>> {
        let compiled = compile_all(routes, self.trailing)?;
        self.cell.publish(|current, seq| {
            seq.routes = compiled.len() as u64;
            Ok((current.with_routes(RouteSnapshot::new(compiled)), ()))
        })
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Vec<Arc<CompiledRoute>>, &mut u64, TrailingWildcard) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.cell.publish(|current, seq| {
            let mut routes = current.routes.routes.clone();
            let result = f(&mut routes, &mut seq.routes, self.trailing)?;
            Ok((current.with_routes(RouteSnapshot::new(routes)), result))
        })
    }
}

fn push_new(
    routes: &mut Vec<Arc<CompiledRoute>>,
    next_seq: &mut u64,
    route: Route,
    trailing: TrailingWildcard,
) -> EngineResult<Route> {
    let compiled = CompiledRoute::compile(route, *next_seq, trailing)?;
    *next_seq += 1;
    let stored = compiled.route.clone();
    routes.push(Arc::new(compiled));
    Ok(stored)
}

fn replace_at(
    routes: &mut [Arc<CompiledRoute>],
    pos: usize,
    mut route: Route,
    trailing: TrailingWildcard,
) -> EngineResult<Route> {
    let existing = &routes[pos];
    route.created_at = existing.route.created_at;
    route.updated_at = Utc::now();
    let compiled = CompiledRoute::compile(route, existing.seq, trailing)?;
    let stored = compiled.route.clone();
    routes[pos] = Arc::new(compiled);
    Ok(stored)
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(TrailingWildcard::default())
    }
}

/// Validate a full route set, collecting every error. Creation order follows
/// `created_at`, then input order.
pub fn compile_all(
    routes: Vec<Route>,
    trailing: TrailingWildcard,
) -> Result<Vec<Arc<CompiledRoute>>, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut indexed: Vec<(usize, Route)> = routes.into_iter().enumerate().collect();
    indexed.sort_by_key(|(i, r)| (r.created_at, *i));

    let mut compiled = Vec::with_capacity(indexed.len());
    for (seq, (i, route)) in indexed.into_iter().enumerate() {
        let parent = format!("routes[{i}]");
        if !seen.insert(route.id.clone()) {
            errors.push(ValidationError::new("id", format!("duplicate route id '{}'", route.id)).within(&parent));
            continue;
        }
        match CompiledRoute::compile(route, seq as u64, trailing) {
            Ok(route) => compiled.push(Arc::new(route)),
            Err(e) => errors.push(e.within(&parent)),
        }
    }

    if errors.is_empty() {
        Ok(compiled)
    } else {
        errors.sort_by(|a, b| a.field.cmp(&b.field));
        Err(errors)
    }
}
