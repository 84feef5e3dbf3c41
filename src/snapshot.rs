//! Combined route and policy state.
//!
//! # Responsibilities
//! - Hold the live routes and policies as one `EngineSnapshot`
//! - Serialize every writer, route or policy, behind one mutex
//!
//! # Design Decisions
//! - One `ArcSwap` for both halves: a dispatch loads once and resolves and
//!   evaluates against the same generation, so a bulk reload can never pair
//!   new routes with old policies
//! - Writers clone the half they change and keep the other half's `Arc`

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;

use crate::routing::RouteSnapshot;
use crate::security::PolicySnapshot;

/// Routes and policies published together.
#[derive(Debug, Default)]
pub struct EngineSnapshot {
    pub routes: Arc<RouteSnapshot>,
    pub policies: Arc<PolicySnapshot>,
}

impl EngineSnapshot {
    pub fn new(routes: RouteSnapshot, policies: PolicySnapshot) -> Self {
        Self {
            routes: Arc::new(routes),
            policies: Arc::new(policies),
        }
    }

    /// Same policies, new routes.
    pub fn with_routes(&self, routes: RouteSnapshot) -> Self {
        Self {
            routes: Arc::new(routes),
            policies: self.policies.clone(),
        }
    }

    /// Same routes, new policies.
    pub fn with_policies(&self, policies: PolicySnapshot) -> Self {
        Self {
            routes: self.routes.clone(),
            policies: Arc::new(policies),
        }
    }
}

/// Next creation sequence for each half. Only touched under the writer lock.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Sequences {
    pub routes: u64,
    pub policies: u64,
}

/// The single publication point shared by `RouteTable`, `PolicyChain` and
/// `Dispatcher`.
#[derive(Debug, Default)]
pub struct SnapshotCell {
    current: ArcSwap<EngineSnapshot>,
    writer: Mutex<Sequences>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation. Stays valid while writers publish newer ones.
    pub fn load(&self) -> Arc<EngineSnapshot> {
        self.current.load_full()
    }

    /// Run `f` under the writer lock and publish what it returns with one
    /// store. Neither the snapshot nor the sequences change when `f` fails.
    pub fn publish<T, E>(
        &self,
        f: impl FnOnce(&EngineSnapshot, &mut Sequences) -> Result<(EngineSnapshot, T), E>,
    ) -> Result<T, E> {
        let mut sequences = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.current.load_full();
        let mut next_seq = *sequences;
        let (next, result) = f(&current, &mut next_seq)?;
        self.current.store(Arc::new(next));
        *sequences = next_seq;
        Ok(result)
    }
}
