//! Candidate index over a route snapshot.
//!
//! Routes are grouped by their first literal segment. Routes whose first
//! segment is a wildcard (or the root pattern) live in an unkeyed list that
//! every lookup also scans. The index narrows candidates only; it never
//! changes which route wins.

use std::collections::HashMap;
use std::sync::Arc;

use crate::routing::table::CompiledRoute;

#[derive(Debug, Default)]
pub struct RouteIndex {
    by_first: HashMap<String, Vec<usize>>,
    unkeyed: Vec<usize>,
}

impl RouteIndex {
    /// Index the enabled routes of `routes` by position.
    pub fn build(routes: &[Arc<CompiledRoute>]) -> Self {
        let mut index = Self::default();
        for (i, route) in routes.iter().enumerate() {
            if !route.route.enabled {
                continue;
            }
            match route.pattern.first_literal() {
                Some(first) => index.by_first.entry(first.to_string()).or_default().push(i),
                None => index.unkeyed.push(i),
            }
        }
        index
    }

    /// Positions of routes that could match `path`.
    pub fn candidates<'a>(&'a self, path: &str) -> impl Iterator<Item = usize> + 'a {
        let first = path
            .strip_prefix('/')
            .and_then(|rest| rest.split('/').next())
            .unwrap_or_default();
        let keyed = self.by_first.get(first).map(Vec::as_slice).unwrap_or_default();
        keyed.iter().chain(self.unkeyed.iter()).copied()
    }

    pub fn len(&self) -> usize {
        self.by_first.values().map(Vec::len).sum::<usize>() + self.unkeyed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
