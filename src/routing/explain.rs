//! Resolution explanations for operators debugging overlapping routes.

use std::cmp::Ordering;

use serde::Serialize;

use crate::routing::table::CompiledRoute;

/// Ranking data for one route. Lower sorts first and wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Specificity {
    pub wildcard_count: usize,
    pub trailing_wildcard: bool,
    pub literal_prefix_len: usize,
    pub created_seq: u64,
}

impl Ord for Specificity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wildcard_count
            .cmp(&other.wildcard_count)
            .then(self.trailing_wildcard.cmp(&other.trailing_wildcard))
            .then(other.literal_prefix_len.cmp(&self.literal_prefix_len))
            .then(self.created_seq.cmp(&other.created_seq))
    }
}

impl PartialOrd for Specificity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Why the chosen route beat the runner-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    OnlyCandidate,
    FewerWildcards,
    NoTrailingWildcard,
    LongerLiteralPrefix,
    EarlierCreated,
}

impl TieBreak {
    /// First ranking rule on which `winner` and `runner_up` differ.
    pub fn between(winner: &Specificity, runner_up: &Specificity) -> Self {
        if winner.wildcard_count != runner_up.wildcard_count {
            TieBreak::FewerWildcards
        } else if winner.trailing_wildcard != runner_up.trailing_wildcard {
            TieBreak::NoTrailingWildcard
        } else if winner.literal_prefix_len != runner_up.literal_prefix_len {
            TieBreak::LongerLiteralPrefix
        } else {
            TieBreak::EarlierCreated
        }
    }
}

/// A route that matched method and path.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub route_id: String,
    pub path: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub condition_passed: bool,
    pub specificity: Specificity,
}

impl Candidate {
    pub(crate) fn from_route(route: &CompiledRoute, condition_passed: bool) -> Self {
        Self {
            route_id: route.route.id.clone(),
            path: route.route.path.clone(),
            target: route.route.target.clone(),
            condition: route.condition.as_ref().map(|c| c.as_str().to_string()),
            condition_passed,
            specificity: route.specificity(),
        }
    }
}

/// Full candidate set plus the chosen route.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    /// Sorted best-first.
    pub candidates: Vec<Candidate>,
    pub chosen: Option<String>,
    pub reason: Option<TieBreak>,
}

impl Explanation {
    pub(crate) fn from_candidates(mut candidates: Vec<Candidate>) -> Self {
        candidates.sort_by(|a, b| a.specificity.cmp(&b.specificity));

        let mut passing = candidates.iter().filter(|c| c.condition_passed);
        let (chosen, reason) = match (passing.next(), passing.next()) {
            (None, _) => (None, None),
            (Some(only), None) => (Some(only.route_id.clone()), Some(TieBreak::OnlyCandidate)),
            (Some(winner), Some(runner_up)) => (
                Some(winner.route_id.clone()),
                Some(TieBreak::between(&winner.specificity, &runner_up.specificity)),
            ),
        };

        Self {
            candidates,
            chosen,
            reason,
        }
    }
}
