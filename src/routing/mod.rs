//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path, context)
//!     → table.rs (load snapshot)
//!     → index.rs (candidates by first path segment)
//!     → pattern.rs (segment-wise path match)
//!     → condition.rs (evaluate route condition)
//!     → rank by specificity, return best route or None
//!
//! Route mutation:
//!     Route
//!     → compile pattern + condition (reject on error)
//!     → rebuild snapshot + index
//!     → atomic swap
//! ```
//!
//! # Design Decisions
//! - Overlapping routes are ranked, not ordered by the operator
//! - No regex in the hot path
//! - Deterministic: same snapshot and input always yield the same route

pub mod condition;
pub mod explain;
pub mod index;
pub mod pattern;
pub mod route;
pub mod table;

pub use condition::{Condition, InvalidExpression};
pub use explain::{Candidate, Explanation, Specificity, TieBreak};
pub use pattern::{InvalidPattern, PathPattern, TrailingWildcard};
pub use route::{HttpMethod, MethodSet, Route};
pub use table::{CompiledRoute, RouteSnapshot, RouteTable};
