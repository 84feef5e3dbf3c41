//! Path pattern compilation and matching.
//!
//! # Responsibilities
//! - Compile route and policy scope patterns (`/api/*/detail`, `/api/payment/**`)
//! - Match request paths segment by segment
//! - Expose specificity data used by route tie-breaking
//!
//! # Design Decisions
//! - Matching is anchored and case-sensitive
//! - `*` matches exactly one non-empty segment
//! - `**` is only legal as the final segment
//! - Whether `**` may match zero segments is a `TrailingWildcard` policy,
//!   fixed at compile time so matching stays a pure function of (pattern, path)
//! - No regex: matching is O(segments)

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pattern compilation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pattern `{pattern}`: {reason}")]
pub struct InvalidPattern {
    pub pattern: String,
    pub reason: &'static str,
}

impl InvalidPattern {
    fn new(pattern: &str, reason: &'static str) -> Self {
        Self {
            pattern: pattern.to_string(),
            reason,
        }
    }
}

/// How a trailing `**` treats an empty remainder.
///
/// With `RequireSegment`, `/api/payment/**` does not match `/api/payment`
/// nor `/api/payment/`. With `AllowEmpty` it matches both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrailingWildcard {
    #[default]
    RequireSegment,
    AllowEmpty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `*`
    Single,
    /// `**`
    Rest,
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    trailing: TrailingWildcard,
}

impl PathPattern {
    /// Compile with the default trailing-wildcard policy.
    pub fn compile(pattern: &str) -> Result<Self, InvalidPattern> {
        Self::compile_with(pattern, TrailingWildcard::default())
    }

    pub fn compile_with(
        pattern: &str,
        trailing: TrailingWildcard,
    ) -> Result<Self, InvalidPattern> {
        if pattern.is_empty() {
            return Err(InvalidPattern::new(pattern, "pattern is empty"));
        }
        let Some(rest) = pattern.strip_prefix('/') else {
            return Err(InvalidPattern::new(pattern, "pattern must start with '/'"));
        };

        // Root pattern "/" has no segments and only matches "/".
        if rest.is_empty() {
            return Ok(Self {
                raw: pattern.to_string(),
                segments: Vec::new(),
                trailing,
            });
        }

        let parts: Vec<&str> = rest.split('/').collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());

        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "" => return Err(InvalidPattern::new(pattern, "empty path segment")),
                "*" => Segment::Single,
                "**" if i == last => Segment::Rest,
                "**" => {
                    return Err(InvalidPattern::new(
                        pattern,
                        "'**' is only allowed as the final segment",
                    ))
                }
                p if p.contains('*') => {
                    return Err(InvalidPattern::new(
                        pattern,
                        "wildcards must occupy a whole segment",
                    ))
                }
                p => Segment::Literal(p.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
            trailing,
        })
    }

    /// Returns true if `path` matches this pattern in full.
    pub fn matches(&self, path: &str) -> bool {
        let Some(rest) = path.strip_prefix('/') else {
            return false;
        };
        if rest.is_empty() {
            return self.segments.is_empty()
                || (self.segments == [Segment::Rest]
                    && self.trailing == TrailingWildcard::AllowEmpty);
        }

        let mut parts = rest.split('/');
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => match parts.next() {
                    Some(p) if p == lit => {}
                    _ => return false,
                },
                Segment::Single => match parts.next() {
                    Some(p) if !p.is_empty() => {}
                    _ => return false,
                },
                Segment::Rest => return self.rest_matches(parts),
            }
        }
        parts.next().is_none()
    }

    fn rest_matches<'a>(&self, remainder: impl Iterator<Item = &'a str>) -> bool {
        let remainder: Vec<&str> = remainder.collect();
        match self.trailing {
            TrailingWildcard::RequireSegment => {
                !remainder.is_empty() && remainder.iter().all(|p| !p.is_empty())
            }
            // A lone trailing slash is the empty remainder.
            TrailingWildcard::AllowEmpty => {
                remainder == [""] || remainder.iter().all(|p| !p.is_empty())
            }
        }
    }

    /// Original pattern text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of `*` and `**` segments.
    pub fn wildcard_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| !matches!(s, Segment::Literal(_)))
            .count()
    }

    /// True if the pattern ends in `**`.
    pub fn has_rest(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Rest))
    }

    /// Byte length of the leading literal segments, separators included.
    pub fn literal_prefix_len(&self) -> usize {
        self.segments
            .iter()
            .map_while(|s| match s {
                Segment::Literal(lit) => Some(lit.len() + 1),
                _ => None,
            })
            .sum()
    }

    /// First segment if it is a literal. Used as the route index key.
    pub fn first_literal(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Literal(lit)) => Some(lit),
            _ => None,
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
