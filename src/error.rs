//! Engine error types.
//!
//! Policy denials are not errors; they are returned as
//! [`DenyReason`](crate::dispatch::DenyReason) values.

use serde::Serialize;
use thiserror::Error;

/// A configuration value that failed to compile. Always names the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl ToString) -> Self {
        Self {
            field: field.into(),
            message: message.to_string(),
        }
    }

    /// Prefix the field path, e.g. `path` becomes `routes[2].path`.
    pub fn within(mut self, parent: &str) -> Self {
        self.field = format!("{parent}.{}", self.field);
        self
    }
}

/// Kind of configuration entity a mutation referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    Route,
    Policy,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Route => f.write_str("route"),
            Entity::Policy => f.write_str("policy"),
        }
    }
}

/// Errors returned by configuration mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Rejected before reaching the live table.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Mutation referenced an id that does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: Entity, id: String },

    /// Invariant violation inside the engine.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Result type for configuration mutations.
pub type EngineResult<T> = Result<T, EngineError>;
