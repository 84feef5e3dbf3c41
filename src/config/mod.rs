//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (compile every pattern, condition, policy config)
//!     → GatewayConfig (validated)
//!     → Gateway::from_config
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Gateway::replace_config (atomic swap of route and policy snapshots)
//! ```
//!
//! # Design Decisions
//! - A config that fails validation is never partially applied
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, GatewayConfig, ListenerConfig, MatchingConfig, ObservabilityConfig, RateLimitConfig,
};
pub use validation::validate_config;
pub use watcher::ConfigWatcher;
