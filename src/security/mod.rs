//! Security policy subsystem.
//!
//! # Data Flow
//! ```text
//! Resolved route + request:
//!     → chain.rs (select enabled, in-scope policies by priority)
//!     → auth.rs (credential → principal)
//!     → rate_limit.rs (per-key token bucket)
//!     → waf.rs (signature inspection)
//!     → cors.rs (response annotations)
//!     → Decision
//! ```
//!
//! # Design Decisions
//! - Fail closed: a missing or rejected credential denies
//! - Policy configs are parsed when written, never per request
//! - First denial ends the chain

pub mod auth;
pub mod chain;
pub mod cors;
pub mod policy;
pub mod rate_limit;
pub mod waf;

pub use auth::{AuthConfig, CredentialVerifier, IssuerConfig, StaticVerifier};
pub use chain::{CompiledPolicy, KindStats, PolicyChain, PolicyFilter, PolicySnapshot, PolicyStats};
pub use policy::{InvalidPolicyConfig, PolicyKind, PolicyRule, SecurityPolicy};
pub use rate_limit::{Quota, RateLimiter};
pub use waf::{WafConfig, WafRule};
