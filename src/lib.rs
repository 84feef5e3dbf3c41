//! Route and Security-Policy Resolution Engine
//!
//! Resolves every inbound gateway request to one route and runs the security
//! policies scoped to it, returning forward-or-deny.

// Core engine
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod routing;
pub mod security;
pub mod snapshot;

// Operational shell
pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::GatewayConfig;
pub use dispatch::{DenyReason, GatewayRequest, RequestContext, RouteDecision};
pub use error::{EngineError, ValidationError};
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
