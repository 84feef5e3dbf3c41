//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::routing::{Route, TrailingWildcard};
use crate::security::{IssuerConfig, SecurityPolicy};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Decision server listener.
    pub listener: ListenerConfig,

    /// Management API.
    pub admin: AdminConfig,

    /// Rate-limit bucket housekeeping.
    pub rate_limit: RateLimitConfig,

    /// Path matching options.
    pub matching: MatchingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Credential issuers known to auth policies.
    pub issuers: Vec<IssuerConfig>,

    /// Route definitions.
    pub routes: Vec<Route>,

    /// Security policy definitions.
    pub policies: Vec<SecurityPolicy>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Header whose value becomes the `region` condition attribute.
    ///
    /// Clients can send any header, so this value is only as trustworthy as
    /// the hop that sets it. Deploy behind an edge proxy that strips any
    /// client-supplied copy and writes its own; otherwise a caller can pick
    /// which region-conditioned route serves them.
    pub region_header: String,

    /// Caller-side deadline around each dispatch, in seconds.
    pub request_timeout_secs: u64,

    /// Largest request body inspected by WAF policies.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            region_header: "x-region".to_string(),
            request_timeout_secs: 5,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Rate-limit housekeeping configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Buckets idle this long are evicted.
    pub idle_ttl_secs: u64,

    /// How often the sweeper runs.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

/// Path matching configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Whether a trailing `**` may match zero segments.
    pub trailing_wildcard: TrailingWildcard,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Emit a structured event per dispatch.
    pub dispatch_records: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            dispatch_records: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::MethodSet;
    use crate::security::PolicyKind;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.matching.trailing_wildcard, TrailingWildcard::RequireSegment);
        assert!(!config.admin.enabled);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let toml = r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [matching]
            trailing_wildcard = "allow-empty"

            [[issuers]]
            name = "auth-server"
            tokens = { "secret-token" = "alice" }

            [[routes]]
            id = "1"
            path = "/api/payment/**"
            method = "POST"
            target = "lb://payment-service"

            [[routes]]
            id = "2"
            path = "/api/order/**"
            method = "ALL"
            target = "lb://order-service"
            condition = "region==EU"

            [[policies]]
            id = "1"
            name = "JWT auth"
            type = "jwt"
            path = "/api/**"
            config = "issuer=auth-server"
            priority = 1
        "#;
        let config: GatewayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.matching.trailing_wildcard, TrailingWildcard::AllowEmpty);
        assert_eq!(config.issuers[0].tokens["secret-token"], "alice");
        assert_eq!(config.routes.len(), 2);
        assert_eq!(config.routes[1].methods, MethodSet::All);
        assert_eq!(config.routes[1].condition.as_deref(), Some("region==EU"));
        assert_eq!(config.policies[0].kind, PolicyKind::Auth);
        assert!(config.policies[0].enabled);
    }
}
