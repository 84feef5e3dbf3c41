//! Security policy definitions and per-kind config parsing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::route::generate_id;
use crate::security::auth::AuthConfig;
use crate::security::cors::CorsConfig;
use crate::security::rate_limit::{Quota, RateLimiter};
use crate::security::waf::WafConfig;

/// Kind of security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[serde(alias = "jwt", alias = "authentication")]
    Auth,
    #[serde(alias = "rate-limit", alias = "rate_limit")]
    RateLimit,
    #[serde(alias = "content-filtering")]
    Waf,
    #[serde(alias = "cross-origin")]
    Cors,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 4] = [
        PolicyKind::Auth,
        PolicyKind::RateLimit,
        PolicyKind::Waf,
        PolicyKind::Cors,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Auth => "auth",
            PolicyKind::RateLimit => "ratelimit",
            PolicyKind::Waf => "waf",
            PolicyKind::Cors => "cors",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auth" | "jwt" | "authentication" => Ok(PolicyKind::Auth),
            "ratelimit" | "rate-limit" | "rate_limit" => Ok(PolicyKind::RateLimit),
            "waf" | "content-filtering" => Ok(PolicyKind::Waf),
            "cors" | "cross-origin" => Ok(PolicyKind::Cors),
            other => Err(format!("unknown policy kind '{other}'")),
        }
    }
}

/// A security rule scoped to a path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    #[serde(default = "generate_id")]
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    #[serde(alias = "type")]
    pub kind: PolicyKind,

    /// Path pattern the policy applies to.
    #[serde(alias = "path")]
    pub scope: String,

    /// Kind-specific config, e.g. `10req/s` or `issuer=auth-server`.
    pub config: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Lower is evaluated earlier.
    #[serde(default)]
    pub priority: i32,
}

impl SecurityPolicy {
    pub fn new(kind: PolicyKind, scope: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            name: String::new(),
            kind,
            scope: scope.into(),
            config: config.into(),
            enabled: true,
            priority: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

fn default_enabled() -> bool {
    true
}

/// Policy config that failed to parse for its kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} config: {reason}")]
pub struct InvalidPolicyConfig {
    pub kind: PolicyKind,
    pub reason: String,
}

/// Compiled, kind-specific behaviour of a policy.
#[derive(Debug, Clone)]
pub enum PolicyRule {
    Auth(AuthConfig),
    RateLimit(Arc<RateLimiter>),
    Waf(WafConfig),
    Cors(CorsConfig),
}

impl PolicyRule {
    /// Parse `config` for `kind`. Rate-limit rules reuse `previous` when its
    /// quota is unchanged so live buckets survive edits and toggles.
    pub fn compile(
        kind: PolicyKind,
        config: &str,
        idle_ttl: Duration,
        previous: Option<&PolicyRule>,
    ) -> Result<Self, InvalidPolicyConfig> {
        let invalid = |reason: String| InvalidPolicyConfig { kind, reason };
        let rule = match kind {
            PolicyKind::Auth => PolicyRule::Auth(AuthConfig::parse(config).map_err(invalid)?),
            PolicyKind::RateLimit => {
                let quota: Quota = config.parse().map_err(invalid)?;
                match previous {
                    Some(PolicyRule::RateLimit(limiter)) if limiter.quota() == quota => {
                        PolicyRule::RateLimit(limiter.clone())
                    }
                    _ => PolicyRule::RateLimit(Arc::new(RateLimiter::new(quota, idle_ttl))),
                }
            }
            PolicyKind::Waf => PolicyRule::Waf(WafConfig::parse(config).map_err(invalid)?),
            PolicyKind::Cors => PolicyRule::Cors(CorsConfig::parse(config).map_err(invalid)?),
        };
        Ok(rule)
    }

    pub fn limiter(&self) -> Option<&Arc<RateLimiter>> {
        match self {
            PolicyRule::RateLimit(limiter) => Some(limiter),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserializes_console_shape() {
        let json = r#"{
            "id": "2",
            "name": "API rate limit",
            "type": "ratelimit",
            "path": "/api/payment/**",
            "config": "10req/s",
            "enabled": true,
            "priority": 2
        }"#;
        let policy: SecurityPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.kind, PolicyKind::RateLimit);
        assert_eq!(policy.scope, "/api/payment/**");

        let jwt: PolicyKind = serde_json::from_str("\"jwt\"").unwrap();
        assert_eq!(jwt, PolicyKind::Auth);
    }

    #[test]
    fn test_compile_per_kind() {
        let ttl = Duration::from_secs(60);
        assert!(PolicyRule::compile(PolicyKind::Auth, "issuer=a", ttl, None).is_ok());
        assert!(PolicyRule::compile(PolicyKind::RateLimit, "10req/s", ttl, None).is_ok());
        assert!(PolicyRule::compile(PolicyKind::Waf, "block-xss", ttl, None).is_ok());
        assert!(PolicyRule::compile(PolicyKind::Cors, "allow-origin=*", ttl, None).is_ok());

        let err = PolicyRule::compile(PolicyKind::RateLimit, "ten per second", ttl, None).unwrap_err();
        assert_eq!(err.kind, PolicyKind::RateLimit);
    }

    #[test]
    fn test_rate_limiter_reused_when_quota_unchanged() {
        let ttl = Duration::from_secs(60);
        let first = PolicyRule::compile(PolicyKind::RateLimit, "5req/s", ttl, None).unwrap();
        let same = PolicyRule::compile(PolicyKind::RateLimit, "5req/s", ttl, Some(&first)).unwrap();
        let changed = PolicyRule::compile(PolicyKind::RateLimit, "6req/s", ttl, Some(&first)).unwrap();

        let a = first.limiter().unwrap();
        assert!(Arc::ptr_eq(a, same.limiter().unwrap()));
        assert!(!Arc::ptr_eq(a, changed.limiter().unwrap()));
    }
}
