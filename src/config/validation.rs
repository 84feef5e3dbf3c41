//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile every route pattern, condition and policy config
//! - Check referential integrity (auth policies name a configured issuer)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config::schema::GatewayConfig;
use crate::error::ValidationError;
use crate::routing::table;
use crate::security::{chain, AuthConfig, PolicyKind};

/// Validate a full configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }
    if config.listener.region_header.trim().is_empty() {
        errors.push(ValidationError::new("listener.region_header", "must not be empty"));
    }

    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty when admin is enabled"));
        }
    }

    if config.rate_limit.idle_ttl_secs == 0 {
        errors.push(ValidationError::new("rate_limit.idle_ttl_secs", "must be greater than 0"));
    }
    if config.rate_limit.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.sweep_interval_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled {
        check_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    let mut issuers = HashSet::new();
    for (i, issuer) in config.issuers.iter().enumerate() {
        if issuer.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("issuers[{i}].name"), "must not be empty"));
        } else if !issuers.insert(issuer.name.as_str()) {
            errors.push(ValidationError::new(
                format!("issuers[{i}].name"),
                format!("duplicate issuer '{}'", issuer.name),
            ));
        }
    }

    let trailing = config.matching.trailing_wildcard;
    if let Err(route_errors) = table::compile_all(config.routes.clone(), trailing) {
        errors.extend(route_errors);
    }

    let idle_ttl = Duration::from_secs(config.rate_limit.idle_ttl_secs.max(1));
    match chain::compile_all(config.policies.clone(), trailing, idle_ttl, |_| None) {
        Ok(_) => {
            for (i, policy) in config.policies.iter().enumerate() {
                if policy.kind != PolicyKind::Auth {
                    continue;
                }
                if let Ok(auth) = AuthConfig::parse(&policy.config) {
                    if !issuers.contains(auth.issuer.as_str()) {
                        errors.push(ValidationError::new(
                            format!("policies[{i}].config"),
                            format!("unknown issuer '{}'", auth.issuer),
                        ));
                    }
                }
            }
        }
        Err(policy_errors) => errors.extend(policy_errors),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("'{value}' is not a socket address")));
    }
}
