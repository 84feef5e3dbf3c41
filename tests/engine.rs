//! End-to-end checks of resolution and policy evaluation through the public API.

mod common;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use policy_gateway::dispatch::Verdict;
use policy_gateway::observability::{ChannelSink, NullSink};
use policy_gateway::routing::{HttpMethod, MethodSet, PathPattern, Route, TieBreak, TrailingWildcard};
use policy_gateway::security::{PolicyKind, Quota, RateLimiter, SecurityPolicy, StaticVerifier};
use policy_gateway::{DenyReason, Gateway, GatewayRequest, RequestContext, RouteDecision};

fn empty_gateway() -> Gateway {
    Gateway::new(
        TrailingWildcard::RequireSegment,
        Duration::from_secs(300),
        Arc::new(StaticVerifier::new().with_token("auth-server", "valid-token", "alice")),
        Arc::new(NullSink),
    )
}

fn forwarded_to(decision: &RouteDecision) -> Option<&str> {
    match decision {
        RouteDecision::Forward { route_id, .. } => Some(route_id),
        RouteDecision::Deny { .. } => None,
    }
}

#[test]
fn test_trailing_wildcard_policies() {
    let strict = PathPattern::compile_with("/api/payment/**", TrailingWildcard::RequireSegment).unwrap();
    assert!(strict.matches("/api/payment/charge"));
    assert!(strict.matches("/api/payment/charge/refund"));
    assert!(!strict.matches("/api/payment"));
    assert!(!strict.matches("/api/payment/"));
    assert!(!strict.matches("/api/paymentx/charge"));

    let lenient = PathPattern::compile_with("/api/payment/**", TrailingWildcard::AllowEmpty).unwrap();
    assert!(lenient.matches("/api/payment"));
    assert!(lenient.matches("/api/payment/"));
    assert!(lenient.matches("/api/payment/charge"));
}

#[test]
fn test_single_segment_wildcard() {
    let pattern = PathPattern::compile("/api/*/detail").unwrap();
    assert!(pattern.matches("/api/x/detail"));
    assert!(!pattern.matches("/api/x/y/detail"));
    assert!(!pattern.matches("/api//detail"));
}

#[test]
fn test_more_specific_route_wins_regardless_of_order() {
    for broad_first in [true, false] {
        let gateway = empty_gateway();
        let broad = Route::new("/api/**", MethodSet::All, "lb://api").with_id("A");
        let narrow = Route::new("/api/payment/**", MethodSet::All, "lb://payment").with_id("B");
        let (first, second) = if broad_first { (broad, narrow) } else { (narrow, broad) };
        gateway.create_route(first).unwrap();
        gateway.create_route(second).unwrap();

        let decision = gateway.dispatch(&GatewayRequest::new(HttpMethod::Get, "/api/payment/x"));
        assert_eq!(forwarded_to(&decision), Some("B"));

        let explanation = gateway.explain_resolution(
            HttpMethod::Get,
            "/api/payment/x",
            &RequestContext::new(),
        );
        assert_eq!(explanation.candidates.len(), 2);
        assert_eq!(explanation.chosen.as_deref(), Some("B"));
        assert_eq!(explanation.reason, Some(TieBreak::LongerLiteralPrefix));
    }
}

#[test]
fn test_condition_selects_between_overlapping_routes() {
    let gateway = common::console_gateway();
    let eu = GatewayRequest::new(HttpMethod::Get, "/api/order/7")
        .attribute("region", "EU")
        .header("authorization", "Bearer valid-token");
    assert_eq!(forwarded_to(&gateway.dispatch(&eu)), Some("2"));

    let us = GatewayRequest::new(HttpMethod::Get, "/api/order/7")
        .attribute("region", "US")
        .header("authorization", "Bearer valid-token");
    assert_eq!(gateway.dispatch(&us).deny_reason(), Some(&DenyReason::NotFound));
}

#[test]
fn test_exact_route_beats_wildcard_sibling() {
    let gateway = common::console_gateway();
    let req = GatewayRequest::new(HttpMethod::Post, "/api/payment/checkout")
        .header("authorization", "Bearer valid-token");
    assert_eq!(forwarded_to(&gateway.dispatch(&req)), Some("5"));
}

#[test]
fn test_explain_unmatched_path_is_empty() {
    let gateway = common::console_gateway();
    let explanation =
        gateway.explain_resolution(HttpMethod::Get, "/nowhere/at/all", &RequestContext::new());
    assert!(explanation.candidates.is_empty());
    assert_eq!(explanation.chosen, None);
    assert_eq!(explanation.reason, None);
}

#[test]
fn test_explain_lists_failed_condition() {
    let gateway = common::console_gateway();
    let ctx = RequestContext::new().with_attribute("region", "US");
    let explanation = gateway.explain_resolution(HttpMethod::Get, "/api/order/1", &ctx);
    assert_eq!(explanation.candidates.len(), 1);
    assert!(!explanation.candidates[0].condition_passed);
    assert_eq!(explanation.chosen, None);
}

#[test]
fn test_rate_limiter_burst_then_refill() {
    let limiter = RateLimiter::new(Quota::per_second(5), Duration::from_secs(300));
    let t0 = Instant::now();

    let admitted = (0..6).filter(|_| limiter.allow("client", t0)).count();
    assert_eq!(admitted, 5);

    let t1 = t0 + Duration::from_secs(1);
    let refilled = (0..6).filter(|_| limiter.allow("client", t1)).count();
    assert_eq!(refilled, 5);

    // Keys are independent.
    assert!(limiter.allow("other", t1));
}

#[test]
fn test_auth_denial_short_circuits_rate_limit() {
    let gateway = empty_gateway();
    gateway
        .create_route(Route::new("/api/**", MethodSet::All, "lb://api").with_id("api"))
        .unwrap();
    gateway
        .create_policy(
            SecurityPolicy::new(PolicyKind::Auth, "/api/**", "issuer=auth-server")
                .with_id("auth")
                .with_priority(1),
        )
        .unwrap();
    gateway
        .create_policy(
            SecurityPolicy::new(PolicyKind::RateLimit, "/api/**", "10req/s")
                .with_id("rl")
                .with_priority(2),
        )
        .unwrap();

    let anonymous = GatewayRequest::new(HttpMethod::Get, "/api/users");
    for _ in 0..3 {
        assert_eq!(
            gateway.dispatch(&anonymous).deny_reason(),
            Some(&DenyReason::Unauthorized)
        );
    }
    let limiter = gateway.policies().limiter("rl").unwrap();
    assert_eq!(limiter.calls(), 0);

    let signed = anonymous.clone().header("authorization", "Bearer valid-token");
    assert!(forwarded_to(&gateway.dispatch(&signed)).is_some());
    assert_eq!(limiter.calls(), 1);
}

#[test]
fn test_disabling_policy_applies_to_next_dispatch() {
    let gateway = common::console_gateway();
    let anonymous = GatewayRequest::new(HttpMethod::Get, "/api/user/42");
    assert_eq!(
        gateway.dispatch(&anonymous).deny_reason(),
        Some(&DenyReason::Unauthorized)
    );

    gateway.set_policy_enabled("1", false).unwrap();
    assert_eq!(forwarded_to(&gateway.dispatch(&anonymous)), Some("4"));

    gateway.set_policy_enabled("1", true).unwrap();
    assert_eq!(
        gateway.dispatch(&anonymous).deny_reason(),
        Some(&DenyReason::Unauthorized)
    );
}

#[test]
fn test_disabled_route_is_never_selected() {
    let gateway = common::console_gateway();
    let req = GatewayRequest::new(HttpMethod::Get, "/api/product/9")
        .header("authorization", "Bearer valid-token");
    assert_eq!(gateway.dispatch(&req).deny_reason(), Some(&DenyReason::NotFound));

    gateway.set_route_enabled("3", true).unwrap();
    assert_eq!(forwarded_to(&gateway.dispatch(&req)), Some("3"));
}

#[test]
fn test_waf_blocks_with_rule_name() {
    let gateway = common::console_gateway();
    let req = GatewayRequest::new(HttpMethod::Get, "/api/user/1")
        .header("authorization", "Bearer valid-token")
        .query_string("q=1%27%20OR%201%3D1");
    assert_eq!(
        gateway.dispatch(&req).deny_reason(),
        Some(&DenyReason::Blocked {
            rule: "sql-injection".into()
        })
    );
}

#[test]
fn test_forward_carries_cors_annotations() {
    let gateway = common::console_gateway();
    let req = GatewayRequest::new(HttpMethod::Get, "/public/logo.png");
    match gateway.dispatch(&req) {
        RouteDecision::Forward {
            route_id,
            annotations,
            ..
        } => {
            assert_eq!(route_id, "6");
            assert!(annotations
                .iter()
                .any(|(k, v)| k == "access-control-allow-origin" && v == "*"));
        }
        other => panic!("expected forward, got {other:?}"),
    }
}

#[test]
fn test_dispatch_emits_record_with_policy_trace() {
    let (sink, mut records) = ChannelSink::new();
    let config = policy_gateway::config::parse_config(common::CONSOLE_CONFIG).unwrap();
    let gateway = Gateway::from_config(&config, Arc::new(sink)).unwrap();

    let req = GatewayRequest::new(HttpMethod::Get, "/api/user/1")
        .request_id("req-1")
        .header("authorization", "Bearer valid-token");
    gateway.dispatch(&req);

    let record = records.try_recv().unwrap();
    assert_eq!(record.request_id.as_deref(), Some("req-1"));
    assert_eq!(record.route_id.as_deref(), Some("4"));
    let kinds: Vec<_> = record.policies.iter().map(|t| t.kind).collect();
    assert_eq!(kinds, vec![PolicyKind::Auth, PolicyKind::Waf, PolicyKind::Cors]);
    assert!(record
        .policies
        .iter()
        .all(|t| !matches!(t.verdict, Verdict::Denied(_))));
}

#[test]
fn test_rate_limit_is_exact_under_contention() {
    let gateway = Arc::new(empty_gateway());
    gateway
        .create_route(Route::new("/api/**", MethodSet::All, "lb://api").with_id("api"))
        .unwrap();
    gateway
        .create_policy(SecurityPolicy::new(PolicyKind::RateLimit, "/api/**", "100req/h").with_id("rl"))
        .unwrap();

    let client = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gateway = gateway.clone();
            thread::spawn(move || {
                let req = GatewayRequest::new(HttpMethod::Get, "/api/x").client_ip(client);
                (0..25)
                    .filter(|_| forwarded_to(&gateway.dispatch(&req)).is_some())
                    .count()
            })
        })
        .collect();

    let forwarded: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(forwarded, 100);
}

#[test]
fn test_dispatch_sees_whole_snapshots_during_mutation() {
    let gateway = common::console_gateway();
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let gateway = gateway.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let req = GatewayRequest::new(HttpMethod::Get, "/api/user/1");
                while !stop.load(Ordering::Relaxed) {
                    match gateway.dispatch(&req) {
                        RouteDecision::Forward { route_id, .. } => assert_eq!(route_id, "4"),
                        RouteDecision::Deny { reason } => {
                            assert_eq!(reason, DenyReason::Unauthorized)
                        }
                    }
                }
            })
        })
        .collect();

    for i in 0..200 {
        gateway.set_policy_enabled("1", i % 2 == 0).unwrap();
        let copy = gateway.duplicate_route("6").unwrap();
        gateway.delete_route(&copy.id).unwrap();
    }
    stop.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(gateway.list_routes().len(), 6);
}

#[test]
fn test_bulk_reload_never_pairs_new_routes_with_old_policies() {
    let gateway = Arc::new(empty_gateway());
    let stop = Arc::new(AtomicBool::new(false));
    let leaked = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let gateway = gateway.clone();
            let stop = stop.clone();
            let leaked = leaked.clone();
            thread::spawn(move || {
                let req = GatewayRequest::new(HttpMethod::Get, "/internal/secrets");
                while !stop.load(Ordering::Relaxed) {
                    if let RouteDecision::Forward { .. } = gateway.dispatch(&req) {
                        leaked.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for _ in 0..500 {
        gateway
            .replace_config(
                vec![Route::new("/internal/**", MethodSet::All, "lb://internal").with_id("internal")],
                vec![SecurityPolicy::new(PolicyKind::Auth, "/internal/**", "issuer=auth-server").with_id("auth")],
            )
            .unwrap();
        gateway.replace_config(vec![], vec![]).unwrap();
    }
    stop.store(true, Ordering::Relaxed);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(leaked.load(Ordering::Relaxed), 0);
}

#[test]
fn test_gateways_are_independent() {
    let first = empty_gateway();
    let second = empty_gateway();
    first
        .create_route(Route::new("/a/**", MethodSet::All, "lb://a").with_id("a"))
        .unwrap();

    let req = GatewayRequest::new(HttpMethod::Get, "/a/b");
    assert_eq!(forwarded_to(&first.dispatch(&req)), Some("a"));
    assert_eq!(second.dispatch(&req).deny_reason(), Some(&DenyReason::NotFound));
}
