//! Response rendering.
//!
//! # Responsibilities
//! - Map a `RouteDecision` to an HTTP status
//! - Attach the route, target and annotation headers on forward
//! - Render JSON bodies for every outcome
//!
//! # Design Decisions
//! - Forward-auth style: the caller proxies on 200 and uses the target header
//! - Annotation headers that are not valid HTTP are dropped with a warning

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::dispatch::{DenyReason, RouteDecision};

pub const X_GATEWAY_ROUTE: &str = "x-gateway-route";
pub const X_GATEWAY_TARGET: &str = "x-gateway-target";

pub fn status_for(reason: &DenyReason) -> StatusCode {
    match reason {
        DenyReason::NotFound => StatusCode::NOT_FOUND,
        DenyReason::Unauthorized => StatusCode::UNAUTHORIZED,
        DenyReason::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        DenyReason::Blocked { .. } => StatusCode::FORBIDDEN,
        DenyReason::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn render(decision: &RouteDecision) -> Response {
    match decision {
        RouteDecision::Forward {
            route_id,
            target,
            annotations,
        } => {
            let mut response = (StatusCode::OK, Json(decision)).into_response();
            let headers = response.headers_mut();
            for (name, value) in [(X_GATEWAY_ROUTE, route_id), (X_GATEWAY_TARGET, target)] {
                match HeaderValue::from_str(value) {
                    Ok(value) => {
                        headers.insert(name, value);
                    }
                    Err(_) => tracing::warn!(header = name, "Dropping invalid gateway header value"),
                }
            }
            for (name, value) in annotations {
                match (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
                    (Ok(name), Ok(value)) => {
                        headers.append(name, value);
                    }
                    _ => tracing::warn!(header = %name, "Dropping invalid annotation header"),
                }
            }
            response
        }
        RouteDecision::Deny { reason } => (status_for(reason), Json(decision)).into_response(),
    }
}

/// JSON error body for requests rejected before dispatch.
pub fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_statuses() {
        let cases = [
            (DenyReason::NotFound, 404),
            (DenyReason::Unauthorized, 401),
            (DenyReason::RateLimited, 429),
            (DenyReason::Blocked { rule: "xss".into() }, 403),
            (DenyReason::Internal, 500),
        ];
        for (reason, status) in cases {
            let response = render(&RouteDecision::deny(reason));
            assert_eq!(response.status().as_u16(), status);
        }
    }

    #[test]
    fn test_forward_headers() {
        let response = render(&RouteDecision::Forward {
            route_id: "pay".into(),
            target: "lb://payment-service".into(),
            annotations: vec![
                ("access-control-allow-origin".into(), "*".into()),
                ("bad header".into(), "x".into()),
            ],
        });
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[X_GATEWAY_ROUTE], "pay");
        assert_eq!(headers[X_GATEWAY_TARGET], "lb://payment-service");
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert!(headers.get("bad header").is_none());
    }
}
