//! Request handling and transformation.
//!
//! # Responsibilities
//! - Convert an axum request into a `GatewayRequest`
//! - Carry the request ID, client address, headers, query and body across
//! - Populate the condition attributes (`region`, `host`, `client.ip`)
//! - Normalize the path so routes and policy scopes see the same segments
//!   the upstream will
//!
//! # Design Decisions
//! - Request ID is assigned by the tower-http layer before this runs
//! - Body is read up to the configured limit; larger bodies are rejected
//!   rather than inspected partially
//! - Paths that cannot be normalized unambiguously are rejected with 400
//!   instead of being matched in raw form

use std::net::SocketAddr;
use std::str::FromStr;

use axum::body::{to_bytes, Body};
use axum::http::{request::Parts, HeaderMap, Request, StatusCode};

use crate::dispatch::GatewayRequest;
use crate::routing::HttpMethod;

/// Header carrying the correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Why an inbound request could not be turned into a `GatewayRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestRejection {
    UnsupportedMethod(String),
    BodyTooLarge,
    MalformedPath(&'static str),
}

impl RequestRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestRejection::UnsupportedMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            RequestRejection::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RequestRejection::MalformedPath(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> String {
        match self {
            RequestRejection::UnsupportedMethod(m) => format!("unsupported method '{m}'"),
            RequestRejection::BodyTooLarge => "request body too large".to_string(),
            RequestRejection::MalformedPath(why) => format!("malformed path: {why}"),
        }
    }
}

/// Options applied while converting requests.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub region_header: String,
    pub max_body_bytes: usize,
}

pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Read the body and build the engine-side request.
pub async fn into_gateway_request(
    request: Request<Body>,
    client: SocketAddr,
    options: &RequestOptions,
) -> Result<GatewayRequest, RequestRejection> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, options.max_body_bytes)
        .await
        .map_err(|_| RequestRejection::BodyTooLarge)?;
    let mut request = from_parts(&parts, client, &options.region_header)?;
    request.body = body.to_vec();
    Ok(request)
}

fn from_parts(
    parts: &Parts,
    client: SocketAddr,
    region_header: &str,
) -> Result<GatewayRequest, RequestRejection> {
    let method = HttpMethod::from_str(parts.method.as_str())
        .map_err(|_| RequestRejection::UnsupportedMethod(parts.method.to_string()))?;

    let path = normalize_path(parts.uri.path())?;
    let mut request = GatewayRequest::new(method, path).client_ip(client.ip());
    if let Some(id) = request_id(&parts.headers) {
        request = request.request_id(id);
    }
    if let Some(query) = parts.uri.query() {
        request = request.query_string(query);
    }

    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => request.context.set_header(name.as_str(), value),
            Err(_) => tracing::debug!(header = %name, "Skipping non-ASCII header value"),
        }
    }

    // Taken as-is; the edge in front of the gateway owns this header.
    let region = request.context.header(&region_header.to_ascii_lowercase()).map(String::from);
    if let Some(region) = region {
        request.context.set_attribute("region", region);
    }
    let host = request.context.header("host").map(String::from);
    if let Some(host) = host {
        request.context.set_attribute("host", host);
    }

    Ok(request)
}

/// Percent-decode each segment and resolve `.` and `..`.
///
/// Rejected: an encoded `/` inside a segment, a dot-segment spelled with
/// `%2E`, `..` above the root, and segments that do not decode to UTF-8.
/// A trailing slash, or a path ending in a dot-segment, keeps its trailing `/`.
pub fn normalize_path(raw: &str) -> Result<String, RequestRejection> {
    let Some(rest) = raw.strip_prefix('/') else {
        return Err(RequestRejection::MalformedPath("must start with '/'"));
    };

    let mut segments: Vec<String> = Vec::new();
    let mut ends_in_directory = false;
    for segment in rest.split('/') {
        let lower = segment.to_ascii_lowercase();
        if lower.contains("%2f") {
            return Err(RequestRejection::MalformedPath("encoded '/' in segment"));
        }
        let decoded = String::from_utf8(urlencoding::decode_binary(segment.as_bytes()).into_owned())
            .map_err(|_| RequestRejection::MalformedPath("segment is not valid UTF-8"))?;

        match decoded.as_str() {
            "." | ".." if decoded != segment => {
                return Err(RequestRejection::MalformedPath("encoded dot-segment"));
            }
            "." => ends_in_directory = true,
            ".." => {
                if segments.pop().is_none() {
                    return Err(RequestRejection::MalformedPath("'..' above root"));
                }
                ends_in_directory = true;
            }
            _ => {
                segments.push(decoded);
                ends_in_directory = false;
            }
        }
    }

    let mut path = format!("/{}", segments.join("/"));
    if ends_in_directory && !path.ends_with('/') {
        path.push('/');
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> RequestOptions {
        RequestOptions {
            region_header: "X-Region".into(),
            max_body_bytes: 16,
        }
    }

    fn client() -> SocketAddr {
        "192.168.1.20:51000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_converts_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/order/7?debug=1")
            .header("x-request-id", "abc")
            .header("x-region", "EU")
            .header("host", "gw.local")
            .body(Body::from("hi"))
            .unwrap();

        let req = into_gateway_request(request, client(), &options()).await.unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "/api/order/7");
        assert_eq!(req.request_id.as_deref(), Some("abc"));
        assert_eq!(req.context.query("debug"), Some("1"));
        assert_eq!(req.context.attribute("region"), Some("EU"));
        assert_eq!(req.context.attribute("host"), Some("gw.local"));
        assert_eq!(req.context.attribute("client.ip"), Some("192.168.1.20"));
        assert_eq!(req.body, b"hi");
    }

    #[tokio::test]
    async fn test_rejects_oversized_body() {
        let request = Request::builder()
            .uri("/upload")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let err = into_gateway_request(request, client(), &options()).await.unwrap_err();
        assert_eq!(err, RequestRejection::BodyTooLarge);
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_normalize_decodes_and_resolves_dot_segments() {
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("/api/user/1").unwrap(), "/api/user/1");
        assert_eq!(normalize_path("/api/%61dmin/users").unwrap(), "/api/admin/users");
        assert_eq!(normalize_path("/api/x/../admin/users").unwrap(), "/api/admin/users");
        assert_eq!(normalize_path("/api/./admin").unwrap(), "/api/admin");
        assert_eq!(normalize_path("/api/admin/").unwrap(), "/api/admin/");
        assert_eq!(normalize_path("/api/admin/..").unwrap(), "/api/");
        assert_eq!(normalize_path("/caf%C3%A9").unwrap(), "/café");
        // Decoded once only.
        assert_eq!(normalize_path("/api/%2561dmin").unwrap(), "/api/%61dmin");
    }

    #[test]
    fn test_normalize_rejects_ambiguous_paths() {
        for raw in [
            "/api/%2Fadmin",
            "/api/a%2fb",
            "/api/%2E%2E/admin",
            "/api/.%2e/admin",
            "/api/%2e",
            "/..",
            "/api/../../admin",
            "/bad%FF",
            "relative",
        ] {
            let err = normalize_path(raw).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{raw}");
        }
    }

    #[tokio::test]
    async fn test_converts_with_normalized_path() {
        let request = Request::builder()
            .uri("/api/x/../%61dmin/users?id=1")
            .body(Body::empty())
            .unwrap();
        let req = into_gateway_request(request, client(), &options()).await.unwrap();
        assert_eq!(req.path, "/api/admin/users");
        assert_eq!(req.context.query("id"), Some("1"));

        let request = Request::builder().uri("/api/%2Fadmin").body(Body::empty()).unwrap();
        let err = into_gateway_request(request, client(), &options()).await.unwrap_err();
        assert!(matches!(err, RequestRejection::MalformedPath(_)));
    }
}
