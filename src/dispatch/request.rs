//! Engine-side view of an inbound request.
//!
//! # Design Decisions
//! - Header names are lowercased on insert so lookups are case-insensitive
//! - The context is immutable during a dispatch; conditions and policies
//!   only borrow it

use std::collections::HashMap;
use std::net::IpAddr;

use crate::routing::HttpMethod;

/// Attribute, header and query mappings that conditions are evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    attributes: HashMap<String, String>,
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Repeated headers are joined with `", "`.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let value = value.into();
        self.headers
            .entry(name.as_ref().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    /// Parse `a=1&b=two` into the query map. Undecodable pairs are kept raw.
    pub fn set_query_string(&mut self, raw: &str) {
        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            self.query.insert(decode_component(k), decode_component(v));
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// `name` must already be lowercase.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

/// A request as seen by the dispatcher.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub request_id: Option<String>,
    pub method: HttpMethod,
    pub path: String,
    pub raw_query: Option<String>,
    pub client_ip: Option<IpAddr>,
    pub body: Vec<u8>,
    pub context: RequestContext,
}

impl GatewayRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            request_id: None,
            method,
            path: path.into(),
            raw_query: None,
            client_ip: None,
            body: Vec::new(),
            context: RequestContext::new(),
        }
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.context.set_header(name, value);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.set_attribute(name, value);
        self
    }

    pub fn query_string(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        self.context.set_query_string(&raw);
        self.raw_query = Some(raw);
        self
    }

    /// Also exposes the address as the `client.ip` attribute.
    pub fn client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self.context.set_attribute("client.ip", ip.to_string());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}
