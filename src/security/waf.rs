//! Content filtering (WAF) signatures.
//!
//! # Responsibilities
//! - Parse rule lists such as `block-sql-injection;block-xss;deny=wp-admin`
//! - Inspect path, query, header values and body against the signatures
//!
//! # Design Decisions
//! - Inputs are normalized before matching: percent-decoded (`+` → space),
//!   lowercased and whitespace-collapsed, so encoded payloads cannot slip by
//! - Substring signatures, no regex: inspection cost is linear in input size

use serde::Serialize;

use crate::dispatch::GatewayRequest;

const SQL_INJECTION: &[&str] = &[
    "' or '",
    "' or 1=1",
    "\" or \"",
    " or 1=1",
    "union select",
    "union all select",
    "; drop ",
    "drop table",
    "insert into",
    "delete from",
    "information_schema",
    "sleep(",
    "benchmark(",
    "'--",
    "' --",
    "';",
];

const XSS: &[&str] = &[
    "<script",
    "</script",
    "javascript:",
    "onerror=",
    "onload=",
    "onmouseover=",
    "<iframe",
    "<svg",
    "document.cookie",
];

const PATH_TRAVERSAL: &[&str] = &["../", "..\\", "/etc/passwd", "c:\\windows"];

/// One configured WAF rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", content = "literal", rename_all = "kebab-case")]
pub enum WafRule {
    SqlInjection,
    Xss,
    PathTraversal,
    /// Operator-supplied literal, stored normalized.
    Deny(String),
}

impl WafRule {
    pub fn name(&self) -> &str {
        match self {
            WafRule::SqlInjection => "sql-injection",
            WafRule::Xss => "xss",
            WafRule::PathTraversal => "path-traversal",
            WafRule::Deny(_) => "custom",
        }
    }

    fn matches(&self, normalized: &str) -> bool {
        match self {
            WafRule::SqlInjection => SQL_INJECTION.iter().any(|s| normalized.contains(s)),
            WafRule::Xss => XSS.iter().any(|s| normalized.contains(s)),
            WafRule::PathTraversal => PATH_TRAVERSAL.iter().any(|s| normalized.contains(s)),
            WafRule::Deny(literal) => normalized.contains(literal.as_str()),
        }
    }
}

/// Parsed WAF policy config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WafConfig {
    pub rules: Vec<WafRule>,
}

impl WafConfig {
    pub fn parse(config: &str) -> Result<Self, String> {
        let mut rules = Vec::new();
        for item in config.split(';').map(str::trim).filter(|i| !i.is_empty()) {
            let rule = match item {
                "block-sql-injection" => WafRule::SqlInjection,
                "block-xss" => WafRule::Xss,
                "block-path-traversal" => WafRule::PathTraversal,
                other => match other.strip_prefix("deny=") {
                    Some(literal) if !literal.trim().is_empty() => {
                        WafRule::Deny(normalize(literal.trim()))
                    }
                    Some(_) => return Err("'deny=' needs a literal".into()),
                    None => return Err(format!("unknown WAF rule '{other}'")),
                },
            };
            if !rules.contains(&rule) {
                rules.push(rule);
            }
        }
        if rules.is_empty() {
            return Err("at least one WAF rule is required".into());
        }
        Ok(Self { rules })
    }

    /// First rule matched by any inspected part of the request.
    pub fn inspect(&self, request: &GatewayRequest) -> Option<&WafRule> {
        let mut inputs = vec![normalize(&request.path)];
        if let Some(query) = &request.raw_query {
            inputs.push(normalize(query));
        }
        inputs.extend(request.context.headers().map(|(_, v)| normalize(v)));
        if !request.body.is_empty() {
            inputs.push(normalize(&String::from_utf8_lossy(&request.body)));
        }

        self.rules
            .iter()
            .find(|rule| inputs.iter().any(|input| rule.matches(input)))
    }
}

/// Percent-decode, lowercase and collapse whitespace runs to one space.
fn normalize(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    let decoded = urlencoding::decode(&spaced)
        .map(|d| d.into_owned())
        .unwrap_or(spaced);
    decoded
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
