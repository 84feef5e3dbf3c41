//! Route definitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "CONNECT" => Ok(HttpMethod::Connect),
            "OPTIONS" => Ok(HttpMethod::Options),
            "TRACE" => Ok(HttpMethod::Trace),
            "PATCH" => Ok(HttpMethod::Patch),
            other => Err(format!("unknown HTTP method '{other}'")),
        }
    }
}

/// Methods a route accepts. Written as `"ALL"`, `"GET"` or `"GET,POST"`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MethodSet {
    #[default]
    All,
    Only(Vec<HttpMethod>),
}

impl MethodSet {
    pub fn contains(&self, method: HttpMethod) -> bool {
        match self {
            MethodSet::All => true,
            MethodSet::Only(methods) => methods.contains(&method),
        }
    }
}

impl FromStr for MethodSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("ALL") || s == "*" {
            return Ok(MethodSet::All);
        }
        let mut methods = Vec::new();
        for part in s.split(',') {
            let method: HttpMethod = part.parse()?;
            if !methods.contains(&method) {
                methods.push(method);
            }
        }
        Ok(MethodSet::Only(methods))
    }
}

impl TryFrom<String> for MethodSet {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MethodSet> for String {
    fn from(set: MethodSet) -> Self {
        set.to_string()
    }
}

impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodSet::All => f.write_str("ALL"),
            MethodSet::Only(methods) => {
                for (i, m) in methods.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(m.as_str())?;
                }
                Ok(())
            }
        }
    }
}

/// A rule mapping method + path pattern (+ optional condition) to an upstream target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Unique identifier. Generated when omitted.
    #[serde(default = "generate_id")]
    pub id: String,

    /// Path pattern, e.g. `/api/payment/**`.
    pub path: String,

    #[serde(default, alias = "method")]
    pub methods: MethodSet,

    /// Opaque upstream reference, e.g. `lb://payment-service`.
    pub target: String,

    /// Optional condition such as `region==EU`. Blank means none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Route {
    pub fn new(path: impl Into<String>, methods: MethodSet, target: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            path: path.into(),
            methods,
            target: target.into(),
            condition: None,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The condition text, if any non-blank one is set.
    pub fn condition_expr(&self) -> Option<&str> {
        self.condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

pub(crate) fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_enabled() -> bool {
    true
}
