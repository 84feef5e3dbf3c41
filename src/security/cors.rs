//! Cross-origin policy annotations.
//!
//! A CORS policy never denies. It adds response headers to the decision and
//! the chain continues.

use serde::Serialize;

use crate::dispatch::RequestContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

/// Parsed CORS policy config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorsConfig {
    pub allow_origin: AllowedOrigins,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub max_age: Option<u64>,
    pub allow_credentials: bool,
}

impl CorsConfig {
    pub fn parse(config: &str) -> Result<Self, String> {
        let mut allow_origin = None;
        let mut cfg = CorsConfig {
            allow_origin: AllowedOrigins::Any,
            allow_methods: Vec::new(),
            allow_headers: Vec::new(),
            max_age: None,
            allow_credentials: false,
        };

        for option in config.split(';').map(str::trim).filter(|o| !o.is_empty()) {
            let (key, value) = option
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| format!("expected key=value, got '{option}'"))?;
            match key {
                "allow-origin" if value == "*" => allow_origin = Some(AllowedOrigins::Any),
                "allow-origin" => allow_origin = Some(AllowedOrigins::List(list(value)?)),
                "allow-methods" => {
                    cfg.allow_methods = list(value)?
                        .into_iter()
                        .map(|m| m.to_ascii_uppercase())
                        .collect()
                }
                "allow-headers" => cfg.allow_headers = list(value)?,
                "max-age" => {
                    cfg.max_age = Some(
                        value
                            .parse()
                            .map_err(|_| format!("max-age '{value}' is not a number"))?,
                    )
                }
                "allow-credentials" => {
                    cfg.allow_credentials = value
                        .parse()
                        .map_err(|_| format!("allow-credentials '{value}' is not true/false"))?
                }
                other => return Err(format!("unknown CORS option '{other}'")),
            }
        }

        cfg.allow_origin = allow_origin.ok_or("missing 'allow-origin'")?;
        if cfg.allow_credentials && cfg.allow_origin == AllowedOrigins::Any {
            return Err("allow-credentials cannot be combined with allow-origin=*".into());
        }
        Ok(cfg)
    }

    /// Response headers to apply for this request. Lowercase names.
    pub fn annotations(&self, ctx: &RequestContext) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        match &self.allow_origin {
            AllowedOrigins::Any => headers.push(header("access-control-allow-origin", "*")),
            AllowedOrigins::List(origins) => {
                let Some(origin) = ctx.header("origin") else {
                    return headers;
                };
                if !origins.iter().any(|o| o == origin) {
                    return headers;
                }
                headers.push(header("access-control-allow-origin", origin));
                headers.push(header("vary", "origin"));
            }
        }
        if !self.allow_methods.is_empty() {
            headers.push(header("access-control-allow-methods", &self.allow_methods.join(", ")));
        }
        if !self.allow_headers.is_empty() {
            headers.push(header("access-control-allow-headers", &self.allow_headers.join(", ")));
        }
        if let Some(max_age) = self.max_age {
            headers.push(header("access-control-max-age", &max_age.to_string()));
        }
        if self.allow_credentials {
            headers.push(header("access-control-allow-credentials", "true"));
        }
        headers
    }
}

fn header(name: &str, value: &str) -> (String, String) {
    (name.to_string(), value.to_string())
}

fn list(value: &str) -> Result<Vec<String>, String> {
    let items: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect();
    if items.is_empty() {
        return Err("list must not be empty".into());
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_origin() {
        let cfg = CorsConfig::parse("allow-origin=*").unwrap();
        let headers = cfg.annotations(&RequestContext::new());
        assert_eq!(headers, vec![header("access-control-allow-origin", "*")]);
    }

    #[test]
    fn test_listed_origin_is_echoed() {
        let cfg = CorsConfig::parse(
            "allow-origin=https://a.example, https://b.example; allow-methods=get,post; max-age=600; allow-credentials=true",
        )
        .unwrap();

        let listed = RequestContext::new().with_header("Origin", "https://b.example");
        let headers = cfg.annotations(&listed);
        assert!(headers.contains(&header("access-control-allow-origin", "https://b.example")));
        assert!(headers.contains(&header("vary", "origin")));
        assert!(headers.contains(&header("access-control-allow-methods", "GET, POST")));
        assert!(headers.contains(&header("access-control-max-age", "600")));
        assert!(headers.contains(&header("access-control-allow-credentials", "true")));

        let other = RequestContext::new().with_header("Origin", "https://evil.example");
        assert!(cfg.annotations(&other).is_empty());
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "",
            "allow-methods=GET",
            "allow-origin=",
            "allow-origin=*;max-age=soon",
            "allow-origin=*;allow-credentials=true",
            "allow-origin=*;expose=x",
        ] {
            assert!(CorsConfig::parse(bad).is_err(), "{bad:?} should fail");
        }
    }
}
