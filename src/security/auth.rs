//! Credential verification for authentication policies.
//!
//! # Responsibilities
//! - Parse `issuer=<name>[;header=<name>][;scheme=<word>|none]`
//! - Extract the credential from the configured header
//! - Ask a `CredentialVerifier` for the authenticated principal
//!
//! # Design Decisions
//! - Fail closed: a missing header, an empty credential or an unknown
//!   issuer all reject
//! - Verification sits behind a trait so deployments can plug in JWT or
//!   introspection backends; `StaticVerifier` covers config-file tokens

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dispatch::RequestContext;

/// Parsed authentication policy config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthConfig {
    pub issuer: String,
    /// Lowercased header name.
    pub header: String,
    /// Expected scheme prefix, e.g. `Bearer`. `None` takes the raw header value.
    pub scheme: Option<String>,
}

impl AuthConfig {
    pub fn parse(config: &str) -> Result<Self, String> {
        let mut issuer = None;
        let mut header = "authorization".to_string();
        let mut scheme = Some("Bearer".to_string());

        for option in config.split(';').map(str::trim).filter(|o| !o.is_empty()) {
            let (key, value) = option
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| format!("expected key=value, got '{option}'"))?;
            if value.is_empty() {
                return Err(format!("'{key}' needs a value"));
            }
            match key {
                "issuer" => issuer = Some(value.to_string()),
                "header" => header = value.to_ascii_lowercase(),
                "scheme" if value.eq_ignore_ascii_case("none") => scheme = None,
                "scheme" => scheme = Some(value.to_string()),
                other => return Err(format!("unknown auth option '{other}'")),
            }
        }

        Ok(Self {
            issuer: issuer.ok_or("missing 'issuer'")?,
            header,
            scheme,
        })
    }

    /// The credential carried by the request, if any.
    pub fn credential<'a>(&self, ctx: &'a RequestContext) -> Option<&'a str> {
        let raw = ctx.header(&self.header)?.trim();
        let credential = match &self.scheme {
            None => raw,
            Some(scheme) => {
                let (given, rest) = raw.split_once(' ')?;
                if !given.eq_ignore_ascii_case(scheme) {
                    return None;
                }
                rest.trim()
            }
        };
        (!credential.is_empty()).then_some(credential)
    }
}

/// Resolves a credential to a principal for a named issuer.
pub trait CredentialVerifier: Send + Sync {
    /// Returns the principal when `credential` is valid for `issuer`.
    fn verify(&self, issuer: &str, credential: &str) -> Option<String>;
}

/// One issuer's accepted tokens, as written in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerConfig {
    pub name: String,
    /// token → subject
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

/// Verifier backed by static token lists.
#[derive(Debug, Clone, Default)]
pub struct StaticVerifier {
    issuers: HashMap<String, HashMap<String, String>>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_issuers(issuers: &[IssuerConfig]) -> Self {
        let mut verifier = Self::new();
        for issuer in issuers {
            for (token, subject) in &issuer.tokens {
                verifier = verifier.with_token(&issuer.name, token, subject);
            }
            verifier.issuers.entry(issuer.name.clone()).or_default();
        }
        verifier
    }

    pub fn with_token(mut self, issuer: &str, token: &str, subject: &str) -> Self {
        self.issuers
            .entry(issuer.to_string())
            .or_default()
            .insert(token.to_string(), subject.to_string());
        self
    }
}

impl CredentialVerifier for StaticVerifier {
    fn verify(&self, issuer: &str, credential: &str) -> Option<String> {
        self.issuers.get(issuer)?.get(credential).cloned()
    }
}
