//! Route conditions.
//!
//! Grammar:
//!
//! ```text
//! condition := clause (('&&' | 'and') clause)*
//! clause    := attribute ('==' | '!=') value
//! attribute := ident ('.' ident)* | 'header' '[' quoted ']' | 'query' '[' quoted ']'
//! value     := quoted | bare
//! ```
//!
//! Expressions are parsed once at write time. Evaluation never allocates and
//! never fails: an attribute missing from the context makes its comparison
//! false, whichever operator is used.

use std::fmt;

use thiserror::Error;

use crate::dispatch::RequestContext;

/// Expression parse failure. `position` is a byte offset into the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid expression at byte {position}: {reason}")]
pub struct InvalidExpression {
    pub position: usize,
    pub reason: String,
}

/// Where a clause reads its left-hand side from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// Dotted attribute, e.g. `region` or `client.ip`.
    Field(String),
    /// `header['X-Version']`, stored lowercased.
    Header(String),
    /// `query['v']`
    Query(String),
}

impl Attribute {
    fn resolve<'a>(&self, ctx: &'a RequestContext) -> Option<&'a str> {
        match self {
            Attribute::Field(name) => ctx.attribute(name),
            Attribute::Header(name) => ctx.header(name),
            Attribute::Query(name) => ctx.query(name),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Field(name) => f.write_str(name),
            Attribute::Header(name) => write!(f, "header['{name}']"),
            Attribute::Query(name) => write!(f, "query['{name}']"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub attribute: Attribute,
    pub op: Op,
    pub value: String,
}

impl Clause {
    fn evaluate(&self, ctx: &RequestContext) -> bool {
        match self.attribute.resolve(ctx) {
            None => false,
            Some(actual) => match self.op {
                Op::Eq => actual == self.value,
                Op::Ne => actual != self.value,
            },
        }
    }
}

/// A compiled conjunction of comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    source: String,
    clauses: Vec<Clause>,
}

impl Condition {
    pub fn compile(expr: &str) -> Result<Self, InvalidExpression> {
        let clauses = Parser::new(expr).parse()?;
        Ok(Self {
            source: expr.to_string(),
            clauses,
        })
    }

    pub fn evaluate(&self, ctx: &RequestContext) -> bool {
        self.clauses.iter().all(|c| c.evaluate(ctx))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn parse(mut self) -> Result<Vec<Clause>, InvalidExpression> {
        let mut clauses = vec![self.clause()?];
        loop {
            self.skip_ws();
            if self.at_end() {
                return Ok(clauses);
            }
            if self.eat("&&") || self.eat_keyword("and") {
                clauses.push(self.clause()?);
            } else {
                return Err(self.error("expected '&&' between clauses"));
            }
        }
    }

    fn clause(&mut self) -> Result<Clause, InvalidExpression> {
        self.skip_ws();
        let attribute = self.attribute()?;
        self.skip_ws();
        let op = if self.eat("==") {
            Op::Eq
        } else if self.eat("!=") {
            Op::Ne
        } else {
            return Err(self.error("expected '==' or '!='"));
        };
        self.skip_ws();
        let value = self.value()?;
        Ok(Clause {
            attribute,
            op,
            value,
        })
    }

    fn attribute(&mut self) -> Result<Attribute, InvalidExpression> {
        let start = self.pos;
        let mut name = self.ident()?;
        if self.peek() == Some('[') {
            self.pos += 1;
            let key = self.quoted()?;
            if !self.eat("]") {
                return Err(self.error("expected ']'"));
            }
            if key.is_empty() {
                return Err(InvalidExpression {
                    position: start,
                    reason: "empty index key".into(),
                });
            }
            return match name.as_str() {
                "header" => Ok(Attribute::Header(key.to_ascii_lowercase())),
                "query" => Ok(Attribute::Query(key)),
                _ => Err(InvalidExpression {
                    position: start,
                    reason: format!("unknown indexed attribute '{name}'"),
                }),
            };
        }
        while self.peek() == Some('.') {
            self.pos += 1;
            name.push('.');
            name.push_str(&self.ident()?);
        }
        Ok(Attribute::Field(name))
    }

    fn ident(&mut self) -> Result<String, InvalidExpression> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("expected attribute name"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn value(&mut self) -> Result<String, InvalidExpression> {
        match self.peek() {
            Some('\'') | Some('"') => self.quoted(),
            Some(_) => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || self.rest().starts_with("&&") {
                        break;
                    }
                    if matches!(c, '=' | '!' | '\'' | '"') {
                        return Err(self.error("unexpected character in bare value"));
                    }
                    self.pos += c.len_utf8();
                }
                Ok(self.src[start..self.pos].to_string())
            }
            None => Err(self.error("expected value")),
        }
    }

    fn quoted(&mut self) -> Result<String, InvalidExpression> {
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected quoted string")),
        };
        self.pos += 1;
        let start = self.pos;
        match self.rest().find(quote) {
            Some(len) => {
                self.pos += len + 1;
                Ok(self.src[start..start + len].to_string())
            }
            None => Err(InvalidExpression {
                position: start - 1,
                reason: "unterminated string".into(),
            }),
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        let rest = self.rest();
        let matched = rest
            .get(..kw.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(kw))
            && rest[kw.len()..].starts_with(char::is_whitespace);
        if matched {
            self.pos += kw.len();
        }
        matched
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn error(&self, reason: &str) -> InvalidExpression {
        InvalidExpression {
            position: self.pos,
            reason: reason.to_string(),
        }
    }
}
