// src/resolve/query.rs

//! Artifact filter language for resolver tasks.
//!
//! A filter is a conjunction of equality clauses:
//!
//! ```text
//! filter  := clause ( "and" clause )*
//! clause  := field "=" literal
//! field   := "contexts.name" | "artifact_type" | "uri" | "state" | "name"
//!          | "properties[" string "]" | "custom_properties[" string "]"
//! literal := string | number
//! string  := '...' | "..."      (backslash escapes the next character)
//! ```
//!
//! `and` is case-insensitive. No other operators exist. An empty filter
//! matches everything (still subject to the implicit context scope).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{EngineError, Result};
use crate::ir::{QueryCardinality, ResolverSpec, Value};
use crate::metadata::{MetadataStore, StoredArtifact};
use crate::outputs::TaskOutputs;

use super::context::RunContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterField {
    ContextName,
    ArtifactType,
    Uri,
    State,
    Name,
    Property(String),
    CustomProperty(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterLiteral {
    String(String),
    /// Numeric literal, kept as written.
    Number(String),
}

impl FilterLiteral {
    pub fn string(s: impl Into<String>) -> Self {
        FilterLiteral::String(s.into())
    }

    fn text(&self) -> &str {
        match self {
            FilterLiteral::String(s) | FilterLiteral::Number(s) => s,
        }
    }

    fn matches_text(&self, actual: &str) -> bool {
        self.text() == actual
    }

    /// Strings compare against the rendered value; numbers compare
    /// numerically against INT/DOUBLE values only.
    fn matches_value(&self, value: &Value) -> bool {
        match self {
            FilterLiteral::String(s) => value.to_string() == *s,
            FilterLiteral::Number(text) => match (value, text.parse::<f64>()) {
                (Value::Int(i), Ok(n)) => *i as f64 == n,
                (Value::Double(d), Ok(n)) => *d == n,
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: FilterField,
    pub literal: FilterLiteral,
}

impl Predicate {
    fn matches(&self, stored: &StoredArtifact) -> bool {
        let artifact = &stored.artifact;
        match &self.field {
            FilterField::ContextName => stored
                .contexts
                .iter()
                .any(|c| self.literal.matches_text(c)),
            FilterField::ArtifactType => self.literal.matches_text(artifact.artifact_type.identity()),
            FilterField::Uri => self.literal.matches_text(&artifact.uri),
            FilterField::Name => self.literal.matches_text(&artifact.name),
            FilterField::State => stored
                .state
                .to_string()
                .eq_ignore_ascii_case(self.literal.text()),
            FilterField::Property(key) => artifact
                .properties
                .get(key)
                .is_some_and(|v| self.literal.matches_value(v)),
            FilterField::CustomProperty(key) => artifact
                .custom_properties
                .get(key)
                .is_some_and(|v| self.literal.matches_value(v)),
        }
    }
}

/// A parsed filter: all predicates must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactFilter {
    predicates: Vec<Predicate>,
}

impl ArtifactFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: FilterField, literal: FilterLiteral) -> Self {
        self.predicates.push(Predicate { field, literal });
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn has_context_clause(&self) -> bool {
        self.predicates
            .iter()
            .any(|p| p.field == FilterField::ContextName)
    }

    /// Add a `contexts.name` clause unless the filter already has one.
    pub fn scoped_to(self, context: &str) -> Self {
        if self.has_context_clause() {
            self
        } else {
            self.with(FilterField::ContextName, FilterLiteral::string(context))
        }
    }

    pub fn matches(&self, stored: &StoredArtifact) -> bool {
        self.predicates.iter().all(|p| p.matches(stored))
    }
}

impl FromStr for ArtifactFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Parser::new(s).parse_filter()
    }
}

impl fmt::Display for ArtifactFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.predicates.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            match &p.field {
                FilterField::ContextName => f.write_str("contexts.name")?,
                FilterField::ArtifactType => f.write_str("artifact_type")?,
                FilterField::Uri => f.write_str("uri")?,
                FilterField::State => f.write_str("state")?,
                FilterField::Name => f.write_str("name")?,
                FilterField::Property(k) => write!(f, "properties['{}']", escape(k))?,
                FilterField::CustomProperty(k) => write!(f, "custom_properties['{}']", escape(k))?,
            }
            match &p.literal {
                FilterLiteral::String(s) => write!(f, " = '{}'", escape(s))?,
                FilterLiteral::Number(n) => write!(f, " = {n}")?,
            }
        }
        Ok(())
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> std::result::Result<(), String> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(format!("expected '{want}' at offset {}, found '{c}'", self.pos - c.len_utf8())),
            None => Err(format!("expected '{want}', found end of filter")),
        }
    }

    fn ident(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn parse_filter(mut self) -> std::result::Result<ArtifactFilter, String> {
        let mut filter = ArtifactFilter::new();
        self.skip_ws();
        if self.peek().is_none() {
            return Ok(filter);
        }

        loop {
            filter.predicates.push(self.parse_clause()?);
            self.skip_ws();
            if self.peek().is_none() {
                return Ok(filter);
            }
            let offset = self.pos;
            let keyword = self.ident();
            if !keyword.eq_ignore_ascii_case("and") {
                return Err(format!(
                    "expected 'and' at offset {offset}, found {:?}",
                    &self.src[offset..]
                ));
            }
            if !self.peek().is_some_and(char::is_whitespace) {
                return Err(format!("expected whitespace after 'and' at offset {}", self.pos));
            }
            self.skip_ws();
        }
    }

    fn parse_clause(&mut self) -> std::result::Result<Predicate, String> {
        let field = self.parse_field()?;
        self.skip_ws();
        self.expect('=')?;
        if self.peek() == Some('=') {
            return Err("only single '=' equality is supported".to_string());
        }
        self.skip_ws();
        let literal = self.parse_literal()?;
        Ok(Predicate { field, literal })
    }

    fn parse_field(&mut self) -> std::result::Result<FilterField, String> {
        let offset = self.pos;
        let name = self.ident();
        match name {
            "contexts.name" => Ok(FilterField::ContextName),
            "artifact_type" => Ok(FilterField::ArtifactType),
            "uri" => Ok(FilterField::Uri),
            "state" => Ok(FilterField::State),
            "name" => Ok(FilterField::Name),
            "properties" | "custom_properties" => {
                self.expect('[')?;
                let key = match self.peek() {
                    Some('\'') | Some('"') => self.parse_quoted()?,
                    _ => return Err(format!("expected quoted key after '{name}['")),
                };
                self.expect(']')?;
                if name == "properties" {
                    Ok(FilterField::Property(key))
                } else {
                    Ok(FilterField::CustomProperty(key))
                }
            }
            "" => Err(format!("expected a field name at offset {offset}")),
            other => Err(format!("unknown field '{other}'")),
        }
    }

    fn parse_literal(&mut self) -> std::result::Result<FilterLiteral, String> {
        match self.peek() {
            Some('\'') | Some('"') => Ok(FilterLiteral::String(self.parse_quoted()?)),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let start = self.pos;
                while self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
                {
                    self.bump();
                }
                let text = &self.src[start..self.pos];
                text.parse::<f64>()
                    .map_err(|_| format!("invalid number literal '{text}'"))?;
                Ok(FilterLiteral::Number(text.to_string()))
            }
            Some(c) => Err(format!("expected a literal at offset {}, found '{c}'", self.pos)),
            None => Err("expected a literal, found end of filter".to_string()),
        }
    }

    fn parse_quoted(&mut self) -> std::result::Result<String, String> {
        let quote = self.bump().ok_or("expected a quote")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err("dangling escape at end of filter".to_string()),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err("unterminated string literal".to_string()),
            }
        }
    }
}

/// Parse a filter, attributing failures to `task`.
pub fn parse_filter(task: &str, filter: &str) -> Result<ArtifactFilter> {
    filter
        .parse::<ArtifactFilter>()
        .map_err(|reason| EngineError::InvalidFilter {
            task: task.to_string(),
            filter: filter.to_string(),
            reason,
        })
}

/// Run every output query of a resolver task.
///
/// Queries without a `contexts.name` clause are scoped to the pipeline
/// context of `ctx`. Each query returns at most `limit` artifacts (1 when
/// unset), most recent first.
pub fn evaluate_resolver(
    task: &str,
    resolver: &ResolverSpec,
    ctx: &RunContext,
    store: &dyn MetadataStore,
) -> Result<TaskOutputs> {
    let mut outputs = TaskOutputs::default();

    for (key, query) in &resolver.output_artifact_queries {
        let filter = parse_filter(task, &query.filter)?.scoped_to(&ctx.pipeline_name);
        let limit = match query.limit {
            Some(n) if n > 0 => n as usize,
            _ => 1,
        };

        let mut found = store.query_artifacts(&filter, limit)?;
        found.truncate(limit);

        if found.is_empty() && query.cardinality == QueryCardinality::Required {
            return Err(EngineError::ArtifactNotFound {
                task: task.to_string(),
                output_key: key.clone(),
                filter: filter.to_string(),
            });
        }

        debug!(task = %task, output = %key, %filter, found = found.len(), "resolved artifact query");
        outputs.artifacts.insert(
            key.clone(),
            found.into_iter().map(|s| Arc::new(s.artifact)).collect(),
        );
    }

    info!(task = %task, outputs = outputs.artifacts.len(), "resolver task evaluated");
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conjunction_of_all_fields() {
        let f: ArtifactFilter = "contexts.name = 'train' AND artifact_type = \"system.Model\" and \
                                 properties['accuracy'] = 0.9 and custom_properties['tag']='v\\'1' \
                                 and uri='gs://x' and state = 'LIVE' and name='m'"
            .parse()
            .unwrap();
        assert_eq!(f.predicates().len(), 7);
        assert_eq!(
            f.predicates()[3],
            Predicate {
                field: FilterField::CustomProperty("tag".into()),
                literal: FilterLiteral::String("v'1".into()),
            }
        );
        assert!(f.has_context_clause());
    }

    #[test]
    fn empty_filter_has_no_predicates() {
        let f: ArtifactFilter = "   ".parse().unwrap();
        assert!(f.predicates().is_empty());
    }

    #[test]
    fn rejects_operators_outside_the_grammar() {
        for bad in [
            "uri = 'a' or uri = 'b'",
            "uri == 'a'",
            "uri != 'a'",
            "properties[k] = 'a'",
            "size = 3",
            "uri = 'unterminated",
            "uri = 'a' and",
            "uri = 'a' andname = 'b'",
        ] {
            assert!(bad.parse::<ArtifactFilter>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn display_round_trips() {
        let g: ArtifactFilter = "properties['a b'] = 'x\\'y' and state = 'LIVE'".parse().unwrap();
        assert_eq!(g.to_string().parse::<ArtifactFilter>().unwrap(), g);
    }

    #[test]
    fn scoping_adds_context_only_when_missing() {
        let f: ArtifactFilter = "uri = 'a'".parse().unwrap();
        let scoped = f.scoped_to("pipe");
        assert_eq!(scoped.predicates().len(), 2);
        let again = scoped.clone().scoped_to("other");
        assert_eq!(again, scoped);
    }
}
