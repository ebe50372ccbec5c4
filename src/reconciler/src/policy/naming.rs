//! Partition name templates.
//!
//! A pattern is literal identifier text with placeholders in braces:
//!
//! - `{n}` renders the boundary value itself, e.g. `p{n}` -> `p3000`
//! - `{<strftime>}` renders the point in time the boundary denotes, e.g.
//!   `p{%Y%m%d}` -> `p20240102`; only valid with calendar steps

use std::fmt;
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use common::ddl::Identifier;
use serde::{Serialize, Serializer};

use super::PolicyError;
use super::step::BoundaryStep;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Value,
    Date(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl NamingPattern {
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        let invalid = |reason: &str| PolicyError::InvalidPattern(format!("'{raw}': {reason}"));

        let mut segments = Vec::new();
        let mut rest = raw;
        while !rest.is_empty() {
            match rest.find('{') {
                Some(0) => {
                    let close = rest.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
                    let inner = &rest[1..close];
                    segments.push(parse_placeholder(inner).map_err(|reason| invalid(&reason))?);
                    rest = &rest[close + 1..];
                }
                Some(open) => {
                    segments.push(parse_literal(&rest[..open]).map_err(|reason| invalid(&reason))?);
                    rest = &rest[open..];
                }
                None => {
                    segments.push(parse_literal(rest).map_err(|reason| invalid(&reason))?);
                    rest = "";
                }
            }
        }

        if !segments.iter().any(|s| !matches!(s, Segment::Literal(_))) {
            return Err(invalid("needs a {n} or date placeholder"));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern renders dates and therefore needs a calendar step.
    pub fn has_date_placeholder(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Date(_)))
    }

    /// Partition name for the partition bounded above by `boundary`.
    pub fn render(&self, boundary: i64, step: &BoundaryStep) -> Result<Identifier, PolicyError> {
        let mut name = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => name.push_str(text),
                Segment::Value => name.push_str(&boundary.to_string()),
                Segment::Date(format) => {
                    let at = step
                        .repr()
                        .ok_or(PolicyError::DatePatternNeedsCalendarStep)?
                        .to_datetime(boundary)
                        .ok_or(PolicyError::BoundaryOutOfRange(boundary))?;
                    name.push_str(&at.format(format).to_string());
                }
            }
        }
        Ok(Identifier::new(name)?)
    }
}

fn parse_literal(text: &str) -> Result<Segment, String> {
    if let Some(c) = text
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$'))
    {
        return Err(format!("'{c}' is not allowed in a partition name"));
    }
    Ok(Segment::Literal(text.to_string()))
}

fn parse_placeholder(inner: &str) -> Result<Segment, String> {
    if inner == "n" {
        return Ok(Segment::Value);
    }
    if !inner.starts_with('%') {
        return Err(format!("unknown placeholder '{{{inner}}}'"));
    }
    if inner.contains(['{', ':', ']']) {
        return Err(format!("'{inner}' contains a reserved character"));
    }
    if StrftimeItems::new(inner).any(|item| matches!(item, Item::Error)) {
        return Err(format!("'{inner}' is not a valid date format"));
    }
    Ok(Segment::Date(inner.to_string()))
}

impl fmt::Display for NamingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for NamingPattern {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for NamingPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}
