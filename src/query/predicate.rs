//! The query tree.
//!
//! Both term searches and structured predicates are represented as a
//! [`Predicate`], which the evaluator interprets recursively.

use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};

use crate::error::{QuarryError, Result};

/// Comparison operator of a [`Predicate::Compare`] leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Wildcard match: `*` is any run of characters, `?` any single one.
    Like,
    Contains,
    BeginsWith,
    EndsWith,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Like => "LIKE",
            CompareOp::Contains => "CONTAINS",
            CompareOp::BeginsWith => "BEGINSWITH",
            CompareOp::EndsWith => "ENDSWITH",
        };
        f.write_str(s)
    }
}

/// A literal operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
}

impl Literal {
    /// The literal as it was written, for string comparisons.
    pub fn to_text(&self) -> String {
        match self {
            Literal::Str(s) => s.clone(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Str(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

/// A node of the query tree.
///
/// `field: None` on the text leaves means "any of the default fields".
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every live document.
    True,

    /// Analyzed text; every resulting term must occur in the field. Terms
    /// produced at the same position are alternatives.
    Term { field: Option<String>, text: String },

    /// Analyzed text whose terms must occur at consecutive positions.
    Phrase { field: Option<String>, text: String },

    /// Terms starting with `prefix` (lowercased, not stemmed).
    Prefix { field: Option<String>, prefix: String },

    /// Compare a field against a literal.
    Compare {
        field: String,
        op: CompareOp,
        value: Literal,
        case_insensitive: bool,
    },

    /// Inclusive range.
    Between {
        field: String,
        low: Literal,
        high: Literal,
    },

    /// Equal to any of the listed values.
    In {
        field: String,
        values: Vec<Literal>,
        case_insensitive: bool,
    },

    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Self {
        Predicate::Term {
            field: Some(field.into()),
            text: text.into(),
        }
    }

    pub fn phrase(field: impl Into<String>, text: impl Into<String>) -> Self {
        Predicate::Phrase {
            field: Some(field.into()),
            text: text.into(),
        }
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Predicate::Prefix {
            field: Some(field.into()),
            prefix: prefix.into(),
        }
    }

    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Literal>) -> Self {
        Predicate::Compare {
            field: field.into(),
            op,
            value: value.into(),
            case_insensitive: false,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Like, Literal::Str(pattern.into()))
    }

    pub fn between(
        field: impl Into<String>,
        low: impl Into<Literal>,
        high: impl Into<Literal>,
    ) -> Self {
        Predicate::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut children) => {
                children.push(other);
                Predicate::And(children)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut children) => {
                children.push(other);
                Predicate::Or(children)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }
}

impl FromStr for Predicate {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        crate::query::parser::parse_predicate(s)
    }
}

/// How to order a result set by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortType {
    String,
    Integer,
    Float,
    Date,
}

impl FromStr for SortType {
    type Err = QuarryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(SortType::String),
            "integer" | "int" => Ok(SortType::Integer),
            "float" | "double" | "number" => Ok(SortType::Float),
            "date" | "datetime" => Ok(SortType::Date),
            other => Err(QuarryError::query(format!("unknown sort type {other:?}"))),
        }
    }
}

/// Sort by a field instead of by relevance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub sort_type: SortType,
    pub ascending: bool,
}

impl SortSpec {
    pub fn new(field: impl Into<String>, sort_type: SortType, ascending: bool) -> Self {
        SortSpec {
            field: field.into(),
            sort_type,
            ascending,
        }
    }

    pub fn ascending(field: impl Into<String>, sort_type: SortType) -> Self {
        Self::new(field, sort_type, true)
    }

    pub fn descending(field: impl Into<String>, sort_type: SortType) -> Self {
        Self::new(field, sort_type, false)
    }
}

/// Compile a `LIKE` pattern into an anchored regex.
///
/// `*` matches any run of characters and `?` exactly one; a backslash makes
/// the next character literal.
pub fn wildcard_regex(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => source.push_str(&regex::escape(&escaped.to_string())),
                None => source.push_str(r"\\"),
            },
            c => source.push_str(&regex::escape(&c.to_string())),
        }
    }
    source.push('$');
    RegexBuilder::new(&source)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| QuarryError::query(format!("invalid LIKE pattern {pattern:?}: {e}")))
}

pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}
