//! Tuple pattern matching and projection.
//!
//! Records are JSON arrays (tuples). A pattern is a tree of terms:
//! literals must be equal, `_` matches any single element and `$N` matches
//! any element while capturing it. A variable that occurs twice must bind
//! the same value both times.
//!
//! Match clauses pair a pattern with a result spec. Guards are accepted and
//! carried along but never evaluated.

use crate::error::{CacheError, CacheResult};
use serde_json::Value;

const WILDCARD: &str = "_";
const WHOLE_OBJECT: &str = "$_";
const ALL_BINDINGS: &str = "$$";

#[derive(Debug, Clone, PartialEq)]
pub enum PatternTerm {
    Literal(Value),
    Wildcard,
    Binding(String),
    Tuple(Vec<PatternTerm>),
}

impl PatternTerm {
    /// Parse a JSON term: `"_"` is a wildcard, `"$<digits>"` a variable,
    /// an array a nested tuple pattern, anything else a literal.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) if s == WILDCARD => PatternTerm::Wildcard,
            Value::String(s) if is_variable(s) => PatternTerm::Binding(s.clone()),
            Value::Array(items) => PatternTerm::Tuple(items.iter().map(PatternTerm::from_json).collect()),
            other => PatternTerm::Literal(other.clone()),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        PatternTerm::Literal(value.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        PatternTerm::Binding(name.into())
    }
}

fn is_variable(s: &str) -> bool {
    s.len() > 1 && s.starts_with('$') && s[1..].bytes().all(|b| b.is_ascii_digit())
}

/// A pattern matched against whole records.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    root: PatternTerm,
}

impl Pattern {
    /// Matches every record.
    pub fn any() -> Self {
        Self {
            root: PatternTerm::Wildcard,
        }
    }

    pub fn tuple(terms: Vec<PatternTerm>) -> Self {
        Self {
            root: PatternTerm::Tuple(terms),
        }
    }

    pub fn from_json(value: &Value) -> Self {
        Self {
            root: PatternTerm::from_json(value),
        }
    }

    pub fn root(&self) -> &PatternTerm {
        &self.root
    }

    /// Key literal in position 0, when the pattern pins one.
    pub fn key_literal(&self) -> Option<&Value> {
        match &self.root {
            PatternTerm::Tuple(terms) => match terms.first() {
                Some(PatternTerm::Literal(v)) => Some(v),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Values captured by variables, in the order they were first bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    captured: Vec<(String, Value)>,
}

impl Bindings {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.captured.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn values(&self) -> Vec<Value> {
        self.captured.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.captured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captured.is_empty()
    }

    fn bind(&mut self, name: &str, value: &Value) -> bool {
        match self.get(name) {
            Some(existing) => existing == value,
            None => {
                self.captured.push((name.to_string(), value.clone()));
                true
            }
        }
    }
}

/// What a matching clause returns.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSpec {
    /// The matched record unchanged (`"$_"`).
    WholeObject,
    /// Captured values in binding order (`"$$"`).
    Bindings,
    /// Returned verbatim, including structural templates.
    Literal(Value),
}

impl ResultSpec {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) if s == WHOLE_OBJECT => ResultSpec::WholeObject,
            Value::String(s) if s == ALL_BINDINGS => ResultSpec::Bindings,
            other => ResultSpec::Literal(other.clone()),
        }
    }
}

/// One `{pattern, guards, result}` entry of a match specification.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    pub pattern: Pattern,
    pub guards: Vec<Value>,
    pub result: ResultSpec,
}

impl MatchClause {
    pub fn new(pattern: Pattern, result: ResultSpec) -> Self {
        Self {
            pattern,
            guards: Vec::new(),
            result,
        }
    }

    /// Parse `[pattern, [guards...], [body...]]`. The last body expression is
    /// the result; a non-list body is used directly.
    pub fn from_json(value: &Value) -> CacheResult<Self> {
        let parts = value
            .as_array()
            .filter(|parts| parts.len() == 3)
            .ok_or_else(|| CacheError::BadRequest(format!("invalid match clause: {value}")))?;

        let guards = match &parts[1] {
            Value::Array(guards) => guards.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        };
        let result = match &parts[2] {
            Value::Array(body) => body
                .last()
                .map(ResultSpec::from_json)
                .ok_or_else(|| CacheError::BadRequest("match clause has an empty body".to_string()))?,
            other => ResultSpec::from_json(other),
        };

        Ok(Self {
            pattern: Pattern::from_json(&parts[0]),
            guards,
            result,
        })
    }

    /// Parse a list of clauses.
    pub fn parse_spec(value: &Value) -> CacheResult<Vec<Self>> {
        value
            .as_array()
            .ok_or_else(|| CacheError::BadRequest(format!("match spec must be a list: {value}")))?
            .iter()
            .map(MatchClause::from_json)
            .collect()
    }
}

fn bind_term(term: &PatternTerm, value: &Value, bindings: &mut Bindings) -> bool {
    match term {
        PatternTerm::Wildcard => true,
        PatternTerm::Binding(name) => bindings.bind(name, value),
        PatternTerm::Literal(expected) => expected == value,
        PatternTerm::Tuple(terms) => match value {
            Value::Array(items) if items.len() == terms.len() => terms
                .iter()
                .zip(items)
                .all(|(term, item)| bind_term(term, item, bindings)),
            _ => false,
        },
    }
}

/// Match `record` against `pattern`, returning the captured variables.
pub fn bind(record: &Value, pattern: &Pattern) -> Option<Bindings> {
    let mut bindings = Bindings::default();
    bind_term(&pattern.root, record, &mut bindings).then_some(bindings)
}

pub fn matches(record: &Value, pattern: &Pattern) -> bool {
    bind(record, pattern).is_some()
}

fn render(record: &Value, bindings: Bindings, spec: &ResultSpec) -> Value {
    match spec {
        ResultSpec::WholeObject => record.clone(),
        ResultSpec::Bindings => Value::Array(bindings.values()),
        ResultSpec::Literal(value) => value.clone(),
    }
}

/// Project a record through `spec` if it matches `pattern`.
pub fn project(record: &Value, pattern: &Pattern, spec: &ResultSpec) -> Option<Value> {
    bind(record, pattern).map(|bindings| render(record, bindings, spec))
}

/// Result of the first clause whose pattern matches `record`.
pub fn evaluate(record: &Value, clauses: &[MatchClause]) -> Option<Value> {
    clauses
        .iter()
        .find_map(|clause| project(record, &clause.pattern, &clause.result))
}

/// Project every record through the first matching clause, stopping after
/// `limit` results when a limit is given.
pub fn select<'a, I>(records: I, clauses: &[MatchClause], limit: Option<usize>) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let projected = records
        .into_iter()
        .filter_map(|record| evaluate(record, clauses));
    match limit {
        Some(limit) => projected.take(limit).collect(),
        None => projected.collect(),
    }
}

/// Only a literal `true` counts as a positive result for select-delete.
pub fn is_truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}
