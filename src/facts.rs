//! Fact names, values and the registry they are stored in.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a harvested fact.
///
/// Built by joining path segments with `_` after replacing `-` and `/` in
/// each segment with `_`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FactName(String);

impl FactName {
    /// Join `segments` into a fact name.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = segments
            .into_iter()
            .map(|segment| sanitize(segment.as_ref()))
            .collect::<Vec<_>>()
            .join("_");
        Self(joined)
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the name, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for FactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FactName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn sanitize(segment: &str) -> String {
    segment.replace(['-', '/'], "_")
}

/// Value of a fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactValue::Boolean(b) => write!(f, "{b}"),
            FactValue::Integer(n) => write!(f, "{n}"),
            FactValue::Float(n) => write!(f, "{n}"),
            FactValue::String(s) => f.write_str(s),
            FactValue::List(items) => f.write_str(&items.join(",")),
        }
    }
}

impl From<String> for FactValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for FactValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for FactValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for FactValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Vec<String>> for FactValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// Store of named facts.
///
/// The harvester reads host facts (virtualization platform, MAC address,
/// kernel) from it and registers what it discovers into it.
pub trait FactRegistry {
    /// Current value of the fact called `name`.
    fn value(&self, name: &str) -> Option<FactValue>;

    /// Define or replace a fact.
    fn register(&mut self, name: FactName, value: FactValue);
}

/// In-memory fact registry ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Facts {
    entries: BTreeMap<String, FactValue>,
}

impl Facts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fact by its literal name, without segment sanitizing.
    pub fn with(mut self, name: &str, value: impl Into<FactValue>) -> Self {
        self.entries.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FactValue> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Facts in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FactValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl FactRegistry for Facts {
    fn value(&self, name: &str) -> Option<FactValue> {
        self.entries.get(name).cloned()
    }

    fn register(&mut self, name: FactName, value: FactValue) {
        self.entries.insert(name.into_string(), value);
    }
}
