//! Hierarchical metadata as served by a metadata service.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::facts::FactValue;

/// One node of a metadata tree.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataNode {
    Scalar(FactValue),
    List(Vec<MetadataNode>),
    Mapping(BTreeMap<String, MetadataNode>),
}

impl MetadataNode {
    /// Convert a parsed JSON document.
    ///
    /// `null` has no fact representation and yields `None`; nulls inside
    /// objects and arrays are dropped.
    pub fn from_json(value: Value) -> Option<Self> {
        let node = match value {
            Value::Null => return None,
            Value::Bool(b) => MetadataNode::Scalar(FactValue::Boolean(b)),
            Value::Number(n) => MetadataNode::Scalar(if let Some(i) = n.as_i64() {
                FactValue::Integer(i)
            } else if n.is_u64() {
                FactValue::String(n.to_string())
            } else {
                FactValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }),
            Value::String(s) => MetadataNode::Scalar(FactValue::String(s)),
            Value::Array(items) => {
                MetadataNode::List(items.into_iter().filter_map(Self::from_json).collect())
            }
            Value::Object(map) => MetadataNode::Mapping(
                map.into_iter()
                    .filter_map(|(key, value)| Self::from_json(value).map(|node| (key, node)))
                    .collect(),
            ),
        };
        Some(node)
    }

    /// Interpret the body of a leaf in a line-delimited listing.
    ///
    /// A single line is a scalar; several lines are a list of scalars.
    pub fn from_leaf_body(body: &str) -> Self {
        let mut lines: Vec<&str> = body.lines().collect();
        if lines.len() <= 1 {
            let line = lines.pop().unwrap_or_default();
            return MetadataNode::Scalar(FactValue::from(line));
        }
        MetadataNode::List(
            lines
                .into_iter()
                .map(|line| MetadataNode::Scalar(FactValue::from(line)))
                .collect(),
        )
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, MetadataNode::Scalar(_))
    }
}
