//! Flattening of metadata trees into named facts.

use crate::facts::{FactName, FactValue};
use crate::node::MetadataNode;

/// Keys whose values are resource paths; only the last path segment is kept.
const REFERENCE_KEYS: &[&str] = &["machineType", "zone", "network"];

/// Scalars under this key hold one SSH key per line.
const SSH_KEYS: &str = "sshKeys";

/// How lists are turned into facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    /// One fact per element, named `<path>_<index>`.
    Indexed,
    /// A list of scalars becomes one comma-joined fact at the list's own path.
    Joined,
}

/// Turns a [`MetadataNode`] into `(name, value)` pairs.
#[derive(Debug, Clone, Copy)]
pub struct Flattener {
    mode: ListMode,
}

impl Flattener {
    pub fn new(mode: ListMode) -> Self {
        Self { mode }
    }

    /// Emit every fact below `node`, whose position in the tree is `base`.
    pub fn flatten<F>(&self, node: &MetadataNode, base: &[String], emit: &mut F)
    where
        F: FnMut(FactName, FactValue),
    {
        match node {
            MetadataNode::Mapping(map) => {
                for (key, value) in map {
                    let path = child_path(base, key);
                    match reference_target(key, value) {
                        Some(last) => {
                            let node = MetadataNode::Scalar(FactValue::from(last));
                            self.flatten(&node, &path, emit);
                        }
                        None => self.flatten(value, &path, emit),
                    }
                }
            }
            MetadataNode::List(items) => {
                if self.mode == ListMode::Joined
                    && !items.is_empty()
                    && items.iter().all(MetadataNode::is_scalar)
                {
                    let joined = items
                        .iter()
                        .filter_map(|item| match item {
                            MetadataNode::Scalar(value) => Some(value.to_string()),
                            _ => None,
                        })
                        .collect::<Vec<_>>()
                        .join(",");
                    emit(FactName::from_segments(base), FactValue::String(joined));
                    return;
                }
                for (index, item) in items.iter().enumerate() {
                    self.flatten(item, &child_path(base, &index.to_string()), emit);
                }
            }
            MetadataNode::Scalar(value) => match value {
                FactValue::String(text) if base.last().is_some_and(|k| k == SSH_KEYS) => {
                    let keys = text.lines().filter(|line| !line.is_empty());
                    for (index, key) in keys.enumerate() {
                        let path = child_path(base, &index.to_string());
                        emit(FactName::from_segments(&path), FactValue::from(key));
                    }
                }
                _ => emit(FactName::from_segments(base), value.clone()),
            },
        }
    }
}

fn child_path(base: &[String], segment: &str) -> Vec<String> {
    let mut path = Vec::with_capacity(base.len() + 1);
    path.extend_from_slice(base);
    path.push(segment.to_string());
    path
}

fn reference_target<'a>(key: &str, value: &'a MetadataNode) -> Option<&'a str> {
    if !REFERENCE_KEYS.contains(&key) {
        return None;
    }
    match value {
        MetadataNode::Scalar(FactValue::String(path)) => path.rsplit('/').next(),
        _ => None,
    }
}
