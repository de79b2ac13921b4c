//! GCE metadata implementation.
//!
//! The whole metadata tree comes back as one JSON document when asked for
//! recursively.

use crate::client::Transport;
use crate::error::HarvestError;
use crate::facts::{FactName, FactValue};
use crate::flatten::{Flattener, ListMode};
use crate::node::MetadataNode;
use crate::provider::CloudProvider;

/// GCE metadata service base path.
const METADATA_PATH: &str = "/computeMetadata/v1/";

/// Query asking for the full tree as JSON.
const RECURSIVE_QUERY: &str = "?recursive=true&alt=json";

/// URI checked for reachability.
pub fn probe_url(base_url: &str) -> String {
    format!("{base_url}/")
}

/// URI of the recursive metadata document.
pub fn tree_url(base_url: &str) -> String {
    format!("{base_url}{METADATA_PATH}{RECURSIVE_QUERY}")
}

/// Fetch the metadata document and emit one fact per leaf.
pub async fn collect_metadata<T, F>(
    transport: &T,
    base_url: &str,
    emit: &mut F,
) -> Result<(), HarvestError>
where
    T: Transport + ?Sized,
    F: FnMut(FactName, FactValue),
{
    let uri = tree_url(base_url);
    let body = transport
        .read(&uri)
        .await
        .map_err(|source| HarvestError::Connection {
            uri: uri.clone(),
            source,
        })?;
    let document: serde_json::Value = serde_json::from_str(&body)?;

    if let Some(root) = MetadataNode::from_json(document) {
        let base = [CloudProvider::Gce.fact_prefix().to_string()];
        Flattener::new(ListMode::Indexed).flatten(&root, &base, emit);
    }
    Ok(())
}
