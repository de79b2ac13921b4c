//! EC2 metadata implementation.
//!
//! The meta-data tree is served as plain-text listings, one key per line.
//! Keys ending in `/` are directories; everything else is a leaf whose value
//! takes one more request.

use async_trait::async_trait;

use crate::client::Transport;
use crate::error::{ConnectionError, HarvestError};
use crate::facts::{FactName, FactRegistry, FactValue};
use crate::flatten::{Flattener, ListMode};
use crate::node::MetadataNode;
use crate::provider::CloudProvider;

/// Log target for EC2 harvesting
const LOG_TARGET: &str = "cloud_facts::ec2";

/// Meta-data tree path.
const META_DATA_PATH: &str = "/2008-02-01/meta-data/";

/// User-data path.
const USER_DATA_PATH: &str = "/2008-02-01/user-data/";

/// MAC address of the EC2 gateway as it shows up in ARP tables.
const EC2_ARP_MAC: &str = "fe:ff:ff:ff:ff:ff";

/// Same address in the notation `arp -a` uses on Windows.
const EC2_ARP_MAC_WINDOWS: &str = "fe-ff-ff-ff-ff-ff";

/// MAC prefix Eucalyptus hands out.
const EUCALYPTUS_MAC_PREFIX: &str = "d0:0d";

/// MAC prefixes OpenStack hands out (`02:16:3e` on older releases).
const OPENSTACK_MAC_PREFIXES: &[&str] = &["fa:16:3e", "02:16:3e"];

/// URI checked for reachability.
pub fn probe_url(base_url: &str) -> String {
    format!("{base_url}/")
}

/// Walk the meta-data listing depth-first, emitting a fact per leaf.
///
/// Leaves whose value cannot be fetched are skipped. A directory that cannot
/// be listed ends the walk with an error; facts emitted before it stand.
pub async fn collect_metadata<T, F>(
    transport: &T,
    base_url: &str,
    emit: &mut F,
) -> Result<(), HarvestError>
where
    T: Transport + ?Sized,
    F: FnMut(FactName, FactValue),
{
    let root = format!("{base_url}{META_DATA_PATH}");
    let flattener = Flattener::new(ListMode::Joined);

    let mut pending = vec![(String::new(), list_keys(transport, &root).await?.into_iter())];
    loop {
        let Some((dir, lines)) = pending.last_mut() else {
            break;
        };
        let Some(line) = lines.next() else {
            pending.pop();
            continue;
        };
        let key = format!("{dir}{}", normalize_key(&line));
        let uri = format!("{root}{key}");

        if key.ends_with('/') {
            let children = list_keys(transport, &uri).await?;
            pending.push((key, children.into_iter()));
            continue;
        }

        match transport.read(&uri).await {
            Ok(body) => {
                let node = MetadataNode::from_leaf_body(&body);
                flattener.flatten(&node, &fact_path(&key), emit);
            }
            Err(err) => {
                log::warn!(target: LOG_TARGET, "Skipping meta-data key '{key}': {err}");
            }
        }
    }
    Ok(())
}

/// Fetch user-data and emit it as the whitespace-separated list `ec2_userdata`.
///
/// Missing or empty user-data emits nothing.
pub async fn collect_user_data<T, F>(transport: &T, base_url: &str, emit: &mut F)
where
    T: Transport + ?Sized,
    F: FnMut(FactName, FactValue),
{
    let uri = format!("{base_url}{USER_DATA_PATH}");
    match transport.read(&uri).await {
        Ok(body) => {
            let words: Vec<String> = body.split_whitespace().map(str::to_string).collect();
            if !words.is_empty() {
                let name = FactName::from_segments([CloudProvider::Ec2.fact_prefix(), "userdata"]);
                emit(name, FactValue::List(words));
            }
        }
        Err(ConnectionError::Http(404)) => {
            log::debug!(target: LOG_TARGET, "No user-data at {uri}");
        }
        Err(err) => {
            log::warn!(target: LOG_TARGET, "Could not read user-data at {uri}: {err}");
        }
    }
}

async fn list_keys<T>(transport: &T, uri: &str) -> Result<Vec<String>, HarvestError>
where
    T: Transport + ?Sized,
{
    let body = transport
        .read(uri)
        .await
        .map_err(|source| HarvestError::Connection {
            uri: uri.to_string(),
            source,
        })?;
    Ok(body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// `0=my-key` style entries name a directory by their index.
fn normalize_key(line: &str) -> String {
    match line.split_once('=') {
        Some((index, _)) => format!("{index}/"),
        None => line.to_string(),
    }
}

fn fact_path(key: &str) -> Vec<String> {
    std::iter::once(CloudProvider::Ec2.fact_prefix())
        .chain(key.split('/').filter(|segment| !segment.is_empty()))
        .map(str::to_string)
        .collect()
}

/// Source of the host's ARP table.
#[async_trait]
pub trait ArpTable: Send + Sync {
    /// Raw ARP table output, or `None` if it cannot be read.
    async fn entries(&self, windows: bool) -> Option<String>;
}

/// Reads the ARP table with the system `arp` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemArp;

#[async_trait]
impl ArpTable for SystemArp {
    async fn entries(&self, windows: bool) -> Option<String> {
        let flag = if windows { "-a" } else { "-an" };
        let output = tokio::process::Command::new("arp")
            .arg(flag)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8(output.stdout).ok()
    }
}

/// Whether the host looks like an EC2-compatible instance.
pub async fn is_candidate<R>(facts: &R, arp: &dyn ArpTable) -> bool
where
    R: FactRegistry + ?Sized,
{
    has_euca_mac(facts) || has_openstack_mac(facts) || has_ec2_arp(facts, arp).await
}

pub fn has_euca_mac<R: FactRegistry + ?Sized>(facts: &R) -> bool {
    mac_address(facts).is_some_and(|mac| mac.starts_with(EUCALYPTUS_MAC_PREFIX))
}

pub fn has_openstack_mac<R: FactRegistry + ?Sized>(facts: &R) -> bool {
    mac_address(facts).is_some_and(|mac| {
        OPENSTACK_MAC_PREFIXES
            .iter()
            .any(|prefix| mac.starts_with(prefix))
    })
}

/// Whether the ARP table holds the EC2 gateway's MAC address.
pub async fn has_ec2_arp<R>(facts: &R, arp: &dyn ArpTable) -> bool
where
    R: FactRegistry + ?Sized,
{
    let windows = facts
        .value("kernel")
        .is_some_and(|kernel| kernel.to_string().to_lowercase().contains("windows"));
    let mac = if windows {
        EC2_ARP_MAC_WINDOWS
    } else {
        EC2_ARP_MAC
    };

    let Some(table) = arp.entries(windows).await else {
        return false;
    };
    table.lines().any(|line| line.to_lowercase().contains(mac))
}

fn mac_address<R: FactRegistry + ?Sized>(facts: &R) -> Option<String> {
    facts
        .value("macaddress")
        .map(|mac| mac.to_string().to_lowercase())
}
