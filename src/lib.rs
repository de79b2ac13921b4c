//! Harvest cloud instance metadata into flat host facts.
//!
//! When a host runs on a cloud, its provider's metadata service knows a lot
//! about it: instance id, zone, machine type, network, SSH keys. This crate
//! checks whether such a service is around and flattens what it serves into
//! a registry of named facts.
//!
//! # Features
//!
//! - Bounded, deadline-based reachability probing with platform short-circuit
//! - EC2 line-delimited listings walked lazily, one request per key
//! - GCE recursive JSON document fetched in one request
//! - One-shot harvesting guarded per process, with an explicit force
//!
//! # Example
//!
//! ```ignore
//! use cloud_facts::{Facts, HarvestOutcome, Harvester};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cloud_facts::HarvestError> {
//!     // Host facts gathered elsewhere
//!     let mut facts = Facts::new().with("virtual", "gce");
//!
//!     let harvester = Harvester::gce()?;
//!     if let HarvestOutcome::Complete { facts: n } = harvester.harvest(&mut facts, false).await? {
//!         println!("{n} metadata facts");
//!     }
//!
//!     // gce_instance_zone, gce_instance_machineType, ...
//!     for (name, value) in facts.iter() {
//!         println!("{name} => {value}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Provider-Specific Behavior
//!
//! | Provider | Metadata Source | Lists | Host Check |
//! |----------|-----------------|-------|------------|
//! | EC2 | `meta-data/` listing, `user-data/` | Comma-joined | MAC prefix or ARP table |
//! | GCE | `computeMetadata/v1/?recursive=true&alt=json` | One fact per index | `virtual` fact is `gce` |

mod client;
mod error;
mod facts;
mod flatten;
mod harvest;
mod node;
mod options;
mod probe;
mod provider;
pub mod providers;

#[cfg(test)]
mod testing;

pub use client::{MetadataClient, Transport, DEFAULT_TIMEOUT};
pub use error::{ConnectionError, HarvestError};
pub use facts::{FactName, FactRegistry, FactValue, Facts};
pub use flatten::{Flattener, ListMode};
pub use harvest::{HarvestOutcome, HarvestRun, Harvester};
pub use node::MetadataNode;
pub use options::HarvestOptions;
pub use probe::{platform_matches, Attempt, Prober};
pub use provider::CloudProvider;
pub use providers::ec2::{ArpTable, SystemArp};
