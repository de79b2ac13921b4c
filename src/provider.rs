//! Cloud provider enumeration.

use std::fmt;

/// Supported cloud providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudProvider {
    /// Amazon EC2 and compatible clouds (Eucalyptus, OpenStack)
    Ec2,
    /// Google Compute Engine
    Gce,
}

impl CloudProvider {
    /// Prefix of every fact harvested from this provider.
    pub fn fact_prefix(self) -> &'static str {
        match self {
            CloudProvider::Ec2 => "ec2",
            CloudProvider::Gce => "gce",
        }
    }

    /// Metadata service base URL.
    pub fn default_base_url(self) -> &'static str {
        match self {
            CloudProvider::Ec2 => "http://169.254.169.254",
            CloudProvider::Gce => "http://metadata.google.internal",
        }
    }

    /// Headers the metadata service insists on.
    pub(crate) fn request_headers(self) -> &'static [(&'static str, &'static str)] {
        match self {
            CloudProvider::Ec2 => &[],
            CloudProvider::Gce => &[("metadata-flavor", "Google")],
        }
    }

    /// Value the virtualization platform fact takes on this provider, if it
    /// has a dedicated one.
    ///
    /// EC2 hosts report the hypervisor instead, so they are recognized from
    /// network heuristics.
    pub fn platform_value(self) -> Option<&'static str> {
        match self {
            CloudProvider::Ec2 => None,
            CloudProvider::Gce => Some("gce"),
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudProvider::Ec2 => write!(f, "EC2"),
            CloudProvider::Gce => write!(f, "GCE"),
        }
    }
}
