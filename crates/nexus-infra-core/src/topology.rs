//! Topology versions
//!
//! Each historical shape of the application graph is a variant here, with a
//! fixed feature set resolved at build time.

use serde::{Deserialize, Serialize};

/// A distinct version of the resource graph shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Storage, compute, ingress, distribution and table only
    Minimal,

    /// Adds the firewall policy, delivery notifications and observability
    Observed,

    /// Adds a certificate with custom domain and an IAM authorizer on routes
    Secured,
}

impl Default for Topology {
    fn default() -> Self {
        Self::Secured
    }
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minimal => write!(f, "minimal"),
            Self::Observed => write!(f, "observed"),
            Self::Secured => write!(f, "secured"),
        }
    }
}

/// What a topology version includes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopologyFeatures {
    pub firewall: bool,
    pub certificate: bool,
    pub authorizer: bool,
    pub notifications: bool,
    pub observability: bool,
}

impl Topology {
    pub fn features(&self) -> TopologyFeatures {
        match self {
            Self::Minimal => TopologyFeatures {
                firewall: false,
                certificate: false,
                authorizer: false,
                notifications: false,
                observability: false,
            },
            Self::Observed => TopologyFeatures {
                firewall: true,
                certificate: false,
                authorizer: false,
                notifications: true,
                observability: true,
            },
            Self::Secured => TopologyFeatures {
                firewall: true,
                certificate: true,
                authorizer: true,
                notifications: true,
                observability: true,
            },
        }
    }

    /// Whether the edge graph has anything to build for this topology
    pub fn needs_edge_graph(&self) -> bool {
        let features = self.features();
        features.firewall || features.certificate
    }
}
