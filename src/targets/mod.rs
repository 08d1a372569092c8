//! Cluster targets
//!
//! Node types, logical networks and the hosts that fill each node type. The
//! executor only looks hosts up; where they come from is the business of a
//! [`TargetDirectory`] implementation.

mod inventory;

pub use inventory::Inventory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::Result;

/// Role of a machine in the cluster
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum NodeType {
    NcnMaster,
    NcnWorker,
    NcnStorage,
    Uan,
    Cn,
    SpineSwitch,
    LeafSwitch,
    LeafBmcSwitch,
    CduSwitch,
}

impl NodeType {
    pub const ALL: [NodeType; 9] = [
        NodeType::NcnMaster,
        NodeType::NcnWorker,
        NodeType::NcnStorage,
        NodeType::Uan,
        NodeType::Cn,
        NodeType::SpineSwitch,
        NodeType::LeafSwitch,
        NodeType::LeafBmcSwitch,
        NodeType::CduSwitch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::NcnMaster => "ncn_master",
            NodeType::NcnWorker => "ncn_worker",
            NodeType::NcnStorage => "ncn_storage",
            NodeType::Uan => "uan",
            NodeType::Cn => "cn",
            NodeType::SpineSwitch => "spine_switch",
            NodeType::LeafSwitch => "leaf_switch",
            NodeType::LeafBmcSwitch => "leaf_bmc_switch",
            NodeType::CduSwitch => "cdu_switch",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Logical network a connection is attempted over
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lower")]
pub enum Network {
    /// Customer access network
    Can,
    /// Customer high-speed network
    Chn,
    /// Customer management network
    Cmn,
    /// Node management network
    Nmn,
    /// Hardware management network
    Hmn,
    /// Node management load balancers
    Nmnlb,
    /// Hardware management load balancers
    Hmnlb,
}

impl Network {
    pub const ALL: [Network; 7] = [
        Network::Can,
        Network::Chn,
        Network::Cmn,
        Network::Nmn,
        Network::Hmn,
        Network::Nmnlb,
        Network::Hmnlb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Can => "can",
            Network::Chn => "chn",
            Network::Cmn => "cmn",
            Network::Nmn => "nmn",
            Network::Hmn => "hmn",
            Network::Nmnlb => "nmnlb",
            Network::Hmnlb => "hmnlb",
        }
    }

    /// DNS suffix that routes a hostname over this network
    pub fn domain_suffix(&self, system_domain: &str) -> String {
        format!("{}.{}", self.as_str(), system_domain)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A concrete machine that can be reached over SSH
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Short hostname, e.g. `ncn-m002`
    pub hostname: String,
    /// Login user overriding the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Whether the host is in service
    #[serde(default = "default_ready")]
    pub ready: bool,
    #[serde(skip)]
    domain_suffix: Option<String>,
}

fn default_ready() -> bool {
    true
}

impl Host {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            user: None,
            ready: true,
            domain_suffix: None,
        }
    }

    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Copy of this host addressed through `suffix`; `None` strips any suffix
    pub fn with_domain_suffix(&self, suffix: Option<&str>) -> Host {
        Host {
            domain_suffix: suffix.filter(|s| !s.is_empty()).map(str::to_string),
            ..self.clone()
        }
    }

    pub fn domain_suffix(&self) -> Option<&str> {
        self.domain_suffix.as_deref()
    }

    /// Name to hand to ssh, e.g. `ncn-m003.cmn.example.com`
    pub fn full_domain_name(&self) -> String {
        match &self.domain_suffix {
            Some(suffix) => format!("{}.{}", self.hostname, suffix),
            None => self.hostname.clone(),
        }
    }
}

/// Source of hosts for each node type
#[async_trait]
pub trait TargetDirectory: Send + Sync {
    /// Re-discover hosts. Called once before a run starts.
    async fn refresh(&mut self) -> Result<()>;

    /// Hosts of a node type in directory order
    fn hosts(&self, node_type: NodeType) -> &[Host];

    /// First ready host of `node_type` whose hostname is not excluded
    fn find_host(&self, node_type: NodeType, excluded: &[&str]) -> Option<&Host> {
        find_host(self.hosts(node_type), excluded)
    }
}

/// Scan `hosts` in order and return the first ready, non-excluded one
pub fn find_host<'a>(hosts: &'a [Host], excluded: &[&str]) -> Option<&'a Host> {
    hosts
        .iter()
        .find(|host| !excluded.contains(&host.hostname.as_str()) && host.is_ready())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masters() -> Vec<Host> {
        vec![
            Host::new("ncn-m001"),
            Host::new("ncn-m002").not_ready(),
            Host::new("ncn-m003"),
            Host::new("ncn-m004"),
        ]
    }

    #[test]
    fn test_find_host_skips_excluded_and_unready() {
        let hosts = masters();
        let found = find_host(&hosts, &["ncn-m001"]).unwrap();
        assert_eq!(found.hostname, "ncn-m003");
    }

    #[test]
    fn test_find_host_returns_first_in_order() {
        let hosts = masters();
        assert_eq!(find_host(&hosts, &[]).unwrap().hostname, "ncn-m001");
        assert_eq!(
            find_host(&hosts, &["ncn-m001", "ncn-m003"]).unwrap().hostname,
            "ncn-m004"
        );
    }

    #[test]
    fn test_find_host_none_when_exhausted() {
        let hosts = masters();
        assert!(find_host(&hosts, &["ncn-m001", "ncn-m003", "ncn-m004"]).is_none());
        assert!(find_host(&[], &[]).is_none());
    }

    #[test]
    fn test_domain_suffix_qualification() {
        let host = Host::new("ncn-m002");
        assert_eq!(host.full_domain_name(), "ncn-m002");

        let qualified = host.with_domain_suffix(Some("cmn.example.com"));
        assert_eq!(qualified.full_domain_name(), "ncn-m002.cmn.example.com");
        assert_eq!(qualified.hostname, "ncn-m002");

        let bare = qualified.with_domain_suffix(None);
        assert_eq!(bare.full_domain_name(), "ncn-m002");
        assert_eq!(host.with_domain_suffix(Some("")).domain_suffix(), None);
    }

    #[test]
    fn test_network_suffix() {
        assert_eq!(Network::Hmnlb.domain_suffix("example.com"), "hmnlb.example.com");
        assert_eq!(NodeType::SpineSwitch.to_string(), "spine_switch");
    }

    #[test]
    fn test_node_type_names_round_trip_through_serde() {
        for node_type in NodeType::ALL {
            let yaml = serde_yaml::to_string(&node_type).unwrap();
            assert_eq!(yaml.trim(), node_type.as_str());
        }
    }
}
