//! Test plan types
//!
//! A plan maps from-node-type → network → to-node-type → whether an SSH
//! connection along that path should work. Document order is preserved so
//! cases run in the order they are written.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::common::{Error, Result};
use crate::targets::{Network, NodeType};

const CHN_TOGGLE_PLAN: &str = include_str!("../../plans/chn_toggle_tests.yaml");
const CAN_TOGGLE_PLAN: &str = include_str!("../../plans/can_toggle_tests.yaml");

/// Which customer network carries user traffic, selecting the bundled plan
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PlanToggle {
    #[default]
    Chn,
    Can,
}

impl PlanToggle {
    pub fn file_name(&self) -> &'static str {
        match self {
            PlanToggle::Chn => "chn_toggle_tests.yaml",
            PlanToggle::Can => "can_toggle_tests.yaml",
        }
    }

    fn contents(&self) -> &'static str {
        match self {
            PlanToggle::Chn => CHN_TOGGLE_PLAN,
            PlanToggle::Can => CAN_TOGGLE_PLAN,
        }
    }
}

/// Mapping that keeps document order and rejects duplicate keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<K, V>(Vec<(K, V)>);

impl<K: PartialEq, V> OrderedMap<K, V> {
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for OrderedMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de, K, V> Deserialize<'de> for OrderedMap<K, V>
where
    K: Deserialize<'de> + PartialEq + fmt::Display,
    V: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

struct OrderedMapVisitor<K, V>(PhantomData<(K, V)>);

impl<'de, K, V> Visitor<'de> for OrderedMapVisitor<K, V>
where
    K: Deserialize<'de> + PartialEq + fmt::Display,
    V: Deserialize<'de>,
{
    type Value = OrderedMap<K, V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping")
    }

    // `uan:` with nothing under it
    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(OrderedMap(Vec::new()))
    }

    fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut entries: Vec<(K, V)> = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<K, V>()? {
            if entries.iter().any(|(k, _)| *k == key) {
                return Err(de::Error::custom(format!("duplicate key `{}`", key)));
            }
            entries.push((key, value));
        }
        Ok(OrderedMap(entries))
    }
}

/// Expected outcome per destination node type
pub type TargetExpectations = OrderedMap<NodeType, bool>;

/// Destinations per network
pub type NetworkPlan = OrderedMap<Network, TargetExpectations>;

#[derive(Deserialize)]
struct PlanDocument {
    tests: OrderedMap<NodeType, NetworkPlan>,
}

/// A loaded test plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPlan {
    tests: OrderedMap<NodeType, NetworkPlan>,
}

/// One (from, network, to) triple of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlannedCase {
    pub from: NodeType,
    pub network: Network,
    pub to: NodeType,
    pub expected: bool,
}

impl TestPlan {
    /// Parse a plan document with a top-level `tests` key
    pub fn from_yaml(content: &str) -> Result<Self> {
        let document: PlanDocument =
            serde_yaml::from_str(content).map_err(|e| Error::PlanParse(e.to_string()))?;
        Ok(Self {
            tests: document.tests,
        })
    }

    /// Load a plan from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::PlanRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    /// One of the plans compiled into the binary
    pub fn bundled(toggle: PlanToggle) -> Result<Self> {
        Self::from_yaml(toggle.contents())
    }

    /// Source node types with their per-network plans, in document order
    pub fn sources(&self) -> impl Iterator<Item = (NodeType, &NetworkPlan)> {
        self.tests.iter().map(|(node_type, plan)| (*node_type, plan))
    }

    /// All triples allowed by `filters`, in document order
    pub fn cases(&self, filters: &Filters) -> Vec<PlannedCase> {
        let mut cases = Vec::new();
        for (from, networks) in self.sources().filter(|(from, _)| filters.allows_from(*from)) {
            for (network, targets) in networks.iter() {
                if !filters.allows_network(*network) {
                    continue;
                }
                for (to, expected) in targets.iter() {
                    if filters.allows_to(*to) {
                        cases.push(PlannedCase {
                            from,
                            network: *network,
                            to: *to,
                            expected: *expected,
                        });
                    }
                }
            }
        }
        cases
    }

    /// Number of triples in the plan, ignoring filters
    pub fn len(&self) -> usize {
        self.tests
            .iter()
            .flat_map(|(_, networks)| networks.iter())
            .map(|(_, targets)| targets.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Allow-lists narrowing which plan entries run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub from: Vec<NodeType>,
    pub to: Vec<NodeType>,
    pub networks: Vec<Network>,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            from: vec![
                NodeType::NcnMaster,
                NodeType::Uan,
                NodeType::Cn,
                NodeType::SpineSwitch,
            ],
            to: vec![NodeType::NcnMaster],
            networks: vec![
                Network::Can,
                Network::Chn,
                Network::Cmn,
                Network::Nmn,
                Network::Hmn,
                Network::Hmnlb,
            ],
        }
    }
}

impl Filters {
    /// Filters that let every plan entry through
    pub fn all() -> Self {
        Self {
            from: NodeType::ALL.to_vec(),
            to: NodeType::ALL.to_vec(),
            networks: Network::ALL.to_vec(),
        }
    }

    pub fn allows_from(&self, node_type: NodeType) -> bool {
        self.from.contains(&node_type)
    }

    pub fn allows_to(&self, node_type: NodeType) -> bool {
        self.to.contains(&node_type)
    }

    pub fn allows_network(&self, network: Network) -> bool {
        self.networks.contains(&network)
    }
}
