//! File-backed target directory
//!
//! The inventory is a YAML mapping of node type to an ordered host list:
//!
//! ```yaml
//! ncn_master:
//!   - hostname: ncn-m001
//!   - hostname: ncn-m002
//!   - hostname: ncn-m003
//!     ready: false
//! uan:
//!   - hostname: uan01
//!     user: admin
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{Host, NodeType, TargetDirectory};
use crate::common::{Error, Result};

/// Hosts per node type, optionally backed by a file
#[derive(Debug, Default)]
pub struct Inventory {
    path: Option<PathBuf>,
    hosts: HashMap<NodeType, Vec<Host>>,
}

impl Inventory {
    /// Inventory read from `path` on every refresh
    ///
    /// Nothing is read until [`TargetDirectory::refresh`] is called.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            hosts: HashMap::new(),
        }
    }

    /// Fixed in-memory inventory; refreshing it is a no-op
    pub fn from_hosts(hosts: HashMap<NodeType, Vec<Host>>) -> Self {
        Self { path: None, hosts }
    }

    /// Parse inventory YAML text
    pub fn parse(content: &str) -> Result<HashMap<NodeType, Vec<Host>>> {
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        let hosts: Option<HashMap<NodeType, Vec<Host>>> = serde_yaml::from_str(content)
            .map_err(|e| Error::InventoryParse(e.to_string()))?;
        // An empty document deserializes to None
        Ok(hosts.unwrap_or_default())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Total number of hosts across all node types
    pub fn len(&self) -> usize {
        self.hosts.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load(path: &Path) -> Result<HashMap<NodeType, Vec<Host>>> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::InventoryRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }
}

#[async_trait]
impl TargetDirectory for Inventory {
    async fn refresh(&mut self) -> Result<()> {
        if let Some(path) = &self.path {
            self.hosts = Self::load(path)?;
            tracing::debug!(
                "Loaded {} hosts from {}",
                self.hosts.values().map(Vec::len).sum::<usize>(),
                path.display()
            );
        }
        Ok(())
    }

    fn hosts(&self, node_type: NodeType) -> &[Host] {
        self.hosts.get(&node_type).map(Vec::as_slice).unwrap_or(&[])
    }
}
