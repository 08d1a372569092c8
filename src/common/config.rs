//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::Result;
use crate::testing::{Filters, PlanToggle};

/// Main configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    /// DNS domain of the system; network suffixes are `<network>.<domain>`
    #[serde(default)]
    pub system_domain: Option<String>,

    /// Host never used as a test endpoint
    #[serde(default = "default_bootstrap_host")]
    pub bootstrap_host: String,

    /// Which bundled plan to run
    #[serde(default)]
    pub toggle: PlanToggle,

    /// Inventory file to use instead of the default location
    #[serde(default)]
    pub inventory: Option<PathBuf>,

    /// SSH client settings
    #[serde(default)]
    pub ssh: SshConfig,

    /// Default applicability filters
    #[serde(default)]
    pub filters: Filters,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system_domain: None,
            bootstrap_host: default_bootstrap_host(),
            toggle: PlanToggle::default(),
            inventory: None,
            ssh: SshConfig::default(),
            filters: Filters::default(),
        }
    }
}

fn default_bootstrap_host() -> String {
    "ncn-m001".to_string()
}

/// Settings for the system OpenSSH client
#[derive(Debug, Deserialize, Clone)]
pub struct SshConfig {
    /// ssh executable, looked up in PATH when not absolute
    #[serde(default = "default_program")]
    pub program: String,

    /// Login user; ssh's own default when unset
    #[serde(default)]
    pub user: Option<String>,

    /// Timeout for establishing a connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout for running the canary command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// How long multiplexed master connections outlive their last use
    #[serde(default = "default_control_persist")]
    pub control_persist_secs: u64,

    /// Value passed to `StrictHostKeyChecking`
    #[serde(default = "default_host_key_checking")]
    pub strict_host_key_checking: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            user: None,
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            control_persist_secs: default_control_persist(),
            strict_host_key_checking: default_host_key_checking(),
        }
    }
}

fn default_program() -> String {
    "ssh".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_command_timeout() -> u64 {
    30
}
fn default_control_persist() -> u64 {
    300
}
fn default_host_key_checking() -> String {
    "accept-new".to_string()
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::Config(format!(
            "Failed to read '{}': {}",
            path.display(),
            e
        )))?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
