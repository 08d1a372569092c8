//! CLI command definitions
//!
//! Defines the clap commands for netreach.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::targets::{Network, NodeType};
use crate::testing::{Filters, PlanToggle};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the reachability tests in a plan
    Run {
        #[command(flatten)]
        plan: PlanArgs,

        #[command(flatten)]
        filters: FilterArgs,

        /// Inventory file listing hosts per node type
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// System DNS domain; networks are reached as <host>.<network>.<domain>
        #[arg(long)]
        domain: Option<String>,

        /// Host never used as a test endpoint (default: ncn-m001)
        #[arg(long)]
        bootstrap_host: Option<String>,

        /// Skip authenticating to source hosts before the timed pass
        #[arg(long)]
        no_warmup: bool,

        /// Resolve hosts and list the cases without connecting
        #[arg(long)]
        dry_run: bool,

        /// Print a JSON report instead of per-case output
        #[arg(long)]
        json: bool,
    },

    /// Show the cases of a test plan
    Plan {
        #[command(flatten)]
        plan: PlanArgs,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// List inventory hosts and their readiness
    Targets {
        /// Inventory file listing hosts per node type
        #[arg(long)]
        inventory: Option<PathBuf>,
    },
}

/// Which plan to load
#[derive(Args, Debug, Default)]
pub struct PlanArgs {
    /// Bundled plan to use
    #[arg(long, value_enum)]
    pub toggle: Option<PlanToggle>,

    /// Plan file to use instead of a bundled plan
    #[arg(long, conflicts_with = "toggle")]
    pub plan_file: Option<PathBuf>,
}

/// Allow-list overrides; an empty list keeps the configured one
#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Source node types to test from (comma separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub from: Vec<NodeType>,

    /// Destination node types to test against (comma separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub to: Vec<NodeType>,

    /// Networks to test over (comma separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub networks: Vec<Network>,
}

impl FilterArgs {
    pub fn is_empty(&self) -> bool {
        self.from.is_empty() && self.to.is_empty() && self.networks.is_empty()
    }

    /// Replace each list of `base` that was given on the command line
    pub fn apply(self, mut base: Filters) -> Filters {
        if !self.from.is_empty() {
            base.from = self.from;
        }
        if !self.to.is_empty() {
            base.to = self.to;
        }
        if !self.networks.is_empty() {
            base.networks = self.networks;
        }
        base
    }
}
