//! netreach - SSH reachability tests across cluster networks
//!
//! Checks that each node type can or cannot SSH to other node types over
//! each logical network, according to a YAML test plan.

pub mod cli;
pub mod commands;
pub mod common;
pub mod ssh;
pub mod targets;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use targets::{Host, Network, NodeType};
