//! Reachability test plans and their execution
//!
//! Reads a YAML plan of expected SSH reachability between node types over
//! each logical network, then checks every case against live hosts.

mod plan;
mod report;
mod runner;

pub use plan::{Filters, NetworkPlan, OrderedMap, PlanToggle, PlannedCase, TargetExpectations, TestPlan};
pub use report::{CaseRecord, CaseStatus, RunReport};
pub use runner::{
    dry_run, run_plan, DryRunCase, OutputMode, RunContext, RunSettings, CANARY_COMMAND,
    CANARY_OUTPUT,
};
