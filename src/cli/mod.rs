//! CLI command handling
//!
//! Resolves command-line options against the config file, runs the command
//! and formats its output.

use std::path::PathBuf;

use colored::Colorize;

use crate::commands::{Commands, PlanArgs};
use crate::common::config::Config;
use crate::common::{local_hostname, paths, Error, Result};
use crate::ssh::OpenSsh;
use crate::targets::{Inventory, NodeType, TargetDirectory};
use crate::testing::{self, DryRunCase, Filters, OutputMode, RunSettings, TestPlan};

/// Dispatch a CLI command
///
/// Returns whether the command succeeded; for `run` that is the overall
/// verdict of the plan.
pub async fn dispatch(command: Commands, config: &Config) -> Result<bool> {
    match command {
        Commands::Run {
            plan,
            filters,
            inventory,
            domain,
            bootstrap_host,
            no_warmup,
            dry_run,
            json,
        } => {
            let test_plan = load_plan(&plan, config)?;
            let filters = filters.apply(config.filters.clone());

            let system_domain = domain
                .or_else(|| config.system_domain.clone())
                .filter(|d| !d.is_empty())
                .ok_or(Error::DomainMissing)?;

            let settings = RunSettings {
                system_domain,
                bootstrap_host: bootstrap_host.unwrap_or_else(|| config.bootstrap_host.clone()),
                local_hostname: local_hostname(),
                warm_credentials: !no_warmup,
                output: if json {
                    OutputMode::Silent
                } else {
                    OutputMode::Human
                },
            };

            let mut directory = Inventory::from_file(inventory_path(inventory, config)?);

            if dry_run {
                let cases =
                    testing::dry_run(&test_plan, &filters, &settings, &mut directory).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&cases)?);
                } else {
                    print_dry_run(&cases);
                }
                return Ok(true);
            }

            let transport = OpenSsh::new(&config.ssh)?;
            let report =
                testing::run_plan(&test_plan, &filters, &settings, &mut directory, &transport)
                    .await?;

            if json {
                println!("{}", report.to_json()?);
            }

            Ok(report.overall_pass)
        }

        Commands::Plan { plan, filters } => {
            let test_plan = load_plan(&plan, config)?;
            // Unlike `run`, show the whole plan unless narrowed explicitly
            let filters = filters.apply(Filters::all());

            let cases = test_plan.cases(&filters);
            if cases.is_empty() {
                println!("No cases match the given filters");
                return Ok(true);
            }

            let mut current = None;
            for case in &cases {
                if current != Some((case.from, case.network)) {
                    println!("\n{} over {}", case.from.to_string().bold(), case.network);
                    current = Some((case.from, case.network));
                }
                let verdict = if case.expected {
                    "reachable".green()
                } else {
                    "unreachable".red()
                };
                println!("  -> {:<16} {}", case.to, verdict);
            }
            println!("\n{} of {} cases", cases.len(), test_plan.len());

            Ok(true)
        }

        Commands::Targets { inventory } => {
            let path = inventory_path(inventory, config)?;
            let mut directory = Inventory::from_file(&path);
            directory.refresh().await?;

            if let Some(path) = directory.path() {
                println!("Inventory: {}", path.display());
            }
            if directory.is_empty() {
                println!("  (no hosts)");
                return Ok(true);
            }

            for node_type in NodeType::ALL {
                let hosts = directory.hosts(node_type);
                if hosts.is_empty() {
                    continue;
                }
                println!("\n{}:", node_type.to_string().bold());
                for host in hosts {
                    let mut notes = Vec::new();
                    if host.hostname == config.bootstrap_host {
                        notes.push("bootstrap".yellow().to_string());
                    }
                    if !host.is_ready() {
                        notes.push("not ready".red().to_string());
                    }
                    if let Some(user) = &host.user {
                        notes.push(format!("user {}", user));
                    }

                    if notes.is_empty() {
                        println!("  {}", host.hostname);
                    } else {
                        println!("  {} ({})", host.hostname, notes.join(", "));
                    }
                }
            }

            Ok(true)
        }
    }
}

/// Plan from `--plan-file`, else the bundled plan for the chosen toggle
fn load_plan(args: &PlanArgs, config: &Config) -> Result<TestPlan> {
    match &args.plan_file {
        Some(path) => {
            tracing::debug!("Loading plan from {}", path.display());
            TestPlan::load(path)
        }
        None => {
            let toggle = args.toggle.unwrap_or(config.toggle);
            tracing::debug!("Using bundled plan {}", toggle.file_name());
            TestPlan::bundled(toggle)
        }
    }
}

/// Inventory from `--inventory`, the config file, or the default location
fn inventory_path(arg: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    if let Some(path) = arg.or_else(|| config.inventory.clone()) {
        return Ok(path);
    }

    match paths::inventory_path() {
        Some(path) if path.exists() => Ok(path),
        Some(path) => Err(Error::InventoryMissing(path.display().to_string())),
        None => Err(Error::InventoryMissing(
            "<config dir>/netreach/inventory.yaml".to_string(),
        )),
    }
}

fn print_dry_run(cases: &[DryRunCase]) {
    for case in cases {
        let from = case.from_host.as_deref().unwrap_or("<none>");
        let to = case.to_host.as_deref().unwrap_or("<none>");
        let marker = if case.from_host.is_some() && case.to_host.is_some() {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "{} {} ({}) -> {} ({}) over {}, expect {}",
            marker,
            case.from,
            from,
            case.to,
            to,
            case.network,
            if case.expected { "reachable" } else { "unreachable" }
        );
    }
    println!("\n{} cases", cases.len());
}

