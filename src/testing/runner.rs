//! Plan executor
//!
//! Walks a test plan in document order, resolves a concrete host for each
//! end of every (from, network, to) case, and checks that an SSH hop from the
//! source host to the destination over that network works exactly when the
//! plan says it should.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::Serialize;

use super::plan::{Filters, TestPlan};
use super::report::{self, CaseRecord, CaseStatus, RunReport};
use crate::common::Result;
use crate::ssh::{SshSession, SshTransport};
use crate::targets::{Host, Network, NodeType, TargetDirectory};

/// Command run on the destination to prove the connection is usable
pub const CANARY_COMMAND: &str = "echo hello";
/// Output the canary must print
pub const CANARY_OUTPUT: &str = "hello";

/// How results are shown while the run progresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// One block per case plus a summary on stdout
    #[default]
    Human,
    /// Nothing printed; the caller renders the report
    Silent,
}

/// Per-run settings that are not part of the plan
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Network suffixes are `<network>.<system_domain>`
    pub system_domain: String,
    /// Never used as a source or destination
    pub bootstrap_host: String,
    /// Machine the harness runs on; never used as a source
    pub local_hostname: Option<String>,
    /// Run the credential pre-pass before the timed pass
    pub warm_credentials: bool,
    pub output: OutputMode,
}

impl RunSettings {
    pub fn new(system_domain: impl Into<String>) -> Self {
        Self {
            system_domain: system_domain.into(),
            bootstrap_host: "ncn-m001".to_string(),
            local_hostname: None,
            warm_credentials: true,
            output: OutputMode::Human,
        }
    }
}

/// State of one run: inputs plus the report being accumulated
pub struct RunContext<'a, D, T> {
    plan: &'a TestPlan,
    filters: &'a Filters,
    settings: &'a RunSettings,
    directory: &'a D,
    transport: &'a T,
    /// Bare source hosts used so far, closed when the pass ends
    sources: Vec<Host>,
    report: RunReport,
}

impl<'a, D, T> RunContext<'a, D, T>
where
    D: TargetDirectory,
    T: SshTransport,
{
    pub fn new(
        plan: &'a TestPlan,
        filters: &'a Filters,
        settings: &'a RunSettings,
        directory: &'a D,
        transport: &'a T,
    ) -> Self {
        Self {
            plan,
            filters,
            settings,
            directory,
            transport,
            sources: Vec::new(),
            report: RunReport::default(),
        }
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    fn human(&self) -> bool {
        self.settings.output == OutputMode::Human
    }

    fn resolve_from(&self, node_type: NodeType) -> Option<&'a Host> {
        resolve_from(self.directory, self.settings, node_type)
    }

    fn resolve_to(&self, node_type: NodeType, from_hostname: &str) -> Option<&'a Host> {
        resolve_to(self.directory, self.settings, node_type, from_hostname)
    }

    fn allowed_targets(&self, from: NodeType, network: Network) -> Vec<(NodeType, bool)> {
        allowed_targets(self.plan, self.filters, from, network)
    }

    /// Authenticate along every path the timed pass will use
    ///
    /// Each source host is warmed over its bare name, then each destination
    /// through that source over the network under test, so no session of the
    /// timed pass has to prompt. Best effort: hosts that don't resolve or
    /// fail to authenticate are logged and skipped; nothing is recorded in
    /// the report.
    pub async fn collect_credentials(&self) {
        let mut sources: HashMap<String, bool> = HashMap::new();
        let mut hops: HashSet<(String, String)> = HashSet::new();

        for (from, network) in pairs(self.plan) {
            let targets = self.allowed_targets(from, network);
            if targets.is_empty() {
                continue;
            }

            let Some(from_host) = self.resolve_from(from) else {
                tracing::debug!("No {} host to warm credentials for", from);
                continue;
            };
            let from_host = from_host.with_domain_suffix(None);

            let source_ready = match sources.get(&from_host.hostname) {
                Some(ready) => *ready,
                None => {
                    let ready = match self.transport.cache_credentials(&from_host, None).await {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!(
                                "Could not cache credentials for {}: {}",
                                from_host.hostname,
                                e
                            );
                            false
                        }
                    };
                    sources.insert(from_host.hostname.clone(), ready);
                    ready
                }
            };
            // Destinations are only reachable through the source
            if !source_ready {
                continue;
            }

            let from_session = self.transport.session(&from_host, None);
            let network_suffix = network.domain_suffix(&self.settings.system_domain);

            for (to, _) in targets {
                let Some(to_host) = self.resolve_to(to, &from_host.hostname) else {
                    tracing::debug!("No {} host to warm credentials for", to);
                    continue;
                };
                let to_host = to_host.with_domain_suffix(Some(&network_suffix));

                if !hops.insert((from_host.hostname.clone(), to_host.full_domain_name())) {
                    continue;
                }

                if let Err(e) = self
                    .transport
                    .cache_credentials(&to_host, Some(&from_session))
                    .await
                {
                    tracing::warn!(
                        "Could not cache credentials for {} via {}: {}",
                        to_host.full_domain_name(),
                        from_host.hostname,
                        e
                    );
                }
            }
        }
    }

    /// Run every allowed case and record the results
    pub async fn execute(&mut self) {
        let start_time = Instant::now();

        for (from, network) in pairs(self.plan) {
            let targets = self.allowed_targets(from, network);
            if !targets.is_empty() {
                self.test_from_node_type_over_network(from, network, &targets)
                    .await;
            }
        }

        self.report.elapsed_secs = start_time.elapsed().as_secs_f64();
        self.close_sources().await;
    }

    /// Tear down the source masters once every case has run
    async fn close_sources(&mut self) {
        for host in std::mem::take(&mut self.sources) {
            let mut session = self.transport.session(&host, None);
            session.close(true).await;
        }
    }

    async fn test_from_node_type_over_network(
        &mut self,
        from: NodeType,
        network: Network,
        targets: &[(NodeType, bool)],
    ) {
        let network_suffix = network.domain_suffix(&self.settings.system_domain);

        let Some(from_host) = self.resolve_from(from) else {
            tracing::warn!("No ready {} host available to test from", from);
            for &(to, expected) in targets {
                if self.human() {
                    report::print_header(from, None, &network_suffix, None, expected);
                    report::print_status(&CaseStatus::FromUnresolved, from, to);
                }
                self.report.record(CaseRecord {
                    from,
                    network,
                    to,
                    expected,
                    from_host: None,
                    to_host: None,
                    status: CaseStatus::FromUnresolved,
                });
            }
            return;
        };

        // The operator's own path to the source node, always expected to work
        let from_host = from_host.with_domain_suffix(None);
        if !self.sources.iter().any(|h| h.hostname == from_host.hostname) {
            self.sources.push(from_host.clone());
        }
        let from_session = self.transport.session(&from_host, None);

        for &(to, expected) in targets {
            self.test_from_node_type_to_node_type_over_network(
                from,
                &from_host,
                &from_session,
                network,
                &network_suffix,
                to,
                expected,
            )
            .await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn test_from_node_type_to_node_type_over_network(
        &mut self,
        from: NodeType,
        from_host: &Host,
        from_session: &T::Session,
        network: Network,
        network_suffix: &str,
        to: NodeType,
        expected: bool,
    ) {
        let from_name = from_host.full_domain_name();

        let Some(to_host) = self.resolve_to(to, &from_host.hostname) else {
            tracing::warn!("No ready {} host available to test {} against", to, from_name);
            if self.human() {
                report::print_header(from, Some(&from_name), network_suffix, Some((to, None)), expected);
                report::print_status(&CaseStatus::ToUnresolved, from, to);
            }
            self.report.record(CaseRecord {
                from,
                network,
                to,
                expected,
                from_host: Some(from_name),
                to_host: None,
                status: CaseStatus::ToUnresolved,
            });
            return;
        };

        let to_host = to_host.with_domain_suffix(Some(network_suffix));
        let to_name = to_host.full_domain_name();

        if self.human() {
            report::print_header(
                from,
                Some(&from_name),
                network_suffix,
                Some((to, Some(&to_name))),
                expected,
            );
        }

        let mut session = self.transport.session(&to_host, Some(from_session));
        tracing::debug!(
            "Checking {} -> {} (expected: {})",
            from_name,
            session.host().full_domain_name(),
            expected
        );

        let result = match session.connect().await {
            Ok(()) => session.run_test_command(CANARY_COMMAND, CANARY_OUTPUT).await,
            Err(e) => Err(e),
        };
        session.close(false).await;

        if let Err(e) = &result {
            if !e.is_connection_error() {
                tracing::warn!("Local failure while testing {}: {}", to_name, e);
            }
        }

        let status = CaseStatus::evaluate(expected, result);
        if self.human() {
            report::print_status(&status, from, to);
        }

        self.report.record(CaseRecord {
            from,
            network,
            to,
            expected,
            from_host: Some(from_name),
            to_host: Some(to_name),
            status,
        });
    }
}

/// A case as it would run, with the hosts it would use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DryRunCase {
    pub from: NodeType,
    pub network: Network,
    pub to: NodeType,
    pub expected: bool,
    pub from_host: Option<String>,
    pub to_host: Option<String>,
}

/// Run a whole plan: refresh targets, warm credentials, then test every case
pub async fn run_plan<D, T>(
    plan: &TestPlan,
    filters: &Filters,
    settings: &RunSettings,
    directory: &mut D,
    transport: &T,
) -> Result<RunReport>
where
    D: TargetDirectory,
    T: SshTransport,
{
    directory.refresh().await?;

    let mut context = RunContext::new(plan, filters, settings, &*directory, transport);

    if settings.warm_credentials {
        tracing::info!("Collecting credentials for source hosts");
        context.collect_credentials().await;
    }

    tracing::info!("Running reachability tests");
    context.execute().await;

    let report = context.into_report();
    if settings.output == OutputMode::Human {
        report::print_summary(&report);
    }

    Ok(report)
}

/// Resolve hosts for every case without opening any connection
pub async fn dry_run<D>(
    plan: &TestPlan,
    filters: &Filters,
    settings: &RunSettings,
    directory: &mut D,
) -> Result<Vec<DryRunCase>>
where
    D: TargetDirectory,
{
    directory.refresh().await?;
    let directory: &D = directory;
    let mut cases = Vec::new();

    for (from, network) in pairs(plan) {
        let suffix = network.domain_suffix(&settings.system_domain);
        let from_host = resolve_from(directory, settings, from);

        for (to, expected) in allowed_targets(plan, filters, from, network) {
            let to_host = from_host
                .and_then(|source| resolve_to(directory, settings, to, &source.hostname))
                .map(|host| host.with_domain_suffix(Some(&suffix)).full_domain_name());

            cases.push(DryRunCase {
                from,
                network,
                to,
                expected,
                from_host: from_host.map(|host| host.hostname.clone()),
                to_host,
            });
        }
    }

    Ok(cases)
}

/// Source host for a node type: not the bootstrap host, not this machine
fn resolve_from<'d, D: TargetDirectory>(
    directory: &'d D,
    settings: &RunSettings,
    node_type: NodeType,
) -> Option<&'d Host> {
    let mut excluded = vec![settings.bootstrap_host.as_str()];
    if let Some(local) = &settings.local_hostname {
        excluded.push(local.as_str());
    }
    directory.find_host(node_type, &excluded)
}

/// Destination host for a node type: not the bootstrap host, not the source
fn resolve_to<'d, D: TargetDirectory>(
    directory: &'d D,
    settings: &RunSettings,
    node_type: NodeType,
    from_hostname: &str,
) -> Option<&'d Host> {
    directory.find_host(node_type, &[settings.bootstrap_host.as_str(), from_hostname])
}

/// (from, network) pairs of the plan in document order
fn pairs(plan: &TestPlan) -> Vec<(NodeType, Network)> {
    plan.sources()
        .flat_map(|(from, networks)| {
            networks
                .iter()
                .filter(|(_, targets)| !targets.is_empty())
                .map(move |(network, _)| (from, *network))
        })
        .collect()
}

/// Destination types of one (from, network) entry that pass the filters
fn allowed_targets(
    plan: &TestPlan,
    filters: &Filters,
    from: NodeType,
    network: Network,
) -> Vec<(NodeType, bool)> {
    if !filters.allows_from(from) || !filters.allows_network(network) {
        return Vec::new();
    }

    plan.sources()
        .filter(|(node_type, _)| *node_type == from)
        .filter_map(|(_, networks)| networks.get(&network))
        .flat_map(|targets| targets.iter())
        .filter(|(to, _)| filters.allows_to(**to))
        .map(|(to, expected)| (*to, *expected))
        .collect()
}
