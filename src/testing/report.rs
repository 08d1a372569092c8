//! Test results and their console rendering

use colored::Colorize;
use serde::Serialize;

use crate::common::Result;
use crate::targets::{Network, NodeType};

/// What happened to one (from, network, to) case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseStatus {
    /// Connected, and was expected to
    Reachable,
    /// Failed to connect, and was expected to
    Unreachable { error: String },
    /// Connected although it should not have
    UnexpectedlyReachable,
    /// Failed to connect although it should have
    UnexpectedlyUnreachable { error: String },
    /// No usable source host
    FromUnresolved,
    /// No usable destination host
    ToUnresolved,
}

impl CaseStatus {
    /// Judge a connection attempt against the expectation
    pub fn evaluate(expected: bool, result: Result<()>) -> Self {
        match (expected, result) {
            (true, Ok(())) => CaseStatus::Reachable,
            (false, Ok(())) => CaseStatus::UnexpectedlyReachable,
            (false, Err(e)) => CaseStatus::Unreachable {
                error: e.to_string(),
            },
            (true, Err(e)) => CaseStatus::UnexpectedlyUnreachable {
                error: e.to_string(),
            },
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, CaseStatus::Reachable | CaseStatus::Unreachable { .. })
    }

    /// Whether a connection was actually attempted
    pub fn ran(&self) -> bool {
        !matches!(self, CaseStatus::FromUnresolved | CaseStatus::ToUnresolved)
    }
}

/// Outcome of one case with the hosts it used
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseRecord {
    pub from: NodeType,
    pub network: Network,
    pub to: NodeType,
    pub expected: bool,
    pub from_host: Option<String>,
    pub to_host: Option<String>,
    #[serde(flatten)]
    pub status: CaseStatus,
}

/// Accumulated results of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Cases where both endpoints resolved and a connection was attempted
    pub total_ran: usize,
    pub passed: usize,
    pub failed: usize,
    pub overall_pass: bool,
    /// Duration of the timed pass
    pub elapsed_secs: f64,
    pub cases: Vec<CaseRecord>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            total_ran: 0,
            passed: 0,
            failed: 0,
            overall_pass: true,
            elapsed_secs: 0.0,
            cases: Vec::new(),
        }
    }
}

impl RunReport {
    pub fn record(&mut self, record: CaseRecord) {
        if record.status.ran() {
            self.total_ran += 1;
        }
        if record.status.passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
            self.overall_pass = false;
        }
        self.cases.push(record);
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseRecord> {
        self.cases.iter().filter(|case| !case.status.passed())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Block introducing a case
///
/// `to` is the destination node type with its resolved address, if any.
pub fn format_header(
    from: NodeType,
    from_host: Option<&str>,
    network: &str,
    to: Option<(NodeType, Option<&str>)>,
    expected: bool,
) -> String {
    let mut lines = vec![format!("\n{}", "Testing SSH access:".bold())];

    lines.push(match from_host {
        Some(host) => format!("        From node type {}, using {}", from, host.cyan()),
        None => format!("        From node type {}", from),
    });
    lines.push(format!("        Over network {}", network));

    if let Some((to, to_host)) = to {
        lines.push(match to_host {
            Some(host) => format!("        To node type {}, using {}", to, host.cyan()),
            None => format!("        To node type {}", to),
        });
        lines.push(format!("        Expected to work: {}", expected));
    }

    lines.join("\n")
}

/// Verdict line under a case header
pub fn format_status(status: &CaseStatus, from: NodeType, to: NodeType) -> String {
    let line = match status {
        CaseStatus::Reachable | CaseStatus::Unreachable { .. } => {
            format!("^^^^ {} ^^^^", "PASSED".green().bold())
        }
        CaseStatus::UnexpectedlyReachable => format!(
            "^^^^ {} accessible but SHOULD NOT have been accessible ^^^^",
            "FAILED:".red().bold()
        ),
        CaseStatus::UnexpectedlyUnreachable { error } => format!(
            "^^^^ {} not accessible but SHOULD have been accessible ^^^^\n{}",
            "FAILED:".red().bold(),
            error.dimmed()
        ),
        CaseStatus::FromUnresolved => format!(
            "^^^^ {} Cannot find a suitable node for node type {} ^^^^",
            "FAILED:".red().bold(),
            from
        ),
        CaseStatus::ToUnresolved => format!(
            "^^^^ {} Cannot find a suitable node for node type {} ^^^^",
            "FAILED:".red().bold(),
            to
        ),
    };
    format!("\t\t{}", line)
}

/// Closing summary of a run
pub fn format_summary(report: &RunReport) -> String {
    let mut lines = vec![format!(
        "\n\nRan {} tests in {:.3}s",
        report.total_ran, report.elapsed_secs
    )];

    if report.overall_pass {
        lines.push(format!("{}", "OVERALL: PASSED".green().bold()));
    } else {
        lines.push(format!(
            "{} ({} failed)",
            "OVERALL: FAILED".red().bold(),
            report.failed
        ));
        for case in report.failures() {
            lines.push(format!(
                "  {} {} -> {} over {}",
                "✗".red(),
                case.from,
                case.to,
                case.network
            ));
        }
    }

    lines.join("\n")
}

pub fn print_header(
    from: NodeType,
    from_host: Option<&str>,
    network: &str,
    to: Option<(NodeType, Option<&str>)>,
    expected: bool,
) {
    println!("{}", format_header(from, from_host, network, to, expected));
}

pub fn print_status(status: &CaseStatus, from: NodeType, to: NodeType) {
    println!("{}", format_status(status, from, to));
}

pub fn print_summary(report: &RunReport) {
    println!("{}", format_summary(report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;

    fn plain() {
        colored::control::set_override(false);
    }

    fn refused() -> Result<()> {
        Err(Error::connect_failed("ncn-m003.cmn.example.com", "Connection refused"))
    }

    fn record(status: CaseStatus) -> CaseRecord {
        CaseRecord {
            from: NodeType::NcnMaster,
            network: Network::Cmn,
            to: NodeType::Uan,
            expected: true,
            from_host: Some("ncn-m002".into()),
            to_host: Some("uan01.cmn.example.com".into()),
            status,
        }
    }

    #[test]
    fn test_expected_reachable_and_connected_passes() {
        let status = CaseStatus::evaluate(true, Ok(()));
        assert_eq!(status, CaseStatus::Reachable);
        assert!(status.passed());
    }

    #[test]
    fn test_expected_reachable_but_failed_fails() {
        let status = CaseStatus::evaluate(true, refused());
        assert!(matches!(status, CaseStatus::UnexpectedlyUnreachable { ref error } if error.contains("refused")));
        assert!(!status.passed());
        assert!(status.ran());
    }

    #[test]
    fn test_expected_unreachable_and_failed_passes() {
        let status = CaseStatus::evaluate(false, refused());
        assert!(matches!(status, CaseStatus::Unreachable { .. }));
        assert!(status.passed());
    }

    #[test]
    fn test_expected_unreachable_but_connected_fails() {
        let status = CaseStatus::evaluate(false, Ok(()));
        assert_eq!(status, CaseStatus::UnexpectedlyReachable);
        assert!(!status.passed());
    }

    #[test]
    fn test_unresolved_cases_fail_without_running() {
        for status in [CaseStatus::FromUnresolved, CaseStatus::ToUnresolved] {
            assert!(!status.passed());
            assert!(!status.ran());
        }
    }

    #[test]
    fn test_report_counts() {
        let mut report = RunReport::default();
        assert!(report.overall_pass);

        report.record(record(CaseStatus::Reachable));
        assert!(report.overall_pass);

        report.record(record(CaseStatus::ToUnresolved));
        report.record(record(CaseStatus::UnexpectedlyReachable));

        assert_eq!(report.total_ran, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 2);
        assert!(!report.overall_pass);
        assert_eq!(report.failures().count(), 2);
    }

    #[test]
    fn test_report_json_shape() {
        let mut report = RunReport::default();
        report.record(record(CaseStatus::Unreachable {
            error: "timed out".into(),
        }));

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["total_ran"], 1);
        assert_eq!(value["overall_pass"], true);
        let case = &value["cases"][0];
        assert_eq!(case["from"], "ncn_master");
        assert_eq!(case["network"], "cmn");
        assert_eq!(case["status"], "unreachable");
        assert_eq!(case["error"], "timed out");
    }

    #[test]
    fn test_header_block() {
        plain();
        let header = format_header(
            NodeType::NcnMaster,
            Some("ncn-m002"),
            "cmn.example.com",
            Some((NodeType::NcnMaster, Some("ncn-m003.cmn.example.com"))),
            true,
        );
        assert_eq!(
            header,
            "\nTesting SSH access:\n\
             \x20       From node type ncn_master, using ncn-m002\n\
             \x20       Over network cmn.example.com\n\
             \x20       To node type ncn_master, using ncn-m003.cmn.example.com\n\
             \x20       Expected to work: true"
        );

        // Unresolved source: no destination lines
        let header = format_header(NodeType::Uan, None, "can.example.com", None, false);
        assert_eq!(
            header,
            "\nTesting SSH access:\n        From node type uan\n        Over network can.example.com"
        );
    }

    #[test]
    fn test_status_markers() {
        plain();
        let from = NodeType::Uan;
        let to = NodeType::NcnMaster;

        assert_eq!(format_status(&CaseStatus::Reachable, from, to), "\t\t^^^^ PASSED ^^^^");
        assert_eq!(
            format_status(&CaseStatus::Unreachable { error: "refused".into() }, from, to),
            "\t\t^^^^ PASSED ^^^^"
        );
        assert_eq!(
            format_status(&CaseStatus::UnexpectedlyReachable, from, to),
            "\t\t^^^^ FAILED: accessible but SHOULD NOT have been accessible ^^^^"
        );
        assert_eq!(
            format_status(
                &CaseStatus::UnexpectedlyUnreachable { error: "timed out".into() },
                from,
                to
            ),
            "\t\t^^^^ FAILED: not accessible but SHOULD have been accessible ^^^^\ntimed out"
        );
        assert_eq!(
            format_status(&CaseStatus::FromUnresolved, from, to),
            "\t\t^^^^ FAILED: Cannot find a suitable node for node type uan ^^^^"
        );
        assert_eq!(
            format_status(&CaseStatus::ToUnresolved, from, to),
            "\t\t^^^^ FAILED: Cannot find a suitable node for node type ncn_master ^^^^"
        );
    }

    #[test]
    fn test_summary_lines() {
        plain();
        let mut report = RunReport::default();
        report.record(record(CaseStatus::Reachable));
        report.elapsed_secs = 1.23456;
        assert_eq!(format_summary(&report), "\n\nRan 1 tests in 1.235s\nOVERALL: PASSED");

        report.record(record(CaseStatus::UnexpectedlyReachable));
        assert_eq!(
            format_summary(&report),
            "\n\nRan 2 tests in 1.235s\nOVERALL: FAILED (1 failed)\n  ✗ ncn_master -> uan over cmn"
        );
    }
}
