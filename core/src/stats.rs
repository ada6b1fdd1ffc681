use crate::model::{Finding, Severity};
use serde::{Deserialize, Serialize};

/// Rejected kind argument for [`HostStats::percentage_for`].
#[derive(Debug, thiserror::Error)]
#[error("{0} is not a valid percentage kind; expected one of all, tcp, udp, icmp, high, medium or low")]
pub struct InvalidStatKind(pub String);

/// Cached per-host statistics over one sighting's findings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStats {
    pub informational: u32,
    pub low: u32,
    pub medium: u32,
    pub high: u32,
    pub critical: u32,
    pub tcp: u32,
    pub udp: u32,
    pub icmp: u32,
    pub open_ports: u32,
    pub ports: Vec<String>,
}

impl HostStats {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut stats = HostStats::default();

        for finding in findings {
            match finding.severity {
                Severity::Informational => stats.informational += 1,
                Severity::Low => stats.low += 1,
                Severity::Medium => stats.medium += 1,
                Severity::High => stats.high += 1,
                Severity::Critical => stats.critical += 1,
            }

            // protocols are only counted for findings that matter
            if finding.severity != Severity::Informational {
                match finding.protocol.as_str() {
                    "tcp" => stats.tcp += 1,
                    "udp" => stats.udp += 1,
                    "icmp" => stats.icmp += 1,
                    _ => {}
                }
            }

            if leading_number(&finding.port) != 0 {
                stats.open_ports += 1;
            }

            stats.ports.push(finding.port.clone());
        }

        stats.ports.sort();
        stats.ports.dedup();
        stats
    }

    /// Sum of low, medium, high and critical counts.
    pub fn all(&self) -> u32 {
        self.low + self.medium + self.high + self.critical
    }

    pub fn total(&self, include_informational: bool) -> u32 {
        if include_informational {
            self.all() + self.informational
        } else {
            self.all()
        }
    }

    /// Share of `kind` findings against the non-informational total, as a
    /// numeric string. A host with no non-informational findings reports "0"
    /// instead of dividing by zero.
    pub fn percentage_for(&self, kind: &str, round: bool) -> Result<String, InvalidStatKind> {
        let count = match kind {
            "high" => self.high,
            "medium" => self.medium,
            "low" => self.low,
            "tcp" => self.tcp,
            "udp" => self.udp,
            "icmp" => self.icmp,
            "all" => self.all(),
            other => return Err(InvalidStatKind(other.to_string())),
        };

        let all = self.all();
        if all == 0 {
            return Ok("0".to_string());
        }

        let share = (f64::from(count) / f64::from(all)) * 100.0;
        if round {
            Ok((share.round() as i64).to_string())
        } else {
            Ok(share.to_string())
        }
    }
}

// Leading-digit parse: "443" -> 443, "general/tcp" -> 0, "" -> 0.
fn leading_number(port: &str) -> u64 {
    let digits: String = port
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(port: &str, protocol: &str, severity: Severity) -> Finding {
        Finding {
            port: port.to_string(),
            protocol: protocol.to_string(),
            severity,
            ..Finding::default()
        }
    }

    #[test]
    fn single_high_tcp_finding() {
        let stats = HostStats::from_findings(&[finding("80", "tcp", Severity::High)]);

        assert_eq!(stats.open_ports, 1);
        assert_eq!(stats.tcp, 1);
        assert_eq!(stats.high, 1);
        assert_eq!(stats.all(), 1);
        assert_eq!(stats.ports, vec!["80".to_string()]);
    }

    #[test]
    fn protocol_counts_skip_informational_findings() {
        let stats = HostStats::from_findings(&[
            finding("80", "tcp", Severity::Informational),
            finding("53", "udp", Severity::Low),
            finding("0", "icmp", Severity::Medium),
        ]);

        assert_eq!(stats.tcp, 0);
        assert_eq!(stats.udp, 1);
        assert_eq!(stats.icmp, 1);
        assert_eq!(stats.informational, 1);
    }

    #[test]
    fn open_ports_counts_numerically_nonzero_ports_only() {
        let stats = HostStats::from_findings(&[
            finding("0", "tcp", Severity::Informational),
            finding("", "tcp", Severity::Informational),
            finding("general", "tcp", Severity::Informational),
            finding("443", "tcp", Severity::High),
        ]);

        assert_eq!(stats.open_ports, 1);
    }

    #[test]
    fn ports_are_sorted_and_deduplicated() {
        let stats = HostStats::from_findings(&[
            finding("443", "tcp", Severity::Low),
            finding("80", "tcp", Severity::Low),
            finding("443", "tcp", Severity::High),
            finding("0", "tcp", Severity::Informational),
        ]);

        assert_eq!(
            stats.ports,
            vec!["0".to_string(), "443".to_string(), "80".to_string()]
        );
    }

    #[test]
    fn total_optionally_includes_informational() {
        let stats = HostStats::from_findings(&[
            finding("80", "tcp", Severity::Informational),
            finding("80", "tcp", Severity::Low),
            finding("80", "tcp", Severity::Critical),
        ]);

        assert_eq!(stats.total(false), 2);
        assert_eq!(stats.total(true), 3);
    }

    #[test]
    fn percentage_rejects_unknown_kinds() {
        let stats = HostStats::from_findings(&[finding("80", "tcp", Severity::High)]);
        let err = stats.percentage_for("critical", false).unwrap_err();
        assert!(err.to_string().contains("critical"));
    }

    #[test]
    fn percentage_with_empty_denominator_is_zero() {
        let stats = HostStats::from_findings(&[finding("80", "tcp", Severity::Informational)]);
        assert_eq!(stats.percentage_for("high", false).unwrap(), "0");
        assert_eq!(stats.percentage_for("all", true).unwrap(), "0");
    }

    #[test]
    fn percentage_rounds_on_request() {
        let stats = HostStats::from_findings(&[
            finding("80", "tcp", Severity::High),
            finding("81", "tcp", Severity::Low),
            finding("82", "tcp", Severity::Low),
        ]);

        assert_eq!(stats.percentage_for("high", true).unwrap(), "33");
        assert!(stats
            .percentage_for("high", false)
            .unwrap()
            .starts_with("33.33"));
        assert_eq!(stats.percentage_for("all", true).unwrap(), "100");
    }
}
