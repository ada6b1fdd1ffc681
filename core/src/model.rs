use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::stats::HostStats;

/// Severity class of a finding, 0 (informational) through 4 (critical).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Values outside 0..=4 degrade to informational.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Severity::Low,
            2 => Severity::Medium,
            3 => Severity::High,
            4 => Severity::Critical,
            _ => Severity::Informational,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Severity::Informational => 0,
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Informational => "Informational",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A single reported issue on a host. Fields missing from the source file
/// are carried as empty values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Finding {
    pub port: String,
    pub protocol: String,
    pub severity: Severity,
    pub plugin_id: String,
    pub family: String,
    pub plugin_name: String,
    pub synopsis: String,
    pub description: String,
    pub solution: String,
    #[serde(default)]
    pub see_also: Vec<String>,
    pub cvss_base_score: String,
    pub cve: String,
    pub cvss_vector: String,
    pub output: String,
}

/// The (ip, hostname, os) triple that decides whether two sightings are the
/// same physical host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostIdentity {
    pub ip: String,
    pub hostname: String,
    pub os: String,
}

/// An aggregated host. The id is assigned by the engine in first-seen order
/// and never comes from the source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: u32,
    pub ip: String,
    pub hostname: String,
    pub os: String,
    pub stats: HostStats,
}

/// Host id to plugin output text, for one port of one event.
pub type PortHosts = BTreeMap<u32, String>;

/// The aggregated, cross-host view of all findings sharing one plugin id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub severity: Severity,
    pub family: String,
    pub plugin_name: String,
    pub synopsis: String,
    pub description: String,
    pub solution: String,
    pub see_also: Vec<String>,
    pub cvss_base_score: String,
    pub cve: String,
    pub cvss_vector: String,
    pub ports: BTreeMap<String, PortHosts>,
}

impl Event {
    /// Captures the descriptive fields of the first sighting of a plugin id.
    /// They stay as they are even if later sightings disagree.
    pub fn from_first_sighting(finding: &Finding) -> Self {
        Event {
            id: finding.plugin_id.clone(),
            severity: finding.severity,
            family: finding.family.clone(),
            plugin_name: finding.plugin_name.clone(),
            synopsis: finding.synopsis.clone(),
            description: finding.description.clone(),
            solution: finding.solution.clone(),
            see_also: finding.see_also.clone(),
            cvss_base_score: finding.cvss_base_score.clone(),
            cve: finding.cve.clone(),
            cvss_vector: finding.cvss_vector.clone(),
            ports: BTreeMap::new(),
        }
    }

    /// Distinct ids of all hosts recorded under any port of this event.
    pub fn impacted_hosts(&self) -> BTreeSet<u32> {
        self.ports
            .values()
            .flat_map(|hosts| hosts.keys().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_informational_to_critical() {
        assert!(Severity::Informational < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_round_trips_through_raw_values() {
        for raw in 0..=4u8 {
            assert_eq!(Severity::from_raw(raw).as_u8(), raw);
        }
    }

    #[test]
    fn out_of_range_severity_degrades_to_informational() {
        assert_eq!(Severity::from_raw(9), Severity::Informational);
    }

    #[test]
    fn severity_labels() {
        assert_eq!(Severity::Informational.label(), "Informational");
        assert_eq!(Severity::Critical.to_string(), "Critical");
    }

    #[test]
    fn event_captures_descriptive_fields_with_empty_ports() {
        let finding = Finding {
            plugin_id: "11111".to_string(),
            plugin_name: "Example Plugin".to_string(),
            severity: Severity::High,
            synopsis: "short".to_string(),
            ..Finding::default()
        };

        let event = Event::from_first_sighting(&finding);
        assert_eq!(event.id, "11111");
        assert_eq!(event.plugin_name, "Example Plugin");
        assert_eq!(event.severity, Severity::High);
        assert!(event.ports.is_empty());
    }

    #[test]
    fn impacted_hosts_deduplicates_across_ports() {
        let finding = Finding {
            plugin_id: "11111".to_string(),
            ..Finding::default()
        };
        let mut event = Event::from_first_sighting(&finding);
        event
            .ports
            .entry("80".to_string())
            .or_default()
            .insert(0, "a".to_string());
        event
            .ports
            .entry("443".to_string())
            .or_default()
            .insert(0, "b".to_string());
        event
            .ports
            .entry("443".to_string())
            .or_default()
            .insert(2, "c".to_string());

        let impacted: Vec<u32> = event.impacted_hosts().into_iter().collect();
        assert_eq!(impacted, vec![0, 2]);
    }
}
