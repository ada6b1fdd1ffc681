use crate::model::{Event, Finding, Host, HostIdentity};
use crate::nessus::{ReadError, ScanFile, ScanHost, ScanVersion};
use crate::stats::HostStats;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Patch applied to every sighting of an ip before its identity is computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostOverride {
    pub ip: String,
    pub hostname: Option<String>,
    pub os: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Input files, consumed strictly in this order.
    pub inputs: Vec<PathBuf>,
    /// Sightings of these ips are dropped entirely.
    #[serde(default)]
    pub skip: HashSet<String>,
    /// Hostname/os patches keyed by ip; the first entry per ip applies.
    #[serde(default)]
    pub overrides: Vec<HostOverride>,
    /// Explicit scan schema version; detected from the file when absent.
    #[serde(default)]
    pub version: Option<ScanVersion>,
}

/// Accumulates hosts and events across scan files. All run state lives here;
/// sightings must be fed in file order because winner selection and the
/// first-write merge rules depend on encounter order.
#[derive(Debug, Default)]
pub struct Aggregator {
    skip: HashSet<String>,
    overrides: HashMap<String, HostOverride>,
    hosts: Vec<Host>,
    host_index: HashMap<HostIdentity, u32>,
    events: Vec<Event>,
    event_index: HashMap<String, usize>,
    next_id: u32,
}

impl Aggregator {
    pub fn new(skip: HashSet<String>, overrides: &[HostOverride]) -> Self {
        let mut lookup = HashMap::new();
        for entry in overrides {
            // the first entry for an ip wins
            lookup
                .entry(entry.ip.clone())
                .or_insert_with(|| entry.clone());
        }
        Aggregator {
            skip,
            overrides: lookup,
            ..Aggregator::default()
        }
    }

    pub fn ingest_file(&mut self, scan: &ScanFile) {
        for host in &scan.hosts {
            self.ingest_host(host);
        }
    }

    pub fn ingest_host(&mut self, sighting: &ScanHost) {
        // a host without an ip was never actually scanned
        if sighting.ip.is_empty() {
            return;
        }
        if self.skip.contains(&sighting.ip) {
            return;
        }

        let mut hostname = sighting.hostname.clone();
        // the OS sometimes arrives split over multiple lines
        let mut os = sighting.os.replace('\n', "/");
        if let Some(patch) = self.overrides.get(&sighting.ip) {
            if let Some(replacement) = &patch.os {
                os = replacement.clone();
            }
            if let Some(replacement) = &patch.hostname {
                hostname = replacement.clone();
            }
        }

        let identity = HostIdentity {
            ip: sighting.ip.clone(),
            hostname,
            os,
        };
        let stats = HostStats::from_findings(&sighting.findings);

        let host_id = match self.host_index.get(&identity) {
            None => {
                let id = self.next_id;
                self.next_id += 1;
                self.hosts.push(Host {
                    id,
                    ip: identity.ip.clone(),
                    hostname: identity.hostname.clone(),
                    os: identity.os.clone(),
                    stats,
                });
                self.host_index.insert(identity, id);
                id
            }
            Some(&id) => {
                // the challenger sum leaves critical out; the stored total it
                // is compared against includes it
                let challenger = stats.informational + stats.low + stats.medium + stats.high;
                let existing = &mut self.hosts[id as usize];
                if existing.stats.total(true) < challenger {
                    existing.stats = stats;
                }
                id
            }
        };

        for finding in &sighting.findings {
            self.merge_finding(host_id, finding);
        }
    }

    fn merge_finding(&mut self, host_id: u32, finding: &Finding) {
        let index = match self.event_index.get(&finding.plugin_id) {
            Some(&index) => index,
            None => {
                let index = self.events.len();
                self.events.push(Event::from_first_sighting(finding));
                self.event_index.insert(finding.plugin_id.clone(), index);
                index
            }
        };

        let by_host = self.events[index]
            .ports
            .entry(finding.port.clone())
            .or_default();
        // the first output recorded for a host on this port stays
        by_host
            .entry(host_id)
            .or_insert_with(|| finding.output.clone());
    }

    pub fn finish(self) -> (Vec<Host>, Vec<Event>) {
        let mut events = self.events;
        sort_events(&mut events);
        (self.hosts, events)
    }
}

/// Orders events by severity, highest first. The sort is stable, so events
/// of equal severity keep the order in which they were first seen.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by_key(|event| Reverse(event.severity));
}

/// Reads every input file in order and aggregates all sightings. An
/// unsupported scan version aborts the whole run with no partial result.
pub fn import_scan_files(options: &ImportOptions) -> Result<(Vec<Host>, Vec<Event>), ReadError> {
    let mut aggregator = Aggregator::new(options.skip.clone(), &options.overrides);
    for path in &options.inputs {
        let scan = ScanFile::open(path, options.version)?;
        aggregator.ingest_file(&scan);
    }
    Ok(aggregator.finish())
}
