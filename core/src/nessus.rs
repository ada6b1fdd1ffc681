use crate::model::{Finding, Severity};
use crate::stats::HostStats;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::name::QName;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("unsupported scan version")]
    UnsupportedVersion,
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed scan file: {0}")]
    Xml(#[from] quick_xml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanVersion {
    V1,
    V2,
}

impl ScanVersion {
    pub fn from_number(value: u8) -> Result<Self, ReadError> {
        match value {
            1 => Ok(ScanVersion::V1),
            2 => Ok(ScanVersion::V2),
            _ => Err(ReadError::UnsupportedVersion),
        }
    }
}

/// One host record as reported by a single scan file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanHost {
    pub ip: String,
    pub hostname: String,
    pub os: String,
    pub findings: Vec<Finding>,
}

impl ScanHost {
    pub fn stats(&self) -> HostStats {
        HostStats::from_findings(&self.findings)
    }
}

/// A fully parsed scan result file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFile {
    pub version: ScanVersion,
    pub hosts: Vec<ScanHost>,
}

impl ScanFile {
    pub fn open(path: &Path, version: Option<ScanVersion>) -> Result<Self, ReadError> {
        let bytes = fs::read(path).map_err(|source| ReadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes, version)
    }

    /// Parses a scan document. Without an explicit version the root element
    /// decides: `NessusClientData` is v1, `NessusClientData_v2` is v2,
    /// anything else is fatal.
    pub fn from_bytes(xml: &[u8], version: Option<ScanVersion>) -> Result<Self, ReadError> {
        let version = match version {
            Some(version) => version,
            None => detect_version(xml)?,
        };
        let hosts = match version {
            ScanVersion::V1 => parse_v1(xml)?,
            ScanVersion::V2 => parse_v2(xml)?,
        };
        Ok(ScanFile { version, hosts })
    }
}

fn detect_version(xml: &[u8]) -> Result<ScanVersion, ReadError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            XmlEvent::Start(element) | XmlEvent::Empty(element) => {
                return match element.name() {
                    QName(b"NessusClientData_v2") => Ok(ScanVersion::V2),
                    QName(b"NessusClientData") => Ok(ScanVersion::V1),
                    _ => Err(ReadError::UnsupportedVersion),
                };
            }
            XmlEvent::Eof => return Err(ReadError::UnsupportedVersion),
            _ => {}
        }
        buf.clear();
    }
}

#[derive(Default)]
struct HostBuilder {
    ip: String,
    hostname: String,
    os: String,
    findings: Vec<Finding>,
}

impl HostBuilder {
    fn into_scan_host(self) -> ScanHost {
        ScanHost {
            ip: self.ip,
            hostname: self.hostname,
            os: self.os,
            findings: self.findings,
        }
    }
}

#[derive(Default)]
struct FindingBuilder {
    port: String,
    protocol: String,
    severity: u8,
    plugin_id: String,
    family: String,
    plugin_name: String,
    synopsis: String,
    description: String,
    solution: String,
    see_also: String,
    cvss_base_score: String,
    cve: String,
    cvss_vector: String,
    output: String,
}

impl FindingBuilder {
    fn build(self) -> Finding {
        Finding {
            port: self.port,
            protocol: self.protocol,
            severity: Severity::from_raw(self.severity),
            plugin_id: self.plugin_id,
            family: self.family,
            plugin_name: self.plugin_name,
            synopsis: self.synopsis,
            description: self.description,
            solution: self.solution,
            see_also: split_references(&self.see_also),
            cvss_base_score: self.cvss_base_score,
            cve: self.cve,
            cvss_vector: self.cvss_vector,
            output: self.output,
        }
    }
}

fn split_references(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_v2(xml: &[u8]) -> Result<Vec<ScanHost>, ReadError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut hosts = Vec::new();
    let mut current_host: Option<HostBuilder> = None;
    let mut current_finding: Option<FindingBuilder> = None;
    let mut current_property: Option<String> = None;
    let mut current_field: Option<&'static str> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            XmlEvent::Start(element) => match element.name() {
                QName(b"ReportHost") => {
                    current_host = Some(HostBuilder::default());
                }
                QName(b"tag") => {
                    if current_host.is_some() {
                        for attr in element.attributes().flatten() {
                            if attr.key.as_ref() == b"name" {
                                current_property =
                                    Some(String::from_utf8_lossy(&attr.value).to_string());
                            }
                        }
                    }
                }
                QName(b"ReportItem") => {
                    current_finding = Some(finding_from_attributes(&element));
                }
                name => {
                    if current_finding.is_some() {
                        current_field = finding_field(name);
                    }
                }
            },
            XmlEvent::Empty(element) => {
                if element.name() == QName(b"ReportItem") {
                    if let Some(host) = current_host.as_mut() {
                        host.findings.push(finding_from_attributes(&element).build());
                    }
                }
            }
            XmlEvent::Text(text) => {
                let value = text.unescape().unwrap_or_default().to_string();
                apply_v2_value(
                    current_host.as_mut(),
                    current_finding.as_mut(),
                    current_property.as_deref(),
                    current_field,
                    &value,
                );
            }
            XmlEvent::CData(text) => {
                let value = String::from_utf8_lossy(&text.into_inner()).to_string();
                apply_v2_value(
                    current_host.as_mut(),
                    current_finding.as_mut(),
                    current_property.as_deref(),
                    current_field,
                    &value,
                );
            }
            XmlEvent::End(element) => match element.name() {
                QName(b"ReportItem") => {
                    if let (Some(host), Some(finding)) =
                        (current_host.as_mut(), current_finding.take())
                    {
                        host.findings.push(finding.build());
                    }
                    current_field = None;
                }
                QName(b"ReportHost") => {
                    if let Some(host) = current_host.take() {
                        hosts.push(host.into_scan_host());
                    }
                }
                QName(b"tag") => current_property = None,
                name => {
                    if current_field == finding_field(name) {
                        current_field = None;
                    }
                }
            },
            XmlEvent::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(hosts)
}

fn finding_from_attributes(element: &BytesStart<'_>) -> FindingBuilder {
    let mut builder = FindingBuilder::default();
    for attr in element.attributes().flatten() {
        let value = String::from_utf8_lossy(&attr.value).to_string();
        match attr.key.as_ref() {
            b"port" => builder.port = value,
            b"protocol" => builder.protocol = value,
            b"severity" => builder.severity = value.trim().parse().unwrap_or(0),
            b"pluginID" => builder.plugin_id = value,
            b"pluginName" => builder.plugin_name = value,
            b"pluginFamily" => builder.family = value,
            _ => {}
        }
    }
    builder
}

fn finding_field(name: QName<'_>) -> Option<&'static str> {
    match name {
        QName(b"synopsis") => Some("synopsis"),
        QName(b"description") => Some("description"),
        QName(b"solution") => Some("solution"),
        QName(b"see_also") => Some("see_also"),
        QName(b"cvss_base_score") => Some("cvss_base_score"),
        QName(b"cve") => Some("cve"),
        QName(b"cvss_vector") => Some("cvss_vector"),
        QName(b"plugin_output") => Some("plugin_output"),
        _ => None,
    }
}

fn apply_v2_value(
    host: Option<&mut HostBuilder>,
    finding: Option<&mut FindingBuilder>,
    property: Option<&str>,
    field: Option<&'static str>,
    value: &str,
) {
    if let (Some(finding), Some(field)) = (finding, field) {
        append_field(finding, field, value);
        return;
    }
    if let (Some(host), Some(property)) = (host, property) {
        match property {
            "host-ip" => host.ip = value.to_string(),
            "host-fqdn" => host.hostname = value.to_string(),
            "operating-system" => host.os = value.to_string(),
            _ => {}
        }
    }
}

// Repeated elements (multiple cve or see_also entries) accumulate onto
// separate lines.
fn append_field(finding: &mut FindingBuilder, field: &str, value: &str) {
    let slot = match field {
        "synopsis" => &mut finding.synopsis,
        "description" => &mut finding.description,
        "solution" => &mut finding.solution,
        "see_also" => &mut finding.see_also,
        "cvss_base_score" => &mut finding.cvss_base_score,
        "cve" => &mut finding.cve,
        "cvss_vector" => &mut finding.cvss_vector,
        "plugin_output" => &mut finding.output,
        _ => return,
    };
    if slot.is_empty() {
        slot.push_str(value);
    } else {
        slot.push('\n');
        slot.push_str(value);
    }
}

fn parse_v1(xml: &[u8]) -> Result<Vec<ScanHost>, ReadError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut hosts = Vec::new();
    let mut current_host: Option<HostBuilder> = None;
    let mut current_finding: Option<FindingBuilder> = None;
    let mut current_element: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            XmlEvent::Start(element) => match element.name() {
                QName(b"ReportHost") => current_host = Some(HostBuilder::default()),
                QName(b"ReportItem") => current_finding = Some(FindingBuilder::default()),
                name => {
                    current_element = Some(String::from_utf8_lossy(name.as_ref()).to_string());
                }
            },
            XmlEvent::Text(text) => {
                let value = text.unescape().unwrap_or_default().to_string();
                apply_v1_value(
                    current_host.as_mut(),
                    current_finding.as_mut(),
                    current_element.as_deref(),
                    value,
                );
            }
            XmlEvent::CData(text) => {
                let value = String::from_utf8_lossy(&text.into_inner()).to_string();
                apply_v1_value(
                    current_host.as_mut(),
                    current_finding.as_mut(),
                    current_element.as_deref(),
                    value,
                );
            }
            XmlEvent::End(element) => match element.name() {
                QName(b"ReportItem") => {
                    if let (Some(host), Some(finding)) =
                        (current_host.as_mut(), current_finding.take())
                    {
                        host.findings.push(finding.build());
                    }
                }
                QName(b"ReportHost") => {
                    if let Some(host) = current_host.take() {
                        hosts.push(host.into_scan_host());
                    }
                }
                _ => current_element = None,
            },
            XmlEvent::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(hosts)
}

fn apply_v1_value(
    host: Option<&mut HostBuilder>,
    finding: Option<&mut FindingBuilder>,
    element: Option<&str>,
    value: String,
) {
    if let Some(finding) = finding {
        match element {
            Some("port") => {
                let (port, protocol) = split_v1_port(&value);
                finding.port = port;
                finding.protocol = protocol;
            }
            Some("severity") => finding.severity = value.trim().parse().unwrap_or(0),
            Some("pluginID") => finding.plugin_id = value,
            Some("pluginName") => finding.plugin_name = value,
            Some("data") => finding.output = value,
            _ => {}
        }
        return;
    }

    if let (Some(host), Some("HostName")) = (host, element) {
        // the v1 dialect carries no separate address tag
        host.ip = value.clone();
        host.hostname = value;
    }
}

// v1 port strings look like "ssh (22/tcp)" or "general/tcp".
fn split_v1_port(raw: &str) -> (String, String) {
    let inner = match (raw.find('('), raw.rfind(')')) {
        (Some(start), Some(end)) if start < end => &raw[start + 1..end],
        _ => raw,
    };
    match inner.split_once('/') {
        Some((port, protocol)) => (port.trim().to_string(), protocol.trim().to_string()),
        None => (inner.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V2_DOC: &str = r#"<?xml version="1.0" ?>
<NessusClientData_v2>
<Report name="demo">
<ReportHost name="web01">
<HostProperties>
<tag name="host-ip">10.0.0.1</tag>
<tag name="host-fqdn">web01.example.com</tag>
<tag name="operating-system">Linux Kernel 5.4</tag>
</HostProperties>
<ReportItem port="80" svc_name="http" protocol="tcp" severity="3" pluginID="11111" pluginName="Example Plugin" pluginFamily="Web Servers">
<synopsis>Synopsis text</synopsis>
<description>Description text</description>
<solution>Solution text</solution>
<see_also>https://example.com/a
https://example.com/b</see_also>
<cvss_base_score>7.5</cvss_base_score>
<cve>CVE-2024-0001</cve>
<cvss_vector>AV:N/AC:L</cvss_vector>
<plugin_output>Server header observed</plugin_output>
</ReportItem>
<ReportItem port="0" protocol="tcp" severity="0" pluginID="22222" pluginName="Ping"/>
</ReportHost>
</Report>
</NessusClientData_v2>"#;

    const V1_DOC: &str = r#"<NessusClientData>
<Report>
<ReportHost>
<HostName>10.0.0.9</HostName>
<ReportItem>
<port>ssh (22/tcp)</port>
<severity>2</severity>
<pluginID>33333</pluginID>
<pluginName>SSH Plugin</pluginName>
<data>banner</data>
</ReportItem>
</ReportHost>
</Report>
</NessusClientData>"#;

    #[test]
    fn parses_v2_hosts_and_findings() {
        let scan = ScanFile::from_bytes(V2_DOC.as_bytes(), None).expect("v2 document parses");
        assert_eq!(scan.version, ScanVersion::V2);
        assert_eq!(scan.hosts.len(), 1);

        let host = &scan.hosts[0];
        assert_eq!(host.ip, "10.0.0.1");
        assert_eq!(host.hostname, "web01.example.com");
        assert_eq!(host.os, "Linux Kernel 5.4");
        assert_eq!(host.findings.len(), 2);

        let finding = &host.findings[0];
        assert_eq!(finding.port, "80");
        assert_eq!(finding.protocol, "tcp");
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.plugin_id, "11111");
        assert_eq!(finding.plugin_name, "Example Plugin");
        assert_eq!(finding.family, "Web Servers");
        assert_eq!(finding.synopsis, "Synopsis text");
        assert_eq!(finding.description, "Description text");
        assert_eq!(finding.solution, "Solution text");
        assert_eq!(finding.see_also.len(), 2);
        assert_eq!(finding.cvss_base_score, "7.5");
        assert_eq!(finding.cve, "CVE-2024-0001");
        assert_eq!(finding.cvss_vector, "AV:N/AC:L");
        assert_eq!(finding.output, "Server header observed");
    }

    #[test]
    fn missing_v2_fields_degrade_to_empty() {
        let scan = ScanFile::from_bytes(V2_DOC.as_bytes(), None).expect("v2 document parses");
        let finding = &scan.hosts[0].findings[1];
        assert_eq!(finding.severity, Severity::Informational);
        assert_eq!(finding.synopsis, "");
        assert_eq!(finding.output, "");
        assert!(finding.see_also.is_empty());
    }

    #[test]
    fn host_without_ip_tag_keeps_empty_ip() {
        let doc = r#"<NessusClientData_v2>
<Report><ReportHost name="printer">
<HostProperties><tag name="host-fqdn">printer.example.com</tag></HostProperties>
</ReportHost></Report>
</NessusClientData_v2>"#;
        let scan = ScanFile::from_bytes(doc.as_bytes(), None).expect("document parses");
        assert_eq!(scan.hosts[0].ip, "");
        assert_eq!(scan.hosts[0].hostname, "printer.example.com");
    }

    #[test]
    fn parses_v1_hosts_and_port_strings() {
        let scan = ScanFile::from_bytes(V1_DOC.as_bytes(), None).expect("v1 document parses");
        assert_eq!(scan.version, ScanVersion::V1);

        let host = &scan.hosts[0];
        assert_eq!(host.ip, "10.0.0.9");
        assert_eq!(host.hostname, "10.0.0.9");
        assert_eq!(host.os, "");

        let finding = &host.findings[0];
        assert_eq!(finding.port, "22");
        assert_eq!(finding.protocol, "tcp");
        assert_eq!(finding.severity, Severity::Medium);
        assert_eq!(finding.plugin_id, "33333");
        assert_eq!(finding.output, "banner");
    }

    #[test]
    fn splits_v1_port_variants() {
        assert_eq!(
            split_v1_port("ssh (22/tcp)"),
            ("22".to_string(), "tcp".to_string())
        );
        assert_eq!(
            split_v1_port("general/tcp"),
            ("general".to_string(), "tcp".to_string())
        );
        assert_eq!(split_v1_port("unknown"), ("unknown".to_string(), String::new()));
    }

    #[test]
    fn unknown_root_is_a_fatal_version_error() {
        let err = ScanFile::from_bytes(b"<SomethingElse/>", None).unwrap_err();
        assert!(matches!(err, ReadError::UnsupportedVersion));
        assert_eq!(err.to_string(), "unsupported scan version");
    }

    #[test]
    fn explicit_version_skips_detection() {
        let doc = r#"<Wrapped>
<Report><ReportHost>
<HostProperties><tag name="host-ip">10.0.0.2</tag></HostProperties>
<ReportItem port="443" protocol="tcp" severity="1" pluginID="44444" pluginName="TLS"/>
</ReportHost></Report>
</Wrapped>"#;

        assert!(matches!(
            ScanFile::from_bytes(doc.as_bytes(), None),
            Err(ReadError::UnsupportedVersion)
        ));

        let scan = ScanFile::from_bytes(doc.as_bytes(), Some(ScanVersion::V2))
            .expect("forced version parses");
        assert_eq!(scan.hosts.len(), 1);
        assert_eq!(scan.hosts[0].ip, "10.0.0.2");
    }

    #[test]
    fn version_numbers_outside_one_and_two_are_fatal() {
        assert!(ScanVersion::from_number(1).is_ok());
        assert!(ScanVersion::from_number(2).is_ok());
        assert!(matches!(
            ScanVersion::from_number(3),
            Err(ReadError::UnsupportedVersion)
        ));
    }
}
