use crate::model::{Event, Host, Severity};
use comfy_table::{presets::ASCII_FULL, Table};
use serde_json::json;
use std::collections::HashSet;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Knobs consumed by the filtering writers. Aggregation itself never reads
/// these.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Events below this severity are dropped by filtering writers.
    pub severity: Severity,
    /// When set, filtering writers only keep these plugin ids.
    pub filter: Option<HashSet<String>>,
}

impl ReportOptions {
    fn keeps(&self, event: &Event) -> bool {
        if let Some(filter) = &self.filter {
            if !filter.contains(&event.id) {
                return false;
            }
        }
        event.severity >= self.severity
    }
}

/// A report rendering over the aggregation result. Writers only ever read
/// the collections.
pub trait ReportWriter {
    fn file_name(&self) -> &'static str;
    fn render(&self, hosts: &[Host], events: &[Event], options: &ReportOptions) -> String;
}

/// Standalone HTML summary: host table plus one row per aggregated event.
pub struct HtmlReport;

impl ReportWriter for HtmlReport {
    fn file_name(&self) -> &'static str {
        "report.html"
    }

    fn render(&self, hosts: &[Host], events: &[Event], _options: &ReportOptions) -> String {
        let generated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());

        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\" />\n");
        html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n");
        html.push_str("<title>Prescan Report</title>\n");
        html.push_str("<style>");
        html.push_str(
            "body{font-family:system-ui,-apple-system,\"Segoe UI\",sans-serif;background:#0f172a;color:#e2e8f0;margin:0;padding:0;}\
            header{background:#1e293b;padding:24px 32px;border-bottom:1px solid rgba(148,163,184,0.2);}\
            h1{margin:0;font-size:28px;}\
            h2{margin-top:32px;margin-bottom:12px;font-size:22px;}\
            main{padding:32px;}\
            section{margin-bottom:40px;background:#111c34;padding:24px;border-radius:12px;border:1px solid rgba(148,163,184,0.1);}\
            table{width:100%;border-collapse:collapse;margin-top:16px;font-size:14px;}\
            th,td{border:1px solid rgba(148,163,184,0.2);padding:8px 10px;text-align:left;}\
            th{background:#1e293b;font-weight:600;}\
            tr:nth-child(even){background:rgba(148,163,184,0.05);}\
            footer{padding:16px 32px;border-top:1px solid rgba(148,163,184,0.2);color:#94a3b8;font-size:13px;}",
        );
        html.push_str("</style>\n</head>\n<body>\n");
        html.push_str("<header><h1>Prescan Report</h1>");
        html.push_str(&format!(
            "<p>Generated at {}</p>",
            escape_html(&generated_at)
        ));
        html.push_str("</header>\n<main>\n");

        html.push_str("<section><h2>Hosts</h2><table><thead><tr>");
        for column in [
            "Id", "IP", "Hostname", "OS", "Info", "Low", "Medium", "High", "Critical", "Total",
        ] {
            html.push_str(&format!("<th>{column}</th>"));
        }
        html.push_str("</tr></thead><tbody>");
        for host in hosts {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                host.id,
                escape_html(&host.ip),
                escape_html(&host.hostname),
                escape_html(&host.os),
                host.stats.informational,
                host.stats.low,
                host.stats.medium,
                host.stats.high,
                host.stats.critical,
                host.stats.total(true),
            ));
        }
        html.push_str("</tbody></table></section>\n");

        html.push_str("<section><h2>Findings</h2><table><thead><tr>");
        for column in ["Plugin", "Severity", "Name", "Synopsis", "Hosts"] {
            html.push_str(&format!("<th>{column}</th>"));
        }
        html.push_str("</tr></thead><tbody>");
        for event in events {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&event.id),
                event.severity.label(),
                escape_html(&event.plugin_name),
                escape_html(&event.synopsis),
                event.impacted_hosts().len(),
            ));
        }
        html.push_str("</tbody></table></section>\n");

        html.push_str("</main>\n<footer>Generated by prescan-core</footer>\n</body>\n</html>");
        html
    }
}

/// Excel-compatible HTML table, one row per event with the deduplicated list
/// of impacted host ips. Renders everything; filters are ignored.
pub struct XlsReport;

impl ReportWriter for XlsReport {
    fn file_name(&self) -> &'static str {
        "report.xls"
    }

    fn render(&self, hosts: &[Host], events: &[Event], _options: &ReportOptions) -> String {
        let mut out = String::new();
        out.push_str("<table border=1>\n");
        out.push_str(
            "<tr><th>Nessus Plugin ID</th><th>Severity</th><th>Plugin Name</th>\
             <th>Synopsis</th><th>Description</th><th>Solution</th><th>Hosts</th></tr>\n",
        );

        for event in events {
            out.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>",
                escape_html(&event.id),
                event.severity.as_u8(),
                escape_html(&event.plugin_name),
                escape_html(&event.synopsis),
                escape_html(&event.description),
                escape_html(&event.solution),
            ));
            out.push_str("<td>");
            for host_id in event.impacted_hosts() {
                if let Some(host) = hosts.iter().find(|host| host.id == host_id) {
                    out.push_str(&escape_html(&host.ip));
                    out.push('\n');
                }
            }
            out.push_str("</td></tr>\n");
        }

        out.push_str("</table>\n");
        out
    }
}

/// Afterglow link-graph input: one `plugin (severity),ip` line per impacted
/// host. Honors the severity threshold and the plugin-id filter.
pub struct AfterglowReport;

impl ReportWriter for AfterglowReport {
    fn file_name(&self) -> &'static str {
        "afterglow.csv"
    }

    fn render(&self, hosts: &[Host], events: &[Event], options: &ReportOptions) -> String {
        let mut out = String::new();
        for event in events {
            if !options.keeps(event) {
                continue;
            }
            for host_id in event.impacted_hosts() {
                if let Some(host) = hosts.iter().find(|host| host.id == host_id) {
                    out.push_str(&format!(
                        "{} ({}),{}\n",
                        event.id,
                        event.severity.as_u8(),
                        host.ip
                    ));
                }
            }
        }
        out
    }
}

/// Machine-readable dump of the full aggregation result.
pub struct JsonReport;

impl ReportWriter for JsonReport {
    fn file_name(&self) -> &'static str {
        "report.json"
    }

    fn render(&self, hosts: &[Host], events: &[Event], _options: &ReportOptions) -> String {
        let payload = json!({
            "hosts": hosts,
            "events": events,
        });
        serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string())
    }
}

/// CSV dump of the per-host statistics.
pub struct HostInfoReport;

impl ReportWriter for HostInfoReport {
    fn file_name(&self) -> &'static str {
        "hostinfo.csv"
    }

    fn render(&self, hosts: &[Host], _events: &[Event], _options: &ReportOptions) -> String {
        let mut out = String::from(
            "id,ip,hostname,os,informational,low,medium,high,critical,open_ports,total,total_excl_info\n",
        );
        for host in hosts {
            let stats = &host.stats;
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{}\n",
                host.id,
                csv_cell(&host.ip),
                csv_cell(&host.hostname),
                csv_cell(&host.os),
                stats.informational,
                stats.low,
                stats.medium,
                stats.high,
                stats.critical,
                stats.open_ports,
                stats.total(true),
                stats.total(false),
            ));
        }
        out
    }
}

/// Terminal host summary.
pub fn render_host_table(hosts: &[Host]) -> String {
    let mut table = Table::new();
    table.load_preset(ASCII_FULL);
    table.set_header(vec![
        "Id", "IP", "Hostname", "OS", "Info", "Low", "Medium", "High", "Critical", "Total",
    ]);

    for host in hosts {
        table.add_row(vec![
            host.id.to_string(),
            host.ip.clone(),
            host.hostname.clone(),
            host.os.clone(),
            host.stats.informational.to_string(),
            host.stats.low.to_string(),
            host.stats.medium.to_string(),
            host.stats.high.to_string(),
            host.stats.critical.to_string(),
            host.stats.total(true).to_string(),
        ]);
    }

    table.to_string()
}

/// Terminal event summary, in the sorted event order.
pub fn render_event_table(events: &[Event]) -> String {
    let mut table = Table::new();
    table.load_preset(ASCII_FULL);
    table.set_header(vec!["Plugin", "Severity", "Name", "Hosts"]);

    for event in events {
        table.add_row(vec![
            event.id.clone(),
            event.severity.label().to_string(),
            event.plugin_name.clone(),
            event.impacted_hosts().len().to_string(),
        ]);
    }

    table.to_string()
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn csv_cell(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
