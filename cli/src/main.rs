use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use prescan_core::{
    import_scan_files, render_event_table, render_host_table, AfterglowReport, Event, Host,
    HostInfoReport, HostOverride, HtmlReport, ImportOptions, JsonReport, ReportOptions,
    ReportWriter, ScanVersion, Severity, XlsReport,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Aggregate Nessus scan results into cross-referenced host and finding reports"
)]
struct PrescanCli {
    /// Scan result files, processed in the given order
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Report to produce
    #[arg(short = 't', long = "type", default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Directory report files are written to
    #[arg(short, long, default_value = "prescan-report")]
    output_dir: PathBuf,

    /// YAML file with skip and override entries
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Lowest severity kept by filtering reports (0-4)
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=4))]
    severity: u8,

    /// Restrict filtering reports to a plugin id. Repeat for multiple ids.
    #[arg(short = 'f', long = "filter", value_name = "PLUGIN_ID", action = ArgAction::Append)]
    filter: Vec<String>,

    /// Force the scan schema version (1 or 2) instead of detecting it
    #[arg(long, value_name = "VERSION")]
    scan_version: Option<u8>,

    /// Print the aggregated hosts and events as JSON instead of a report
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Host and event summary tables on stdout
    Table,
    /// Standalone HTML report
    Html,
    /// Excel-compatible table
    Xls,
    /// Afterglow link-graph CSV
    Glow,
    /// Per-host statistics CSV
    Hostinfo,
    /// Full aggregation result as JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            OutputFormat::Table => "table",
            OutputFormat::Html => "html",
            OutputFormat::Xls => "xls",
            OutputFormat::Glow => "glow",
            OutputFormat::Hostinfo => "hostinfo",
            OutputFormat::Json => "json",
        };
        write!(f, "{value}")
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Config {
    skip: Vec<String>,
    #[serde(rename = "override")]
    overrides: Vec<HostOverride>,
}

fn main() -> anyhow::Result<()> {
    let cli = PrescanCli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    let version = match cli.scan_version {
        Some(number) => Some(ScanVersion::from_number(number)?),
        None => None,
    };

    let options = ImportOptions {
        inputs: cli.inputs.clone(),
        skip: config.skip.iter().cloned().collect(),
        overrides: config.overrides.clone(),
        version,
    };

    let (hosts, events) = import_scan_files(&options)?;
    if hosts.is_empty() {
        eprintln!("[warn] no hosts survived aggregation");
    }

    if cli.json {
        let payload = json!({
            "hosts": hosts,
            "events": events,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    let report_options = ReportOptions {
        severity: Severity::from_raw(cli.severity),
        filter: if cli.filter.is_empty() {
            None
        } else {
            Some(cli.filter.iter().cloned().collect::<HashSet<_>>())
        },
    };

    match cli.format {
        OutputFormat::Table => {
            println!("{}", render_host_table(&hosts));
            println!();
            println!("{}", render_event_table(&events));
        }
        OutputFormat::Html => {
            write_report(&HtmlReport, &hosts, &events, &report_options, &cli.output_dir)?
        }
        OutputFormat::Xls => {
            write_report(&XlsReport, &hosts, &events, &report_options, &cli.output_dir)?
        }
        OutputFormat::Glow => write_report(
            &AfterglowReport,
            &hosts,
            &events,
            &report_options,
            &cli.output_dir,
        )?,
        OutputFormat::Hostinfo => write_report(
            &HostInfoReport,
            &hosts,
            &events,
            &report_options,
            &cli.output_dir,
        )?,
        OutputFormat::Json => write_report(
            &JsonReport,
            &hosts,
            &events,
            &report_options,
            &cli.output_dir,
        )?,
    }

    Ok(())
}

fn write_report(
    writer: &dyn ReportWriter,
    hosts: &[Host],
    events: &[Event],
    options: &ReportOptions,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let contents = writer.render(hosts, events, options);
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;
    let path = output_dir.join(writer.file_name());
    fs::write(&path, contents)
        .with_context(|| format!("failed to write report {}", path.display()))?;
    println!("report written to {}", path.display());
    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}
