pub mod aggregate;
pub mod model;
pub mod nessus;
pub mod report;
pub mod stats;

pub use aggregate::{import_scan_files, sort_events, Aggregator, HostOverride, ImportOptions};
pub use model::{Event, Finding, Host, HostIdentity, PortHosts, Severity};
pub use nessus::{ReadError, ScanFile, ScanHost, ScanVersion};
pub use report::{
    render_event_table, render_host_table, AfterglowReport, HostInfoReport, HtmlReport,
    JsonReport, ReportOptions, ReportWriter, XlsReport,
};
pub use stats::{HostStats, InvalidStatKind};
