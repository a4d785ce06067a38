//! CLI entry point for the netscope network discovery engine.

use clap::Parser;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use netscope_core::config::ScanOptions;
use netscope_core::events::TracingSink;
use netscope_core::types::{NicRecord, TopologyResult};

use netscope_discover::nic::{NicProvider, StaticNicProvider, SystemNicProvider};
use netscope_discover::transport::SystemTransport;
use netscope_discover::ScanOrchestrator;

#[derive(Parser)]
#[command(name = "netscope-discover")]
#[command(about = "Discover hosts, services and topology of an IPv4 range")]
struct Cli {
    /// Range to scan: CIDR (10.0.1.0/24), dash range (10.0.1.10-10.0.1.20)
    /// or a single address.
    #[arg(short, long)]
    range: String,

    /// Comma-separated ports to probe (overrides config).
    #[arg(short, long, value_delimiter = ',')]
    ports: Option<Vec<u16>>,

    /// Probe every port from 1 to 65535.
    #[arg(long)]
    all_ports: bool,

    /// Skip the port scan phase.
    #[arg(long)]
    no_port_scan: bool,

    /// Skip NIC enrichment.
    #[arg(long)]
    no_enrichment: bool,

    /// Skip anomaly detection.
    #[arg(long)]
    no_anomalies: bool,

    /// Config file prefix (default: netscope).
    #[arg(short, long, default_value = "netscope")]
    config: String,

    /// Pretty-print the JSON result.
    #[arg(long)]
    pretty: bool,
}

/// Static interface records from the `[nic]` section.
#[derive(Debug, Default, Deserialize)]
struct NicConfig {
    #[serde(default)]
    records: Vec<NicRecord>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;
    let options = apply_overrides(scan_options(&settings), &cli);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling scan");
            on_signal.cancel();
        }
    });

    let nic = nic_records(&settings);
    let result = if nic.is_empty() {
        run(SystemNicProvider, &cli.range, &options, &cancel).await?
    } else {
        tracing::info!(records = nic.len(), "Using static NIC records from config");
        run(StaticNicProvider::new(nic), &cli.range, &options, &cancel).await?
    };

    let json = if cli.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{json}");

    Ok(())
}

async fn run<N: NicProvider>(
    nic: N,
    range: &str,
    options: &ScanOptions,
    cancel: &CancellationToken,
) -> anyhow::Result<TopologyResult> {
    let orchestrator = ScanOrchestrator::new(SystemTransport::new(), nic, TracingSink);
    Ok(orchestrator.scan(range, options, cancel).await?)
}

fn load_settings(file_prefix: &str) -> anyhow::Result<config::Config> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("NETSCOPE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("scan.ports")
                .with_list_parse_key("scan.anomaly_rules.suspicious_ports"),
        )
        .build()?;
    Ok(cfg)
}

fn scan_options(cfg: &config::Config) -> ScanOptions {
    match cfg.get::<ScanOptions>("scan") {
        Ok(options) => options,
        Err(config::ConfigError::NotFound(_)) => ScanOptions::default(),
        Err(e) => {
            tracing::warn!(error = %e, "Invalid [scan] configuration, using defaults");
            ScanOptions::default()
        }
    }
}

fn nic_records(cfg: &config::Config) -> Vec<NicRecord> {
    match cfg.get::<NicConfig>("nic") {
        Ok(nic) => nic.records,
        Err(config::ConfigError::NotFound(_)) => Vec::new(),
        Err(e) => {
            tracing::warn!(error = %e, "Invalid [nic] configuration, ignoring");
            Vec::new()
        }
    }
}

fn apply_overrides(mut options: ScanOptions, cli: &Cli) -> ScanOptions {
    if let Some(ports) = &cli.ports {
        options.ports = ports.clone();
    }
    if cli.all_ports {
        options.scan_all_ports = true;
    }
    if cli.no_port_scan {
        options.enable_port_scan = false;
    }
    if cli.no_enrichment {
        options.enable_enrichment = false;
    }
    if cli.no_anomalies {
        options.enable_anomaly_detection = false;
    }
    options
}
