//! SNMP exporter entry point: parses the CLI, loads and validates config,
//! then hands off to [`snmp_exporter::backend::run`].

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use snmp_exporter::config;

#[derive(Parser)]
#[command(name = "snmp-exporter")]
#[command(about = "SNMP polling exporter for Prometheus and InfluxDB")]
#[command(version = snmp_exporter::VERSION)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short = 'f', long, default_value = "snmp.yaml")]
    filename: PathBuf,

    /// Log level: debug, info, warning, error.
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Prometheus listen address (host:port; empty host binds wildcard).
    #[arg(long, default_value = ":9100")]
    listen: String,

    /// Prometheus exposition path.
    #[arg(long, default_value = "/metrics")]
    path: String,

    /// Validate the config file and exit without starting collection.
    #[arg(short = 'c', long)]
    check: bool,

    /// Tokio runtime worker threads.
    #[arg(short = 'M', long, default_value_t = 1)]
    max_threads: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.max_threads.max(1))
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    runtime.block_on(run(cli))
}

fn init_logging(log_level: &str) {
    let directive = match log_level {
        "debug" => "debug",
        "warning" | "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn run(cli: Cli) -> ExitCode {
    info!("loading config from {}", cli.filename.display());
    let config = match config::parse_config(&cli.filename) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "config loaded: {} host(s), {} module(s)",
        config.hosts.len(),
        config.modules.len()
    );

    if cli.check {
        println!("configuration OK");
        return ExitCode::SUCCESS;
    }

    if let Err(e) = snmp_exporter::backend::run(config, &cli.listen, &cli.path).await {
        error!("fatal error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
