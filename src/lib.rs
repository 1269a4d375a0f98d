//! SNMP exporter: polls remote agents on a schedule, runs their varbinds
//! through a multi-stage label pipeline, and serves the results as
//! Prometheus text exposition or pushes them as InfluxDB line protocol.

pub mod backend;
pub mod config;
pub mod sink;
pub mod snmp;
pub mod storage;

/// Application version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default Prometheus listen address.
pub const DEFAULT_LISTEN: &str = ":9100";

/// Default Prometheus exposition path.
pub const DEFAULT_PATH: &str = "/metrics";

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "snmp.yaml";
