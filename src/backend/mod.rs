//! Backend daemon: builds the SNMP/storage/sink stack from a validated
//! config, drives the orchestrator's warmup, and keeps the process alive
//! for the scheduler's recurring jobs and the sink's background server.

pub mod orchestrator;
pub mod scheduler;

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::{error, info};

use crate::config::{Config, DriverConfig};
use crate::sink::{influxdb, prometheus, InfluxDbSink, PrometheusSink, Sink};
use crate::snmp::{BuiltinMibResolver, SnmpQuerier};
use crate::storage::{LabelStorage, TemplateStorage};

use orchestrator::Orchestrator;

/// Build the collection stack, run warmup, start the configured sink
/// output, and block until a shutdown signal arrives.
pub async fn run(config: Config, listen: &str, path: &str) -> Result<()> {
    let config = Arc::new(config);
    let template_storage = Arc::new(TemplateStorage::new());
    let label_storage = Arc::new(LabelStorage::new());
    let resolver = Arc::new(BuiltinMibResolver::new());
    let querier = Arc::new(SnmpQuerier::new(resolver));

    let sink: Arc<dyn Sink> = match &config.driver {
        DriverConfig::Prometheus => {
            let prom = PrometheusSink::new(listen, path, template_storage.clone(), label_storage.clone());
            let for_server = prom.clone();
            tokio::spawn(async move {
                if let Err(e) = prometheus::start_http_server(for_server).await {
                    error!("prometheus http server stopped: {}", e);
                }
            });
            prom
        }
        DriverConfig::InfluxDb {
            host,
            database,
            username,
            password,
        } => {
            let influx = InfluxDbSink::new(host, database, username, password);
            influxdb::start_influx_pusher(influx.clone()).await?;
            influx
        }
    };

    let orchestrator = Orchestrator::new(config, querier, template_storage, label_storage, sink);
    info!("starting warmup");
    orchestrator.run().await;
    info!("warmup complete, collection running");

    signal::ctrl_c().await?;
    info!("shutdown signal received");
    Ok(())
}
