//! Sink driver — the uniform interface metric samples land on, implemented
//! by the Prometheus HTTP exposition and InfluxDB push variants.

pub mod influxdb;
pub mod prometheus;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

pub use influxdb::InfluxDbSink;
pub use prometheus::PrometheusSink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("http server error: {0}")]
    Http(String),
    #[error("influxdb write failed: {0}")]
    InfluxWrite(String),
}

/// A single metric sample row ready for a sink, canonicalised labels and
/// all — see the atomicity contract on `clear`/`update_metric`/
/// `release_update_lock` in the component design.
#[derive(Debug, Clone)]
pub struct Sample {
    pub metric_name: String,
    pub host: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

#[async_trait]
pub trait Sink: Send + Sync {
    /// Declare a metric's type and help text, idempotent per name.
    async fn add_metric(&self, name: &str, metric_type: &str, description: &str);

    /// Acquire the host-scoped exclusive window for `metric_name` on `host`
    /// and erase its existing rows. Always paired with `release_update_lock`,
    /// even on error.
    async fn clear(&self, host: &str, metric_name: &str);

    /// Insert or overwrite one row, timestamped now.
    async fn update_metric(&self, sample: Sample);

    /// Release the window opened by `clear`.
    async fn release_update_lock(&self, host: &str, metric_name: &str);
}

// `start_serving` (background HTTP server / periodic pusher) isn't part of
// this trait: spawning a 'static background task needs an owned `Arc` of
// the concrete sink, which a `&self`/`Arc<dyn Sink>` trait method can't
// give us. The driver-specific entry points
// (`prometheus::start_http_server`, `influxdb::start_influx_pusher`)
// are called directly from `main` against the concrete type instead.
