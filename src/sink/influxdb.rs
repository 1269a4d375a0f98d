//! InfluxDB sink: accumulates rows per (measurement, host, labels) and
//! pushes them as InfluxDB v1 line protocol on a background timer built on
//! `reqwest`, the HTTP client the wider example pack reaches for (the
//! teacher itself has no HTTP client dependency of its own).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{error, info, warn};

use super::prometheus::label_to_str;
use super::{Sample, Sink, SinkError};

const FLUSH_INTERVAL: Duration = Duration::from_secs(10);
const CHUNK_SIZE: usize = 1000;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingKey {
    measurement: String,
    host: String,
    canon_labels: String,
}

#[derive(Debug, Clone, Default)]
struct PendingRow {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, f64>,
    timestamp_ns: i64,
    /// Fields written since the last flush. Cleared on flush, not on
    /// construction, so a row that never completes a full cycle keeps the
    /// stale values from its last successful emission.
    written: BTreeSet<String>,
    /// Whether any field has been written since the last flush. Set on the
    /// first write of a cycle and used only to gate the timestamp capture;
    /// emission eligibility is governed by `written` against the
    /// measurement's declared field set, not by this flag.
    is_edited: bool,
}

pub struct InfluxDbSink {
    client: reqwest::Client,
    write_url: String,
    username: String,
    password: String,
    metric_types: Mutex<BTreeMap<String, String>>,
    /// Declared field set per measurement, accumulated from every
    /// `add_metric` call whose type maps to that measurement.
    measurement_fields: Mutex<BTreeMap<String, BTreeSet<String>>>,
    pending: Mutex<HashMap<PendingKey, PendingRow>>,
}

impl InfluxDbSink {
    pub fn new(host: &str, database: &str, username: &str, password: &str) -> Arc<Self> {
        Arc::new(InfluxDbSink {
            client: reqwest::Client::new(),
            write_url: format!("{}/write?db={}", host.trim_end_matches('/'), database),
            username: username.to_string(),
            password: password.to_string(),
            metric_types: Mutex::new(BTreeMap::new()),
            measurement_fields: Mutex::new(BTreeMap::new()),
            pending: Mutex::new(HashMap::new()),
        })
    }

    async fn measurement_for(&self, metric_name: &str) -> String {
        let types = self.metric_types.lock().await;
        match types.get(metric_name) {
            Some(metric_type) => measurement_name(metric_type),
            None => metric_name.to_string(),
        }
    }

    async fn flush_once(&self) {
        let declared = self.measurement_fields.lock().await.clone();
        let lines: Vec<String> = {
            let mut pending = self.pending.lock().await;
            let mut lines = Vec::new();
            for (key, row) in pending.iter_mut() {
                if !row.is_edited {
                    continue;
                }
                let ready = declared
                    .get(&key.measurement)
                    .map(|fields| fields.iter().all(|f| row.written.contains(f)))
                    .unwrap_or(true);
                if ready {
                    lines.push(render_line(row));
                    row.written.clear();
                    row.is_edited = false;
                }
            }
            lines
        };
        if lines.is_empty() {
            return;
        }
        let total = lines.len();
        let mut dropped = 0;
        for chunk in lines.chunks(CHUNK_SIZE) {
            if let Err(e) = self.push_chunk(chunk).await {
                error!("influxdb push failed after retries: {}", e);
                dropped += chunk.len();
            }
        }
        if dropped > 0 {
            warn!("influxdb flush dropped {}/{} rows", dropped, total);
        } else {
            info!("influxdb flush pushed {} rows", total);
        }
    }

    async fn push_chunk(&self, lines: &[String]) -> Result<(), SinkError> {
        let body = lines.join("\n");
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.client.post(&self.write_url).body(body.clone());
            if !self.username.is_empty() {
                request = request.basic_auth(&self.username, Some(&self.password));
            }
            match request.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) if attempt < MAX_ATTEMPTS => {
                    warn!("influxdb write returned {}, retrying", resp.status());
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Ok(resp) => return Err(SinkError::InfluxWrite(format!("status {}", resp.status()))),
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!("influxdb write error {}, retrying", e);
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
                Err(e) => return Err(SinkError::InfluxWrite(e.to_string())),
            }
        }
    }
}

/// Measurement name for a declared metric type: the `type` string truncated
/// at its first `$`, matching the Prometheus-type-string/measurement-name
/// double duty the config's `description.type` field plays per driver.
fn measurement_name(metric_type: &str) -> String {
    metric_type.split('$').next().unwrap_or(metric_type).to_string()
}

fn render_line(row: &PendingRow) -> String {
    let tags = row
        .tags
        .iter()
        .map(|(k, v)| format!("{}={}", escape_tag(k), escape_tag(v)))
        .collect::<Vec<_>>()
        .join(",");
    let fields = row
        .fields
        .iter()
        .map(|(k, v)| format!("{}={}", escape_tag(k), v))
        .collect::<Vec<_>>()
        .join(",");
    if tags.is_empty() {
        format!("{} {} {}", row.measurement, fields, row.timestamp_ns)
    } else {
        format!("{},{} {} {}", row.measurement, tags, fields, row.timestamp_ns)
    }
}

fn escape_tag(value: &str) -> String {
    value.replace(' ', "\\ ").replace(',', "\\,").replace('=', "\\=")
}

fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl Sink for InfluxDbSink {
    async fn add_metric(&self, name: &str, metric_type: &str, _description: &str) {
        let measurement = measurement_name(metric_type);
        self.metric_types
            .lock()
            .await
            .insert(name.to_string(), metric_type.to_string());
        self.measurement_fields
            .lock()
            .await
            .entry(measurement)
            .or_default()
            .insert(name.to_string());
    }

    /// Append-only semantics: clearing is a no-op, matching the original
    /// driver contract for a sink that never retracts a point.
    async fn clear(&self, _host: &str, _metric_name: &str) {}

    async fn update_metric(&self, sample: Sample) {
        let measurement = self.measurement_for(&sample.metric_name).await;
        let canon = label_to_str(&sample.labels);
        let key = PendingKey {
            measurement: measurement.clone(),
            host: sample.host.clone(),
            canon_labels: canon,
        };
        let mut pending = self.pending.lock().await;
        let row = pending.entry(key).or_default();
        row.measurement = measurement;
        row.tags = sample.labels.clone();
        row.tags.insert("host".to_string(), sample.host.clone());
        if !row.is_edited {
            row.timestamp_ns = now_ns();
        }
        row.fields.insert(sample.metric_name.clone(), sample.value);
        row.written.insert(sample.metric_name);
        row.is_edited = true;
    }

    async fn release_update_lock(&self, _host: &str, _metric_name: &str) {}
}

/// Start the background flush timer. Takes an owned `Arc` (see the note in
/// `sink::mod` on why this lives outside the `Sink` trait) so it can move
/// into the spawned task.
pub async fn start_influx_pusher(sink: Arc<InfluxDbSink>) -> Result<(), SinkError> {
    tokio::spawn(async move {
        let mut tick = interval(FLUSH_INTERVAL);
        loop {
            tick.tick().await;
            sink.flush_once().await;
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn row_with_single_declared_field_flushes_on_first_write() {
        let sink = InfluxDbSink::new("http://localhost:8086", "snmp", "", "");
        sink.add_metric("temp", "gauge", "temperature").await;
        let mut labels = BTreeMap::new();
        labels.insert("dc".to_string(), "eu".to_string());
        sink.update_metric(Sample {
            metric_name: "temp".to_string(),
            host: "h1".to_string(),
            labels,
            value: 42.0,
        })
        .await;

        let declared = sink.measurement_fields.lock().await.clone();
        let pending = sink.pending.lock().await;
        assert_eq!(pending.len(), 1);
        let (key, row) = pending.iter().next().unwrap();
        assert!(row.is_edited);
        let ready = declared
            .get(&key.measurement)
            .map(|fields| fields.iter().all(|f| row.written.contains(f)))
            .unwrap_or(true);
        assert!(ready);
        assert_eq!(row.fields.get("temp"), Some(&42.0));
    }

    #[tokio::test]
    async fn row_is_not_ready_until_every_declared_field_is_written() {
        let sink = InfluxDbSink::new("http://localhost:8086", "snmp", "", "");
        sink.add_metric("in_octets", "iface", "inbound octets").await;
        sink.add_metric("out_octets", "iface", "outbound octets").await;

        let mut labels = BTreeMap::new();
        labels.insert("iface".to_string(), "eth0".to_string());
        sink.update_metric(Sample {
            metric_name: "in_octets".to_string(),
            host: "h1".to_string(),
            labels: labels.clone(),
            value: 10.0,
        })
        .await;

        {
            let declared = sink.measurement_fields.lock().await.clone();
            let pending = sink.pending.lock().await;
            let (key, row) = pending.iter().next().unwrap();
            let ready = declared
                .get(&key.measurement)
                .map(|fields| fields.iter().all(|f| row.written.contains(f)))
                .unwrap_or(true);
            assert!(!ready, "row must not be ready until out_octets is written too");
        }

        sink.update_metric(Sample {
            metric_name: "out_octets".to_string(),
            host: "h1".to_string(),
            labels,
            value: 20.0,
        })
        .await;

        let declared = sink.measurement_fields.lock().await.clone();
        let pending = sink.pending.lock().await;
        let (key, row) = pending.iter().next().unwrap();
        let ready = declared
            .get(&key.measurement)
            .map(|fields| fields.iter().all(|f| row.written.contains(f)))
            .unwrap_or(true);
        assert!(ready);
        assert_eq!(row.fields.get("in_octets"), Some(&10.0));
        assert_eq!(row.fields.get("out_octets"), Some(&20.0));
    }

    #[tokio::test]
    async fn timestamp_is_fixed_at_first_write_of_a_cycle() {
        let sink = InfluxDbSink::new("http://localhost:8086", "snmp", "", "");
        sink.add_metric("in_octets", "iface", "inbound octets").await;
        sink.add_metric("out_octets", "iface", "outbound octets").await;

        let mut labels = BTreeMap::new();
        labels.insert("iface".to_string(), "eth0".to_string());
        sink.update_metric(Sample {
            metric_name: "in_octets".to_string(),
            host: "h1".to_string(),
            labels: labels.clone(),
            value: 10.0,
        })
        .await;
        let first_ts = {
            let pending = sink.pending.lock().await;
            pending.values().next().unwrap().timestamp_ns
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        sink.update_metric(Sample {
            metric_name: "out_octets".to_string(),
            host: "h1".to_string(),
            labels,
            value: 20.0,
        })
        .await;
        let second_ts = {
            let pending = sink.pending.lock().await;
            pending.values().next().unwrap().timestamp_ns
        };

        assert_eq!(first_ts, second_ts);
    }

    #[tokio::test]
    async fn flush_once_emits_only_ready_rows_and_resets_written_set() {
        let sink = InfluxDbSink::new("http://localhost:8086", "snmp", "", "");
        sink.add_metric("temp", "gauge", "temperature").await;
        let mut labels = BTreeMap::new();
        labels.insert("dc".to_string(), "eu".to_string());
        sink.update_metric(Sample {
            metric_name: "temp".to_string(),
            host: "h1".to_string(),
            labels,
            value: 42.0,
        })
        .await;

        // Exercise the readiness/reset logic directly; the actual HTTP push
        // in flush_once would fail against a real endpoint in this test, so
        // drive the declared-field check the same way flush_once does.
        let declared = sink.measurement_fields.lock().await.clone();
        let mut pending = sink.pending.lock().await;
        for (key, row) in pending.iter_mut() {
            let ready = declared
                .get(&key.measurement)
                .map(|fields| fields.iter().all(|f| row.written.contains(f)))
                .unwrap_or(true);
            assert!(ready);
            assert!(row.is_edited);
            row.written.clear();
            row.is_edited = false;
        }
        drop(pending);

        let pending = sink.pending.lock().await;
        let row = pending.values().next().unwrap();
        assert!(!row.is_edited);
        assert!(row.written.is_empty());
        // Field values persist across the reset; only the written-flags
        // clear, matching the original driver's flush() contract.
        assert_eq!(row.fields.get("temp"), Some(&42.0));
    }

    #[test]
    fn render_line_includes_tags_fields_and_timestamp() {
        let mut row = PendingRow::default();
        row.measurement = "gauge".to_string();
        row.tags.insert("host".to_string(), "h1".to_string());
        row.fields.insert("temp".to_string(), 42.0);
        row.timestamp_ns = 123;
        let line = render_line(&row);
        assert!(line.starts_with("gauge,"));
        assert!(line.contains("host=h1"));
        assert!(line.contains("temp=42"));
        assert!(line.ends_with(" 123"));
    }
}
