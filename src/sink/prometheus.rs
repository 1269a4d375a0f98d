//! Prometheus sink: `/metrics` and `/dump` over `actix-web`'s
//! `HttpServer::new`/`App::new()` builder, generalised from a session-backed
//! app to a stateless exposition server.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use actix_web::{web, App, HttpResponse, HttpServer};
use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;
use tracing_actix_web::TracingLogger;

use super::{Sample, Sink, SinkError};
use crate::storage::{LabelStorage, TemplateStorage};

#[derive(Debug, Clone)]
struct MetricRow {
    value: f64,
    timestamp_ms: i64,
}

#[derive(Debug, Clone)]
struct MetricMeta {
    metric_type: String,
    description: String,
}

type RowKey = (String, String); // (metric_name, host)

pub struct PrometheusSink {
    listen: String,
    path: String,
    metadata: Mutex<BTreeMap<String, MetricMeta>>,
    rows: Mutex<HashMap<RowKey, BTreeMap<String, MetricRow>>>,
    update_locks: Mutex<HashMap<RowKey, Arc<Mutex<()>>>>,
    held_guards: Mutex<HashMap<RowKey, OwnedMutexGuard<()>>>,
    template_storage: Arc<TemplateStorage>,
    label_storage: Arc<LabelStorage>,
}

impl PrometheusSink {
    pub fn new(
        listen: &str,
        path: &str,
        template_storage: Arc<TemplateStorage>,
        label_storage: Arc<LabelStorage>,
    ) -> Arc<Self> {
        Arc::new(PrometheusSink {
            listen: listen.to_string(),
            path: path.to_string(),
            metadata: Mutex::new(BTreeMap::new()),
            rows: Mutex::new(HashMap::new()),
            update_locks: Mutex::new(HashMap::new()),
            held_guards: Mutex::new(HashMap::new()),
            template_storage,
            label_storage,
        })
    }

    async fn lock_for(&self, key: &RowKey) -> Arc<Mutex<()>> {
        let mut locks = self.update_locks.lock().await;
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Render the full exposition body, taking each host's update lock in
    /// turn so printing never interleaves with a `clear`/`update` window.
    pub async fn metric_print(&self) -> String {
        let metadata = self.metadata.lock().await;
        let mut out = String::new();
        for (name, meta) in metadata.iter() {
            out.push_str(&format!("# HELP {} {}\n", name, meta.description));
            out.push_str(&format!("# TYPE {} {}\n", name, meta.metric_type));

            let keys: Vec<RowKey> = {
                let rows = self.rows.lock().await;
                rows.keys().filter(|(m, _)| m == name).cloned().collect()
            };
            let mut hosts: Vec<String> = keys.into_iter().map(|(_, h)| h).collect();
            hosts.sort();
            hosts.dedup();

            for host in hosts {
                let key = (name.clone(), host.clone());
                let lock = self.lock_for(&key).await;
                let _guard = lock.lock().await;
                let rows = self.rows.lock().await;
                if let Some(table) = rows.get(&key) {
                    for (labels, row) in table.iter() {
                        if labels.is_empty() {
                            out.push_str(&format!("{} {} {}\n", name, row.value, row.timestamp_ms));
                        } else {
                            out.push_str(&format!(
                                "{}{{{}}} {} {}\n",
                                name, labels, row.value, row.timestamp_ms
                            ));
                        }
                    }
                }
            }
        }
        out
    }

    pub async fn dump_text(&self) -> String {
        let mut out = String::new();
        out.push_str("# templates\n");
        out.push_str(&self.template_storage.dump().await);
        out.push_str("# labels\n");
        out.push_str(&self.label_storage.dump().await);
        out
    }
}

/// Labels in ascending key order, `"` escaped — the row-identity form used
/// both for exposition output and as the per-row cache key.
pub fn label_to_str(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v.replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",")
}

/// `host:port` → bind string; empty host is wildcard `::`, an IPv4 literal
/// is upgraded to `::ffff:A.B.C.D` so one dual-stack socket serves both
/// families.
pub fn resolve_bind_address(listen: &str) -> String {
    let (host, port) = listen.rsplit_once(':').unwrap_or((listen, "9100"));
    if host.is_empty() {
        return format!("[::]:{}", port);
    }
    if let Ok(v4) = host.parse::<Ipv4Addr>() {
        return format!("[::ffff:{}]:{}", v4, port);
    }
    format!("{}:{}", host, port)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl Sink for PrometheusSink {
    async fn add_metric(&self, name: &str, metric_type: &str, description: &str) {
        self.metadata.lock().await.insert(
            name.to_string(),
            MetricMeta {
                metric_type: metric_type.to_string(),
                description: description.to_string(),
            },
        );
    }

    async fn clear(&self, host: &str, metric_name: &str) {
        let key = (metric_name.to_string(), host.to_string());
        let lock = self.lock_for(&key).await;
        let guard = lock.lock_owned().await;
        self.held_guards.lock().await.insert(key.clone(), guard);
        self.rows.lock().await.insert(key, BTreeMap::new());
    }

    async fn update_metric(&self, sample: Sample) {
        let key = (sample.metric_name.clone(), sample.host.clone());
        let canon = label_to_str(&sample.labels);
        let row = MetricRow {
            value: sample.value,
            timestamp_ms: now_ms(),
        };
        self.rows.lock().await.entry(key).or_default().insert(canon, row);
    }

    async fn release_update_lock(&self, host: &str, metric_name: &str) {
        let key = (metric_name.to_string(), host.to_string());
        self.held_guards.lock().await.remove(&key);
    }
}

/// Runs the actix-web server for `sink`. Split out from the `Sink` trait
/// method because `HttpServer::new`'s factory closure needs an owned
/// `Arc<PrometheusSink>` per worker, not a borrowed `&self`.
pub async fn start_http_server(sink: Arc<PrometheusSink>) -> Result<(), SinkError> {
    let bind_addr = resolve_bind_address(&sink.listen);
    let path = sink.path.clone();
    info!("prometheus sink listening on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(sink.clone()))
            .route(&path, web::get().to(metrics_handler))
            .route("/dump", web::get().to(dump_handler))
    })
    .bind(&bind_addr)
    .map_err(|e| SinkError::Http(e.to_string()))?
    .run()
    .await
    .map_err(|e| SinkError::Http(e.to_string()))
}

async fn metrics_handler(sink: web::Data<Arc<PrometheusSink>>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(sink.metric_print().await)
}

async fn dump_handler(sink: web::Data<Arc<PrometheusSink>>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain")
        .body(sink.dump_text().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_to_str_sorts_and_escapes() {
        let mut labels = BTreeMap::new();
        labels.insert("dc".to_string(), "eu".to_string());
        labels.insert("name".to_string(), "say \"hi\"".to_string());
        assert_eq!(
            label_to_str(&labels),
            "dc=\"eu\",name=\"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn bind_address_empty_host_is_wildcard() {
        assert_eq!(resolve_bind_address(":9100"), "[::]:9100");
    }

    #[test]
    fn bind_address_ipv4_is_mapped() {
        assert_eq!(resolve_bind_address("10.0.0.5:9100"), "[::ffff:10.0.0.5]:9100");
    }

    #[test]
    fn bind_address_hostname_passthrough() {
        assert_eq!(resolve_bind_address("example.com:9100"), "example.com:9100");
    }

    #[tokio::test]
    async fn clear_then_update_then_print_round_trip() {
        let sink = PrometheusSink::new(
            ":9100",
            "/metrics",
            Arc::new(TemplateStorage::new()),
            Arc::new(LabelStorage::new()),
        );
        sink.add_metric("temp", "gauge", "temperature").await;
        sink.clear("h1", "temp").await;
        let mut labels = BTreeMap::new();
        labels.insert("dc".to_string(), "eu".to_string());
        sink.update_metric(Sample {
            metric_name: "temp".to_string(),
            host: "h1".to_string(),
            labels,
            value: 42.0,
        })
        .await;
        sink.release_update_lock("h1", "temp").await;

        let text = sink.metric_print().await;
        assert!(text.contains("# TYPE temp gauge"));
        assert!(text.contains("temp{dc=\"eu\"} 42"));
    }
}
