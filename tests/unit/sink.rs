//! Unit tests for Prometheus exposition rendering through the public API.

use std::collections::BTreeMap;
use std::sync::Arc;

use snmp_exporter::sink::{prometheus::PrometheusSink, Sample, Sink};
use snmp_exporter::storage::{LabelStorage, TemplateStorage};

#[tokio::test]
async fn exposition_output_is_sorted_and_escaped() {
    let sink = PrometheusSink::new(
        ":9100",
        "/metrics",
        Arc::new(TemplateStorage::new()),
        Arc::new(LabelStorage::new()),
    );
    sink.add_metric("ifInOctets", "counter", "inbound octets").await;
    sink.clear("r1", "ifInOctets").await;

    let mut labels = BTreeMap::new();
    labels.insert("iface".to_string(), "Gi1/0/1".to_string());
    sink.update_metric(Sample {
        metric_name: "ifInOctets".to_string(),
        host: "r1".to_string(),
        labels,
        value: 1234.0,
    })
    .await;
    sink.release_update_lock("r1", "ifInOctets").await;

    let text = sink.metric_print().await;
    assert!(text.contains("# TYPE ifInOctets counter"));
    assert!(text.contains("ifInOctets{iface=\"Gi1/0/1\"} 1234"));
}
