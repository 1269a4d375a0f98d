//! Config parsing feeding the label pipeline feeding the Prometheus sink,
//! simulating one orchestrator tick without real SNMP transport: the
//! storage writes below stand in for what `SnmpQuerier::query` would
//! otherwise populate from an agent.

use std::io::Write;
use std::sync::Arc;

use snmp_exporter::config::{parse_config, LabelGroupRef};
use snmp_exporter::sink::prometheus::PrometheusSink;
use snmp_exporter::sink::{Sample, Sink};
use snmp_exporter::storage::{LabelStorage, TemplateStorage};

const CONFIG: &str = r#"
hosts:
  - hostname: switch1
    community: public
    static_labels:
      dc: eu
    modules: [ifaces]
modules:
  ifaces:
    every: 30s
    labels:
      names:
        query_type: walk
        store_method: value
        mappings:
          ifdescr: "1.3.6.1.2.1.2.2.1.2"
    metrics:
      - query_type: walk
        store_method: value
        label_group: ["names"]
        mappings:
          ifInOctets: "1.3.6.1.2.1.2.2.1.10"
description:
  ifInOctets:
    type: counter
    description: inbound octets
"#;

#[tokio::test]
async fn config_to_labels_to_exposition_round_trip() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(CONFIG.as_bytes()).unwrap();
    let config = parse_config(f.path()).unwrap();

    let template_storage = Arc::new(TemplateStorage::new());
    let label_storage = Arc::new(LabelStorage::new());
    let sink = PrometheusSink::new(":9100", "/metrics", template_storage.clone(), label_storage.clone());

    let host = &config.hosts[0];
    let module = &config.modules["ifaces"];
    for (name, desc) in &config.descriptions {
        sink.add_metric(name, &desc.metric_type, &desc.description).await;
    }

    // simulated walk response for the "names" label group
    label_storage
        .set_label(&host.hostname, "ifaces", "names", "ifdescr", "Gi1/0/1", None, None, Some("1"))
        .await;

    // simulated walk response for the metric itself
    let metric = &module.metrics[0];
    sink.clear(&host.hostname, &metric.common.name).await;
    let resolved = label_storage
        .resolve_label(&host.hostname, "ifaces", &metric.label_group, None, None, Some("1"))
        .await;
    assert!(matches!(&metric.label_group[0], LabelGroupRef::Group { group, .. } if group == "names"));

    let mut labels = host.static_labels.clone();
    labels.extend(resolved);
    sink.update_metric(Sample {
        metric_name: metric.common.name.clone(),
        host: host.hostname.clone(),
        labels,
        value: 9000.0,
    })
    .await;
    sink.release_update_lock(&host.hostname, &metric.common.name).await;

    let text = sink.metric_print().await;
    assert!(text.contains("# TYPE ifInOctets counter"));
    assert!(text.contains("dc=\"eu\""));
    assert!(text.contains("ifdescr=\"Gi1/0/1\""));
    assert!(text.contains("9000"));
}

#[tokio::test]
async fn unsatisfied_walk_index_drops_the_row() {
    let template_storage = Arc::new(TemplateStorage::new());
    let label_storage = Arc::new(LabelStorage::new());
    let sink = PrometheusSink::new(":9100", "/metrics", template_storage, label_storage.clone());
    sink.add_metric("ifInOctets", "counter", "inbound octets").await;

    label_storage
        .set_label("switch1", "ifaces", "names", "ifdescr", "Gi1/0/1", None, None, Some("1"))
        .await;

    let refs = vec![LabelGroupRef::Group {
        module: None,
        group: "names".to_string(),
    }];
    // index "2" was never populated, so the group lookup can't be satisfied
    let resolved = label_storage
        .resolve_label("switch1", "ifaces", &refs, None, None, Some("2"))
        .await;
    assert!(resolved.is_empty());
}
