//! Unit tests for config loading through the public API.

use pretty_assertions::assert_eq;
use snmp_exporter::config::parse_config;
use std::io::Write;

fn write_temp(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
}

const FULL: &str = r#"
hosts:
  - hostname: switch1.example.com
    community: public
    version: "2c"
    static_labels:
      dc: eu-west
      role: access
    modules: [ifaces]
modules:
  ifaces:
    every: 60s
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

#[test]
fn loads_hosts_modules_and_descriptions() {
    let f = write_temp(FULL);
    let config = parse_config(f.path()).unwrap();

    assert_eq!(config.hosts.len(), 1);
    let host = &config.hosts[0];
    assert_eq!(host.hostname, "switch1.example.com");
    assert_eq!(host.community, "public");
    assert_eq!(host.static_labels.get("dc").unwrap(), "eu-west");
    assert_eq!(host.modules, vec!["ifaces".to_string()]);

    let module = &config.modules["ifaces"];
    assert_eq!(module.labels["names"].len(), 1);
    assert_eq!(module.metrics.len(), 1);
    assert_eq!(module.metrics[0].common.name, "ifInOctets");

    let desc = &config.descriptions["ifInOctets"];
    assert_eq!(desc.metric_type, "counter");
}

#[test]
fn rejects_missing_hostname() {
    let yaml = r#"
hosts:
  - community: public
modules: {}
description: {}
"#;
    let f = write_temp(yaml);
    assert!(parse_config(f.path()).is_err());
}

#[test]
fn rejects_nonexistent_file() {
    let result = parse_config(std::path::Path::new("/nonexistent/snmp.yaml"));
    assert!(result.is_err());
}

#[test]
fn defaults_community_to_public_and_version_to_v1() {
    let yaml = r#"
hosts:
  - hostname: h1
modules: {}
description: {}
"#;
    let f = write_temp(yaml);
    let config = parse_config(f.path()).unwrap();
    assert_eq!(config.hosts[0].community, "public");
}
