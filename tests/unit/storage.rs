//! Unit tests for the template/label caches through the public API.

use std::collections::BTreeSet;

use snmp_exporter::config::LabelGroupRef;
use snmp_exporter::storage::{LabelStorage, TemplateStorage};

#[tokio::test]
async fn template_storage_expands_one_row_per_walk_value() {
    let storage = TemplateStorage::new();
    storage.set_label("r1", "vrf_mod", "vrf", "red", Some("1")).await;
    storage.set_label("r1", "vrf_mod", "vrf", "blue", Some("2")).await;

    let mut rows = storage
        .resolve_community("r1", "vrf_mod", "vrf", Some("{community}@{template}"), "pub")
        .await;
    rows.sort();
    assert_eq!(rows.len(), 2);
    assert!(rows.contains(&("pub@red".to_string(), Some("vrf".to_string()), Some("red".to_string()))));
}

#[tokio::test]
async fn label_storage_walk_invalidation_then_join() {
    let storage = LabelStorage::new();

    storage.set_label("r1", "m1", "names", "ifindex", "1", None, None, Some("a")).await;
    storage.set_label("r1", "m1", "names", "name", "eth0", None, None, Some("a")).await;
    storage.set_label("r1", "m1", "counters", "ifindex", "1", None, None, Some("b")).await;
    storage.set_label("r1", "m1", "counters", "octets", "500", None, None, Some("b")).await;

    let fresh: BTreeSet<String> = ["a"].into_iter().map(String::from).collect();
    storage.invalidate_cache("r1", "m1", "names", None, None, &fresh).await;

    storage.set_join("r1", "m1", "ifaces", "names", "ifindex", "counters", "ifindex").await;

    let resolved = storage
        .resolve_label(
            "r1",
            "m1",
            &[LabelGroupRef::Join {
                module: None,
                group: "ifaces".to_string(),
                subgroup: "names".to_string(),
            }],
            None,
            None,
            Some("a"),
        )
        .await;
    assert_eq!(resolved.get("name"), Some(&"eth0".to_string()));
    assert_eq!(resolved.get("octets"), Some(&"500".to_string()));
}
