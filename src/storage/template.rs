//! Template cache: per (host, module, template_group) values used to expand
//! a host's base community string into one effective community per
//! template instance.

use std::collections::BTreeMap;

use tokio::sync::Mutex;

#[derive(Debug, Clone)]
enum TemplateEntry {
    Scalar(String),
    Walk(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TemplateKey {
    host: String,
    module: String,
    group: String,
}

/// One row resulting from community expansion: the rendered community, and
/// (if a template applied) its name and the value that produced this row.
pub type ExpandedCommunity = (String, Option<String>, Option<String>);

#[derive(Default)]
pub struct TemplateStorage {
    entries: Mutex<BTreeMap<TemplateKey, TemplateEntry>>,
}

impl TemplateStorage {
    pub fn new() -> Self {
        TemplateStorage::default()
    }

    /// Write a template value. `walk_idx` is `None` for a `get`-typed
    /// template; repeated writes for the same index overwrite, never
    /// delete — matching the "never shrunk except by explicit invalidation"
    /// lifecycle (invalidation doesn't apply to templates, only labels).
    pub async fn set_label(
        &self,
        host: &str,
        module: &str,
        group: &str,
        value: &str,
        walk_idx: Option<&str>,
    ) {
        let key = TemplateKey {
            host: host.to_string(),
            module: module.to_string(),
            group: group.to_string(),
        };
        let mut entries = self.entries.lock().await;
        match walk_idx {
            None => {
                entries.insert(key, TemplateEntry::Scalar(value.to_string()));
            }
            Some(idx) => {
                let entry = entries
                    .entry(key)
                    .or_insert_with(|| TemplateEntry::Walk(BTreeMap::new()));
                match entry {
                    TemplateEntry::Walk(map) => {
                        map.insert(idx.to_string(), value.to_string());
                    }
                    TemplateEntry::Scalar(_) => {
                        *entry = TemplateEntry::Walk(BTreeMap::from([(idx.to_string(), value.to_string())]));
                    }
                }
            }
        }
    }

    /// Expand `base_community` into one row per cached template value. With
    /// no matching entry, returns the single unparameterised row.
    pub async fn resolve_community(
        &self,
        host: &str,
        module: &str,
        template_name: &str,
        community_template: Option<&str>,
        base_community: &str,
    ) -> Vec<ExpandedCommunity> {
        if template_name.is_empty() {
            return vec![(base_community.to_string(), None, None)];
        }
        let key = TemplateKey {
            host: host.to_string(),
            module: module.to_string(),
            group: template_name.to_string(),
        };
        let entries = self.entries.lock().await;
        let Some(entry) = entries.get(&key) else {
            return vec![(base_community.to_string(), None, None)];
        };
        let values: Vec<String> = match entry {
            TemplateEntry::Scalar(v) => vec![v.clone()],
            TemplateEntry::Walk(map) => map.values().cloned().collect(),
        };
        values
            .into_iter()
            .map(|value| {
                let rendered = match community_template {
                    Some(tmpl) => tmpl
                        .replace("{community}", base_community)
                        .replace("{template}", &value),
                    None => base_community.to_string(),
                };
                (rendered, Some(template_name.to_string()), Some(value))
            })
            .collect()
    }

    /// Deterministic text rendering for the `/dump` endpoint.
    pub async fn dump(&self) -> String {
        let entries = self.entries.lock().await;
        let mut out = String::new();
        for (key, entry) in entries.iter() {
            match entry {
                TemplateEntry::Scalar(v) => {
                    out.push_str(&format!("{}/{}/{} = {}\n", key.host, key.module, key.group, v));
                }
                TemplateEntry::Walk(map) => {
                    for (idx, v) in map {
                        out.push_str(&format!(
                            "{}/{}/{}[{}] = {}\n",
                            key.host, key.module, key.group, idx, v
                        ));
                    }
                }
            }
        }
        out
    }
}
