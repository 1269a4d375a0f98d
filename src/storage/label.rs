//! Label cache: multi-key cache of label values keyed by
//! (host, module, group, name, template_selector[, walk_idx]), with join
//! resolution across two declared subgroups and cache invalidation when a
//! walk's index universe shrinks.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tokio::sync::Mutex;

use crate::config::LabelGroupRef;

#[derive(Debug, Clone)]
enum LabelEntry {
    Scalar(String),
    Walk(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    host: String,
    module: String,
    group: String,
    template_str: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct JoinKey {
    host: String,
    module: String,
    group: String,
}

#[derive(Debug, Clone)]
struct JoinSpec {
    left_group: String,
    left_key: String,
    right_group: String,
    right_key: String,
}

/// Canonical template selector: `"<name>=<value>"`, or `"=None"` with no
/// active template. Kept as a string only for this purpose and for `/dump`.
pub fn template_str(template_name: Option<&str>, template_value: Option<&str>) -> String {
    match template_name {
        Some(name) => format!("{}={}", name, template_value.unwrap_or("")),
        None => "=None".to_string(),
    }
}

#[derive(Default)]
pub struct LabelStorage {
    entries: Mutex<HashMap<GroupKey, HashMap<String, LabelEntry>>>,
    joins: Mutex<HashMap<JoinKey, JoinSpec>>,
}

impl LabelStorage {
    pub fn new() -> Self {
        LabelStorage::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn set_label(
        &self,
        host: &str,
        module: &str,
        group: &str,
        name: &str,
        value: &str,
        template_name: Option<&str>,
        template_value: Option<&str>,
        walk_idx: Option<&str>,
    ) {
        let key = GroupKey {
            host: host.to_string(),
            module: module.to_string(),
            group: group.to_string(),
            template_str: template_str(template_name, template_value),
        };
        let mut entries = self.entries.lock().await;
        let names = entries.entry(key).or_default();
        match walk_idx {
            None => {
                names.insert(name.to_string(), LabelEntry::Scalar(value.to_string()));
            }
            Some(idx) => {
                let entry = names
                    .entry(name.to_string())
                    .or_insert_with(|| LabelEntry::Walk(BTreeMap::new()));
                match entry {
                    LabelEntry::Walk(map) => {
                        map.insert(idx.to_string(), value.to_string());
                    }
                    LabelEntry::Scalar(_) => {
                        *entry = LabelEntry::Walk(BTreeMap::from([(idx.to_string(), value.to_string())]));
                    }
                }
            }
        }
    }

    /// Drop any cached walk index for this (group, template_str) not present
    /// in `fresh_indexes`. The only path that shrinks the cache; must run
    /// before writing a walk's fresh values.
    pub async fn invalidate_cache(
        &self,
        host: &str,
        module: &str,
        group: &str,
        template_name: Option<&str>,
        template_value: Option<&str>,
        fresh_indexes: &BTreeSet<String>,
    ) {
        let key = GroupKey {
            host: host.to_string(),
            module: module.to_string(),
            group: group.to_string(),
            template_str: template_str(template_name, template_value),
        };
        let mut entries = self.entries.lock().await;
        if let Some(names) = entries.get_mut(&key) {
            for entry in names.values_mut() {
                if let LabelEntry::Walk(map) = entry {
                    map.retain(|idx, _| fresh_indexes.contains(idx));
                }
            }
        }
    }

    /// Declare `group` as a join over two subgroups and their join key
    /// label names.
    pub async fn set_join(
        &self,
        host: &str,
        module: &str,
        group: &str,
        left_group: &str,
        left_key: &str,
        right_group: &str,
        right_key: &str,
    ) {
        let key = JoinKey {
            host: host.to_string(),
            module: module.to_string(),
            group: group.to_string(),
        };
        self.joins.lock().await.insert(
            key,
            JoinSpec {
                left_group: left_group.to_string(),
                left_key: left_key.to_string(),
                right_group: right_group.to_string(),
                right_key: right_key.to_string(),
            },
        );
    }

    /// Resolve a metric's `label_group` reference list into its final label
    /// map. Any reference that can't be fully satisfied poisons the whole
    /// resolution (empty map is the "drop this sample" sentinel).
    pub async fn resolve_label(
        &self,
        host: &str,
        current_module: &str,
        refs: &[LabelGroupRef],
        template_name: Option<&str>,
        template_value: Option<&str>,
        walk_idx: Option<&str>,
    ) -> BTreeMap<String, String> {
        let entries = self.entries.lock().await;
        let joins = self.joins.lock().await;
        let tstr = template_str(template_name, template_value);

        let mut out = BTreeMap::new();
        for r in refs {
            let partial = match r {
                LabelGroupRef::TemplateLabel => match template_name {
                    Some(name) => {
                        let mut m = BTreeMap::new();
                        m.insert(name.to_string(), template_value.unwrap_or("").to_string());
                        Some(m)
                    }
                    None => Some(BTreeMap::new()),
                },
                LabelGroupRef::Group { module, group } => {
                    let module = module.as_deref().unwrap_or(current_module);
                    group_labels_at(&entries, host, module, group, &tstr, walk_idx)
                }
                LabelGroupRef::Join {
                    module,
                    group,
                    subgroup,
                } => {
                    let module = module.as_deref().unwrap_or(current_module);
                    resolve_join(&entries, &joins, host, module, group, subgroup, &tstr, walk_idx)
                }
            };
            match partial {
                None => return BTreeMap::new(),
                Some(m) => out.extend(m),
            }
        }
        out
    }

    pub async fn dump(&self) -> String {
        let entries = self.entries.lock().await;
        let mut out = String::new();
        for (key, names) in entries.iter() {
            for (name, entry) in names {
                match entry {
                    LabelEntry::Scalar(v) => {
                        out.push_str(&format!(
                            "{}/{}/{}/{}[{}] = {}\n",
                            key.host, key.module, key.group, name, key.template_str, v
                        ));
                    }
                    LabelEntry::Walk(map) => {
                        for (idx, v) in map {
                            out.push_str(&format!(
                                "{}/{}/{}/{}[{}][{}] = {}\n",
                                key.host, key.module, key.group, name, key.template_str, idx, v
                            ));
                        }
                    }
                }
            }
        }
        out
    }
}

/// Every (name, value) in `group` at `template_str`, indexed by `walk_idx`
/// for walk-shaped entries. `None` if a walk entry has no cell at
/// `walk_idx`; `Some(empty)` if the group simply has no entries yet.
fn group_labels_at(
    entries: &HashMap<GroupKey, HashMap<String, LabelEntry>>,
    host: &str,
    module: &str,
    group: &str,
    template_str: &str,
    walk_idx: Option<&str>,
) -> Option<BTreeMap<String, String>> {
    let key = GroupKey {
        host: host.to_string(),
        module: module.to_string(),
        group: group.to_string(),
        template_str: template_str.to_string(),
    };
    let Some(names) = entries.get(&key) else {
        return Some(BTreeMap::new());
    };
    let mut out = BTreeMap::new();
    for (name, entry) in names {
        match entry {
            LabelEntry::Scalar(v) => {
                out.insert(name.clone(), v.clone());
            }
            LabelEntry::Walk(map) => match walk_idx.and_then(|idx| map.get(idx)) {
                Some(v) => {
                    out.insert(name.clone(), v.clone());
                }
                None => return None,
            },
        }
    }
    Some(out)
}

#[allow(clippy::too_many_arguments)]
fn resolve_join(
    entries: &HashMap<GroupKey, HashMap<String, LabelEntry>>,
    joins: &HashMap<JoinKey, JoinSpec>,
    host: &str,
    module: &str,
    group: &str,
    entry_subgroup: &str,
    template_str: &str,
    walk_idx: Option<&str>,
) -> Option<BTreeMap<String, String>> {
    let join_key = JoinKey {
        host: host.to_string(),
        module: module.to_string(),
        group: group.to_string(),
    };
    let spec = joins.get(&join_key)?;
    let (entry_group, entry_join_key, other_group, other_join_key) =
        if entry_subgroup == spec.left_group {
            (&spec.left_group, &spec.left_key, &spec.right_group, &spec.right_key)
        } else if entry_subgroup == spec.right_group {
            (&spec.right_group, &spec.right_key, &spec.left_group, &spec.left_key)
        } else {
            return None;
        };

    let entry_labels = group_labels_at(entries, host, module, entry_group, template_str, walk_idx)?;
    let join_value = entry_labels.get(entry_join_key)?;

    let other_key = GroupKey {
        host: host.to_string(),
        module: module.to_string(),
        group: other_group.clone(),
        template_str: template_str.to_string(),
    };
    let other_names = entries.get(&other_key)?;
    let LabelEntry::Walk(other_join_map) = other_names.get(other_join_key)? else {
        return None;
    };
    let other_idx = other_join_map
        .iter()
        .find(|(_, v)| *v == join_value)
        .map(|(idx, _)| idx.clone())?;

    let other_labels = group_labels_at(entries, host, module, other_group, template_str, Some(&other_idx))?;

    let mut merged = entry_labels;
    merged.extend(other_labels);
    Some(merged)
}
