//! Validated host/module graph produced by loading the YAML config.
//!
//! Tagged Rust types stand in for duck-typed config dicts: closed enums for
//! `query_type`/`store_method`, a parsed `LabelGroupRef` instead of
//! re-splitting a string on every resolution, and a compiled `Regex` for
//! `filter`.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;

use super::duration::parse_duration_secs;
use super::ConfigError;

/// SNMP protocol version used for a host's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpVersion {
    V1,
    V2c,
}

impl SnmpVersion {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "1" => Ok(SnmpVersion::V1),
            "2c" | "2" => Ok(SnmpVersion::V2c),
            other => Err(ConfigError::BadEnumValue {
                field: "version",
                value: other.to_string(),
            }),
        }
    }
}

/// `get`, `walk`, or the `community_walk` synonym, erased to `Walk` on parse
/// since `community_walk` has no distinct code path of its own — it's
/// accepted purely as an alias for `walk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Get,
    Walk,
}

impl QueryType {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "get" => Ok(QueryType::Get),
            "walk" | "community_walk" => Ok(QueryType::Walk),
            other => Err(ConfigError::BadEnumValue {
                field: "query_type",
                value: other.to_string(),
            }),
        }
    }
}

/// Decoding rule mapping a raw varbind (OID suffix, value) to a label or
/// metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMethod {
    Value,
    SubtreeAsString,
    SubtreeAsIp,
    HexAsIp,
    ExtractRealm,
    Milli,
}

impl StoreMethod {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "value" => Ok(StoreMethod::Value),
            "subtree-as-string" => Ok(StoreMethod::SubtreeAsString),
            "subtree-as-ip" => Ok(StoreMethod::SubtreeAsIp),
            "hex-as-ip" => Ok(StoreMethod::HexAsIp),
            "extract_realm" => Ok(StoreMethod::ExtractRealm),
            "milli" => Ok(StoreMethod::Milli),
            other => Err(ConfigError::BadEnumValue {
                field: "store_method",
                value: other.to_string(),
            }),
        }
    }
}

/// A label_group reference of the form `[module.]group[.joinspec]`, parsed
/// once at config-load time rather than re-split on every resolution.
#[derive(Debug, Clone)]
pub enum LabelGroupRef {
    /// `__template_label` — emit the active template's name/value pair.
    TemplateLabel,
    /// `[module.]group` — plain label group lookup.
    Group { module: Option<String>, group: String },
    /// `[module.]group.subgroup` — join-resolved lookup.
    Join {
        module: Option<String>,
        group: String,
        subgroup: String,
    },
}

impl LabelGroupRef {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        if raw == "__template_label" {
            return Ok(LabelGroupRef::TemplateLabel);
        }
        let parts: Vec<&str> = raw.split('.').collect();
        match parts.as_slice() {
            [group] => Ok(LabelGroupRef::Group {
                module: None,
                group: group.to_string(),
            }),
            [module, group] => Ok(LabelGroupRef::Group {
                module: if module.is_empty() {
                    None
                } else {
                    Some(module.to_string())
                },
                group: group.to_string(),
            }),
            [module, group, subgroup] => Ok(LabelGroupRef::Join {
                module: if module.is_empty() {
                    None
                } else {
                    Some(module.to_string())
                },
                group: group.to_string(),
                subgroup: subgroup.to_string(),
            }),
            _ => Err(ConfigError::InvalidLabelGroupRef(raw.to_string())),
        }
    }
}

/// Raw filter config: the regex plus whether it has a capture group (capture
/// present -> matched text replaces the value; absent -> presence of a
/// match simply gates admission).
#[derive(Debug, Clone)]
pub struct Filter {
    pub regex: Regex,
    pub has_capture: bool,
}

impl Filter {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern)
            .map_err(|e| ConfigError::BadRegex(pattern.to_string(), e.to_string()))?;
        let has_capture = regex.captures_len() > 1;
        Ok(Filter { regex, has_capture })
    }

    /// Apply the filter to a decoded value. `None` means "drop this row".
    pub fn apply(&self, value: &str) -> Option<String> {
        let captures = self.regex.captures(value)?;
        if self.has_capture {
            captures.get(1).map(|m| m.as_str().to_string())
        } else {
            Some(value.to_string())
        }
    }
}

/// Fields shared by every OID leaf (template/label/metric).
#[derive(Debug, Clone)]
pub struct OidEntryCommon {
    pub name: String,
    pub oid: String,
    pub query_type: QueryType,
    pub every_secs: u64,
    pub store_method: StoreMethod,
    pub oid_suffix: Option<Vec<u32>>,
    pub filter: Option<Filter>,
}

#[derive(Debug, Clone)]
pub struct TemplateOid {
    pub common: OidEntryCommon,
    pub community_template: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LabelOid {
    pub common: OidEntryCommon,
    pub template_name: String,
}

#[derive(Debug, Clone)]
pub struct MetricOid {
    pub common: OidEntryCommon,
    pub template_name: String,
    pub label_group: Vec<LabelGroupRef>,
}

/// A declared `join` label group: two named subgroups merged row-wise on
/// their respective join-key label names. Config schema for this wasn't
/// fully formalised in the distilled spec (see Open Questions); a `join`
/// group is a third label-group shape alongside the OID-mapping groups,
/// selected in YAML by a `join: {...}` block instead of `mappings`.
#[derive(Debug, Clone)]
pub struct JoinDecl {
    pub left_group: String,
    pub left_key: String,
    pub right_group: String,
    pub right_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub template_labels: BTreeMap<String, TemplateOid>,
    pub labels: BTreeMap<String, BTreeMap<String, LabelOid>>,
    pub joins: BTreeMap<String, JoinDecl>,
    pub metrics: Vec<MetricOid>,
}

impl Module {
    /// community_template inherited by a label/metric through its
    /// `template_name`, looked up against this module's template_labels.
    pub fn community_template_for(&self, template_name: &str) -> Option<String> {
        self.template_labels
            .get(template_name)
            .and_then(|t| t.community_template.clone())
    }
}

#[derive(Debug, Clone)]
pub struct Host {
    pub hostname: String,
    pub community: String,
    pub version: SnmpVersion,
    pub static_labels: BTreeMap<String, String>,
    /// Module names resolved against the top-level `modules` map; unresolved
    /// names are dropped with a warning at load time (see `load_config`).
    pub modules: Vec<String>,
}

/// Raw OID leaf entry as it appears in YAML: either a bare string (the OID
/// itself) or `{oid, every?, oid_suffix?, filter?}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawOidLeaf {
    Scalar(String),
    Detailed {
        oid: String,
        every: Option<String>,
        oid_suffix: Option<String>,
        filter: Option<String>,
    },
}

pub struct ParsedGraph {
    pub hosts: Vec<Host>,
    pub modules: BTreeMap<String, Module>,
    pub descriptions: BTreeMap<String, MetricDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricDescription {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub description: String,
}

/// Parse a trailing `oid_suffix` of the form `"3.4"` into its numeric
/// components.
pub fn parse_oid_suffix(raw: &str) -> Result<Vec<u32>, ConfigError> {
    raw.split('.')
        .map(|c| {
            c.parse::<u32>()
                .map_err(|_| ConfigError::InvalidOidSuffix(raw.to_string()))
        })
        .collect()
}

pub(super) fn build_common(
    name: &str,
    leaf: &RawOidLeaf,
    default_every: &str,
    query_type_raw: &str,
) -> Result<OidEntryCommon, ConfigError> {
    let query_type = QueryType::parse(query_type_raw)?;
    let (oid, every_raw, oid_suffix_raw, filter_raw) = match leaf {
        RawOidLeaf::Scalar(oid) => (oid.clone(), default_every.to_string(), None, None),
        RawOidLeaf::Detailed {
            oid,
            every,
            oid_suffix,
            filter,
        } => (
            oid.clone(),
            every.clone().unwrap_or_else(|| default_every.to_string()),
            oid_suffix.clone(),
            filter.clone(),
        ),
    };
    let every_secs = parse_duration_secs(&every_raw).map_err(ConfigError::BadDuration)?;
    let oid_suffix = oid_suffix_raw.as_deref().map(parse_oid_suffix).transpose()?;
    let filter = filter_raw.as_deref().map(Filter::new).transpose()?;
    Ok(OidEntryCommon {
        name: name.to_string(),
        oid,
        query_type,
        every_secs,
        store_method: StoreMethod::Value,
        oid_suffix,
        filter,
    })
}

pub(super) fn parse_snmp_version(raw: &str) -> Result<SnmpVersion, ConfigError> {
    SnmpVersion::parse(raw)
}

pub(super) fn parse_store_method(raw: &str) -> Result<StoreMethod, ConfigError> {
    StoreMethod::parse(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_group_ref_template_label() {
        assert!(matches!(
            LabelGroupRef::parse("__template_label").unwrap(),
            LabelGroupRef::TemplateLabel
        ));
    }

    #[test]
    fn label_group_ref_one_component() {
        match LabelGroupRef::parse("names").unwrap() {
            LabelGroupRef::Group { module, group } => {
                assert_eq!(module, None);
                assert_eq!(group, "names");
            }
            _ => panic!("expected Group"),
        }
    }

    #[test]
    fn label_group_ref_two_component() {
        match LabelGroupRef::parse("ifaces.names").unwrap() {
            LabelGroupRef::Group { module, group } => {
                assert_eq!(module, Some("ifaces".to_string()));
                assert_eq!(group, "names");
            }
            _ => panic!("expected Group"),
        }
    }

    #[test]
    fn label_group_ref_three_component_is_join() {
        match LabelGroupRef::parse("ifaces.names.counters").unwrap() {
            LabelGroupRef::Join {
                module,
                group,
                subgroup,
            } => {
                assert_eq!(module, Some("ifaces".to_string()));
                assert_eq!(group, "names");
                assert_eq!(subgroup, "counters");
            }
            _ => panic!("expected Join"),
        }
    }

    #[test]
    fn label_group_ref_rejects_other_arities() {
        assert!(LabelGroupRef::parse("a.b.c.d").is_err());
    }

    #[test]
    fn filter_with_capture_replaces_value() {
        let filter = Filter::new(r"^Gi(\d+/\d+)$").unwrap();
        assert_eq!(filter.apply("Gi1/0/24").as_deref(), Some("1/0/24"));
        assert_eq!(filter.apply("Te0/1"), None);
    }

    #[test]
    fn filter_without_capture_gates_admission() {
        let filter = Filter::new(r"^up$").unwrap();
        assert_eq!(filter.apply("up").as_deref(), Some("up"));
        assert_eq!(filter.apply("down"), None);
    }
}
