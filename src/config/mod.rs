//! Configuration system - YAML-based config loading.
//!
//! Loads the declarative `snmp.yaml` document (hosts, modules, description,
//! driver) into the validated graph in [`model`], with tagged Rust types
//! standing in for the duck-typed dicts a dynamic-language config walker
//! would use.

pub mod duration;
pub mod model;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use model::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config file {0}: {1}")]
    Io(String, String),
    #[error("bad YAML format: {0}")]
    Yaml(String),
    #[error("hostname is required")]
    MissingHostname,
    #[error("{field} has invalid value {value:?}")]
    BadEnumValue {
        field: &'static str,
        value: String,
    },
    #[error("bad duration: {0}")]
    BadDuration(#[from] duration::DurationParseError),
    #[error("invalid oid_suffix {0:?}")]
    InvalidOidSuffix(String),
    #[error("invalid filter regex {0:?}: {1}")]
    BadRegex(String, String),
    #[error("invalid label_group reference {0:?}")]
    InvalidLabelGroupRef(String),
}

/// Top-level raw YAML document shape.
#[derive(Debug, Deserialize)]
struct RawConfig {
    hosts: Vec<RawHost>,
    modules: BTreeMap<String, RawModule>,
    description: BTreeMap<String, MetricDescription>,
    driver: Option<RawDriver>,
}

#[derive(Debug, Deserialize)]
struct RawHost {
    hostname: String,
    #[serde(default)]
    community: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    static_labels: BTreeMap<String, String>,
    #[serde(default)]
    modules: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawModule {
    #[serde(default = "default_every")]
    every: String,
    #[serde(default)]
    template_labels: BTreeMap<String, RawTemplateLabel>,
    #[serde(default)]
    labels: BTreeMap<String, RawLabelGroupEntry>,
    #[serde(default)]
    metrics: Vec<RawMetricGroup>,
}

fn default_every() -> String {
    "60s".to_string()
}

#[derive(Debug, Deserialize)]
struct RawTemplateLabel {
    query_type: String,
    store_method: String,
    every: Option<String>,
    oid_suffix: Option<String>,
    filter: Option<String>,
    community_template: Option<String>,
    #[serde(flatten)]
    leaf: RawOidLeaf,
}

/// A label group entry is either an OID-mapping group or a `join`
/// declaration over two other groups in the same module.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLabelGroupEntry {
    Join { join: RawJoinSpec },
    Oids(RawLabelGroup),
}

#[derive(Debug, Deserialize)]
struct RawJoinSpec {
    left_group: String,
    left_key: String,
    right_group: String,
    right_key: String,
}

#[derive(Debug, Deserialize)]
struct RawLabelGroup {
    query_type: String,
    store_method: String,
    every: Option<String>,
    #[serde(default)]
    template_label: String,
    mappings: BTreeMap<String, RawOidLeaf>,
}

#[derive(Debug, Deserialize)]
struct RawMetricGroup {
    query_type: String,
    store_method: String,
    every: Option<String>,
    #[serde(default)]
    template_label: String,
    #[serde(default)]
    label_group: Vec<String>,
    mappings: BTreeMap<String, RawOidLeaf>,
}

#[derive(Debug, Deserialize)]
struct RawDriver {
    name: String,
    #[serde(default)]
    config: serde_yaml::Value,
}

/// Sink driver selection plus its connection settings, from the optional
/// top-level `driver` key.
#[derive(Debug, Clone)]
pub enum DriverConfig {
    Prometheus,
    InfluxDb {
        host: String,
        database: String,
        username: String,
        password: String,
    },
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig::Prometheus
    }
}

fn build_driver_config(raw: Option<RawDriver>) -> Result<DriverConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(DriverConfig::Prometheus);
    };
    match raw.name.as_str() {
        "prometheus" => Ok(DriverConfig::Prometheus),
        "influxdb" => {
            let get = |key: &str, default: &str| {
                raw.config
                    .get(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or(default)
                    .to_string()
            };
            Ok(DriverConfig::InfluxDb {
                host: get("host", "http://localhost:8086"),
                database: get("database", "snmp"),
                username: get("username", ""),
                password: get("password", ""),
            })
        }
        other => Err(ConfigError::BadEnumValue {
            field: "driver.name",
            value: other.to_string(),
        }),
    }
}

/// The fully validated config graph plus the selected sink driver.
pub struct Config {
    pub hosts: Vec<Host>,
    pub modules: BTreeMap<String, Module>,
    pub descriptions: BTreeMap<String, MetricDescription>,
    pub driver: DriverConfig,
}

/// Load and validate `filename` into a [`Config`].
pub fn parse_config(filename: &Path) -> Result<Config, ConfigError> {
    info!("start config parsing");
    let contents = std::fs::read_to_string(filename)
        .map_err(|e| ConfigError::Io(filename.display().to_string(), e.to_string()))?;
    let raw: RawConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Yaml(e.to_string()))?;
    debug!("hosts parsed");

    let modules = build_modules(raw.modules)?;
    debug!("modules parsed");
    let hosts = build_hosts(raw.hosts, &modules)?;

    let driver = build_driver_config(raw.driver)?;

    Ok(Config {
        hosts,
        modules,
        descriptions: raw.description,
        driver,
    })
}

fn build_hosts(
    raw_hosts: Vec<RawHost>,
    modules: &BTreeMap<String, Module>,
) -> Result<Vec<Host>, ConfigError> {
    let mut hosts = Vec::with_capacity(raw_hosts.len());
    for raw in raw_hosts {
        if raw.hostname.is_empty() {
            return Err(ConfigError::MissingHostname);
        }
        let version = parse_snmp_version(raw.version.as_deref().unwrap_or("1"))?;
        let mut static_labels = raw.static_labels;
        for value in static_labels.values_mut() {
            if value == "__hostname" {
                *value = raw.hostname.clone();
            }
        }
        let mut resolved_modules = Vec::new();
        for module_name in raw.modules {
            if modules.contains_key(&module_name) {
                resolved_modules.push(module_name);
            } else {
                warn!(
                    "module {} is unavailable for host {}, discarding",
                    module_name, raw.hostname
                );
            }
        }
        hosts.push(Host {
            hostname: raw.hostname,
            community: raw.community.unwrap_or_else(|| "public".to_string()),
            version,
            static_labels,
            modules: resolved_modules,
        });
    }
    Ok(hosts)
}

fn build_modules(
    raw: BTreeMap<String, RawModule>,
) -> Result<BTreeMap<String, Module>, ConfigError> {
    let mut modules = BTreeMap::new();
    for (module_name, raw_module) in raw {
        debug!("parse module {}", module_name);
        let every = raw_module.every;

        let mut template_labels = BTreeMap::new();
        for (name, raw_tl) in raw_module.template_labels {
            let mut common = build_common(&name, &raw_tl.leaf, &every, &raw_tl.query_type)?;
            common.store_method = parse_store_method(&raw_tl.store_method)?;
            if let Some(e) = &raw_tl.every {
                common.every_secs = duration::parse_duration_secs(e)?;
            }
            if let Some(suffix) = &raw_tl.oid_suffix {
                common.oid_suffix = Some(parse_oid_suffix(suffix)?);
            }
            if let Some(filter) = &raw_tl.filter {
                common.filter = Some(Filter::new(filter)?);
            }
            template_labels.insert(
                name,
                TemplateOid {
                    common,
                    community_template: raw_tl.community_template,
                },
            );
        }

        let mut labels = BTreeMap::new();
        let mut joins = BTreeMap::new();
        for (group_name, raw_entry) in raw_module.labels {
            match raw_entry {
                RawLabelGroupEntry::Join { join } => {
                    joins.insert(
                        group_name,
                        JoinDecl {
                            left_group: join.left_group,
                            left_key: join.left_key,
                            right_group: join.right_group,
                            right_key: join.right_key,
                        },
                    );
                }
                RawLabelGroupEntry::Oids(raw_group) => {
                    let group_every = raw_group.every.clone().unwrap_or_else(|| every.clone());
                    let mut group = BTreeMap::new();
                    for (label_name, leaf) in raw_group.mappings {
                        let mut common =
                            build_common(&label_name, &leaf, &group_every, &raw_group.query_type)?;
                        common.store_method = parse_store_method(&raw_group.store_method)?;
                        group.insert(
                            label_name,
                            LabelOid {
                                common,
                                template_name: raw_group.template_label.clone(),
                            },
                        );
                    }
                    labels.insert(group_name, group);
                }
            }
        }

        let mut metrics = Vec::new();
        for raw_metric in raw_module.metrics {
            let metric_every = raw_metric.every.clone().unwrap_or_else(|| every.clone());
            let label_group = raw_metric
                .label_group
                .iter()
                .map(|r| LabelGroupRef::parse(r))
                .collect::<Result<Vec<_>, _>>()?;
            for (metric_name, leaf) in &raw_metric.mappings {
                let mut common =
                    build_common(metric_name, leaf, &metric_every, &raw_metric.query_type)?;
                common.store_method = parse_store_method(&raw_metric.store_method)?;
                metrics.push(MetricOid {
                    common,
                    template_name: raw_metric.template_label.clone(),
                    label_group: label_group.clone(),
                });
            }
        }

        modules.insert(
            module_name,
            Module {
                template_labels,
                labels,
                joins,
                metrics,
            },
        );
    }
    Ok(modules)
}
