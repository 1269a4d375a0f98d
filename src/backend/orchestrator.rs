//! Warmup + scheduling: walks the config graph, runs the three warmup waves
//! (templates, labels, joins) before the first metric tick, then registers
//! every polled OID as a recurring job via [`super::scheduler`].
//!
//! Generalised from a job-queue consumer to a config-driven task spawner —
//! there is no queue here, every job is known at warmup time.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::backend::scheduler;
use crate::config::{Config, Filter, Host, LabelOid, MetricOid, Module, TemplateOid};
use crate::sink::{Sample, Sink};
use crate::snmp::{QueryOutcome, SnmpQuerier};
use crate::storage::{LabelStorage, TemplateStorage};

#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<Config>,
    querier: Arc<SnmpQuerier>,
    template_storage: Arc<TemplateStorage>,
    label_storage: Arc<LabelStorage>,
    sink: Arc<dyn Sink>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        querier: Arc<SnmpQuerier>,
        template_storage: Arc<TemplateStorage>,
        label_storage: Arc<LabelStorage>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        Orchestrator {
            config,
            querier,
            template_storage,
            label_storage,
            sink,
        }
    }

    /// Run the full warmup sequence and register every recurring job.
    /// Each wave's one-shot runs complete and are awaited before the next
    /// wave starts; the join wave is plain synchronous bookkeeping.
    pub async fn run(&self) {
        self.declare_metrics().await;

        debug!("warmup phase 1: templates");
        self.warmup_templates().await;

        debug!("warmup phase 2: labels");
        self.warmup_labels().await;

        debug!("warmup phase 3: joins");
        self.warmup_joins().await;

        debug!("warmup phase 4: metrics");
        self.warmup_metrics().await;
    }

    async fn declare_metrics(&self) {
        for (name, desc) in &self.config.descriptions {
            self.sink.add_metric(name, &desc.metric_type, &desc.description).await;
        }
    }

    async fn warmup_templates(&self) {
        let mut jobs = JoinSet::new();
        for host in &self.config.hosts {
            for module_name in &host.modules {
                let Some(module) = self.config.modules.get(module_name) else {
                    continue;
                };
                for (group_name, tmpl) in &module.template_labels {
                    let me = self.clone();
                    let host = host.clone();
                    let module_name = module_name.clone();
                    let group_name = group_name.clone();
                    let tmpl = tmpl.clone();
                    jobs.spawn(async move {
                        me.update_template_label(&host, &module_name, &group_name, &tmpl).await;
                        let label = format!("template:{}/{}/{}", host.hostname, module_name, group_name);
                        let every = tmpl.common.every_secs;
                        scheduler::spawn_periodic(label, every, move || {
                            let me = me.clone();
                            let host = host.clone();
                            let module_name = module_name.clone();
                            let group_name = group_name.clone();
                            let tmpl = tmpl.clone();
                            async move {
                                me.update_template_label(&host, &module_name, &group_name, &tmpl).await;
                            }
                        });
                    });
                }
            }
        }
        while jobs.join_next().await.is_some() {}
    }

    async fn warmup_labels(&self) {
        let mut jobs = JoinSet::new();
        for host in &self.config.hosts {
            for module_name in &host.modules {
                let Some(module) = self.config.modules.get(module_name) else {
                    continue;
                };
                for (group_name, group) in &module.labels {
                    for (label_name, oid) in group {
                        let me = self.clone();
                        let host = host.clone();
                        let module_name = module_name.clone();
                        let group_name = group_name.clone();
                        let label_name = label_name.clone();
                        let oid = oid.clone();
                        jobs.spawn(async move {
                            me.update_label(&host, &module_name, &group_name, &label_name, &oid).await;
                            let label = format!(
                                "label:{}/{}/{}/{}",
                                host.hostname, module_name, group_name, label_name
                            );
                            let every = oid.common.every_secs;
                            scheduler::spawn_periodic(label, every, move || {
                                let me = me.clone();
                                let host = host.clone();
                                let module_name = module_name.clone();
                                let group_name = group_name.clone();
                                let label_name = label_name.clone();
                                let oid = oid.clone();
                                async move {
                                    me.update_label(&host, &module_name, &group_name, &label_name, &oid).await;
                                }
                            });
                        });
                    }
                }
            }
        }
        while jobs.join_next().await.is_some() {}
    }

    async fn warmup_joins(&self) {
        for host in &self.config.hosts {
            for module_name in &host.modules {
                let Some(module) = self.config.modules.get(module_name) else {
                    continue;
                };
                for (group_name, join) in &module.joins {
                    self.label_storage
                        .set_join(
                            &host.hostname,
                            module_name,
                            group_name,
                            &join.left_group,
                            &join.left_key,
                            &join.right_group,
                            &join.right_key,
                        )
                        .await;
                }
            }
        }
    }

    async fn warmup_metrics(&self) {
        let mut jobs = JoinSet::new();
        for host in &self.config.hosts {
            for module_name in &host.modules {
                let Some(module) = self.config.modules.get(module_name) else {
                    continue;
                };
                for metric in &module.metrics {
                    let me = self.clone();
                    let host = host.clone();
                    let module_name = module_name.clone();
                    let metric = metric.clone();
                    jobs.spawn(async move {
                        me.update_metric(&host, &module_name, &metric).await;
                        let label = format!("metric:{}/{}/{}", host.hostname, module_name, metric.common.name);
                        let every = metric.common.every_secs;
                        scheduler::spawn_periodic(label, every, move || {
                            let me = me.clone();
                            let host = host.clone();
                            let module_name = module_name.clone();
                            let metric = metric.clone();
                            async move {
                                me.update_metric(&host, &module_name, &metric).await;
                            }
                        });
                    });
                }
            }
        }
        while jobs.join_next().await.is_some() {}
    }

    /// One tick of a template_label OID: query once per host/module pair
    /// (templates have no community of their own to expand) and write the
    /// result into the template cache.
    async fn update_template_label(&self, host: &Host, module_name: &str, group_name: &str, tmpl: &TemplateOid) {
        let outcome = self
            .querier
            .query(
                &host.hostname,
                &host.community,
                host.version,
                &tmpl.common.oid,
                tmpl.common.query_type,
                tmpl.common.store_method,
                tmpl.common.oid_suffix.as_deref(),
            )
            .await;
        match outcome {
            QueryOutcome::Scalar(value) => {
                let Some(value) = value.and_then(|v| apply_filter(&tmpl.common.filter, &v)) else {
                    return;
                };
                self.template_storage
                    .set_label(&host.hostname, module_name, group_name, &value, None)
                    .await;
            }
            QueryOutcome::Indexed(map) => {
                for (idx, value) in map {
                    let Some(value) = apply_filter(&tmpl.common.filter, &value) else {
                        continue;
                    };
                    self.template_storage
                        .set_label(&host.hostname, module_name, group_name, &value, Some(&idx))
                        .await;
                }
            }
        }
    }

    /// One tick of a label OID: expand every community this label's
    /// template currently yields and query/store once per expansion.
    async fn update_label(
        &self,
        host: &Host,
        module_name: &str,
        group_name: &str,
        label_name: &str,
        oid: &LabelOid,
    ) {
        let Some(module) = self.config.modules.get(module_name) else {
            return;
        };
        let community_template = module.community_template_for(&oid.template_name);
        let rows = self
            .template_storage
            .resolve_community(
                &host.hostname,
                module_name,
                &oid.template_name,
                community_template.as_deref(),
                &host.community,
            )
            .await;

        for (community, template_name, template_value) in rows {
            let outcome = self
                .querier
                .query(
                    &host.hostname,
                    &community,
                    host.version,
                    &oid.common.oid,
                    oid.common.query_type,
                    oid.common.store_method,
                    oid.common.oid_suffix.as_deref(),
                )
                .await;
            match outcome {
                QueryOutcome::Scalar(value) => {
                    let Some(value) = value.and_then(|v| apply_filter(&oid.common.filter, &v)) else {
                        continue;
                    };
                    self.label_storage
                        .set_label(
                            &host.hostname,
                            module_name,
                            group_name,
                            label_name,
                            &value,
                            template_name.as_deref(),
                            template_value.as_deref(),
                            None,
                        )
                        .await;
                }
                QueryOutcome::Indexed(map) => {
                    let filtered: Vec<(String, String)> = map
                        .into_iter()
                        .filter_map(|(idx, v)| apply_filter(&oid.common.filter, &v).map(|v| (idx, v)))
                        .collect();
                    let fresh: BTreeSet<String> = filtered.iter().map(|(idx, _)| idx.clone()).collect();
                    self.label_storage
                        .invalidate_cache(
                            &host.hostname,
                            module_name,
                            group_name,
                            template_name.as_deref(),
                            template_value.as_deref(),
                            &fresh,
                        )
                        .await;
                    for (idx, value) in filtered {
                        self.label_storage
                            .set_label(
                                &host.hostname,
                                module_name,
                                group_name,
                                label_name,
                                &value,
                                template_name.as_deref(),
                                template_value.as_deref(),
                                Some(&idx),
                            )
                            .await;
                    }
                }
            }
        }
    }

    /// One tick of a metric OID: expand communities, query, resolve labels,
    /// merge with the host's static labels, and submit one sample per row.
    /// The clear/update/release window brackets every community's results.
    async fn update_metric(&self, host: &Host, module_name: &str, metric: &MetricOid) {
        let Some(module) = self.config.modules.get(module_name) else {
            return;
        };
        let community_template = module.community_template_for(&metric.template_name);
        let rows = self
            .template_storage
            .resolve_community(
                &host.hostname,
                module_name,
                &metric.template_name,
                community_template.as_deref(),
                &host.community,
            )
            .await;

        self.sink.clear(&host.hostname, &metric.common.name).await;
        for (community, template_name, template_value) in rows {
            let outcome = self
                .querier
                .query(
                    &host.hostname,
                    &community,
                    host.version,
                    &metric.common.oid,
                    metric.common.query_type,
                    metric.common.store_method,
                    metric.common.oid_suffix.as_deref(),
                )
                .await;
            match outcome {
                QueryOutcome::Scalar(value) => {
                    let Some(value) = value.and_then(|v| apply_filter(&metric.common.filter, &v)) else {
                        continue;
                    };
                    self.emit_sample(
                        host,
                        module,
                        module_name,
                        metric,
                        &value,
                        template_name.as_deref(),
                        template_value.as_deref(),
                        None,
                    )
                    .await;
                }
                QueryOutcome::Indexed(map) => {
                    for (idx, value) in map {
                        let Some(value) = apply_filter(&metric.common.filter, &value) else {
                            continue;
                        };
                        self.emit_sample(
                            host,
                            module,
                            module_name,
                            metric,
                            &value,
                            template_name.as_deref(),
                            template_value.as_deref(),
                            Some(&idx),
                        )
                        .await;
                    }
                }
            }
        }
        self.sink.release_update_lock(&host.hostname, &metric.common.name).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_sample(
        &self,
        host: &Host,
        module: &Module,
        module_name: &str,
        metric: &MetricOid,
        raw_value: &str,
        template_name: Option<&str>,
        template_value: Option<&str>,
        walk_idx: Option<&str>,
    ) {
        let _ = module;
        let value: f64 = match raw_value.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("metric {} on {} produced non-numeric value {:?}", metric.common.name, host.hostname, raw_value);
                return;
            }
        };
        let resolved = self
            .label_storage
            .resolve_label(
                &host.hostname,
                module_name,
                &metric.label_group,
                template_name,
                template_value,
                walk_idx,
            )
            .await;
        if !metric.label_group.is_empty() && resolved.is_empty() {
            return;
        }
        let mut labels = host.static_labels.clone();
        labels.extend(resolved);
        self.sink
            .update_metric(Sample {
                metric_name: metric.common.name.clone(),
                host: host.hostname.clone(),
                labels,
                value,
            })
            .await;
    }
}

fn apply_filter(filter: &Option<Filter>, value: &str) -> Option<String> {
    match filter {
        None => Some(value.to_string()),
        Some(f) => f.apply(value),
    }
}
