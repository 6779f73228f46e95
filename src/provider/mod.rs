//! Collection cycle orchestration.
//!
//! One cycle walks every source, every exporter the source references and
//! every entity definition of that exporter. Each (source, exporter, entity
//! definition) group is collected in its own task; a shared budget bounds the
//! number of in-flight queries. Nothing fails the cycle as a whole: skipped
//! work shows up as [`Diagnostic`] records next to the entities.

pub mod collector;
pub mod diagnostics;
pub mod owner;

pub use collector::{collect_entity_group, QueryBudget};
pub use diagnostics::{Diagnostic, GroupContext, SkipReason};
pub use owner::process_owner;

use crate::definition::{ExporterDef, SourceDef};
use crate::dif::{DifEntity, EntityType};
use crate::metrics::EngineMetrics;
use futures::FutureExt;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, Instrument};

pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 8;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// How far entity deduplication reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityScope {
    /// Ids are unique within one (source, exporter, entity definition)
    /// group; the same id under two exporters yields two entities.
    #[default]
    Group,
    /// Entities with the same type and id are merged across the cycle.
    Cycle,
}

#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub max_concurrent_queries: usize,
    pub query_timeout: Option<Duration>,
    pub entity_scope: EntityScope,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            query_timeout: Some(DEFAULT_QUERY_TIMEOUT),
            entity_scope: EntityScope::Group,
        }
    }
}

/// Entities produced by a cycle, plus everything that was skipped on the way
#[derive(Debug, Clone, Default)]
pub struct CollectionReport {
    pub entities: Vec<DifEntity>,
    pub diagnostics: Vec<Diagnostic>,
    pub queries_succeeded: usize,
}

impl CollectionReport {
    pub fn extend(&mut self, other: CollectionReport) {
        self.entities.extend(other.entities);
        self.diagnostics.extend(other.diagnostics);
        self.queries_succeeded += other.queries_succeeded;
    }

    pub fn entities_with_id<'a>(&'a self, uid: &'a str) -> impl Iterator<Item = &'a DifEntity> + 'a {
        self.entities.iter().filter(move |e| e.uid == uid)
    }

    /// Number of diagnostics per skip reason
    pub fn skipped_by_reason(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for diag in &self.diagnostics {
            *counts.entry(diag.reason.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Merge entities sharing a type and id, keeping first-seen order
fn merge_across_groups(entities: Vec<DifEntity>) -> Vec<DifEntity> {
    let mut index: HashMap<(EntityType, String), usize> = HashMap::new();
    let mut merged: Vec<DifEntity> = Vec::with_capacity(entities.len());

    for entity in entities {
        let key = (entity.entity_type, entity.uid.clone());
        match index.get(&key) {
            Some(&pos) => merged[pos].merge_from(entity),
            None => {
                index.insert(key, merged.len());
                merged.push(entity);
            }
        }
    }
    merged
}

pub struct MetricProvider {
    sources: HashMap<String, SourceDef>,
    exporters: HashMap<String, ExporterDef>,
    options: ProviderOptions,
    metrics: Option<Arc<EngineMetrics>>,
}

impl MetricProvider {
    pub fn new(sources: HashMap<String, SourceDef>, exporters: HashMap<String, ExporterDef>) -> Self {
        Self {
            sources,
            exporters,
            options: ProviderOptions::default(),
            metrics: None,
        }
    }

    pub fn with_options(mut self, options: ProviderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    /// Run one collection cycle. Never fails; see the report's diagnostics
    /// for anything that was left out.
    pub async fn get_entity_metrics(&self) -> CollectionReport {
        let started = Instant::now();
        let budget = QueryBudget::new(self.options.max_concurrent_queries, self.options.query_timeout);
        let mut report = CollectionReport::default();
        let mut tasks = JoinSet::new();
        let mut spawned = 0usize;

        // Groups are merged back in spawn order, so fix the source order too.
        let mut sources: Vec<&SourceDef> = self.sources.values().collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));

        for source in sources {
            for exporter_name in &source.exporters {
                let ctx = GroupContext::new(&source.name, exporter_name);
                let Some(exporter) = self.exporters.get(exporter_name) else {
                    debug!(
                        "Exporter {} referenced by source {} is not defined; skipping",
                        exporter_name, source.name
                    );
                    report.diagnostics.push(ctx.exporter_not_found());
                    continue;
                };

                for entity_def in &exporter.entity_defs {
                    let ctx = ctx.clone();
                    let querier = source.querier.clone();
                    let entity_def = entity_def.clone();
                    let budget = budget.clone();
                    let index = spawned;
                    spawned += 1;
                    let span = info_span!(
                        "entity_group",
                        source = %ctx.source,
                        exporter = %ctx.exporter,
                        entity_type = %entity_def.entity_type
                    );

                    tasks.spawn(
                        async move {
                            let collected = AssertUnwindSafe(collect_entity_group(
                                &ctx,
                                querier.as_ref(),
                                &entity_def,
                                &budget,
                            ))
                            .catch_unwind()
                            .await;

                            let group = match collected {
                                Ok(group) => group,
                                Err(panic) => {
                                    let message = panic_message(panic.as_ref());
                                    error!("Collection task panicked: {}", message);
                                    CollectionReport {
                                        diagnostics: vec![
                                            ctx.task_failed(entity_def.entity_type, message),
                                        ],
                                        ..Default::default()
                                    }
                                }
                            };
                            (index, group)
                        }
                        .instrument(span),
                    );
                }
            }
        }

        let mut groups = Vec::with_capacity(spawned);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(group) => groups.push(group),
                Err(e) => error!("Collection task did not complete: {}", e),
            }
        }
        groups.sort_by_key(|(index, _)| *index);
        for (_, group) in groups {
            report.extend(group);
        }

        if self.options.entity_scope == EntityScope::Cycle {
            report.entities = merge_across_groups(std::mem::take(&mut report.entities));
        }

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.observe(&report, elapsed);
        }

        info!(
            "Collected {} entities from {} sources in {:?} ({} queries succeeded, {} units skipped)",
            report.entities.len(),
            self.sources.len(),
            elapsed,
            report.queries_succeeded,
            report.diagnostics.len()
        );

        report
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
