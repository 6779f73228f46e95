//! Static definitions driving one collection cycle: which sources to query,
//! which exporters they host, and which entities and metrics each exporter
//! exposes.

use crate::dif::{EntityType, MetricValueKind};
use crate::error::ReconcileError;
use crate::query::MetricQuerier;
use crate::reconcile::{AttributeReconciler, EntityAttribute};
use crate::sample::Labels;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub mod kind {
    pub const USED: &str = "used";
    pub const CAPACITY: &str = "capacity";
}

/// Map a metric kind onto the value slot it fills. Kinds outside the
/// recognized set are not reported.
pub fn metric_value_kind(metric_kind: &str) -> Option<MetricValueKind> {
    match metric_kind {
        kind::USED => Some(MetricValueKind::Average),
        kind::CAPACITY => Some(MetricValueKind::Capacity),
        _ => None,
    }
}

/// A queryable endpoint and the exporters it scrapes
#[derive(Clone)]
pub struct SourceDef {
    pub name: String,
    pub querier: Arc<dyn MetricQuerier>,
    pub exporters: Vec<String>,
}

impl SourceDef {
    pub fn new(name: impl Into<String>, querier: Arc<dyn MetricQuerier>) -> Self {
        Self {
            name: name.into(),
            querier,
            exporters: Vec::new(),
        }
    }

    pub fn with_exporter(mut self, exporter: impl Into<String>) -> Self {
        self.exporters.push(exporter.into());
        self
    }
}

impl fmt::Debug for SourceDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDef")
            .field("name", &self.name)
            .field("endpoint", &self.querier.endpoint())
            .field("exporters", &self.exporters)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ExporterDef {
    pub name: String,
    pub entity_defs: Vec<EntityDef>,
}

impl ExporterDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_defs: Vec::new(),
        }
    }

    pub fn with_entity(mut self, entity_def: EntityDef) -> Self {
        self.entity_defs.push(entity_def);
        self
    }
}

/// One monitored entity type and the metrics collected for it
#[derive(Clone)]
pub struct EntityDef {
    pub entity_type: EntityType,
    pub hosted_on_vm: bool,
    pub metric_defs: Vec<MetricDef>,
    pub reconciler: Arc<dyn AttributeReconciler>,
}

impl EntityDef {
    pub fn new(entity_type: EntityType, reconciler: Arc<dyn AttributeReconciler>) -> Self {
        Self {
            entity_type,
            hosted_on_vm: false,
            metric_defs: Vec::new(),
            reconciler,
        }
    }

    pub fn hosted_on_vm(mut self, hosted_on_vm: bool) -> Self {
        self.hosted_on_vm = hosted_on_vm;
        self
    }

    pub fn with_metric(mut self, metric_def: MetricDef) -> Self {
        self.metric_defs.push(metric_def);
        self
    }

    pub fn reconcile_attributes(&self, labels: &Labels) -> Result<EntityAttribute, ReconcileError> {
        self.reconciler.reconcile(self.entity_type, labels)
    }

    /// Total number of queries one collection of this entity type issues
    pub fn query_count(&self) -> usize {
        self.metric_defs.iter().map(|m| m.queries.len()).sum()
    }
}

impl fmt::Debug for EntityDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDef")
            .field("entity_type", &self.entity_type)
            .field("hosted_on_vm", &self.hosted_on_vm)
            .field("metric_defs", &self.metric_defs)
            .field("reconciler", &self.reconciler.name())
            .finish()
    }
}

/// A metric type and the query retrieving each of its kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDef {
    pub metric_type: String,
    pub queries: BTreeMap<String, String>,
}

impl MetricDef {
    pub fn new(metric_type: impl Into<String>) -> Self {
        Self {
            metric_type: metric_type.into(),
            queries: BTreeMap::new(),
        }
    }

    pub fn with_query(mut self, metric_kind: impl Into<String>, query: impl Into<String>) -> Self {
        self.queries.insert(metric_kind.into(), query.into());
        self
    }
}
