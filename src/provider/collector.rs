//! Per entity-type collection.
//!
//! Runs every query defined for one entity type, turns accepted samples into
//! entities and merges samples that resolve to the same id. The id table
//! lives only for the duration of one call.

use crate::definition::{metric_value_kind, EntityDef};
use crate::dif::{DifEntity, EntityType};
use crate::provider::diagnostics::{GroupContext, SkipReason};
use crate::provider::owner::process_owner;
use crate::provider::CollectionReport;
use crate::query::MetricQuerier;
use crate::reconcile::EntityAttribute;
use crate::sample::{is_valid_value, MetricData};
use crate::{EngineError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Shared limit on in-flight queries plus the per-query timeout
#[derive(Debug, Clone)]
pub struct QueryBudget {
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl QueryBudget {
    pub fn new(max_concurrent_queries: usize, timeout: Option<Duration>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent_queries.max(1))),
            timeout,
        }
    }

    pub async fn execute(&self, querier: &dyn MetricQuerier, query: &str) -> Result<Vec<MetricData>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| EngineError::Query {
                endpoint: querier.endpoint().to_string(),
                message: e.to_string(),
            })?;

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, querier.get_metrics(query))
                .await
                .map_err(|_| EngineError::Timeout {
                    query: query.to_string(),
                    elapsed: limit,
                })?,
            None => querier.get_metrics(query).await,
        }
    }
}

fn build_entity(entity_def: &EntityDef, attr: &EntityAttribute) -> DifEntity {
    let mut entity =
        DifEntity::new(attr.id.clone(), entity_def.entity_type).with_namespace(attr.namespace.clone());
    if !attr.ip.is_empty() {
        entity.matching(attr.ip.clone());
    }
    if entity_def.hosted_on_vm {
        entity
            .hosted_on_type(EntityType::VirtualMachine)
            .hosted_on_ip(attr.ip.clone());
    }
    process_owner(&mut entity, attr);
    entity
}

/// Collect every entity one entity definition yields from `querier`.
pub async fn collect_entity_group(
    ctx: &GroupContext,
    querier: &dyn MetricQuerier,
    entity_def: &EntityDef,
    budget: &QueryBudget,
) -> CollectionReport {
    let entity_type = entity_def.entity_type;
    let mut report = CollectionReport::default();
    let mut entities: HashMap<String, DifEntity> = HashMap::new();

    for metric_def in &entity_def.metric_defs {
        let metric_type = metric_def.metric_type.as_str();

        for (metric_kind, query) in &metric_def.queries {
            let skipped = |reason| ctx.skipped(entity_type, metric_kind, query, reason);

            let series = match budget.execute(querier, query).await {
                Ok(series) => {
                    report.queries_succeeded += 1;
                    series
                }
                Err(EngineError::Timeout { elapsed, .. }) => {
                    error!(
                        "Timed out querying metric {} [{}] for entity type {} after {:?}.",
                        metric_kind, query, entity_type, elapsed
                    );
                    report
                        .diagnostics
                        .push(skipped(SkipReason::QueryTimedOut(elapsed)));
                    continue;
                }
                Err(e) => {
                    error!(
                        "Failed to query metric {} [{}] for entity type {}: {}.",
                        metric_kind, query, entity_type, e
                    );
                    report
                        .diagnostics
                        .push(skipped(SkipReason::QueryFailed(e.to_string())));
                    continue;
                }
            };

            for data in series {
                let sample = match data {
                    MetricData::Basic(sample) => sample,
                    other => {
                        error!(
                            "Unexpected {} result {:?} obtained from {} [{}] for entity type {}.",
                            other.shape(),
                            other,
                            metric_kind,
                            query,
                            entity_type
                        );
                        report
                            .diagnostics
                            .push(skipped(SkipReason::ShapeMismatch(other.shape().to_string())));
                        continue;
                    }
                };

                if !is_valid_value(sample.value) {
                    warn!(
                        "Invalid value {} for labels {:?} obtained from {} [{}] for entity type {}.",
                        sample.value, sample.labels, metric_kind, query, entity_type
                    );
                    report
                        .diagnostics
                        .push(skipped(SkipReason::InvalidValue(sample.value)));
                    continue;
                }

                let attr = match entity_def.reconcile_attributes(&sample.labels) {
                    Ok(attr) => attr,
                    Err(e) => {
                        error!(
                            "Failed to reconcile attributes from labels {:?} obtained from {} [{}] for entity type {}: {}.",
                            sample.labels, metric_kind, query, entity_type, e
                        );
                        report
                            .diagnostics
                            .push(skipped(SkipReason::ReconcileFailed(e)));
                        continue;
                    }
                };

                let entity = entities
                    .entry(attr.id.clone())
                    .or_insert_with(|| build_entity(entity_def, &attr));

                if let Some(value_kind) = metric_value_kind(metric_kind) {
                    debug!("Processing {}, {}, {}", entity.name, metric_type, value_kind);
                    entity.add_metric(metric_type, value_kind, sample.value, None);
                }
            }
        }
    }

    report.entities = entities.into_values().collect();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::MetricDef;
    use crate::dif::MetricValueKind;
    use crate::query::StaticQuerier;
    use crate::reconcile::{AttributeRule, LabelMapping};
    use crate::sample::RawSample;

    fn entity_def(metric: MetricDef) -> EntityDef {
        let mapping = LabelMapping::new()
            .with_rule("id", AttributeRule::label("id").identifier())
            .with_rule("ip", AttributeRule::label("ip"))
            .with_rule("namespace", AttributeRule::label("namespace"))
            .with_rule("service", AttributeRule::label("service"));
        EntityDef::new(EntityType::Application, Arc::new(mapping)).with_metric(metric)
    }

    fn ctx() -> GroupContext {
        GroupContext::new("prom", "app")
    }

    fn budget() -> QueryBudget {
        QueryBudget::new(4, Some(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_used_and_capacity_merge_into_one_entity() {
        let querier = StaticQuerier::new("prom")
            .with_samples("q1", vec![RawSample::with_labels(0.7, [("id", "e1")])])
            .with_samples("q2", vec![RawSample::with_labels(4.0, [("id", "e1")])]);
        let def = entity_def(
            MetricDef::new("cpu")
                .with_query("used", "q1")
                .with_query("capacity", "q2"),
        );

        let report = collect_entity_group(&ctx(), &querier, &def, &budget()).await;

        assert_eq!(report.entities.len(), 1);
        let entity = &report.entities[0];
        assert_eq!(entity.uid, "e1");
        let mut metrics = entity.metric_values();
        metrics.sort_by(|a, b| a.1.as_str().cmp(b.1.as_str()));
        assert_eq!(
            metrics,
            vec![
                ("cpu".to_string(), MetricValueKind::Average, 0.7),
                ("cpu".to_string(), MetricValueKind::Capacity, 4.0),
            ]
        );
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.queries_succeeded, 2);
    }

    #[tokio::test]
    async fn test_invalid_value_never_creates_entity() {
        let querier = StaticQuerier::new("prom")
            .with_samples("q1", vec![RawSample::with_labels(f64::NAN, [("id", "e2")])]);
        let def = entity_def(MetricDef::new("cpu").with_query("used", "q1"));

        let report = collect_entity_group(&ctx(), &querier, &def, &budget()).await;

        assert!(report.entities.is_empty());
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].reason.as_str(), "invalid_value");
    }

    #[tokio::test]
    async fn test_unrecognized_kind_creates_entity_without_metric() {
        let querier = StaticQuerier::new("prom")
            .with_samples("peak", vec![RawSample::with_labels(9.0, [("id", "e3")])])
            .with_samples("used", vec![RawSample::with_labels(1.0, [("id", "e4")])]);
        let def = entity_def(
            MetricDef::new("memory")
                .with_query("peak", "peak")
                .with_query("used", "used"),
        );

        let report = collect_entity_group(&ctx(), &querier, &def, &budget()).await;

        assert_eq!(report.entities.len(), 2);
        let e3 = report.entities.iter().find(|e| e.uid == "e3").unwrap();
        assert!(e3.metric_values().is_empty());
        let e4 = report.entities.iter().find(|e| e.uid == "e4").unwrap();
        assert_eq!(e4.metric("memory", MetricValueKind::Average), Some(1.0));
    }

    #[tokio::test]
    async fn test_relationships_set_at_creation() {
        let querier = StaticQuerier::new("prom").with_samples(
            "q1",
            vec![
                RawSample::with_labels(
                    1.0,
                    [("id", "e1"), ("ip", "10.0.0.1"), ("namespace", "shop"), ("service", "cart")],
                ),
                RawSample::with_labels(2.0, [("id", "e1"), ("service", "other")]),
            ],
        );
        let def = entity_def(MetricDef::new("cpu").with_query("used", "q1")).hosted_on_vm(true);

        let report = collect_entity_group(&ctx(), &querier, &def, &budget()).await;

        assert_eq!(report.entities.len(), 1);
        let entity = &report.entities[0];
        assert_eq!(entity.namespace.as_deref(), Some("shop"));
        assert_eq!(entity.match_identifiers.as_ref().unwrap().ip_address, "10.0.0.1");
        let hosted_on = entity.hosted_on.as_ref().unwrap();
        assert_eq!(hosted_on.host_type, vec![EntityType::VirtualMachine]);
        assert_eq!(hosted_on.ip_address, "10.0.0.1");
        assert_eq!(entity.part_of.len(), 1);
        assert_eq!(entity.part_of[0].label, "cart");
        // last write wins
        assert_eq!(entity.metric("cpu", MetricValueKind::Average), Some(2.0));
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let querier = StaticQuerier::new("prom")
            .with_error("broken", "connection refused")
            .with_data(
                "ok",
                vec![
                    MetricData::Scalar { value: 1.0 },
                    MetricData::Basic(RawSample::with_labels(1.0, [("job", "x")])),
                    MetricData::Basic(RawSample::with_labels(f64::INFINITY, [("id", "e1")])),
                    MetricData::Basic(RawSample::with_labels(3.0, [("id", "e1")])),
                ],
            );
        let def = entity_def(
            MetricDef::new("cpu")
                .with_query("capacity", "broken")
                .with_query("used", "ok"),
        );

        let report = collect_entity_group(&ctx(), &querier, &def, &budget()).await;

        assert_eq!(report.entities.len(), 1);
        let reasons: Vec<&str> = report.diagnostics.iter().map(|d| d.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec!["query_failed", "shape_mismatch", "reconcile_failed", "invalid_value"]
        );
        assert_eq!(report.diagnostics[0].query.as_deref(), Some("broken"));
    }

    #[tokio::test]
    async fn test_query_timeout_is_skipped() {
        let querier = StaticQuerier::new("prom")
            .with_samples("slow", vec![RawSample::with_labels(1.0, [("id", "e1")])])
            .with_delay("slow", Duration::from_secs(2));
        let def = entity_def(MetricDef::new("cpu").with_query("used", "slow"));
        let budget = QueryBudget::new(1, Some(Duration::from_millis(20)));

        let report = collect_entity_group(&ctx(), &querier, &def, &budget).await;

        assert!(report.entities.is_empty());
        assert_eq!(
            report.diagnostics[0].reason,
            SkipReason::QueryTimedOut(Duration::from_millis(20))
        );
    }

    #[tokio::test]
    async fn test_timed_out_queries_release_in_flight_slot() {
        let querier = StaticQuerier::new("prom")
            .with_samples("slow", vec![RawSample::with_labels(1.0, [("id", "e1")])])
            .with_delay("slow", Duration::from_secs(5));
        let def = entity_def(MetricDef::new("cpu").with_query("used", "slow"));
        let budget = QueryBudget::new(4, Some(Duration::from_millis(10)));

        for _ in 0..3 {
            let report = collect_entity_group(&ctx(), &querier, &def, &budget).await;
            assert_eq!(report.diagnostics.len(), 1);
        }

        assert_eq!(querier.calls(), 3);
        assert_eq!(querier.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_hosted_on_vm_without_address() {
        let querier = StaticQuerier::new("prom")
            .with_samples("q1", vec![RawSample::with_labels(1.0, [("id", "e1")])]);
        let def = entity_def(MetricDef::new("cpu").with_query("used", "q1")).hosted_on_vm(true);

        let report = collect_entity_group(&ctx(), &querier, &def, &budget()).await;

        assert_eq!(report.entities.len(), 1);
        let entity = &report.entities[0];
        assert!(entity.match_identifiers.is_none());
        let hosted_on = entity.hosted_on.as_ref().unwrap();
        assert_eq!(hosted_on.host_type, vec![EntityType::VirtualMachine]);
        assert_eq!(hosted_on.ip_address, "");
    }
}
