use crate::provider::{CollectionReport, SkipReason};
use crate::Result;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};
use std::time::Duration;

/// Self-telemetry for collection cycles
pub struct EngineMetrics {
    registry: Registry,
    queries_total: IntCounterVec,
    skipped_total: IntCounterVec,
    entities_collected: IntGauge,
    cycle_duration: Histogram,
}

impl EngineMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let queries_total = IntCounterVec::new(
            Opts::new("promentity_queries_total", "Metric queries executed, by outcome"),
            &["outcome"],
        )?;
        let skipped_total = IntCounterVec::new(
            Opts::new(
                "promentity_skipped_total",
                "Units of work left out of a cycle, by reason",
            ),
            &["reason"],
        )?;
        let entities_collected = IntGauge::new(
            "promentity_entities_collected",
            "Entities produced by the most recent cycle",
        )?;
        let cycle_duration = Histogram::with_opts(HistogramOpts::new(
            "promentity_cycle_duration_seconds",
            "Wall time of a collection cycle",
        ))?;

        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(skipped_total.clone()))?;
        registry.register(Box::new(entities_collected.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;

        Ok(Self {
            registry,
            queries_total,
            skipped_total,
            entities_collected,
            cycle_duration,
        })
    }

    pub fn observe(&self, report: &CollectionReport, elapsed: Duration) {
        self.queries_total
            .with_label_values(&["success"])
            .inc_by(report.queries_succeeded as u64);

        for diag in &report.diagnostics {
            match diag.reason {
                SkipReason::QueryFailed(_) => {
                    self.queries_total.with_label_values(&["error"]).inc();
                }
                SkipReason::QueryTimedOut(_) => {
                    self.queries_total.with_label_values(&["timeout"]).inc();
                }
                _ => {}
            }
            self.skipped_total
                .with_label_values(&[diag.reason.as_str()])
                .inc();
        }

        self.entities_collected.set(report.entities.len() as i64);
        self.cycle_duration.observe(elapsed.as_secs_f64());
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dif::{DifEntity, EntityType};
    use crate::provider::GroupContext;

    #[test]
    fn test_observe_report() {
        let metrics = EngineMetrics::new().unwrap();
        let ctx = GroupContext::new("prom", "node");
        let report = CollectionReport {
            entities: vec![DifEntity::new("a", EntityType::VirtualMachine)],
            diagnostics: vec![
                ctx.skipped(
                    EntityType::VirtualMachine,
                    "used",
                    "q",
                    SkipReason::QueryFailed("refused".to_string()),
                ),
                ctx.skipped(
                    EntityType::VirtualMachine,
                    "used",
                    "q",
                    SkipReason::InvalidValue(f64::NAN),
                ),
            ],
            queries_succeeded: 3,
        };

        metrics.observe(&report, Duration::from_millis(120));

        assert_eq!(metrics.queries_total.with_label_values(&["success"]).get(), 3);
        assert_eq!(metrics.queries_total.with_label_values(&["error"]).get(), 1);
        assert_eq!(
            metrics.skipped_total.with_label_values(&["invalid_value"]).get(),
            1
        );
        assert_eq!(metrics.entities_collected.get(), 1);
        assert_eq!(metrics.cycle_duration.get_sample_count(), 1);
    }
}
