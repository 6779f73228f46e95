//! Structured records of every unit of work skipped during a cycle

use crate::dif::EntityType;
use crate::error::ReconcileError;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// A source references an exporter with no definition
    ExporterNotFound,
    QueryFailed(String),
    QueryTimedOut(Duration),
    /// The query returned something other than an instant vector element
    ShapeMismatch(String),
    InvalidValue(f64),
    ReconcileFailed(ReconcileError),
    /// The task collecting an entity group panicked
    TaskFailed(String),
}

impl SkipReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SkipReason::ExporterNotFound => "exporter_not_found",
            SkipReason::QueryFailed(_) => "query_failed",
            SkipReason::QueryTimedOut(_) => "query_timed_out",
            SkipReason::ShapeMismatch(_) => "shape_mismatch",
            SkipReason::InvalidValue(_) => "invalid_value",
            SkipReason::ReconcileFailed(_) => "reconcile_failed",
            SkipReason::TaskFailed(_) => "task_failed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ExporterNotFound => write!(f, "exporter not defined"),
            SkipReason::QueryFailed(e) => write!(f, "query failed: {}", e),
            SkipReason::QueryTimedOut(t) => write!(f, "query timed out after {:?}", t),
            SkipReason::ShapeMismatch(shape) => write!(f, "unexpected {} result", shape),
            SkipReason::InvalidValue(v) => write!(f, "invalid value {}", v),
            SkipReason::ReconcileFailed(e) => write!(f, "{}", e),
            SkipReason::TaskFailed(e) => write!(f, "collection task failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub source: String,
    pub exporter: String,
    pub entity_type: Option<EntityType>,
    pub metric_kind: Option<String>,
    pub query: Option<String>,
    pub reason: SkipReason,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}", self.source, self.exporter)?;
        if let Some(entity_type) = &self.entity_type {
            write!(f, "/{}", entity_type)?;
        }
        write!(f, "]")?;
        if let (Some(kind), Some(query)) = (&self.metric_kind, &self.query) {
            write!(f, " {} [{}]", kind, query)?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// Where a collection task runs: which source and exporter it serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupContext {
    pub source: String,
    pub exporter: String,
}

impl GroupContext {
    pub fn new(source: impl Into<String>, exporter: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            exporter: exporter.into(),
        }
    }

    pub fn exporter_not_found(&self) -> Diagnostic {
        Diagnostic {
            source: self.source.clone(),
            exporter: self.exporter.clone(),
            entity_type: None,
            metric_kind: None,
            query: None,
            reason: SkipReason::ExporterNotFound,
        }
    }

    pub fn skipped(
        &self,
        entity_type: EntityType,
        metric_kind: &str,
        query: &str,
        reason: SkipReason,
    ) -> Diagnostic {
        Diagnostic {
            source: self.source.clone(),
            exporter: self.exporter.clone(),
            entity_type: Some(entity_type),
            metric_kind: Some(metric_kind.to_string()),
            query: Some(query.to_string()),
            reason,
        }
    }

    pub fn task_failed(&self, entity_type: EntityType, message: String) -> Diagnostic {
        Diagnostic {
            source: self.source.clone(),
            exporter: self.exporter.clone(),
            entity_type: Some(entity_type),
            metric_kind: None,
            query: None,
            reason: SkipReason::TaskFailed(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let ctx = GroupContext::new("prom1", "redis");
        let diag = ctx.skipped(
            EntityType::DatabaseServer,
            "used",
            "redis_cpu",
            SkipReason::InvalidValue(f64::NAN),
        );
        assert_eq!(
            diag.to_string(),
            "[prom1/redis/databaseServer] used [redis_cpu]: invalid value NaN"
        );
        assert_eq!(
            ctx.exporter_not_found().to_string(),
            "[prom1/redis]: exporter not defined"
        );
    }
}
