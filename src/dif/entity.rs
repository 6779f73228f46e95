//! Entity records in the data ingestion format (DIF)
//!
//! A `DifEntity` is built incrementally: identity and relationships are set
//! once when the entity is first seen, metrics are attached as samples
//! arrive.

use crate::dif::types::{EntityType, MetricValueKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Address used to match the entity against entities discovered elsewhere
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingData {
    pub ip_address: String,
}

/// Hosting relationship towards a parent entity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedOn {
    pub host_type: Vec<EntityType>,
    pub ip_address: String,
}

/// "Part of" relationship towards an owning entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartOf {
    pub parent_entity: String,
    pub unique_id: String,
    pub label: String,
}

/// Values recorded for one metric type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifMetricVal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl DifMetricVal {
    fn set(&mut self, kind: MetricValueKind, value: f64) {
        match kind {
            MetricValueKind::Average => self.average = Some(value),
            MetricValueKind::Capacity => self.capacity = Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifEntity {
    pub uid: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_identifiers: Option<MatchingData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosted_on: Option<HostedOn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub part_of: Vec<PartOf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, Vec<DifMetricVal>>,
}

impl DifEntity {
    /// Create an entity whose display name is its unique id
    pub fn new(uid: impl Into<String>, entity_type: EntityType) -> Self {
        let uid = uid.into();
        Self {
            name: uid.clone(),
            uid,
            entity_type,
            namespace: None,
            match_identifiers: None,
            hosted_on: None,
            part_of: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        if !namespace.is_empty() {
            self.namespace = Some(namespace);
        }
        self
    }

    /// Set the address used to match this entity against other sources
    pub fn matching(&mut self, ip: impl Into<String>) -> &mut Self {
        self.match_identifiers = Some(MatchingData {
            ip_address: ip.into(),
        });
        self
    }

    pub fn hosted_on_type(&mut self, host_type: EntityType) -> &mut Self {
        let hosted_on = self.hosted_on.get_or_insert_with(HostedOn::default);
        if !hosted_on.host_type.contains(&host_type) {
            hosted_on.host_type.push(host_type);
        }
        self
    }

    pub fn hosted_on_ip(&mut self, ip: impl Into<String>) -> &mut Self {
        self.hosted_on.get_or_insert_with(HostedOn::default).ip_address = ip.into();
        self
    }

    pub fn part_of_entity(
        &mut self,
        parent_entity: impl Into<String>,
        unique_id: impl Into<String>,
        label: impl Into<String>,
    ) -> &mut Self {
        self.part_of.push(PartOf {
            parent_entity: parent_entity.into(),
            unique_id: unique_id.into(),
            label: label.into(),
        });
        self
    }

    /// Attach a metric value. A later value for the same metric type and
    /// value kind replaces the earlier one.
    pub fn add_metric(
        &mut self,
        metric_type: &str,
        kind: MetricValueKind,
        value: f64,
        unit: Option<&str>,
    ) -> &mut Self {
        let values = self.metrics.entry(metric_type.to_string()).or_default();
        if values.is_empty() {
            values.push(DifMetricVal::default());
        }
        let slot = &mut values[0];
        slot.set(kind, value);
        if let Some(unit) = unit {
            slot.unit = Some(unit.to_string());
        }
        self
    }

    /// Flattened (metric type, value kind, value) view of attached metrics
    pub fn metric_values(&self) -> Vec<(String, MetricValueKind, f64)> {
        let mut out = Vec::new();
        for (metric_type, values) in &self.metrics {
            for val in values {
                if let Some(avg) = val.average {
                    out.push((metric_type.clone(), MetricValueKind::Average, avg));
                }
                if let Some(cap) = val.capacity {
                    out.push((metric_type.clone(), MetricValueKind::Capacity, cap));
                }
            }
        }
        out
    }

    pub fn metric(&self, metric_type: &str, kind: MetricValueKind) -> Option<f64> {
        self.metrics
            .get(metric_type)
            .and_then(|values| values.first())
            .and_then(|val| match kind {
                MetricValueKind::Average => val.average,
                MetricValueKind::Capacity => val.capacity,
            })
    }

    /// Fold another record for the same entity into this one.
    ///
    /// Identity fields already set here are kept; metrics from `other`
    /// overwrite ours slot by slot.
    pub fn merge_from(&mut self, other: DifEntity) {
        if self.namespace.is_none() {
            self.namespace = other.namespace;
        }
        if self.match_identifiers.is_none() {
            self.match_identifiers = other.match_identifiers;
        }
        if self.hosted_on.is_none() {
            self.hosted_on = other.hosted_on;
        }
        if self.part_of.is_empty() {
            self.part_of = other.part_of;
        }
        for (metric_type, values) in other.metrics {
            for val in values {
                if let Some(avg) = val.average {
                    self.add_metric(&metric_type, MetricValueKind::Average, avg, val.unit.as_deref());
                }
                if let Some(cap) = val.capacity {
                    self.add_metric(&metric_type, MetricValueKind::Capacity, cap, val.unit.as_deref());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_metric_last_write_wins() {
        let mut entity = DifEntity::new("e1", EntityType::Application);
        entity.add_metric("cpu", MetricValueKind::Average, 0.5, None);
        entity.add_metric("cpu", MetricValueKind::Capacity, 4.0, None);
        entity.add_metric("cpu", MetricValueKind::Average, 0.9, None);

        assert_eq!(entity.metric("cpu", MetricValueKind::Average), Some(0.9));
        assert_eq!(entity.metric("cpu", MetricValueKind::Capacity), Some(4.0));
        assert_eq!(entity.metrics["cpu"].len(), 1);
    }

    #[test]
    fn test_hosted_on_type_not_duplicated() {
        let mut entity = DifEntity::new("e1", EntityType::DatabaseServer);
        entity
            .hosted_on_type(EntityType::VirtualMachine)
            .hosted_on_type(EntityType::VirtualMachine)
            .hosted_on_ip("10.0.0.1");

        let hosted_on = entity.hosted_on.expect("hosted on set");
        assert_eq!(hosted_on.host_type, vec![EntityType::VirtualMachine]);
        assert_eq!(hosted_on.ip_address, "10.0.0.1");
    }

    #[test]
    fn test_empty_namespace_is_omitted() {
        let entity = DifEntity::new("e1", EntityType::Application).with_namespace("");
        assert!(entity.namespace.is_none());
    }

    #[test]
    fn test_json_shape() {
        let mut entity = DifEntity::new("10.0.0.1:6379", EntityType::DatabaseServer)
            .with_namespace("cache");
        entity
            .matching("10.0.0.1")
            .part_of_entity("service", "Service-10.0.0.1:6379", "redis")
            .add_metric("memory", MetricValueKind::Capacity, 1024.0, Some("mb"));

        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["uid"], "10.0.0.1:6379");
        assert_eq!(json["type"], "databaseServer");
        assert_eq!(json["matchIdentifiers"]["ipAddress"], "10.0.0.1");
        assert_eq!(json["partOf"][0]["uniqueId"], "Service-10.0.0.1:6379");
        assert_eq!(json["metrics"]["memory"][0]["capacity"], 1024.0);
        assert_eq!(json["metrics"]["memory"][0]["unit"], "mb");
        assert!(json.get("hostedOn").is_none());
    }

    #[test]
    fn test_merge_keeps_identity_and_unions_metrics() {
        let mut first = DifEntity::new("e1", EntityType::Application).with_namespace("ns1");
        first.part_of_entity("service", "Service-ns1-a", "a");
        first.add_metric("cpu", MetricValueKind::Average, 0.1, None);

        let mut second = DifEntity::new("e1", EntityType::Application).with_namespace("ns2");
        second.part_of_entity("service", "Service-ns2-b", "b");
        second.matching("10.1.1.1");
        second.add_metric("cpu", MetricValueKind::Capacity, 2.0, None);
        second.add_metric("memory", MetricValueKind::Average, 512.0, None);

        first.merge_from(second);

        assert_eq!(first.namespace.as_deref(), Some("ns1"));
        assert_eq!(first.match_identifiers.as_ref().unwrap().ip_address, "10.1.1.1");
        assert_eq!(first.part_of.len(), 1);
        assert_eq!(first.part_of[0].label, "a");
        assert_eq!(first.metric_values().len(), 3);
    }
}
