//! YAML configuration and its translation into collection definitions.
//!
//! ```yaml
//! engine:
//!   maxConcurrentQueries: 8
//!   queryTimeoutSecs: 30
//!   entityScope: group
//! servers:
//!   prom1:
//!     url: http://prometheus:9090
//!     exporters: [redis]
//! exporters:
//!   redis:
//!     entities:
//!       - type: databaseServer
//!         hostedOnVM: true
//!         metrics:
//!           - type: memory
//!             queries:
//!               used: redis_memory_used_bytes
//!               capacity: redis_memory_max_bytes
//!         attributes:
//!           id:
//!             label: instance
//!             matches: '\d{1,3}(?:\.\d{1,3}){3}(?::\d+)?'
//!             isIdentifier: true
//!           ip:
//!             label: instance
//!             matches: '(\d{1,3}(?:\.\d{1,3}){3})'
//!             as: '$1'
//! ```

use crate::definition::{EntityDef, ExporterDef, MetricDef, SourceDef};
use crate::dif::EntityType;
use crate::provider::{
    EntityScope, MetricProvider, ProviderOptions, DEFAULT_MAX_CONCURRENT_QUERIES,
};
use crate::query::{MetricQuerier, PrometheusClient};
use crate::reconcile::{AttributeRule, LabelMapping, ReconcilerRegistry};
use crate::{EngineError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

fn default_max_concurrent_queries() -> usize {
    DEFAULT_MAX_CONCURRENT_QUERIES
}

fn default_query_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
    /// 0 disables the per-query timeout
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default)]
    pub entity_scope: EntityScope,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: default_max_concurrent_queries(),
            query_timeout_secs: default_query_timeout_secs(),
            entity_scope: EntityScope::default(),
        }
    }
}

impl EngineConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_secs > 0).then(|| Duration::from_secs(self.query_timeout_secs))
    }

    pub fn provider_options(&self) -> ProviderOptions {
        ProviderOptions {
            max_concurrent_queries: self.max_concurrent_queries,
            query_timeout: self.query_timeout(),
            entity_scope: self.entity_scope,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub url: String,
    #[serde(default)]
    pub exporters: Vec<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExporterConfig {
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityConfig {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default, rename = "hostedOnVM")]
    pub hosted_on_vm: bool,
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeConfig>,
    #[serde(default)]
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricConfig {
    #[serde(rename = "type")]
    pub metric_type: String,
    pub queries: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeConfig {
    pub label: String,
    #[serde(default)]
    pub matches: Option<String>,
    #[serde(default, rename = "as")]
    pub replacement: Option<String>,
    #[serde(default)]
    pub is_identifier: bool,
}

impl AttributeConfig {
    fn to_rule(&self, attribute: &str) -> Result<AttributeRule> {
        let rule = match &self.matches {
            Some(pattern) => AttributeRule::matching(
                attribute,
                self.label.clone(),
                pattern,
                self.replacement.as_deref(),
            )?,
            None => AttributeRule::label(self.label.clone()),
        };
        Ok(if self.is_identifier { rule.identifier() } else { rule })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
    #[serde(default)]
    pub exporters: BTreeMap<String, ExporterConfig>,
}

/// Definition tables ready to drive a [`MetricProvider`]
pub struct Definitions {
    pub sources: HashMap<String, SourceDef>,
    pub exporters: HashMap<String, ExporterDef>,
    pub options: ProviderOptions,
}

impl Definitions {
    pub fn into_provider(self) -> MetricProvider {
        MetricProvider::new(self.sources, self.exporters).with_options(self.options)
    }

    pub fn entity_def_count(&self) -> usize {
        self.exporters.values().map(|e| e.entity_defs.len()).sum()
    }

    pub fn query_count(&self) -> usize {
        self.exporters
            .values()
            .flat_map(|e| e.entity_defs.iter())
            .map(EntityDef::query_count)
            .sum()
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.max_concurrent_queries == 0 {
            return Err(EngineError::Config(
                "engine.maxConcurrentQueries must be at least 1".to_string(),
            ));
        }
        if self.servers.is_empty() {
            return Err(EngineError::Config("no servers configured".to_string()));
        }
        for (name, server) in &self.servers {
            if server.url.trim().is_empty() {
                return Err(EngineError::Config(format!("server {} has no url", name)));
            }
            for exporter in &server.exporters {
                if !self.exporters.contains_key(exporter) {
                    warn!(
                        "Server {} references undefined exporter {}; it will be skipped",
                        name, exporter
                    );
                }
            }
        }
        Ok(())
    }

    /// Build definitions querying each server's Prometheus endpoint
    pub fn build(&self) -> Result<Definitions> {
        let timeout = self.engine.query_timeout();
        self.build_with(&ReconcilerRegistry::default(), |_, server| {
            let client = match timeout {
                Some(t) => PrometheusClient::with_timeout(&server.url, t)?,
                None => PrometheusClient::new(&server.url)?,
            };
            let client = match &server.bearer_token {
                Some(token) => client.with_bearer_token(token),
                None => client,
            };
            Ok(Arc::new(client) as Arc<dyn MetricQuerier>)
        })
    }

    /// Build definitions with a custom reconciler registry and querier
    /// factory (called once per server).
    pub fn build_with<F>(&self, registry: &ReconcilerRegistry, mut make_querier: F) -> Result<Definitions>
    where
        F: FnMut(&str, &ServerConfig) -> Result<Arc<dyn MetricQuerier>>,
    {
        let mut sources = HashMap::new();
        for (name, server) in &self.servers {
            let source = SourceDef {
                name: name.clone(),
                querier: make_querier(name, server)?,
                exporters: server.exporters.clone(),
            };
            sources.insert(name.clone(), source);
        }

        let mut exporters = HashMap::new();
        for (name, exporter) in &self.exporters {
            let mut def = ExporterDef::new(name.clone());
            for entity in &exporter.entities {
                def.entity_defs.push(build_entity_def(registry, name, entity)?);
            }
            exporters.insert(name.clone(), def);
        }

        Ok(Definitions {
            sources,
            exporters,
            options: self.engine.provider_options(),
        })
    }
}

fn build_entity_def(
    registry: &ReconcilerRegistry,
    exporter: &str,
    config: &EntityConfig,
) -> Result<EntityDef> {
    let entity_type: EntityType = config.entity_type.parse()?;

    let mut mapping = LabelMapping::new();
    if let Some(delimiter) = &config.delimiter {
        mapping = mapping.with_delimiter(delimiter.clone());
    }
    for (attribute, attr_config) in &config.attributes {
        mapping = mapping.with_rule(attribute.clone(), attr_config.to_rule(attribute)?);
    }

    if config.metrics.is_empty() {
        warn!("Exporter {} defines {} without metrics", exporter, entity_type);
    }

    let mut def = EntityDef::new(entity_type, registry.resolve(entity_type, mapping))
        .hosted_on_vm(config.hosted_on_vm);
    for metric in &config.metrics {
        let mut metric_def = MetricDef::new(metric.metric_type.clone());
        for (kind, query) in &metric.queries {
            metric_def = metric_def.with_query(kind.clone(), query.clone());
        }
        def = def.with_metric(metric_def);
    }
    Ok(def)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::StaticQuerier;

    const CONFIG: &str = r#"
engine:
  maxConcurrentQueries: 4
  queryTimeoutSecs: 0
  entityScope: cycle
scope: prod
servers:
  prom1:
    url: http://prometheus:9090
    exporters: [redis, missing]
exporters:
  redis:
    entities:
      - type: databaseServer
        hostedOnVM: true
        metrics:
          - type: memory
            queries:
              used: redis_memory_used_bytes
              capacity: redis_memory_max_bytes
        attributes:
          id:
            label: instance
            isIdentifier: true
          service:
            label: service
"#;

    fn static_querier(name: &str, _: &ServerConfig) -> Result<Arc<dyn MetricQuerier>> {
        Ok(Arc::new(StaticQuerier::new(name)))
    }

    #[test]
    fn test_parse_config() {
        let config = AppConfig::from_yaml_str(CONFIG).unwrap();
        assert_eq!(config.engine.max_concurrent_queries, 4);
        assert_eq!(config.engine.query_timeout(), None);
        assert_eq!(config.engine.entity_scope, EntityScope::Cycle);
        assert_eq!(config.scope.as_deref(), Some("prod"));
        assert_eq!(config.servers["prom1"].exporters, vec!["redis", "missing"]);
    }

    #[test]
    fn test_build_definitions() {
        let config = AppConfig::from_yaml_str(CONFIG).unwrap();
        let defs = config
            .build_with(&ReconcilerRegistry::default(), static_querier)
            .unwrap();

        assert_eq!(defs.sources.len(), 1);
        assert_eq!(defs.entity_def_count(), 1);
        assert_eq!(defs.query_count(), 2);

        let entity_def = &defs.exporters["redis"].entity_defs[0];
        assert_eq!(entity_def.entity_type, EntityType::DatabaseServer);
        assert!(entity_def.hosted_on_vm);
        assert_eq!(entity_def.metric_defs[0].queries["used"], "redis_memory_used_bytes");
    }

    #[test]
    fn test_engine_defaults() {
        let config = AppConfig::from_yaml_str("servers:\n  p:\n    url: http://p:9090\n").unwrap();
        assert_eq!(config.engine.max_concurrent_queries, 8);
        assert_eq!(config.engine.query_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.engine.entity_scope, EntityScope::Group);
    }

    #[test]
    fn test_unknown_entity_type_rejected() {
        let yaml = r#"
servers:
  p: { url: "http://p:9090", exporters: [x] }
exporters:
  x:
    entities:
      - type: mainframe
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        let result = config.build_with(&ReconcilerRegistry::default(), static_querier);
        assert!(matches!(result, Err(EngineError::UnsupportedEntityType(t)) if t == "mainframe"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let yaml = r#"
servers:
  p: { url: "http://p:9090" }
exporters:
  x:
    entities:
      - type: application
        attributes:
          id: { label: instance, matches: "([", isIdentifier: true }
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        let result = config.build_with(&ReconcilerRegistry::default(), static_querier);
        assert!(matches!(result, Err(EngineError::InvalidPattern { .. })));
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            AppConfig::from_yaml_str("servers: {}"),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            AppConfig::from_yaml_str("servers:\n  p:\n    url: ''\n"),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            AppConfig::from_yaml_str(
                "engine:\n  maxConcurrentQueries: 0\nservers:\n  p:\n    url: http://p\n"
            ),
            Err(EngineError::Config(_))
        ));
    }
}
