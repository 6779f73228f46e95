use crate::EngineError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Entity types understood by the data ingestion format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Application,
    BusinessApplication,
    Container,
    ContainerSpec,
    DatabaseServer,
    Service,
    VirtualMachine,
}

impl EntityType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityType::Application => "application",
            EntityType::BusinessApplication => "businessApplication",
            EntityType::Container => "container",
            EntityType::ContainerSpec => "containerSpec",
            EntityType::DatabaseServer => "databaseServer",
            EntityType::Service => "service",
            EntityType::VirtualMachine => "virtualMachine",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entity_type = match s {
            "application" => EntityType::Application,
            "businessApplication" => EntityType::BusinessApplication,
            "container" => EntityType::Container,
            "containerSpec" => EntityType::ContainerSpec,
            "databaseServer" => EntityType::DatabaseServer,
            "service" => EntityType::Service,
            "virtualMachine" => EntityType::VirtualMachine,
            other => return Err(EngineError::UnsupportedEntityType(other.to_string())),
        };
        Ok(entity_type)
    }
}

/// Which slot of a metric a sample value fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricValueKind {
    Average,
    Capacity,
}

impl MetricValueKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricValueKind::Average => "average",
            MetricValueKind::Capacity => "capacity",
        }
    }
}

impl std::fmt::Display for MetricValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
