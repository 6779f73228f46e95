pub mod entity;
pub mod topology;
pub mod types;

pub use entity::{DifEntity, DifMetricVal, HostedOn, MatchingData, PartOf};
pub use topology::Topology;
pub use types::{EntityType, MetricValueKind};
