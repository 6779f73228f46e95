pub mod memory;
pub mod prometheus;

pub use memory::StaticQuerier;
pub use prometheus::PrometheusClient;

use crate::sample::MetricData;
use crate::Result;
use async_trait::async_trait;

/// Executes a metric query against one source.
#[async_trait]
pub trait MetricQuerier: Send + Sync {
    async fn get_metrics(&self, query: &str) -> Result<Vec<MetricData>>;

    /// Human readable location of the source, used in logs
    fn endpoint(&self) -> &str;
}
