pub mod collector;
pub mod exporter;

pub use collector::EngineMetrics;
pub use exporter::encode_text;
