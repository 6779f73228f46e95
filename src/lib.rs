pub mod cli;
pub mod config;
pub mod definition;
pub mod dif;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod query;
pub mod reconcile;
pub mod sample;

pub use error::{EngineError, ReconcileError, Result};
pub use provider::{CollectionReport, MetricProvider};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
