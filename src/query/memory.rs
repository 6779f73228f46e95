//! In-memory query source.
//!
//! Answers queries from a fixed table. Used to replay captured Prometheus
//! responses and as the query source in tests and benchmarks.

use crate::query::prometheus::decode_response;
use crate::query::MetricQuerier;
use crate::sample::{MetricData, RawSample};
use crate::{EngineError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Response {
    Data(Vec<MetricData>),
    Error(String),
}

#[derive(Debug, Clone)]
struct Entry {
    response: Response,
    delay: Option<Duration>,
}

/// Holds one in-flight slot until dropped, including when a timeout
/// cancels the query mid-sleep.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct StaticQuerier {
    name: String,
    entries: HashMap<String, Entry>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StaticQuerier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Load a replay file: a JSON object mapping each query string to the
    /// Prometheus response envelope captured for it.
    pub fn from_replay_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let table: HashMap<String, serde_json::Value> = serde_json::from_str(json)?;
        let mut querier = Self::new(name);
        for (query, envelope) in table {
            querier = querier.with_data(query, decode_response(envelope)?);
        }
        Ok(querier)
    }

    pub fn with_samples(self, query: impl Into<String>, samples: Vec<RawSample>) -> Self {
        self.with_data(query, samples.into_iter().map(MetricData::Basic).collect())
    }

    pub fn with_data(mut self, query: impl Into<String>, data: Vec<MetricData>) -> Self {
        self.entries.insert(
            query.into(),
            Entry {
                response: Response::Data(data),
                delay: None,
            },
        );
        self
    }

    pub fn with_error(mut self, query: impl Into<String>, message: impl Into<String>) -> Self {
        self.entries.insert(
            query.into(),
            Entry {
                response: Response::Error(message.into()),
                delay: None,
            },
        );
        self
    }

    /// Delay the answer to `query`; unknown queries get an empty result.
    pub fn with_delay(mut self, query: impl Into<String>, delay: Duration) -> Self {
        self.entries
            .entry(query.into())
            .or_insert_with(|| Entry {
                response: Response::Data(Vec::new()),
                delay: None,
            })
            .delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of queries observed executing at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricQuerier for StaticQuerier {
    async fn get_metrics(&self, query: &str) -> Result<Vec<MetricData>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _slot = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let entry = self.entries.get(query).cloned();
        // Yield once so concurrent callers overlap even without a delay.
        match entry.as_ref().and_then(|e| e.delay) {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        match entry.map(|e| e.response) {
            Some(Response::Data(data)) => Ok(data),
            Some(Response::Error(message)) => Err(EngineError::Query {
                endpoint: self.name.clone(),
                message,
            }),
            None => Ok(Vec::new()),
        }
    }

    fn endpoint(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_answers() {
        let querier = StaticQuerier::new("mem")
            .with_samples("up", vec![RawSample::with_labels(1.0, [("job", "node")])])
            .with_error("bad", "boom");

        assert_eq!(querier.get_metrics("up").await.unwrap().len(), 1);
        assert!(querier.get_metrics("unknown").await.unwrap().is_empty());
        let err = querier.get_metrics("bad").await.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(querier.calls(), 3);
    }

    #[tokio::test]
    async fn test_from_replay_json() {
        let json = r#"{
            "node_load1": {
                "status": "success",
                "data": {
                    "resultType": "vector",
                    "result": [{ "metric": { "instance": "a" }, "value": [1, "0.25"] }]
                }
            }
        }"#;

        let querier = StaticQuerier::from_replay_json("replay", json).unwrap();
        let data = querier.get_metrics("node_load1").await.unwrap();
        assert_eq!(data[0].as_basic().unwrap().value, 0.25);
    }
}
