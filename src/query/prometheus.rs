//! Prometheus HTTP API client (`/api/v1/query`)

use crate::query::MetricQuerier;
use crate::sample::{Labels, MetricData, RawSample};
use crate::{EngineError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const QUERY_PATH: &str = "/api/v1/query";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorElement {
    #[serde(default)]
    metric: Labels,
    value: (f64, String),
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    #[serde(default)]
    metric: Labels,
    values: Vec<(f64, String)>,
}

/// Parse a Prometheus sample value. Prometheus encodes values as strings so
/// that `NaN`, `+Inf` and `-Inf` survive JSON.
pub fn parse_sample_value(raw: &str) -> Result<f64> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        other => other
            .parse::<f64>()
            .map_err(|e| EngineError::Decode(format!("invalid sample value {:?}: {}", other, e))),
    }
}

/// Decode a Prometheus query response envelope into metric data
pub fn decode_response(body: serde_json::Value) -> Result<Vec<MetricData>> {
    let response: ApiResponse = serde_json::from_value(body)?;

    if response.status != "success" {
        return Err(EngineError::Decode(format!(
            "query returned status {} ({}): {}",
            response.status,
            response.error_type.unwrap_or_default(),
            response.error.unwrap_or_default()
        )));
    }

    let data = response
        .data
        .ok_or_else(|| EngineError::Decode("response carries no data".to_string()))?;

    match data.result_type.as_str() {
        "vector" => {
            let elements: Vec<VectorElement> = serde_json::from_value(data.result)?;
            elements
                .into_iter()
                .map(|e| -> Result<MetricData> {
                    Ok(MetricData::Basic(RawSample::new(
                        parse_sample_value(&e.value.1)?,
                        e.metric,
                    )))
                })
                .collect()
        }
        "matrix" => {
            let elements: Vec<MatrixElement> = serde_json::from_value(data.result)?;
            elements
                .into_iter()
                .map(|e| -> Result<MetricData> {
                    let values = e
                        .values
                        .iter()
                        .map(|(ts, v)| -> Result<(f64, f64)> { Ok((*ts, parse_sample_value(v)?)) })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(MetricData::Range {
                        labels: e.metric,
                        values,
                    })
                })
                .collect()
        }
        "scalar" => {
            let (_, value): (f64, String) = serde_json::from_value(data.result)?;
            Ok(vec![MetricData::Scalar {
                value: parse_sample_value(&value)?,
            }])
        }
        "string" => {
            let (_, value): (f64, String) = serde_json::from_value(data.result)?;
            Ok(vec![MetricData::Text { value }])
        }
        other => Err(EngineError::Decode(format!("unknown result type {}", other))),
    }
}

pub struct PrometheusClient {
    base_url: String,
    http: reqwest::Client,
    bearer_token: Option<String>,
}

impl PrometheusClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(EngineError::Config("Prometheus URL is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            base_url,
            http,
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[async_trait]
impl MetricQuerier for PrometheusClient {
    async fn get_metrics(&self, query: &str) -> Result<Vec<MetricData>> {
        let url = format!("{}{}", self.base_url, QUERY_PATH);
        debug!("Querying {} with {}", url, query);

        let mut request = self.http.get(&url).query(&[("query", query)]);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Prometheus reports query errors as a JSON envelope with a 4xx/5xx status.
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => decode_response(value).map_err(|e| EngineError::Query {
                endpoint: self.base_url.clone(),
                message: format!("HTTP {}: {}", status, e),
            }),
            Err(_) => Err(EngineError::Query {
                endpoint: self.base_url.clone(),
                message: format!("HTTP {}: {}", status, body.trim()),
            }),
        }
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}
