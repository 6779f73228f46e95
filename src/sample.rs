//! Raw query results and value validation

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type Labels = HashMap<String, String>;

/// One labeled value from an instant query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub value: f64,
    #[serde(default)]
    pub labels: Labels,
}

impl RawSample {
    pub fn new(value: f64, labels: Labels) -> Self {
        Self { value, labels }
    }

    /// Convenience constructor from `(name, value)` label pairs
    pub fn with_labels<'a>(value: f64, labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            value,
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// A single element of a query result, in whichever shape the source
/// returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MetricData {
    /// Instant vector element; the only shape turned into entities
    Basic(RawSample),
    Range {
        labels: Labels,
        values: Vec<(f64, f64)>,
    },
    Scalar {
        value: f64,
    },
    Text {
        value: String,
    },
}

impl MetricData {
    pub fn as_basic(&self) -> Option<&RawSample> {
        match self {
            MetricData::Basic(sample) => Some(sample),
            _ => None,
        }
    }

    pub const fn shape(&self) -> &'static str {
        match self {
            MetricData::Basic(_) => "vector",
            MetricData::Range { .. } => "matrix",
            MetricData::Scalar { .. } => "scalar",
            MetricData::Text { .. } => "string",
        }
    }
}

impl From<RawSample> for MetricData {
    fn from(sample: RawSample) -> Self {
        MetricData::Basic(sample)
    }
}

/// Rejects values that cannot be reported: NaN and either infinity.
pub fn is_valid_value(value: f64) -> bool {
    value.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_value() {
        assert!(is_valid_value(0.0));
        assert!(is_valid_value(-12.5));
        assert!(is_valid_value(f64::MAX));
        assert!(!is_valid_value(f64::NAN));
        assert!(!is_valid_value(f64::INFINITY));
        assert!(!is_valid_value(f64::NEG_INFINITY));
    }

    #[test]
    fn test_as_basic() {
        let basic = MetricData::from(RawSample::with_labels(1.0, [("id", "e1")]));
        assert_eq!(basic.as_basic().unwrap().labels["id"], "e1");
        assert_eq!(basic.shape(), "vector");

        let scalar = MetricData::Scalar { value: 1.0 };
        assert!(scalar.as_basic().is_none());
        assert_eq!(scalar.shape(), "scalar");
    }
}
