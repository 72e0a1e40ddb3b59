use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of a [`Metric`], determining how updates are merged.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Accumulates a signed running total.
    ///
    /// Every update adds its delta to the stored total.
    Counter,
    /// Stores the last reported value.
    Gauge,
}

impl MetricType {
    /// Returns the wire name of this metric type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = ParseMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "counter" => Self::Counter,
            "gauge" => Self::Gauge,
            _ => return Err(ParseMetricError::UnknownType(s.to_owned())),
        })
    }
}

/// An error returned when a metric fails validation at the boundary.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ParseMetricError {
    /// The metric id is empty.
    #[error("metric id must not be empty")]
    EmptyId,

    /// The type is neither `counter` nor `gauge`.
    #[error("unknown metric type {0:?}")]
    UnknownType(String),

    /// The value cannot be parsed for the declared type.
    #[error("invalid {ty} value {value:?}")]
    InvalidValue {
        /// The declared metric type.
        ty: MetricType,
        /// The raw value.
        value: String,
    },

    /// The field required by the declared type is missing.
    #[error("{ty} metric is missing its {field}")]
    MissingValue {
        /// The declared metric type.
        ty: MetricType,
        /// The name of the missing field.
        field: &'static str,
    },

    /// The field belonging to the other type is present as well.
    #[error("{ty} metric must not carry a {field}")]
    UnexpectedValue {
        /// The declared metric type.
        ty: MetricType,
        /// The name of the unexpected field.
        field: &'static str,
    },
}

/// The value of a [`Metric`], which also determines its type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// The delta of a counter.
    Counter(i64),
    /// The value of a gauge.
    Gauge(f64),
}

impl MetricValue {
    /// Returns the type of this value.
    pub fn ty(&self) -> MetricType {
        match self {
            MetricValue::Counter(_) => MetricType::Counter,
            MetricValue::Gauge(_) => MetricType::Gauge,
        }
    }

    /// Returns `false` for gauges that are NaN or infinite.
    ///
    /// Such values have no representation in the JSON wire format.
    pub fn is_finite(&self) -> bool {
        match self {
            MetricValue::Counter(_) => true,
            MetricValue::Gauge(value) => value.is_finite(),
        }
    }

    /// Merges an incoming value into this one.
    ///
    /// Counters add, saturating at the bounds of `i64`. Gauges and values of a different type
    /// replace the current value.
    pub fn merge(&mut self, incoming: MetricValue) {
        *self = match (*self, incoming) {
            (MetricValue::Counter(total), MetricValue::Counter(delta)) => {
                MetricValue::Counter(total.saturating_add(delta))
            }
            (_, incoming) => incoming,
        };
    }

    /// Parses the text form of a value for the given type.
    pub fn parse(ty: MetricType, value: &str) -> Result<Self, ParseMetricError> {
        let invalid = || ParseMetricError::InvalidValue {
            ty,
            value: value.to_owned(),
        };

        match ty {
            MetricType::Counter => value
                .parse()
                .map(MetricValue::Counter)
                .map_err(|_| invalid()),
            MetricType::Gauge => match value.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(MetricValue::Gauge(v)),
                _ => Err(invalid()),
            },
        }
    }
}

/// Formats the value as plain text: counters as integers, gauges in their shortest form.
impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Counter(delta) => write!(f, "{delta}"),
            MetricValue::Gauge(value) => write!(f, "{value}"),
        }
    }
}

/// A single named counter or gauge.
///
/// Serializes to and from the JSON wire format, see the [crate documentation](crate).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "RawMetric", into = "RawMetric")]
pub struct Metric {
    /// The unique name of the metric.
    pub id: String,
    /// The current value of the metric.
    pub value: MetricValue,
}

impl Metric {
    /// Creates a counter metric.
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Counter(delta),
        }
    }

    /// Creates a gauge metric.
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Gauge(value),
        }
    }

    /// Returns the type of this metric.
    pub fn ty(&self) -> MetricType {
        self.value.ty()
    }

    /// Parses a metric from the path-encoded form `/update/{type}/{id}/{value}`.
    ///
    /// ```
    /// use tally_metrics::{Metric, MetricValue};
    ///
    /// let metric = Metric::parse_path("counter", "PollCount", "5").unwrap();
    /// assert_eq!(metric.value, MetricValue::Counter(5));
    /// ```
    pub fn parse_path(ty: &str, id: &str, value: &str) -> Result<Self, ParseMetricError> {
        if id.is_empty() {
            return Err(ParseMetricError::EmptyId);
        }

        let ty = ty.parse()?;
        Ok(Self {
            id: id.to_owned(),
            value: MetricValue::parse(ty, value)?,
        })
    }

    /// Merges an incoming update for the same id into this metric.
    ///
    /// See [`MetricValue::merge`].
    pub fn merge(&mut self, incoming: &Metric) {
        self.value.merge(incoming.value);
    }
}

/// The raw wire representation of a [`Metric`].
#[derive(Debug, Deserialize, Serialize)]
struct RawMetric {
    id: String,
    #[serde(rename = "type")]
    ty: MetricType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
}

impl TryFrom<RawMetric> for Metric {
    type Error = ParseMetricError;

    fn try_from(raw: RawMetric) -> Result<Self, Self::Error> {
        if raw.id.is_empty() {
            return Err(ParseMetricError::EmptyId);
        }

        let value = match (raw.ty, raw.delta, raw.value) {
            (MetricType::Counter, Some(delta), None) => MetricValue::Counter(delta),
            (MetricType::Gauge, None, Some(value)) if value.is_finite() => {
                MetricValue::Gauge(value)
            }
            (MetricType::Gauge, None, Some(value)) => {
                return Err(ParseMetricError::InvalidValue {
                    ty: raw.ty,
                    value: value.to_string(),
                });
            }
            (ty @ MetricType::Counter, _, Some(_)) => {
                return Err(ParseMetricError::UnexpectedValue { ty, field: "value" });
            }
            (ty @ MetricType::Gauge, Some(_), _) => {
                return Err(ParseMetricError::UnexpectedValue { ty, field: "delta" });
            }
            (ty @ MetricType::Counter, None, None) => {
                return Err(ParseMetricError::MissingValue { ty, field: "delta" });
            }
            (ty @ MetricType::Gauge, None, None) => {
                return Err(ParseMetricError::MissingValue { ty, field: "value" });
            }
        };

        Ok(Metric { id: raw.id, value })
    }
}

impl From<Metric> for RawMetric {
    fn from(metric: Metric) -> Self {
        let (delta, value) = match metric.value {
            MetricValue::Counter(delta) => (Some(delta), None),
            MetricValue::Gauge(value) => (None, Some(value)),
        };

        RawMetric {
            id: metric.id,
            ty: metric.value.ty(),
            delta,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_deserialize_counter() {
        let json = r#"{"id":"PollCount","type":"counter","delta":5}"#;
        let metric: Metric = serde_json::from_str(json).unwrap();
        assert_eq!(metric, Metric::counter("PollCount", 5));
    }

    #[test]
    fn test_deserialize_gauge() {
        let json = r#"{"id":"Alloc","type":"gauge","value":12.5}"#;
        let metric: Metric = serde_json::from_str(json).unwrap();
        assert_eq!(metric, Metric::gauge("Alloc", 12.5));
    }

    #[test]
    fn test_serialize_omits_other_field() {
        let json = serde_json::to_string(&Metric::counter("c1", -3)).unwrap();
        assert_eq!(json.as_str(), r#"{"id":"c1","type":"counter","delta":-3}"#);

        let json = serde_json::to_string(&Metric::gauge("g1", 1.5)).unwrap();
        assert_eq!(json.as_str(), r#"{"id":"g1","type":"gauge","value":1.5}"#);
    }

    #[test]
    fn test_reject_both_fields() {
        let json = r#"{"id":"x","type":"counter","delta":1,"value":1.0}"#;
        let error = serde_json::from_str::<Metric>(json).unwrap_err();
        assert!(error.to_string().contains("must not carry a value"), "{error}");
    }

    #[test]
    fn test_reject_missing_field() {
        let json = r#"{"id":"x","type":"gauge"}"#;
        let error = serde_json::from_str::<Metric>(json).unwrap_err();
        assert!(error.to_string().contains("missing its value"), "{error}");
    }

    #[test]
    fn test_reject_mismatched_field() {
        let json = r#"{"id":"x","type":"gauge","delta":4}"#;
        assert!(serde_json::from_str::<Metric>(json).is_err());
    }

    #[test]
    fn test_reject_empty_id() {
        let json = r#"{"id":"","type":"counter","delta":1}"#;
        assert!(serde_json::from_str::<Metric>(json).is_err());
    }

    #[test]
    fn test_reject_unknown_type() {
        let json = r#"{"id":"x","type":"histogram","value":1.0}"#;
        assert!(serde_json::from_str::<Metric>(json).is_err());
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(
            Metric::parse_path("gauge", "cpu", "9.1"),
            Ok(Metric::gauge("cpu", 9.1))
        );
        assert_eq!(
            Metric::parse_path("counter", "requests", "-2"),
            Ok(Metric::counter("requests", -2))
        );
    }

    #[test]
    fn test_parse_path_errors() {
        assert_eq!(
            Metric::parse_path("counter", "requests", "1.5"),
            Err(ParseMetricError::InvalidValue {
                ty: MetricType::Counter,
                value: "1.5".to_owned(),
            })
        );
        assert_eq!(
            Metric::parse_path("gauge", "cpu", "NaN"),
            Err(ParseMetricError::InvalidValue {
                ty: MetricType::Gauge,
                value: "NaN".to_owned(),
            })
        );
        assert_eq!(
            Metric::parse_path("summary", "cpu", "1"),
            Err(ParseMetricError::UnknownType("summary".to_owned()))
        );
        assert_eq!(
            Metric::parse_path("counter", "", "1"),
            Err(ParseMetricError::EmptyId)
        );
    }

    #[test]
    fn test_value_display() {
        assert_eq!(MetricValue::Counter(42).to_string().as_str(), "42");
        assert_eq!(MetricValue::Gauge(9.1).to_string().as_str(), "9.1");
        assert_eq!(MetricValue::Gauge(3.0).to_string().as_str(), "3");
        assert_eq!(MetricValue::Gauge(0.000123).to_string().as_str(), "0.000123");
    }

    #[test]
    fn test_merge_counter_adds() {
        let mut value = MetricValue::Counter(5);
        value.merge(MetricValue::Counter(3));
        assert_eq!(value, MetricValue::Counter(8));
    }

    #[test]
    fn test_merge_counter_saturates() {
        let mut value = MetricValue::Counter(i64::MAX - 1);
        value.merge(MetricValue::Counter(10));
        assert_eq!(value, MetricValue::Counter(i64::MAX));
    }

    #[test]
    fn test_merge_gauge_replaces() {
        let mut value = MetricValue::Gauge(12.5);
        value.merge(MetricValue::Gauge(9.1));
        assert_eq!(value, MetricValue::Gauge(9.1));
    }

    #[test]
    fn test_merge_type_change_replaces() {
        let mut value = MetricValue::Counter(10);
        value.merge(MetricValue::Gauge(0.5));
        assert_eq!(value, MetricValue::Gauge(0.5));

        value.merge(MetricValue::Counter(2));
        assert_eq!(value, MetricValue::Counter(2));
    }

    #[test]
    fn test_is_finite() {
        assert!(MetricValue::Counter(i64::MAX).is_finite());
        assert!(MetricValue::Gauge(0.0).is_finite());
        assert!(!MetricValue::Gauge(f64::NAN).is_finite());
        assert!(!MetricValue::Gauge(f64::INFINITY).is_finite());
    }
}
