use serde::{Deserialize, Serialize};

/// Errors produced while parsing or validating a metric record.
///
/// These are the wire-level sentinels: the HTTP layer maps each variant to a
/// stable status code and message, so the `Display` strings are part of the
/// external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    #[error("invalid metric value")]
    InvalidValue,
    #[error("unsupported metric type")]
    UnsupportedKind,
    #[error("missing gauge value")]
    MissingValue,
    #[error("missing counter delta")]
    MissingDelta,
}

/// The two metric kinds. A gauge keeps the most recent sample; a counter
/// accumulates deltas. `(name, kind)` pairs live in separate namespaces, so
/// a gauge and a counter may share a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Counter => write!(f, "counter"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(MetricError::UnsupportedKind),
        }
    }
}

/// A single metric record as it travels on the wire.
///
/// Exactly one of `delta`/`value` is meaningful, chosen by `kind`: counters
/// carry a signed 64-bit delta, gauges a 64-bit float sample. The accessors
/// below enforce that shape instead of the callers poking at the options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: None,
            value: None,
        }
        .with_delta(delta)
    }

    fn with_delta(mut self, delta: i64) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Builds a metric from URL path parameters, parsing the value according
    /// to the declared kind. Gauges accept any base-10 float form including
    /// signs and fractions; counters accept base-10 signed integers only.
    pub fn from_params(kind: &str, name: &str, value: &str) -> Result<Self, MetricError> {
        let kind: MetricKind = kind.parse()?;
        match kind {
            MetricKind::Gauge => {
                let value: f64 = value.parse().map_err(|_| MetricError::InvalidValue)?;
                Ok(Metric::gauge(name, value))
            }
            MetricKind::Counter => {
                let delta: i64 = value.parse().map_err(|_| MetricError::InvalidValue)?;
                Ok(Metric::counter(name, delta))
            }
        }
    }

    pub fn gauge_value(&self) -> Result<f64, MetricError> {
        self.value.ok_or(MetricError::MissingValue)
    }

    pub fn counter_delta(&self) -> Result<i64, MetricError> {
        self.delta.ok_or(MetricError::MissingDelta)
    }

    /// Display string for the carried value: shortest round-trippable
    /// decimal for gauges, plain decimal for counters.
    pub fn value_string(&self) -> Result<String, MetricError> {
        match self.kind {
            MetricKind::Gauge => Ok(format!("{}", self.gauge_value()?)),
            MetricKind::Counter => Ok(format!("{}", self.counter_delta()?)),
        }
    }
}

/// Post-commit audit record. Delivery is best-effort; see the server's
/// audit publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(rename = "ts")]
    pub timestamp: i64,
    pub metrics: Vec<String>,
    #[serde(rename = "ip_address")]
    pub ip_address: String,
}

impl AuditEvent {
    pub fn new(metrics: Vec<String>, ip_address: impl Into<String>) -> Self {
        Self {
            timestamp: unix_now(),
            metrics,
            ip_address: ip_address.into(),
        }
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
