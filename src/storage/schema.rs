//! Metric value model and relational row definitions
//!
//! ## Metric kinds
//!
//! Exactly two kinds exist, and the kind decides both the numeric
//! representation and the merge rule:
//!
//! - **Gauge**: `f64`, every update replaces the stored value
//! - **Counter**: `i64`, every update adds its delta to the stored value
//!
//! [`MetricValue`] is a tagged union over both representations, so a gauge
//! can never hold an integer accumulator and vice versa. Merge logic matches
//! on the variant instead of sniffing the shape of a number.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};

/// Values of one kind, keyed by metric name
pub type KindMetrics = BTreeMap<String, MetricValue>;

/// Full store state: kind -> name -> value
///
/// This is the unit of snapshot and restore.
pub type StoreState = BTreeMap<MetricKind, KindMetrics>;

/// Kind of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Point-in-time value, last write wins
    Gauge,

    /// Monotonically accumulating value
    Counter,
}

impl MetricKind {
    /// All kinds, in snapshot order
    pub const ALL: [MetricKind; 2] = [MetricKind::Gauge, MetricKind::Counter];

    /// Lowercase code used on the wire, in snapshots and in the database
    pub fn code(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for MetricKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        kind_from_code(s)
    }
}

/// Map a kind code (`"gauge"` / `"counter"`) to a [`MetricKind`]
pub fn kind_from_code(code: &str) -> StorageResult<MetricKind> {
    match code {
        "gauge" => Ok(MetricKind::Gauge),
        "counter" => Ok(MetricKind::Counter),
        other => Err(StorageError::InvalidKind(other.to_string())),
    }
}

/// A stored metric value
///
/// Serializes as a bare JSON number; the kind is carried by the enclosing
/// map key, never inferred from the number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// Parse raw text as an incoming value of the given kind
    pub fn parse(kind: MetricKind, raw: &str) -> StorageResult<Self> {
        let raw = raw.trim();
        match kind {
            MetricKind::Gauge => {
                let value: f64 = raw.parse().map_err(|_| {
                    StorageError::InvalidValue(format!("{:?} is not a valid gauge value", raw))
                })?;
                Self::gauge(value)
            }
            MetricKind::Counter => raw.parse().map(MetricValue::Counter).map_err(|_| {
                StorageError::InvalidValue(format!("{:?} is not a valid counter delta", raw))
            }),
        }
    }

    /// Build a gauge value, rejecting NaN and infinities
    pub fn gauge(value: f64) -> StorageResult<Self> {
        if value.is_finite() {
            Ok(MetricValue::Gauge(value))
        } else {
            Err(StorageError::InvalidValue(format!(
                "gauge value must be finite, got {}",
                value
            )))
        }
    }

    /// Merge an incoming value into the current one
    ///
    /// Gauges replace the current value. Counters add their delta to the
    /// current accumulator, which counts as 0 when absent or not a counter.
    pub fn merge(current: Option<&MetricValue>, incoming: MetricValue) -> StorageResult<Self> {
        match incoming {
            MetricValue::Gauge(_) => Ok(incoming),
            MetricValue::Counter(delta) => {
                let base = match current {
                    Some(MetricValue::Counter(total)) => *total,
                    _ => 0,
                };
                base.checked_add(delta)
                    .map(MetricValue::Counter)
                    .ok_or_else(|| {
                        StorageError::InvalidValue(format!(
                            "counter overflow adding {} to {}",
                            delta, base
                        ))
                    })
            }
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            MetricValue::Counter(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Counter(v) => Some(*v),
            MetricValue::Gauge(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{}", v),
            MetricValue::Counter(v) => write!(f, "{}", v),
        }
    }
}

/// Parse `incoming_raw` for `kind` and merge it into `current`
///
/// Fails with `InvalidValue` if the text is not a number of the kind's type.
pub fn parse_and_merge(
    kind: MetricKind,
    current: Option<&MetricValue>,
    incoming_raw: &str,
) -> StorageResult<MetricValue> {
    let incoming = MetricValue::parse(kind, incoming_raw)?;
    MetricValue::merge(current, incoming)
}

/// Reject empty metric names
pub fn validate_name(name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::InvalidName(
            "metric name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Check that every value matches the kind of the map holding it
pub fn validate_state(state: &StoreState) -> StorageResult<()> {
    for (kind, metrics) in state {
        for (name, value) in metrics {
            validate_name(name)?;
            if value.kind() != *kind {
                return Err(StorageError::InvalidValue(format!(
                    "metric {} holds a {} value under kind {}",
                    name,
                    value.kind(),
                    kind
                )));
            }
            if let MetricValue::Gauge(v) = value {
                MetricValue::gauge(*v)?;
            }
        }
    }
    Ok(())
}

/// A typed metric update
///
/// Wire form: `{"id": "hits", "type": "counter", "delta": 5}` or
/// `{"id": "temp", "type": "gauge", "value": 36.6}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: MetricKind,

    /// Counter delta (counters only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,

    /// Gauge value (gauges only)
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
            delta: Some(delta),
            value: None,
        }
    }

    /// Wire form of a stored value; a counter's `delta` carries its total
    pub fn from_value(id: impl Into<String>, value: MetricValue) -> Self {
        match value {
            MetricValue::Gauge(v) => Self::gauge(id, v),
            MetricValue::Counter(v) => Self::counter(id, v),
        }
    }

    /// Validate the update and extract the incoming value
    pub fn incoming(&self) -> StorageResult<MetricValue> {
        validate_name(&self.id)?;
        match self.kind {
            MetricKind::Gauge => {
                let value = self.value.ok_or_else(|| {
                    StorageError::InvalidValue(format!("gauge {} has no value", self.id))
                })?;
                MetricValue::gauge(value)
            }
            MetricKind::Counter => self.delta.map(MetricValue::Counter).ok_or_else(|| {
                StorageError::InvalidValue(format!("counter {} has no delta", self.id))
            }),
        }
    }
}

/// One row of the relational `metrics` table
///
/// Only the column matching `kind` is populated.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "storage-sqlite", derive(sqlx::FromRow))]
pub struct MetricRow {
    pub name: String,
    pub kind: String,
    pub counter: Option<i64>,
    pub gauge: Option<f64>,
}

impl MetricRow {
    pub fn from_value(name: impl Into<String>, value: MetricValue) -> Self {
        let (counter, gauge) = match value {
            MetricValue::Counter(v) => (Some(v), None),
            MetricValue::Gauge(v) => (None, Some(v)),
        };
        Self {
            name: name.into(),
            kind: value.kind().code().to_string(),
            counter,
            gauge,
        }
    }

    /// Convert back into a kind-correct value
    pub fn into_value(self) -> StorageResult<(MetricKind, String, MetricValue)> {
        let kind = kind_from_code(&self.kind)?;
        let value = match kind {
            MetricKind::Gauge => self.gauge.map(MetricValue::Gauge),
            MetricKind::Counter => self.counter.map(MetricValue::Counter),
        }
        .ok_or_else(|| {
            StorageError::QueryFailed(format!("row {}/{} has no {} column", self.name, kind, kind))
        })?;
        Ok((kind, self.name, value))
    }
}
