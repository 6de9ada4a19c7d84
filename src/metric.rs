//! Metric model shared by the agent and the server
//!
//! A metric is a name plus a closed [`MetricValue`]: either a gauge (`f64`,
//! last write wins) or a counter (`i64`, merged by addition). The JSON wire
//! form is [`MetricPayload`], which optionally carries an HMAC-SHA256
//! signature produced by a [`Signer`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Kind of a metric, as spelled on the wire and in URL paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(MetricError::UnknownKind(other.to_string())),
        }
    }
}

/// Value carried by a metric
#[derive(Debug, Clone, Copy, PartialEq)]
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

    /// Combine a stored value with an incoming update.
    ///
    /// Gauges are replaced. Counters are summed with saturating arithmetic, so
    /// a total pinned at `i64::MAX` or `i64::MIN` stays there instead of
    /// wrapping around.
    pub fn merge(self, update: MetricValue) -> Result<MetricValue, MetricError> {
        match (self, update) {
            (MetricValue::Gauge(_), MetricValue::Gauge(value)) => Ok(MetricValue::Gauge(value)),
            (MetricValue::Counter(stored), MetricValue::Counter(delta)) => {
                Ok(MetricValue::Counter(stored.saturating_add(delta)))
            }
            (stored, update) => Err(MetricError::KindMismatch {
                stored: stored.kind(),
                update: update.kind(),
            }),
        }
    }

    /// Parse a raw textual value (URL path form) for the given kind
    pub fn parse(kind: MetricKind, raw: &str) -> Result<MetricValue, MetricError> {
        let invalid = || MetricError::InvalidValue {
            kind,
            raw: raw.to_string(),
        };

        match kind {
            MetricKind::Gauge => {
                let value: f64 = raw.parse().map_err(|_| invalid())?;
                if !value.is_finite() {
                    return Err(invalid());
                }
                Ok(MetricValue::Gauge(value))
            }
            MetricKind::Counter => raw.parse().map(MetricValue::Counter).map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(value) => write!(f, "{value}"),
            MetricValue::Counter(delta) => write!(f, "{delta}"),
        }
    }
}

/// A named metric
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Counter(delta),
        }
    }

    /// Build a metric from the `/update/{type}/{name}/{value}` path segments
    pub fn parse(name: &str, kind: &str, raw_value: &str) -> Result<Self, MetricError> {
        if name.is_empty() {
            return Err(MetricError::EmptyName);
        }

        let kind: MetricKind = kind.parse()?;
        let value = MetricValue::parse(kind, raw_value)?;

        Ok(Self {
            name: name.to_string(),
            value,
        })
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// The string covered by the signature: `<id>:<type>:<value-or-delta>`.
    ///
    /// Gauges use the shortest form that parses back to the same `f64`, so
    /// every bit of the value is signed.
    pub fn canonical(&self) -> String {
        match self.value {
            MetricValue::Gauge(value) => format!("{}:gauge:{value}", self.name),
            MetricValue::Counter(delta) => format!("{}:counter:{delta}", self.name),
        }
    }
}

/// JSON wire representation of a metric
///
/// `type` stays a plain string here so that an unknown kind can be told apart
/// from a malformed body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl MetricPayload {
    /// Encode a metric for the wire, signing it when a signer is given
    pub fn encode(metric: &Metric, signer: Option<&Signer>) -> Result<Self, MetricError> {
        let (delta, value) = match metric.value {
            MetricValue::Gauge(value) => {
                // JSON has no representation for NaN or infinities
                if !value.is_finite() {
                    return Err(MetricError::NonFinite(metric.name.clone()));
                }
                (None, Some(value))
            }
            MetricValue::Counter(delta) => (Some(delta), None),
        };

        let hash = signer.map(|signer| signer.sign(metric));

        Ok(Self {
            id: metric.name.clone(),
            kind: metric.kind().to_string(),
            delta,
            value,
            hash,
        })
    }

    /// Parse just the kind; used by lookups that carry no value
    pub fn metric_kind(&self) -> Result<MetricKind, MetricError> {
        self.kind.parse()
    }
}

impl TryFrom<&MetricPayload> for Metric {
    type Error = MetricError;

    fn try_from(payload: &MetricPayload) -> Result<Self, Self::Error> {
        if payload.id.is_empty() {
            return Err(MetricError::EmptyName);
        }

        let kind = payload.metric_kind()?;
        let missing = || MetricError::MissingValue {
            name: payload.id.clone(),
            kind,
        };

        let unexpected = |field: &'static str| MetricError::UnexpectedField {
            name: payload.id.clone(),
            kind,
            field,
        };

        let value = match kind {
            MetricKind::Gauge if payload.delta.is_some() => return Err(unexpected("delta")),
            MetricKind::Counter if payload.value.is_some() => return Err(unexpected("value")),
            MetricKind::Gauge => MetricValue::Gauge(payload.value.ok_or_else(missing)?),
            MetricKind::Counter => MetricValue::Counter(payload.delta.ok_or_else(missing)?),
        };

        Ok(Metric {
            name: payload.id.clone(),
            value,
        })
    }
}

impl TryFrom<MetricPayload> for Metric {
    type Error = MetricError;

    fn try_from(payload: MetricPayload) -> Result<Self, Self::Error> {
        Metric::try_from(&payload)
    }
}

/// HMAC-SHA256 signer over [`Metric::canonical`]
#[derive(Clone)]
pub struct Signer {
    key: Arc<[u8]>,
}

impl Signer {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: Arc::from(key.as_ref()),
        }
    }

    /// `None` for a missing or empty key, which disables signing
    pub fn from_key(key: Option<&str>) -> Option<Self> {
        key.filter(|key| !key.is_empty()).map(Self::new)
    }

    fn mac(&self, metric: &Metric) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(metric.canonical().as_bytes());
        mac
    }

    /// Lower-hex signature of the metric
    pub fn sign(&self, metric: &Metric) -> String {
        hex::encode(self.mac(metric).finalize().into_bytes())
    }

    /// Check a hex signature in constant time
    pub fn verify(&self, metric: &Metric, hash: Option<&str>) -> Result<(), SignatureError> {
        let hash = hash.ok_or_else(|| SignatureError::Missing(metric.name.clone()))?;
        let expected =
            hex::decode(hash).map_err(|_| SignatureError::Malformed(metric.name.clone()))?;

        self.mac(metric)
            .verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch(metric.name.clone()))
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("key", &"<redacted>").finish()
    }
}

/// Errors produced while building or converting metrics
#[derive(Debug, Clone, PartialEq)]
pub enum MetricError {
    /// Type is neither `gauge` nor `counter`
    UnknownKind(String),

    /// Value could not be parsed for the given kind
    InvalidValue { kind: MetricKind, raw: String },

    /// `value` (gauge) or `delta` (counter) is absent
    MissingValue { name: String, kind: MetricKind },

    /// `delta` on a gauge or `value` on a counter
    UnexpectedField {
        name: String,
        kind: MetricKind,
        field: &'static str,
    },

    /// Metric name is empty
    EmptyName,

    /// Gauge is NaN or infinite and cannot be encoded
    NonFinite(String),

    /// Update kind differs from the stored kind
    KindMismatch {
        stored: MetricKind,
        update: MetricKind,
    },
}

impl fmt::Display for MetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricError::UnknownKind(kind) => write!(f, "unknown metric type '{kind}'"),
            MetricError::InvalidValue { kind, raw } => {
                write!(f, "invalid {kind} value '{raw}'")
            }
            MetricError::MissingValue { name, kind } => match kind {
                MetricKind::Gauge => write!(f, "gauge '{name}' has no value"),
                MetricKind::Counter => write!(f, "counter '{name}' has no delta"),
            },
            MetricError::UnexpectedField { name, kind, field } => {
                write!(f, "{kind} '{name}' must not carry '{field}'")
            }
            MetricError::EmptyName => write!(f, "metric name can not be blank"),
            MetricError::NonFinite(name) => write!(f, "gauge '{name}' is not a finite number"),
            MetricError::KindMismatch { stored, update } => {
                write!(f, "metric is a {stored}, got a {update} update")
            }
        }
    }
}

impl std::error::Error for MetricError {}

/// Errors produced while verifying a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    Missing(String),
    Malformed(String),
    Mismatch(String),
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureError::Missing(name) => write!(f, "metric '{name}' is not signed"),
            SignatureError::Malformed(name) => {
                write!(f, "metric '{name}' carries a malformed signature")
            }
            SignatureError::Mismatch(name) => write!(f, "wrong sign for metric '{name}'"),
        }
    }
}

impl std::error::Error for SignatureError {}
