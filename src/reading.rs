//! Core data types for the sensor filter pipeline.
//!
//! A sensor delivers timestamped [`Reading`]s (or a [`ReadingBatch`] when a
//! hardware driver buffers several ticks); a filter reduces them into
//! [`FilteredAttributes`] and wraps each emission in a [`FilterEvent`] for
//! routing. All timestamps are elapsed milliseconds since session start,
//! never wall-clock time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Well-known attribute names, matching the catalog the sensor hardware
/// advertises. Filters match on these keys; unknown keys are ignored.
pub mod attr {
    // Skin conductance (Q sensor and compatible electrodermal devices)
    pub const GSR_CONDUCTANCE: &str = "GSRConductance";
    pub const EDA: &str = "EDA";
    pub const GSR_MEAN: &str = "GSRMean";
    pub const GSR_STD: &str = "GSRStd";
    pub const GSR_FEATURE: &str = "GSRFeature";
    pub const TEMPERATURE: &str = "Temperature";
    pub const ACCELERATION_3D: &str = "Acceleration3d";

    // BioHarness chest strap
    pub const HEART_RATE: &str = "HEART_RATE";
    pub const RESPIRATION_RATE: &str = "RESPIRATION_RATE";
    pub const POSTURE: &str = "POSTURE";
    pub const ECG_WAVEFORM_SAMPLE: &str = "ECG_WAVEFORM_SAMPLE";
    pub const BREATHING_WAVEFORM_SAMPLE: &str = "BREATHING_WAVEFORM_SAMPLE";

    // Emotiv headset affective channels
    pub const LONG_TERM_EXCITEMENT: &str = "LongTermExcitement";
    pub const SHORT_TERM_EXCITEMENT: &str = "ShortTermExcitement";
    pub const MEDITATION: &str = "Meditation";
    pub const FRUSTRATION: &str = "Frustration";
    pub const ENGAGEMENT: &str = "Engagement";

    // Kinect skeleton joints (tracked subset)
    pub const HEAD: &str = "HEAD";
    pub const CENTER_SHOULDER: &str = "CENTER_SHOULDER";
    pub const CENTER_HIP: &str = "CENTER_HIP";
    pub const SPINE: &str = "SPINE";
    pub const LEFT_HAND: &str = "LEFT_HAND";
    pub const RIGHT_HAND: &str = "RIGHT_HAND";
    pub const LEFT_SHOULDER: &str = "LEFT_SHOULDER";
    pub const RIGHT_SHOULDER: &str = "RIGHT_SHOULDER";
    pub const LEFT_KNEE: &str = "LEFT_KNEE";
    pub const RIGHT_KNEE: &str = "RIGHT_KNEE";
    pub const LEFT_FOOT: &str = "LEFT_FOOT";
    pub const RIGHT_FOOT: &str = "RIGHT_FOOT";

    // Synthetic self-test source
    pub const SINE_WAVE: &str = "SineWave";
}

/// A single sensor attribute payload. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Numeric scalar sample (conductance, heart rate, waveform tick, ...)
    Scalar(f64),
    /// 3D tuple (joint position, acceleration vector)
    Tuple3d([f64; 3]),
    /// Non-numeric payload (posture labels, device status strings)
    Text(String),
}

impl AttributeValue {
    /// Numeric view of the value. Malformed or non-numeric payloads default
    /// to zero rather than aborting the sample.
    pub fn scalar_or_zero(&self) -> f64 {
        match self {
            AttributeValue::Scalar(v) => *v,
            AttributeValue::Tuple3d(_) => 0.0,
            AttributeValue::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }

    /// The kind tag used by capability advertisement.
    pub fn kind(&self) -> ValueKind {
        match self {
            AttributeValue::Scalar(_) => ValueKind::Scalar,
            AttributeValue::Tuple3d(_) => ValueKind::Tuple3d,
            AttributeValue::Text(_) => ValueKind::Text,
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Scalar(v)
    }
}

impl From<[f64; 3]> for AttributeValue {
    fn from(v: [f64; 3]) -> Self {
        AttributeValue::Tuple3d(v)
    }
}

/// Value kind advertised by a [`CapabilityDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Scalar,
    Tuple3d,
    Text,
}

/// One timestamped set of raw sensor attribute values.
///
/// `elapsed_ms` is monotonic milliseconds since the start of the monitored
/// session. The attribute map is ordered so batch replays stay deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Milliseconds since session start
    pub elapsed_ms: i64,
    /// Attribute name to value
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Reading {
    /// Create an empty reading at the given elapsed time.
    pub fn new(elapsed_ms: i64) -> Self {
        Self {
            elapsed_ms,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute insertion.
    pub fn with(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Whether the reading carries any of the given attribute keys.
    pub fn has_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.attributes.contains_key(*k))
    }
}

/// Several readings delivered together by a buffering driver. Each element
/// is an independent sample and is filtered in arrival order.
pub type ReadingBatch = Vec<Reading>;

/// The two payload shapes a filter can be handed, resolved once at the
/// ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingInput {
    Single(Reading),
    Batch(ReadingBatch),
}

impl ReadingInput {
    /// Decode a raw JSON payload from the event boundary. Payloads that are
    /// neither a single reading nor a batch of readings are an error; the
    /// caller logs and drops them.
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Iterate the contained readings in arrival order.
    pub fn readings(&self) -> impl Iterator<Item = &Reading> {
        match self {
            ReadingInput::Single(r) => std::slice::from_ref(r).iter(),
            ReadingInput::Batch(b) => b.iter(),
        }
    }
}

impl From<Reading> for ReadingInput {
    fn from(r: Reading) -> Self {
        ReadingInput::Single(r)
    }
}

impl From<ReadingBatch> for ReadingInput {
    fn from(b: ReadingBatch) -> Self {
        ReadingInput::Batch(b)
    }
}

/// The reduced attribute map a filter emits. Owned by the downstream
/// consumer once emitted; filters retain no reference to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredAttributes {
    /// Milliseconds since session start of the source sample
    pub elapsed_ms: i64,
    /// Reduced attribute map
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl FilteredAttributes {
    /// Create an empty emission at the given elapsed time.
    pub fn new(elapsed_ms: i64) -> Self {
        Self {
            elapsed_ms,
            attributes: BTreeMap::new(),
        }
    }

    /// Carry over the full attribute map of a reading.
    pub fn from_reading(reading: &Reading) -> Self {
        Self {
            elapsed_ms: reading.elapsed_ms,
            attributes: reading.attributes.clone(),
        }
    }

    /// Carry over only the allow-listed attributes of a reading.
    pub fn from_reading_pruned(reading: &Reading, allow: &[&str]) -> Self {
        let attributes = reading
            .attributes
            .iter()
            .filter(|(k, _)| allow.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            elapsed_ms: reading.elapsed_ms,
            attributes,
        }
    }

    /// Insert a derived attribute.
    pub fn insert(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.to_string(), value.into());
    }
}

/// Routing envelope binding an emission to the filter and sensor it came
/// from. Used by the external event boundary; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterEvent {
    /// Instance id of the emitting filter
    pub filter_id: Uuid,
    /// Instance id of the originating sensor
    pub sensor_id: Uuid,
    /// The reduced attributes
    pub data: FilteredAttributes,
}

/// One (attribute-name, value-kind) pair a filter type can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityEntry {
    pub name: String,
    pub kind: ValueKind,
}

/// Static advertisement of everything a filter type can ever emit.
///
/// Built once at construction and queried by consumers to validate wiring
/// before a session starts; never recomputed per event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub entries: Vec<CapabilityEntry>,
}

impl CapabilityDescriptor {
    /// Build a descriptor from (name, kind) pairs.
    pub fn of(entries: &[(&str, ValueKind)]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(name, kind)| CapabilityEntry {
                    name: name.to_string(),
                    kind: *kind,
                })
                .collect(),
        }
    }

    /// Whether the descriptor advertises the given attribute name.
    pub fn advertises(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }
}
