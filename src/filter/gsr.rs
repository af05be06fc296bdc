//! Skin-conductance feature extraction.
//!
//! Maintains a sliding reaction window of raw conductance samples and, once
//! the window is full, derives the windowed mean, population standard
//! deviation, and an arousal feature per sample: the raw window is EMA
//! smoothed, z-scored against the cumulative mean, differentiated twice
//! with a 4-point central-difference estimator, and reduced to the mean of
//! a trailing root-sum-of-squares energy trace.

use crate::filter::{EventSink, Filter, FilterError};
use crate::reading::{
    attr, CapabilityDescriptor, FilterEvent, FilteredAttributes, Reading, ReadingInput, ValueKind,
};
use crate::window::SampleWindow;
use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;
use tracing::debug;
use uuid::Uuid;

/// Attribute keys recognized as raw conductance samples.
const CONDUCTANCE_KEYS: [&str; 2] = [attr::GSR_CONDUCTANCE, attr::EDA];

/// Configuration for the conductance feature filter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GsrConfig {
    /// Device sampling rate in Hz
    pub sampling_rate_hz: f64,
    /// Reaction window duration in seconds; the sample window capacity is
    /// this duration times the sampling rate
    pub reaction_window_secs: f64,
    /// EMA time constant and energy-trace span, in samples
    pub smoothing_span: f64,
}

impl Default for GsrConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: 60.0,
            reaction_window_secs: 50.0,
            smoothing_span: 30.0,
        }
    }
}

impl GsrConfig {
    /// Window capacity derived from the reaction window duration.
    pub fn window_capacity(&self) -> usize {
        (self.reaction_window_secs * self.sampling_rate_hz).round() as usize
    }

    fn validate(&self) -> Result<(), FilterError> {
        if self.sampling_rate_hz <= 0.0 {
            return Err(FilterError::InvalidConfig(format!(
                "sampling rate must be positive, got {}",
                self.sampling_rate_hz
            )));
        }
        if self.reaction_window_secs <= 0.0 || self.window_capacity() == 0 {
            return Err(FilterError::InvalidConfig(format!(
                "reaction window must span at least one sample, got {} s",
                self.reaction_window_secs
            )));
        }
        if self.smoothing_span < 1.0 {
            return Err(FilterError::InvalidConfig(format!(
                "smoothing span must be at least one sample, got {}",
                self.smoothing_span
            )));
        }
        Ok(())
    }
}

/// Windowed feature-extraction filter for skin conductance streams.
pub struct GsrFilter {
    config: GsrConfig,
    filter_id: Uuid,
    sensor_id: Uuid,
    descriptor: CapabilityDescriptor,
    window: SampleWindow,
    running: bool,
}

impl GsrFilter {
    /// Construct the filter; fails fast on an invalid configuration.
    pub fn new(sensor_id: Uuid, config: GsrConfig) -> Result<Self, FilterError> {
        config.validate()?;
        let window = SampleWindow::new(config.window_capacity());
        Ok(Self {
            config,
            filter_id: Uuid::new_v4(),
            sensor_id,
            descriptor: CapabilityDescriptor::of(&[
                (attr::GSR_MEAN, ValueKind::Scalar),
                (attr::GSR_STD, ValueKind::Scalar),
                (attr::GSR_FEATURE, ValueKind::Scalar),
                (attr::TEMPERATURE, ValueKind::Scalar),
                (attr::ACCELERATION_3D, ValueKind::Tuple3d),
            ]),
            window,
            running: false,
        })
    }

    /// Instance id of this filter.
    pub fn filter_id(&self) -> Uuid {
        self.filter_id
    }

    fn process_reading(&mut self, reading: &Reading, sink: &mut dyn EventSink) {
        // Only conductance-bearing samples are processed; anything else on
        // this stream is dropped.
        let Some(key) = CONDUCTANCE_KEYS
            .iter()
            .find(|k| reading.attributes.contains_key(**k))
        else {
            return;
        };
        let x = reading.attributes[*key].scalar_or_zero();
        self.window.push(x);

        if !self.window.is_full() {
            // Insufficient history; accumulate silently.
            return;
        }

        let mean = self.window.mean();
        let std = self.window.population_std();
        let feature = if std == 0.0 {
            // Flat window: defined as zero rather than dividing by zero.
            0.0
        } else {
            let samples = self.window.to_vec();
            let smoothed = ema(&samples, self.config.smoothing_span);
            let normalized: Vec<f64> = smoothed.iter().map(|s| (s - mean) / std).collect();
            let scale = self.config.sampling_rate_hz / 8.0;
            let first = central_difference(&normalized, scale);
            let second = central_difference(&first, scale);
            let trace = windowed_energy(&second, self.config.smoothing_span as usize);
            trace.mean()
        };

        let mut out = FilteredAttributes::from_reading(reading);
        out.attributes.remove(*key);
        out.insert(attr::GSR_MEAN, mean);
        out.insert(attr::GSR_STD, std);
        out.insert(attr::GSR_FEATURE, feature);
        sink.accept(FilterEvent {
            filter_id: self.filter_id,
            sensor_id: self.sensor_id,
            data: out,
        });
    }
}

impl Filter for GsrFilter {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn start(&mut self, session_start: DateTime<Utc>) -> Result<(), FilterError> {
        self.window.clear();
        self.running = true;
        debug!(
            capacity = self.config.window_capacity(),
            %session_start,
            "gsr filter started"
        );
        Ok(())
    }

    fn on_reading(&mut self, input: ReadingInput, sink: &mut dyn EventSink) {
        if !self.running {
            return;
        }
        match input {
            ReadingInput::Single(reading) => self.process_reading(&reading, sink),
            ReadingInput::Batch(batch) => {
                for reading in &batch {
                    self.process_reading(reading, sink);
                }
            }
        }
    }

    fn stop(&mut self) {
        self.running = false;
        debug!("gsr filter stopped");
    }
}

/// Exponential moving average over the window in insertion order:
/// `s[i] = (1/span)·x[i] + ((span-1)/span)·s[i-1]`, seeded with `s[-1] = 0`.
fn ema(samples: &[f64], span: f64) -> Vec<f64> {
    let alpha = 1.0 / span;
    let decay = (span - 1.0) / span;
    let mut prev = 0.0;
    samples
        .iter()
        .map(|x| {
            prev = alpha * x + decay * prev;
            prev
        })
        .collect()
}

/// 4-point central-difference derivative estimate. Terms referencing
/// indices outside the signal contribute zero instead of shrinking the
/// window; this boundary policy is load-bearing for the feature value.
fn central_difference(signal: &[f64], scale: f64) -> Vec<f64> {
    let len = signal.len() as isize;
    let at = |j: isize| {
        if j < 0 || j >= len {
            0.0
        } else {
            signal[j as usize]
        }
    };
    (0..len)
        .map(|i| (at(i - 2) - 8.0 * at(i - 1) + 8.0 * at(i + 1) - at(i + 2)) * scale)
        .collect()
}

/// Per-index root-sum-of-squares over the trailing `span` samples in
/// `[0, i)`.
fn windowed_energy(signal: &[f64], span: usize) -> Vec<f64> {
    (0..signal.len())
        .map(|i| {
            let start = i.saturating_sub(span);
            let sq_sum: f64 = signal[start..i].iter().map(|v| v * v).sum();
            sq_sum.sqrt()
        })
        .collect()
}
