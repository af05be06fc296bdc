//! Rate-gated passthrough filters.
//!
//! The original deployment carried one filter class per device; here a
//! single [`RateGatedFilter`] is parameterized by a small rule-set value
//! object, with one preset per physical stream type. Each rule gates how
//! often readings carrying its trigger attributes are forwarded, and may
//! prune the forwarded map down to an allow-list when the raw payload is
//! large (full-body joint sets, raw EEG channels).

use crate::filter::{EventSink, Filter, FilterError};
use crate::reading::{
    attr, CapabilityDescriptor, FilterEvent, FilteredAttributes, Reading, ReadingInput, ValueKind,
};
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

/// Default minimum spacing between forwarded events, one second.
pub const DEFAULT_INTERVAL_MS: i64 = 1000;

/// Spacing for the Emotiv affective channels.
pub const EMOTIV_INTERVAL_MS: i64 = 250;

/// Spacing for Kinect skeleton tracking, matching the device's default
/// tracking sample interval of five seconds.
pub const KINECT_INTERVAL_MS: i64 = 5000;

/// Fast gate for continuous BioHarness waveforms.
pub const BIOHARNESS_WAVEFORM_INTERVAL_MS: i64 = 250;

/// Slow gate for discrete BioHarness vitals.
pub const BIOHARNESS_VITALS_INTERVAL_MS: i64 = 1000;

/// One independent gate: which attribute keys trigger it, how often it
/// forwards, and whether the forwarded map is pruned.
#[derive(Debug, Clone)]
pub struct GateRule {
    /// Short label used in logs
    pub label: &'static str,
    /// Attribute keys that select this rule; empty matches every reading
    pub triggers: Vec<String>,
    /// Minimum elapsed-time spacing between forwarded events
    pub min_interval_ms: i64,
    /// Allow-list applied before forwarding; `None` forwards the full map
    pub forward: Option<Vec<String>>,
}

impl GateRule {
    /// Catch-all rule forwarding the full attribute map.
    pub fn catch_all(min_interval_ms: i64) -> Self {
        Self {
            label: "all",
            triggers: Vec::new(),
            min_interval_ms,
            forward: None,
        }
    }

    /// Rule triggered by any of `triggers`, forwarding the full map.
    pub fn on(label: &'static str, triggers: &[&str], min_interval_ms: i64) -> Self {
        Self {
            label,
            triggers: triggers.iter().map(|s| s.to_string()).collect(),
            min_interval_ms,
            forward: None,
        }
    }

    /// Rule triggered by any of `triggers`, pruning the forwarded map to
    /// `allow`.
    pub fn pruned(
        label: &'static str,
        triggers: &[&str],
        min_interval_ms: i64,
        allow: &[&str],
    ) -> Self {
        Self {
            label,
            triggers: triggers.iter().map(|s| s.to_string()).collect(),
            min_interval_ms,
            forward: Some(allow.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn matches(&self, reading: &Reading) -> bool {
        self.triggers.is_empty()
            || self
                .triggers
                .iter()
                .any(|k| reading.attributes.contains_key(k))
    }
}

/// Rate-bounded passthrough filter driven by a rule set.
pub struct RateGatedFilter {
    name: &'static str,
    filter_id: Uuid,
    sensor_id: Uuid,
    descriptor: CapabilityDescriptor,
    rules: Vec<GateRule>,
    /// Elapsed time of the last forwarded reading per rule; `None` means
    /// nothing sent yet, so the first matching sample always passes.
    last_sent: Vec<Option<i64>>,
    running: bool,
}

impl RateGatedFilter {
    /// Construct a filter from an explicit rule set.
    pub fn with_rules(
        name: &'static str,
        sensor_id: Uuid,
        rules: Vec<GateRule>,
        descriptor: CapabilityDescriptor,
    ) -> Result<Self, FilterError> {
        if rules.is_empty() {
            return Err(FilterError::InvalidConfig(format!(
                "{name}: at least one gate rule is required"
            )));
        }
        for rule in &rules {
            if rule.min_interval_ms < 0 {
                return Err(FilterError::InvalidConfig(format!(
                    "{name}: rule '{}' has a negative interval",
                    rule.label
                )));
            }
        }
        let last_sent = vec![None; rules.len()];
        Ok(Self {
            name,
            filter_id: Uuid::new_v4(),
            sensor_id,
            descriptor,
            rules,
            last_sent,
            running: false,
        })
    }

    /// Catch-all passthrough for sensors without a dedicated preset. The
    /// descriptor is empty: the filter forwards whatever its sensor
    /// produces, so wiring validation falls back to the sensor's own
    /// advertisement.
    pub fn generic(sensor_id: Uuid, min_interval_ms: i64) -> Result<Self, FilterError> {
        Self::with_rules(
            "generic",
            sensor_id,
            vec![GateRule::catch_all(min_interval_ms)],
            CapabilityDescriptor::default(),
        )
    }

    /// Gate for the synthetic sine-wave self-test source.
    pub fn sine_wave(sensor_id: Uuid) -> Result<Self, FilterError> {
        Self::with_rules(
            "sine-wave",
            sensor_id,
            vec![GateRule::on("sine", &[attr::SINE_WAVE], DEFAULT_INTERVAL_MS)],
            CapabilityDescriptor::of(&[(attr::SINE_WAVE, ValueKind::Scalar)]),
        )
    }

    /// Gate for the Emotiv headset: forwards the affective channels at a
    /// bounded rate and prunes away the raw EEG channel payload.
    pub fn emotiv(sensor_id: Uuid) -> Result<Self, FilterError> {
        const AFFECTIVE: [&str; 5] = [
            attr::LONG_TERM_EXCITEMENT,
            attr::SHORT_TERM_EXCITEMENT,
            attr::MEDITATION,
            attr::FRUSTRATION,
            attr::ENGAGEMENT,
        ];
        Self::with_rules(
            "emotiv",
            sensor_id,
            vec![GateRule::pruned(
                "affective",
                &AFFECTIVE,
                EMOTIV_INTERVAL_MS,
                &AFFECTIVE,
            )],
            CapabilityDescriptor::of(&[
                (attr::LONG_TERM_EXCITEMENT, ValueKind::Scalar),
                (attr::SHORT_TERM_EXCITEMENT, ValueKind::Scalar),
                (attr::MEDITATION, ValueKind::Scalar),
                (attr::FRUSTRATION, ValueKind::Scalar),
                (attr::ENGAGEMENT, ValueKind::Scalar),
            ]),
        )
    }

    /// Gate for Kinect skeleton tracking: full-body joint sets are pruned
    /// down to the joints learner-state consumers actually read.
    pub fn kinect(sensor_id: Uuid) -> Result<Self, FilterError> {
        const JOINTS: [&str; 6] = [
            attr::HEAD,
            attr::CENTER_SHOULDER,
            attr::SPINE,
            attr::CENTER_HIP,
            attr::LEFT_HAND,
            attr::RIGHT_HAND,
        ];
        Self::with_rules(
            "kinect",
            sensor_id,
            vec![GateRule::pruned(
                "skeleton",
                &JOINTS,
                KINECT_INTERVAL_MS,
                &JOINTS,
            )],
            CapabilityDescriptor::of(&[
                (attr::HEAD, ValueKind::Tuple3d),
                (attr::CENTER_SHOULDER, ValueKind::Tuple3d),
                (attr::SPINE, ValueKind::Tuple3d),
                (attr::CENTER_HIP, ValueKind::Tuple3d),
                (attr::LEFT_HAND, ValueKind::Tuple3d),
                (attr::RIGHT_HAND, ValueKind::Tuple3d),
            ]),
        )
    }

    /// Gate for the BioHarness chest strap: two independent gates, a fast
    /// one for the continuous waveforms and a slow one for discrete vitals.
    pub fn bioharness(sensor_id: Uuid) -> Result<Self, FilterError> {
        Self::with_rules(
            "bioharness",
            sensor_id,
            vec![
                GateRule::on(
                    "waveform",
                    &[attr::ECG_WAVEFORM_SAMPLE, attr::BREATHING_WAVEFORM_SAMPLE],
                    BIOHARNESS_WAVEFORM_INTERVAL_MS,
                ),
                GateRule::on(
                    "vitals",
                    &[attr::HEART_RATE, attr::RESPIRATION_RATE, attr::POSTURE],
                    BIOHARNESS_VITALS_INTERVAL_MS,
                ),
            ],
            CapabilityDescriptor::of(&[
                (attr::ECG_WAVEFORM_SAMPLE, ValueKind::Scalar),
                (attr::BREATHING_WAVEFORM_SAMPLE, ValueKind::Scalar),
                (attr::HEART_RATE, ValueKind::Scalar),
                (attr::RESPIRATION_RATE, ValueKind::Scalar),
                (attr::POSTURE, ValueKind::Scalar),
            ]),
        )
    }

    /// Instance id of this filter.
    pub fn filter_id(&self) -> Uuid {
        self.filter_id
    }

    fn process_reading(&mut self, reading: &Reading, sink: &mut dyn EventSink) {
        // First matching rule wins; a reading matching no rule is dropped
        // silently (e.g. a raw waveform sample arriving at a vitals-only
        // gate).
        let Some(idx) = self.rules.iter().position(|r| r.matches(reading)) else {
            return;
        };
        let rule = &self.rules[idx];

        let passes = match self.last_sent[idx] {
            None => true,
            // Strictly greater-than: an exactly-equal delta never passes.
            Some(t0) => reading.elapsed_ms - t0 > rule.min_interval_ms,
        };
        if !passes {
            debug!(
                filter = self.name,
                rule = rule.label,
                elapsed_ms = reading.elapsed_ms,
                "gate closed, reading dropped"
            );
            return;
        }

        let data = match &rule.forward {
            Some(allow) => {
                let allow: Vec<&str> = allow.iter().map(|s| s.as_str()).collect();
                FilteredAttributes::from_reading_pruned(reading, &allow)
            }
            None => FilteredAttributes::from_reading(reading),
        };
        self.last_sent[idx] = Some(reading.elapsed_ms);
        sink.accept(FilterEvent {
            filter_id: self.filter_id,
            sensor_id: self.sensor_id,
            data,
        });
    }
}

impl Filter for RateGatedFilter {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn start(&mut self, session_start: DateTime<Utc>) -> Result<(), FilterError> {
        for slot in &mut self.last_sent {
            *slot = None;
        }
        self.running = true;
        debug!(filter = self.name, %session_start, "rate gate started");
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
        debug!(filter = self.name, "rate gate stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::ReadingBatch;

    fn started(mut filter: RateGatedFilter) -> RateGatedFilter {
        filter.start(Utc::now()).unwrap();
        filter
    }

    fn sine_reading(elapsed_ms: i64) -> Reading {
        Reading::new(elapsed_ms).with(attr::SINE_WAVE, 0.5)
    }

    #[test]
    fn test_first_sample_always_passes() {
        let mut filter = started(RateGatedFilter::sine_wave(Uuid::new_v4()).unwrap());
        let mut sink: Vec<FilterEvent> = Vec::new();
        filter.on_reading(sine_reading(0).into(), &mut sink);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_equal_delta_does_not_pass() {
        let mut filter = started(RateGatedFilter::sine_wave(Uuid::new_v4()).unwrap());
        let mut sink: Vec<FilterEvent> = Vec::new();
        filter.on_reading(sine_reading(0).into(), &mut sink);
        filter.on_reading(sine_reading(1000).into(), &mut sink); // delta == interval
        filter.on_reading(sine_reading(1001).into(), &mut sink); // delta > interval
        let times: Vec<i64> = sink.iter().map(|e| e.data.elapsed_ms).collect();
        assert_eq!(times, vec![0, 1001]);
    }

    #[test]
    fn test_gate_scenario_sequence() {
        // interval=1000ms, readings at 0,500,1100,1600,2200 -> [0,1100,2200]
        let mut filter = started(RateGatedFilter::sine_wave(Uuid::new_v4()).unwrap());
        let mut sink: Vec<FilterEvent> = Vec::new();
        for t in [0, 500, 1100, 1600, 2200] {
            filter.on_reading(sine_reading(t).into(), &mut sink);
        }
        let times: Vec<i64> = sink.iter().map(|e| e.data.elapsed_ms).collect();
        assert_eq!(times, vec![0, 1100, 2200]);
    }

    #[test]
    fn test_unmatched_reading_dropped_silently() {
        let mut filter = started(RateGatedFilter::sine_wave(Uuid::new_v4()).unwrap());
        let mut sink: Vec<FilterEvent> = Vec::new();
        let reading = Reading::new(0).with(attr::HEART_RATE, 70.0);
        filter.on_reading(reading.into(), &mut sink);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_emotiv_prunes_raw_channels() {
        let mut filter = started(RateGatedFilter::emotiv(Uuid::new_v4()).unwrap());
        let mut sink: Vec<FilterEvent> = Vec::new();
        let reading = Reading::new(0)
            .with(attr::ENGAGEMENT, 0.7)
            .with(attr::MEDITATION, 0.2)
            .with("EE_CHAN_F7", 4201.3)
            .with("ED_GYROX", 12.0);
        filter.on_reading(reading.into(), &mut sink);
        assert_eq!(sink.len(), 1);
        let attrs = &sink[0].data.attributes;
        assert!(attrs.contains_key(attr::ENGAGEMENT));
        assert!(attrs.contains_key(attr::MEDITATION));
        assert!(!attrs.contains_key("EE_CHAN_F7"));
        assert!(!attrs.contains_key("ED_GYROX"));
    }

    #[test]
    fn test_bioharness_gates_are_independent() {
        let mut filter = started(RateGatedFilter::bioharness(Uuid::new_v4()).unwrap());
        let mut sink: Vec<FilterEvent> = Vec::new();

        // Waveform at t=0 passes the fast gate; vitals at t=10 pass the
        // slow gate even though the fast gate just fired.
        filter.on_reading(
            Reading::new(0).with(attr::ECG_WAVEFORM_SAMPLE, 0.02).into(),
            &mut sink,
        );
        filter.on_reading(
            Reading::new(10).with(attr::HEART_RATE, 68.0).into(),
            &mut sink,
        );
        assert_eq!(sink.len(), 2);

        // Another waveform inside the fast gate's interval is dropped;
        // one outside it passes.
        filter.on_reading(
            Reading::new(200).with(attr::ECG_WAVEFORM_SAMPLE, 0.03).into(),
            &mut sink,
        );
        filter.on_reading(
            Reading::new(300).with(attr::ECG_WAVEFORM_SAMPLE, 0.04).into(),
            &mut sink,
        );
        assert_eq!(sink.len(), 3);
        assert_eq!(sink[2].data.elapsed_ms, 300);
    }

    #[test]
    fn test_batch_processed_in_order() {
        let mut filter = started(RateGatedFilter::generic(Uuid::new_v4(), 100).unwrap());
        let mut sink: Vec<FilterEvent> = Vec::new();
        let batch: ReadingBatch = vec![sine_reading(0), sine_reading(50), sine_reading(150)];
        filter.on_reading(batch.into(), &mut sink);
        let times: Vec<i64> = sink.iter().map(|e| e.data.elapsed_ms).collect();
        assert_eq!(times, vec![0, 150]);
    }

    #[test]
    fn test_stop_makes_on_reading_noop_until_restart() {
        let mut filter = started(RateGatedFilter::sine_wave(Uuid::new_v4()).unwrap());
        let mut sink: Vec<FilterEvent> = Vec::new();
        filter.on_reading(sine_reading(0).into(), &mut sink);
        filter.stop();
        filter.on_reading(sine_reading(5000).into(), &mut sink);
        assert_eq!(sink.len(), 1);

        // Restart resets the gate: the first sample passes again.
        filter.start(Utc::now()).unwrap();
        filter.on_reading(sine_reading(5001).into(), &mut sink);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_invalid_rule_set_rejected() {
        assert!(RateGatedFilter::with_rules(
            "bad",
            Uuid::new_v4(),
            vec![],
            CapabilityDescriptor::default()
        )
        .is_err());
        assert!(RateGatedFilter::generic(Uuid::new_v4(), -1).is_err());
    }
}
