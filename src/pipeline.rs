//! Session assembly: binds sensor streams to filters and routes payloads.
//!
//! Each sensor stream is bound to exactly one filter instance. Raw JSON
//! payloads are decoded here, handed to the bound filter, and whatever the
//! filter emits is forwarded to the caller's sink while the shared session
//! counters are kept current. Payloads that do not decode are dropped and
//! counted, never fatal.

use crate::filter::{EventSink, Filter, FilterError};
use crate::reading::{FilterEvent, ReadingInput};
use crate::stats::SharedPipelineStats;
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One sensor stream bound to its filter.
pub struct FilterBinding {
    pub sensor_id: Uuid,
    pub sensor_name: String,
    pub filter: Box<dyn Filter>,
}

/// The running set of filter bindings for a session.
pub struct Pipeline {
    bindings: Vec<FilterBinding>,
    stats: SharedPipelineStats,
    running: bool,
}

/// Sink adapter counting forwarded events on the shared stats.
struct CountingSink<'a> {
    inner: &'a mut dyn EventSink,
    forwarded: u64,
}

impl EventSink for CountingSink<'_> {
    fn accept(&mut self, event: FilterEvent) {
        self.forwarded += 1;
        self.inner.accept(event);
    }
}

impl Pipeline {
    /// Create an empty pipeline sharing the given session counters.
    pub fn new(stats: SharedPipelineStats) -> Self {
        Self {
            bindings: Vec::new(),
            stats,
            running: false,
        }
    }

    /// Bind a named sensor stream to a filter. Returns the sensor id used
    /// to route payloads to this binding.
    pub fn bind(&mut self, sensor_name: &str, filter: Box<dyn Filter>) -> Uuid {
        let sensor_id = Uuid::new_v4();
        debug!(sensor = sensor_name, %sensor_id, "filter bound");
        self.bindings.push(FilterBinding {
            sensor_id,
            sensor_name: sensor_name.to_string(),
            filter,
        });
        sensor_id
    }

    /// Number of bound sensor streams.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Shared session counters.
    pub fn stats(&self) -> &SharedPipelineStats {
        &self.stats
    }

    /// Start every bound filter with a common session start time. Any
    /// filter failing to start aborts the session; filters already started
    /// are stopped again.
    pub fn start(&mut self) -> Result<(), FilterError> {
        let session_start = Utc::now();
        for i in 0..self.bindings.len() {
            if let Err(e) = self.bindings[i].filter.start(session_start) {
                warn!(
                    sensor = %self.bindings[i].sensor_name,
                    error = %e,
                    "filter failed to start"
                );
                for binding in &mut self.bindings[..i] {
                    binding.filter.stop();
                }
                return Err(e);
            }
        }
        self.running = true;
        info!(bindings = self.bindings.len(), %session_start, "pipeline started");
        Ok(())
    }

    /// Stop every bound filter.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        for binding in &mut self.bindings {
            binding.filter.stop();
        }
        self.running = false;
        info!("pipeline stopped");
    }

    /// Decode a raw JSON payload and route it to the bound filter.
    pub fn dispatch_json(&mut self, sensor_id: Uuid, payload: &str, sink: &mut dyn EventSink) {
        match ReadingInput::from_json(payload) {
            Ok(input) => self.dispatch(sensor_id, input, sink),
            Err(e) => {
                self.stats.record_decode_error();
                error!(%sensor_id, error = %e, "dropping undecodable payload");
            }
        }
    }

    /// Route an already-decoded input to the bound filter.
    pub fn dispatch(&mut self, sensor_id: Uuid, input: ReadingInput, sink: &mut dyn EventSink) {
        if !self.running {
            return;
        }
        let Some(binding) = self
            .bindings
            .iter_mut()
            .find(|b| b.sensor_id == sensor_id)
        else {
            warn!(%sensor_id, "no filter bound for sensor");
            return;
        };

        let received = input.readings().count() as u64;
        self.stats.record_readings(received);
        if matches!(input, ReadingInput::Batch(_)) {
            self.stats.record_batch();
        }

        let mut counting = CountingSink {
            inner: sink,
            forwarded: 0,
        };
        binding.filter.on_reading(input, &mut counting);

        let forwarded = counting.forwarded;
        self.stats.record_events_forwarded(forwarded);
        self.stats
            .record_readings_gated(received.saturating_sub(forwarded));
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RateGatedFilter;
    use crate::reading::{attr, Reading};
    use crate::stats::create_shared_stats;

    fn sine_pipeline() -> (Pipeline, Uuid) {
        let mut pipeline = Pipeline::new(create_shared_stats());
        let filter = RateGatedFilter::sine_wave(Uuid::new_v4()).unwrap();
        let sensor_id = pipeline.bind("sine", Box::new(filter));
        pipeline.start().unwrap();
        (pipeline, sensor_id)
    }

    #[test]
    fn test_dispatch_routes_and_counts() {
        let (mut pipeline, sensor_id) = sine_pipeline();
        let mut sink: Vec<FilterEvent> = Vec::new();

        for t in [0, 500, 1100] {
            let reading = Reading::new(t).with(attr::SINE_WAVE, 0.5);
            pipeline.dispatch(sensor_id, reading.into(), &mut sink);
        }

        assert_eq!(sink.len(), 2);
        let snapshot = pipeline.stats().snapshot();
        assert_eq!(snapshot.readings_received, 3);
        assert_eq!(snapshot.events_forwarded, 2);
        assert_eq!(snapshot.readings_gated, 1);
    }

    #[test]
    fn test_dispatch_json_single_and_batch() {
        let (mut pipeline, sensor_id) = sine_pipeline();
        let mut sink: Vec<FilterEvent> = Vec::new();

        pipeline.dispatch_json(
            sensor_id,
            r#"{"elapsed_ms": 0, "attributes": {"SineWave": 0.1}}"#,
            &mut sink,
        );
        pipeline.dispatch_json(
            sensor_id,
            r#"[{"elapsed_ms": 1100, "attributes": {"SineWave": 0.2}},
                {"elapsed_ms": 1200, "attributes": {"SineWave": 0.3}}]"#,
            &mut sink,
        );

        assert_eq!(sink.len(), 2);
        let snapshot = pipeline.stats().snapshot();
        assert_eq!(snapshot.readings_received, 3);
        assert_eq!(snapshot.batches_received, 1);
    }

    #[test]
    fn test_undecodable_payload_is_dropped() {
        let (mut pipeline, sensor_id) = sine_pipeline();
        let mut sink: Vec<FilterEvent> = Vec::new();

        pipeline.dispatch_json(sensor_id, "not json at all", &mut sink);
        pipeline.dispatch_json(sensor_id, r#"{"shape": "wrong"}"#, &mut sink);

        assert!(sink.is_empty());
        assert_eq!(pipeline.stats().snapshot().decode_errors, 2);
    }

    #[test]
    fn test_unbound_sensor_is_ignored() {
        let (mut pipeline, _) = sine_pipeline();
        let mut sink: Vec<FilterEvent> = Vec::new();

        let reading = Reading::new(0).with(attr::SINE_WAVE, 0.5);
        pipeline.dispatch(Uuid::new_v4(), reading.into(), &mut sink);

        assert!(sink.is_empty());
        assert_eq!(pipeline.stats().snapshot().readings_received, 0);
    }

    #[test]
    fn test_stopped_pipeline_dispatches_nothing() {
        let (mut pipeline, sensor_id) = sine_pipeline();
        pipeline.stop();

        let mut sink: Vec<FilterEvent> = Vec::new();
        let reading = Reading::new(0).with(attr::SINE_WAVE, 0.5);
        pipeline.dispatch(sensor_id, reading.into(), &mut sink);
        assert!(sink.is_empty());
    }
}
