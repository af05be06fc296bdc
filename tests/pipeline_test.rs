//! End-to-end tests for the filter pipeline.

use sensor_filter_pipeline::filter::{
    DetectionClient, DetectionError, GsrConfig, GsrFilter, QrsFilter, RateGatedFilter,
};
use sensor_filter_pipeline::pipeline::Pipeline;
use sensor_filter_pipeline::reading::{attr, FilterEvent, Reading, ReadingBatch};
use sensor_filter_pipeline::stats::create_shared_stats;
use uuid::Uuid;

fn sine_reading(elapsed_ms: i64) -> Reading {
    Reading::new(elapsed_ms).with(attr::SINE_WAVE, (elapsed_ms as f64 * 0.01).sin())
}

#[test]
fn test_rate_gate_session() {
    let mut pipeline = Pipeline::new(create_shared_stats());
    let filter = RateGatedFilter::sine_wave(Uuid::new_v4()).unwrap();
    let sensor_id = pipeline.bind("sine", Box::new(filter));
    pipeline.start().unwrap();

    let mut sink: Vec<FilterEvent> = Vec::new();
    for t in [0, 500, 1100, 1600, 2200] {
        pipeline.dispatch(sensor_id, sine_reading(t).into(), &mut sink);
    }

    let forwarded: Vec<i64> = sink.iter().map(|e| e.data.elapsed_ms).collect();
    assert_eq!(forwarded, vec![0, 1100, 2200]);

    let snapshot = pipeline.stats().snapshot();
    assert_eq!(snapshot.readings_received, 5);
    assert_eq!(snapshot.events_forwarded, 3);
    assert_eq!(snapshot.readings_gated, 2);

    pipeline.stop();
}

#[test]
fn test_batch_payload_preserves_order() {
    let mut pipeline = Pipeline::new(create_shared_stats());
    let filter = RateGatedFilter::sine_wave(Uuid::new_v4()).unwrap();
    let sensor_id = pipeline.bind("sine", Box::new(filter));
    pipeline.start().unwrap();

    let batch: ReadingBatch = [0, 500, 1100, 2200].iter().map(|&t| sine_reading(t)).collect();
    let mut sink: Vec<FilterEvent> = Vec::new();
    pipeline.dispatch(sensor_id, batch.into(), &mut sink);

    let forwarded: Vec<i64> = sink.iter().map(|e| e.data.elapsed_ms).collect();
    assert_eq!(forwarded, vec![0, 1100, 2200]);
    assert_eq!(pipeline.stats().snapshot().batches_received, 1);
}

#[test]
fn test_gsr_session_emits_features_once_window_fills() {
    let config = GsrConfig {
        sampling_rate_hz: 10.0,
        reaction_window_secs: 0.5,
        smoothing_span: 2.0,
    };
    let mut pipeline = Pipeline::new(create_shared_stats());
    let filter = GsrFilter::new(Uuid::new_v4(), config).unwrap();
    let sensor_id = pipeline.bind("gsr", Box::new(filter));
    pipeline.start().unwrap();

    let mut sink: Vec<FilterEvent> = Vec::new();
    for i in 0..8i64 {
        let reading = Reading::new(i * 100)
            .with(attr::GSR_CONDUCTANCE, 2.0 + (i as f64 * 0.5).sin())
            .with(attr::TEMPERATURE, 33.0);
        pipeline.dispatch(sensor_id, reading.into(), &mut sink);
    }

    // Window capacity is 5; the first four samples only accumulate.
    assert_eq!(sink.len(), 4);
    for event in &sink {
        assert!(event.data.attributes.contains_key(attr::GSR_MEAN));
        assert!(event.data.attributes.contains_key(attr::GSR_STD));
        assert!(event.data.attributes.contains_key(attr::GSR_FEATURE));
        // Raw conductance is consumed, the rest of the reading rides along.
        assert!(!event.data.attributes.contains_key(attr::GSR_CONDUCTANCE));
        assert!(event.data.attributes.contains_key(attr::TEMPERATURE));
    }

    let snapshot = pipeline.stats().snapshot();
    assert_eq!(snapshot.readings_received, 8);
    assert_eq!(snapshot.events_forwarded, 4);
    assert_eq!(snapshot.readings_gated, 4);
}

struct FixedRateClient {
    calls: u64,
}

impl DetectionClient for FixedRateClient {
    fn detect(&mut self, _sample: f64) -> Result<Option<f64>, DetectionError> {
        self.calls += 1;
        // Every third sample lands on a QRS complex.
        if self.calls % 3 == 0 {
            Ok(Some(72.0))
        } else {
            Ok(None)
        }
    }
}

#[test]
fn test_qrs_session_forwards_detections_only() {
    let mut pipeline = Pipeline::new(create_shared_stats());
    let filter = QrsFilter::with_client(Uuid::new_v4(), Box::new(FixedRateClient { calls: 0 }));
    let sensor_id = pipeline.bind("ecg", Box::new(filter));
    pipeline.start().unwrap();

    let mut sink: Vec<FilterEvent> = Vec::new();
    for i in 0..9i64 {
        let reading = Reading::new(i * 4).with(attr::ECG_WAVEFORM_SAMPLE, 0.1 * i as f64);
        pipeline.dispatch(sensor_id, reading.into(), &mut sink);
    }

    assert_eq!(sink.len(), 3);
    for event in &sink {
        assert_eq!(
            event.data.attributes[attr::HEART_RATE].scalar_or_zero(),
            72.0
        );
    }
}

#[test]
fn test_independent_sensors_do_not_interfere() {
    let mut pipeline = Pipeline::new(create_shared_stats());
    let sine_id = pipeline.bind(
        "sine",
        Box::new(RateGatedFilter::sine_wave(Uuid::new_v4()).unwrap()),
    );
    let generic_id = pipeline.bind(
        "generic",
        Box::new(RateGatedFilter::generic(Uuid::new_v4(), 1000).unwrap()),
    );
    pipeline.start().unwrap();

    let mut sink: Vec<FilterEvent> = Vec::new();
    pipeline.dispatch(sine_id, sine_reading(0).into(), &mut sink);
    pipeline.dispatch(
        generic_id,
        Reading::new(0).with(attr::HEART_RATE, 70.0).into(),
        &mut sink,
    );
    // Both first samples pass their own gates.
    assert_eq!(sink.len(), 2);

    sink.clear();
    // Only the generic sensor has waited long enough.
    pipeline.dispatch(sine_id, sine_reading(900).into(), &mut sink);
    pipeline.dispatch(
        generic_id,
        Reading::new(1100).with(attr::HEART_RATE, 71.0).into(),
        &mut sink,
    );
    assert_eq!(sink.len(), 1);
    assert_eq!(sink[0].data.elapsed_ms, 1100);
}

#[test]
fn test_decode_errors_do_not_stop_the_session() {
    let mut pipeline = Pipeline::new(create_shared_stats());
    let filter = RateGatedFilter::sine_wave(Uuid::new_v4()).unwrap();
    let sensor_id = pipeline.bind("sine", Box::new(filter));
    pipeline.start().unwrap();

    let mut sink: Vec<FilterEvent> = Vec::new();
    pipeline.dispatch_json(sensor_id, "garbage", &mut sink);
    pipeline.dispatch_json(
        sensor_id,
        r#"{"elapsed_ms": 0, "attributes": {"SineWave": 0.5}}"#,
        &mut sink,
    );

    assert_eq!(sink.len(), 1);
    assert_eq!(pipeline.stats().snapshot().decode_errors, 1);
}
