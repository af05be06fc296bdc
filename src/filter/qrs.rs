//! ECG delegation to the external QRS detection service.
//!
//! Unlike the other filters this one does no local signal processing: each
//! raw ECG waveform sample is handed synchronously to an out-of-process
//! detection service over a fixed local port, and the derived heart rate it
//! returns is republished as a filtered event. The blocking latency of the
//! call is an accepted cost of keeping the detection algorithm off-process.

use crate::filter::{EventSink, Filter, FilterError};
use crate::reading::{
    attr, CapabilityDescriptor, FilterEvent, FilteredAttributes, Reading, ReadingInput, ValueKind,
};
use crate::stats::SharedPipelineStats;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Detection failures logged with full detail before throttling kicks in.
const DETAIL_FAILURES: u64 = 10;

/// After throttling, only every this-many-th failure is logged.
const THROTTLE_EVERY: u64 = 100;

/// Configuration of the external detection service endpoint.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QrsServiceConfig {
    /// Service host; the service is expected on the loopback interface
    pub host: String,
    /// Fixed local port the service listens on
    pub port: u16,
    /// Optional command to launch the service process; when set, the filter
    /// owns the process and tears it down on `stop()`
    pub launch_command: Option<Vec<String>>,
}

impl Default for QrsServiceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8124,
            launch_command: None,
        }
    }
}

impl QrsServiceConfig {
    /// Base URL of the service.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Per-sample detection endpoint.
    pub fn detect_url(&self) -> String {
        format!("{}/detect", self.url())
    }

    /// Health check endpoint probed at construction.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.url())
    }
}

/// Errors from a single detection call. Per-sample and non-fatal: the
/// session continues after any of these.
#[derive(Debug)]
pub enum DetectionError {
    /// Could not reach the service
    Network(String),
    /// The service answered with an unexpected payload
    Protocol(String),
}

impl std::fmt::Display for DetectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionError::Network(msg) => write!(f, "Detection network error: {msg}"),
            DetectionError::Protocol(msg) => write!(f, "Detection protocol error: {msg}"),
        }
    }
}

impl std::error::Error for DetectionError {}

/// Injected capability boundary to the detection service, so the filter's
/// forwarding logic is testable without a live subprocess.
pub trait DetectionClient {
    /// Submit one scalar sample. `Ok(None)` means the service had no result
    /// for this sample, which is not an error.
    fn detect(&mut self, sample: f64) -> Result<Option<f64>, DetectionError>;
}

/// HTTP client for the detection service: a `reqwest` client driven by a
/// current-thread runtime, so calls block on the caller's thread as the
/// filter model requires.
pub struct HttpDetectionClient {
    config: QrsServiceConfig,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpDetectionClient {
    /// Build the client and probe the service's health endpoint; an
    /// unreachable service is a fatal construction failure.
    pub fn connect(config: QrsServiceConfig) -> Result<Self, FilterError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| FilterError::ServiceUnavailable(format!("runtime: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| FilterError::ServiceUnavailable(format!("http client: {e}")))?;

        let this = Self {
            config,
            client,
            runtime,
        };
        this.health_check()?;
        Ok(this)
    }

    fn health_check(&self) -> Result<(), FilterError> {
        let url = self.config.health_url();
        let response = self
            .runtime
            .block_on(self.client.get(&url).send())
            .map_err(|e| FilterError::ServiceUnavailable(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(FilterError::ServiceUnavailable(format!(
                "{url}: status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl DetectionClient for HttpDetectionClient {
    fn detect(&mut self, sample: f64) -> Result<Option<f64>, DetectionError> {
        let response = self
            .runtime
            .block_on(
                self.client
                    .post(self.config.detect_url())
                    .json(&json!({ "sample": sample }))
                    .send(),
            )
            .map_err(|e| DetectionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectionError::Protocol(format!("status {status}")));
        }

        let tuple: serde_json::Value = self
            .runtime
            .block_on(response.json())
            .map_err(|e| DetectionError::Protocol(e.to_string()))?;
        parse_detection_tuple(&tuple)
    }
}

/// The service answers with an ordered tuple; the second element, when
/// present and not the `"null"` sentinel, carries the derived scalar.
fn parse_detection_tuple(tuple: &serde_json::Value) -> Result<Option<f64>, DetectionError> {
    let elements = tuple
        .as_array()
        .ok_or_else(|| DetectionError::Protocol(format!("expected tuple, got {tuple}")))?;
    match elements.get(1) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s == "null" => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| DetectionError::Protocol(format!("non-numeric result: {value}"))),
    }
}

/// Throttle for detection-failure logging: full detail for the first few
/// failures, then only every hundredth, so a dead service cannot flood the
/// session log.
#[derive(Debug, Default)]
struct LogThrottle {
    failures: u64,
}

impl LogThrottle {
    /// Record one failure; returns (total so far, whether to log detail).
    fn record(&mut self) -> (u64, bool) {
        self.failures += 1;
        let detail = self.failures <= DETAIL_FAILURES || self.failures % THROTTLE_EVERY == 0;
        (self.failures, detail)
    }
}

/// Delegating filter republishing QRS detection results for an ECG stream.
pub struct QrsFilter {
    filter_id: Uuid,
    sensor_id: Uuid,
    descriptor: CapabilityDescriptor,
    client: Box<dyn DetectionClient>,
    /// Service process owned by this filter, torn down on `stop()`
    service_process: Option<Child>,
    throttle: LogThrottle,
    /// Shared session counters, when the filter runs inside a pipeline
    stats: Option<SharedPipelineStats>,
    running: bool,
}

impl QrsFilter {
    /// Launch (when configured) and connect to the detection service.
    /// Unreachable service or failed launch is fatal and non-retryable.
    pub fn new(sensor_id: Uuid, config: QrsServiceConfig) -> Result<Self, FilterError> {
        let service_process = match &config.launch_command {
            Some(command) => Some(spawn_service(command)?),
            None => None,
        };

        let client = match HttpDetectionClient::connect(config) {
            Ok(client) => client,
            Err(e) => {
                // Don't leave an orphaned service behind a failed construction.
                if let Some(mut child) = service_process {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                return Err(e);
            }
        };

        Ok(Self::assemble(sensor_id, Box::new(client), service_process))
    }

    /// Construct with an injected client; used by tests and by deployments
    /// that manage the service themselves.
    pub fn with_client(sensor_id: Uuid, client: Box<dyn DetectionClient>) -> Self {
        Self::assemble(sensor_id, client, None)
    }

    fn assemble(
        sensor_id: Uuid,
        client: Box<dyn DetectionClient>,
        service_process: Option<Child>,
    ) -> Self {
        Self {
            filter_id: Uuid::new_v4(),
            sensor_id,
            descriptor: CapabilityDescriptor::of(&[(attr::HEART_RATE, ValueKind::Scalar)]),
            client,
            service_process,
            throttle: LogThrottle::default(),
            stats: None,
            running: false,
        }
    }

    /// Attach shared session counters; every failed detection call is
    /// recorded on them in addition to the filter's own throttle.
    pub fn with_stats(mut self, stats: SharedPipelineStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Instance id of this filter.
    pub fn filter_id(&self) -> Uuid {
        self.filter_id
    }

    /// Detection calls that have failed so far this session.
    pub fn failure_count(&self) -> u64 {
        self.throttle.failures
    }

    fn process_reading(&mut self, reading: &Reading, sink: &mut dyn EventSink) {
        let Some(value) = reading.attributes.get(attr::ECG_WAVEFORM_SAMPLE) else {
            return;
        };
        let sample = value.scalar_or_zero();

        match self.client.detect(sample) {
            Ok(Some(derived)) => {
                let mut out = FilteredAttributes::new(reading.elapsed_ms);
                out.insert(attr::HEART_RATE, derived);
                sink.accept(FilterEvent {
                    filter_id: self.filter_id,
                    sensor_id: self.sensor_id,
                    data: out,
                });
            }
            Ok(None) => {
                // No result for this sample; nothing to forward.
            }
            Err(e) => {
                let (count, detail) = self.throttle.record();
                if let Some(stats) = &self.stats {
                    stats.record_detection_failure();
                }
                if detail {
                    warn!(
                        failure = count,
                        error = %e,
                        elapsed_ms = reading.elapsed_ms,
                        "qrs detection call failed"
                    );
                }
            }
        }
    }
}

impl Filter for QrsFilter {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn start(&mut self, session_start: DateTime<Utc>) -> Result<(), FilterError> {
        self.throttle = LogThrottle::default();
        self.running = true;
        debug!(%session_start, "qrs filter started");
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
        if let Some(mut child) = self.service_process.take() {
            if let Err(e) = child.kill() {
                warn!(error = %e, "failed to kill detection service");
            }
            let _ = child.wait();
            info!("detection service torn down");
        }
        debug!("qrs filter stopped");
    }
}

impl Drop for QrsFilter {
    fn drop(&mut self) {
        if self.service_process.is_some() {
            self.stop();
        }
    }
}

fn spawn_service(command: &[String]) -> Result<Child, FilterError> {
    let (program, args) = command.split_first().ok_or_else(|| {
        FilterError::InvalidConfig("empty detection service launch command".to_string())
    })?;
    let child = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| FilterError::ServiceUnavailable(format!("launch '{program}': {e}")))?;
    info!(program = %program, pid = child.id(), "detection service launched");
    Ok(child)
}
