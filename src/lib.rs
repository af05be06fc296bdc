//! Sensor Filter Pipeline - rate gating and feature extraction for
//! physiological sensor streams.
//!
//! This library sits between raw sensor drivers and downstream consumers.
//! High-rate sensors are throttled to a minimum forwarding interval,
//! skin-conductance streams are reduced to windowed arousal features, and
//! ECG streams are delegated to an external QRS detection service. Filters
//! never block the driver on downstream consumers and a dropped or
//! undecodable payload is never fatal to the session.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   Sensor Filter Pipeline                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐    ┌────────────┐    ┌───────────────┐         │
//! │  │ Sensors  │──▶│  Pipeline   │──▶│   Filters      │         │
//! │  │ (raw)    │    │  (routing) │    │ gate/gsr/qrs  │         │
//! │  └──────────┘    └────────────┘    └───────────────┘         │
//! │        │                                  │                  │
//! │        ▼                                  ▼                  │
//! │  ┌──────────┐                      ┌───────────────┐         │
//! │  │ Pipeline │                      │   Filtered    │         │
//! │  │  Stats   │                      │    Events     │         │
//! │  └──────────┘                      └───────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sensor_filter_pipeline::filter::RateGatedFilter;
//! use sensor_filter_pipeline::pipeline::Pipeline;
//! use sensor_filter_pipeline::stats::create_shared_stats;
//! use uuid::Uuid;
//!
//! let mut pipeline = Pipeline::new(create_shared_stats());
//! let filter = RateGatedFilter::sine_wave(Uuid::new_v4()).unwrap();
//! let sensor_id = pipeline.bind("sine", Box::new(filter));
//! pipeline.start().unwrap();
//!
//! // Raw payloads are routed with pipeline.dispatch_json(sensor_id, ...)
//! ```

pub mod config;
pub mod filter;
pub mod pipeline;
pub mod reading;
pub mod stats;
pub mod window;

// Re-export key types at crate root for convenience
pub use config::{Config, FilterSelection, IntervalConfig};
pub use filter::{
    DetectionClient, DetectionError, EventSink, Filter, FilterError, GateRule, GsrConfig,
    GsrFilter, HttpDetectionClient, QrsFilter, QrsServiceConfig, RateGatedFilter,
};
pub use pipeline::{FilterBinding, Pipeline};
pub use reading::{
    AttributeValue, CapabilityDescriptor, FilterEvent, FilteredAttributes, Reading, ReadingBatch,
    ReadingInput, ValueKind,
};
pub use stats::{PipelineStats, PipelineStatsSnapshot, SharedPipelineStats};
pub use window::SampleWindow;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
