//! The filter contract and its concrete implementations.
//!
//! A filter receives raw readings from the event boundary, decides
//! per-reading whether to forward, and emits reduced attribute maps through
//! an [`EventSink`]. Three shapes exist:
//!
//! - [`rate_gate::RateGatedFilter`] — rate-bounded passthrough, one
//!   implementation parameterized per device by a rule set
//! - [`gsr::GsrFilter`] — windowed statistical feature extraction
//! - [`qrs::QrsFilter`] — per-sample delegation to an external detection
//!   service
//!
//! Filters are single-owner over their mutable state: each `on_reading`
//! call runs to completion on the caller's thread and no two readings for
//! one instance may be processed concurrently.

pub mod gsr;
pub mod qrs;
pub mod rate_gate;

use crate::reading::{CapabilityDescriptor, FilterEvent, ReadingInput};
use chrono::{DateTime, Utc};

pub use gsr::{GsrConfig, GsrFilter};
pub use qrs::{DetectionClient, DetectionError, HttpDetectionClient, QrsFilter, QrsServiceConfig};
pub use rate_gate::{GateRule, RateGatedFilter};

/// Callback accepting filtered emissions, implemented by the external event
/// boundary. `Vec<FilterEvent>` implements it for tests.
pub trait EventSink {
    fn accept(&mut self, event: FilterEvent);
}

impl EventSink for Vec<FilterEvent> {
    fn accept(&mut self, event: FilterEvent) {
        self.push(event);
    }
}

/// The contract every sensor filter implements.
///
/// Lifecycle: construct once per (sensor, filter-type) pairing, `start` at
/// session begin, feed an unbounded sequence of inputs, `stop` at session
/// end. All state is session-scoped; `start` after `stop` begins a fresh
/// session.
pub trait Filter {
    /// Static advertisement of every attribute this filter can emit.
    fn descriptor(&self) -> &CapabilityDescriptor;

    /// Reset all per-session state (gate timers, window contents) so the
    /// first matching sample always passes. Safe to call again after
    /// [`Filter::stop`].
    fn start(&mut self, session_start: DateTime<Utc>) -> Result<(), FilterError>;

    /// The only ingestion point. A batch is processed element-by-element in
    /// arrival order; unknown attribute keys are ignored. A no-op between
    /// `stop` and the next `start`.
    fn on_reading(&mut self, input: ReadingInput, sink: &mut dyn EventSink);

    /// End the session. Subsequent readings are dropped until a fresh
    /// `start`.
    fn stop(&mut self);
}

/// Errors raised by filter construction and session control.
#[derive(Debug)]
pub enum FilterError {
    /// Invalid configuration, e.g. a non-positive sampling rate or window
    /// size. Fatal at construction time.
    InvalidConfig(String),
    /// The external detection service could not be reached or launched.
    /// Fatal and non-retryable at construction time.
    ServiceUnavailable(String),
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::InvalidConfig(msg) => write!(f, "Invalid filter configuration: {msg}"),
            FilterError::ServiceUnavailable(msg) => {
                write!(f, "Detection service unavailable: {msg}")
            }
        }
    }
}

impl std::error::Error for FilterError {}
