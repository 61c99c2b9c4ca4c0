//! Run telemetry events.
//!
//! The pipeline reports its progress as [`RunEvent`]s through an
//! [`EventSink`]. Event types are dotted names such as `stage.completed`;
//! the full set emitted by the pipeline is listed in [`event_types`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type names emitted by the pipeline.
pub mod event_types {
    /// A run began.
    pub const RUN_STARTED: &str = "run.started";
    /// A stage is about to invoke the executor.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage finished, successfully or not.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// An optional stage was skipped.
    pub const STAGE_SKIPPED: &str = "stage.skipped";
    /// A middleware reported a failed quality gate.
    pub const GATE_FAILED: &str = "gate.failed";
    /// A middleware fired at a hook point.
    pub const HOOK_FIRED: &str = "hook.fired";
    /// A run reached `Done`.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// A run reached `Aborted`.
    pub const RUN_ABORTED: &str = "run.aborted";
}

/// A single telemetry event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Dotted event type.
    pub event_type: String,
    /// The run that produced the event.
    pub run_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RunEvent {
    /// Creates an event with an empty payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            event_type: event_type.into(),
            run_id,
            timestamp: Utc::now(),
            data: serde_json::Value::Null,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Returns true if the event type starts with `prefix`.
    #[must_use]
    pub fn is_a(&self, prefix: &str) -> bool {
        self.event_type.starts_with(prefix)
    }
}
