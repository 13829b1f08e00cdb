//! Run events.
//!
//! Every invocation appends events to `events.jsonl` in the fingerprint
//! directory. The latest run's state can be rebuilt by replaying them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::Stage;
use super::fingerprint::Fingerprint;

/// A single event in the append-only run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The invocation this event belongs to
    pub run_id: Uuid,

    pub fingerprint: Fingerprint,

    /// Stage the event concerns (if any)
    pub stage: Option<Stage>,

    pub event_type: EventType,

    /// Provider involved (for provider and stage completion events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Human-readable summary (NO secrets)
    pub payload_summary: String,

    pub status: StageStatus,

    /// Time taken in milliseconds
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        fingerprint: Fingerprint,
        stage: Option<Stage>,
        event_type: EventType,
        payload_summary: impl Into<String>,
        status: StageStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            fingerprint,
            stage,
            event_type,
            provider: None,
            payload_summary: payload_summary.into(),
            status,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    RunCompleted,
    RunFailed,
    StageStarted,
    /// A valid cached artifact was reused
    StageSkipped,
    StageCompleted,
    /// One provider in a chain failed; the chain moves on
    ProviderFailed,
}

/// Status of a stage or run at the time of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fingerprint::fingerprint;

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            Uuid::new_v4(),
            fingerprint("Ep1", "text"),
            Some(Stage::Audio),
            EventType::StageStarted,
            "Starting audio stage",
            StageStatus::Running,
        );

        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_type, EventType::StageStarted);
        assert_eq!(parsed.stage, Some(Stage::Audio));
        assert!(!json.contains("\"provider\""));
    }

    #[test]
    fn test_event_builders() {
        let event = Event::new(
            Uuid::new_v4(),
            fingerprint("Ep1", "text"),
            Some(Stage::Video),
            EventType::ProviderFailed,
            "sora failed",
            StageStatus::Running,
        )
        .with_provider("sora")
        .with_duration(1500)
        .with_error("HTTP 500");

        assert_eq!(event.provider.as_deref(), Some("sora"));
        assert_eq!(event.duration_ms, Some(1500));
        assert_eq!(event.error.as_deref(), Some("HTTP 500"));
    }
}
