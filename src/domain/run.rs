//! Pipeline run state and reconstruction from events.
//!
//! A PipelineRun is created per invocation. Its status only moves forward,
//! except that any stage may drop it into the terminal `failed` state.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::Stage;
use super::events::{Event, EventType};
use super::fingerprint::Fingerprint;

/// One invocation of the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,

    pub fingerprint: Fingerprint,

    pub status: RunStatus,

    pub error_message: Option<String>,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Artifact paths known to this run
    pub artifacts: BTreeMap<Stage, PathBuf>,
}

impl PipelineRun {
    pub fn new(run_id: Uuid, fingerprint: Fingerprint) -> Self {
        Self {
            run_id,
            fingerprint,
            status: RunStatus::Extracting,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
            artifacts: BTreeMap::new(),
        }
    }

    /// Move to `next` if it is later than the current status.
    ///
    /// Returns false (and changes nothing) for backward moves or once the
    /// run is terminal.
    pub fn advance(&mut self, next: RunStatus) -> bool {
        if self.status.is_terminal() || next == RunStatus::Failed || next.rank() <= self.status.rank() {
            return false;
        }
        self.status = next;
        if next == RunStatus::Completed {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    /// Enter the terminal failed state
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status == RunStatus::Completed {
            return;
        }
        self.status = RunStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn artifact(&self, stage: Stage) -> Option<&PathBuf> {
        self.artifacts.get(&stage)
    }

    /// Rebuild the most recent run recorded in an event log
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let last = events.last()?;
        let run_id = last.run_id;
        let mut mine = events.iter().filter(|e| e.run_id == run_id);

        let first = mine.next()?;
        let mut run = Self::new(run_id, first.fingerprint.clone());
        run.started_at = first.timestamp;
        run.apply_event(first);
        for event in mine {
            run.apply_event(event);
        }
        Some(run)
    }

    /// Apply a single event to update run state
    pub fn apply_event(&mut self, event: &Event) {
        match event.event_type {
            EventType::RunStarted => {
                self.started_at = event.timestamp;
            }
            EventType::RunCompleted => {
                self.advance(RunStatus::Completed);
                self.completed_at = Some(event.timestamp);
            }
            EventType::RunFailed => {
                self.fail(event.error.clone().unwrap_or_default());
                self.completed_at = Some(event.timestamp);
            }
            EventType::StageStarted | EventType::StageSkipped => {
                if let Some(stage) = event.stage {
                    self.advance(RunStatus::for_stage(stage));
                }
            }
            EventType::StageCompleted | EventType::ProviderFailed => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Extracting,
    SynthesizingAudio,
    SynthesizingVideo,
    Composing,
    Completed,
    Failed,
}

impl RunStatus {
    fn rank(self) -> u8 {
        match self {
            RunStatus::Extracting => 0,
            RunStatus::SynthesizingAudio => 1,
            RunStatus::SynthesizingVideo => 2,
            RunStatus::Composing => 3,
            RunStatus::Completed => 4,
            RunStatus::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Status a run is in while `stage` executes
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Content => RunStatus::Extracting,
            Stage::Audio => RunStatus::SynthesizingAudio,
            Stage::Video => RunStatus::SynthesizingVideo,
            Stage::Final => RunStatus::Composing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::StageStatus;
    use crate::domain::fingerprint::fingerprint;

    #[test]
    fn test_status_is_monotonic() {
        let mut run = PipelineRun::new(Uuid::new_v4(), fingerprint("t", "s"));
        assert!(run.advance(RunStatus::SynthesizingVideo));
        assert!(!run.advance(RunStatus::SynthesizingAudio));
        assert_eq!(run.status, RunStatus::SynthesizingVideo);
        assert!(run.advance(RunStatus::Completed));
        assert!(!run.advance(RunStatus::Composing));
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn test_any_stage_can_fail() {
        let mut run = PipelineRun::new(Uuid::new_v4(), fingerprint("t", "s"));
        run.fail("extraction broke");
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("extraction broke"));
        assert!(!run.advance(RunStatus::Composing));
    }

    #[test]
    fn test_from_events_uses_latest_run() {
        let fp = fingerprint("t", "s");
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        let events = vec![
            Event::new(old, fp.clone(), None, EventType::RunStarted, "start", StageStatus::Running),
            Event::new(old, fp.clone(), None, EventType::RunFailed, "fail", StageStatus::Failed)
                .with_error("boom"),
            Event::new(new, fp.clone(), None, EventType::RunStarted, "start", StageStatus::Running),
            Event::new(
                new,
                fp.clone(),
                Some(Stage::Final),
                EventType::StageStarted,
                "compose",
                StageStatus::Running,
            ),
        ];

        let run = PipelineRun::from_events(&events).unwrap();
        assert_eq!(run.run_id, new);
        assert_eq!(run.status, RunStatus::Composing);
        assert!(run.error_message.is_none());
    }
}
