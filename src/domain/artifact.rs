//! Stage artifacts and the metadata recorded about them.
//!
//! Each stage persists exactly one file in the fingerprint directory. A file
//! only counts as a cache hit when it exists and is above the stage's minimum
//! size, which rejects zero-byte or truncated placeholders.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::{ForceFlags, VoicePreference};

pub const CONTENT_FILE: &str = "teaser_content.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const LOCK_FILE: &str = ".lock";

/// A persisted stage output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Content,
    Audio,
    Video,
    Final,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Content, Stage::Audio, Stage::Video, Stage::Final];

    /// A valid artifact is strictly larger than this many bytes
    pub fn size_floor(self) -> u64 {
        match self {
            Stage::Content | Stage::Audio => 0,
            Stage::Video | Stage::Final => 1024,
        }
    }

    /// File name inside the fingerprint directory
    pub fn file_name(self, audio_ext: &str, video_ext: &str) -> String {
        match self {
            Stage::Content => CONTENT_FILE.to_string(),
            Stage::Audio => format!("audio.{audio_ext}"),
            Stage::Video => format!("video.{video_ext}"),
            Stage::Final => format!("final.{video_ext}"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Content => "content",
            Stage::Audio => "audio",
            Stage::Video => "video",
            Stage::Final => "final",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one provider attempt. Drives fallback and logging only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub provider_name: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    pub elapsed_ms: u64,
}

/// How a stage artifact was produced, as written to `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Provider that produced the artifact
    pub provider: String,

    /// The artifact is a stand-in rather than real generated media
    pub placeholder: bool,

    /// An input to this stage was itself a placeholder
    #[serde(default)]
    pub degraded: bool,

    /// Free-form label, e.g. the remote job id behind an unretrievable video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    #[serde(default)]
    pub attempts: Vec<ProviderAttempt>,

    pub produced_at: DateTime<Utc>,
}

/// Parameters a run was made with
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunParameters {
    pub title: String,
    pub language: String,
    pub target_duration_seconds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_preference: Option<VoicePreference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

/// Contents of `metadata.json`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    pub fingerprint: String,

    #[serde(default)]
    pub parameters: RunParameters,

    /// Force flags of the last full run
    #[serde(default)]
    pub forced: ForceFlags,

    #[serde(default)]
    pub stages: BTreeMap<Stage, StageRecord>,
}

impl RunMetadata {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            ..Default::default()
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageRecord> {
        self.stages.get(&stage)
    }

    pub fn is_placeholder(&self, stage: Stage) -> bool {
        self.stage(stage).map(|r| r.placeholder).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_file_names() {
        assert_eq!(Stage::Content.file_name("wav", "mp4"), "teaser_content.json");
        assert_eq!(Stage::Audio.file_name("wav", "mp4"), "audio.wav");
        assert_eq!(Stage::Video.file_name("wav", "mp4"), "video.mp4");
        assert_eq!(Stage::Final.file_name("wav", "mp4"), "final.mp4");
    }

    #[test]
    fn test_stage_minimum_sizes() {
        assert_eq!(Stage::Audio.size_floor(), 0);
        assert_eq!(Stage::Video.size_floor(), 1024);
        assert_eq!(Stage::Final.size_floor(), 1024);
    }

    #[test]
    fn test_metadata_serializes_stage_keys() {
        let mut meta = RunMetadata::new("abc");
        meta.stages.insert(
            Stage::Video,
            StageRecord {
                provider: "placeholder-video".into(),
                placeholder: true,
                degraded: false,
                note: None,
                attempts: Vec::new(),
                produced_at: Utc::now(),
            },
        );
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["stages"]["video"]["placeholder"], true);

        let parsed: RunMetadata = serde_json::from_value(json).unwrap();
        assert!(parsed.is_placeholder(Stage::Video));
        assert!(!parsed.is_placeholder(Stage::Audio));
    }
}
