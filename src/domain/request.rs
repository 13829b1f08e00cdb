//! Generation requests and request-scoped run options.

use serde::{Deserialize, Serialize};

use super::fingerprint::{fingerprint, Fingerprint};
use crate::error::PipelineError;

/// Shortest and longest teaser a request may ask for, in seconds
pub const MIN_DURATION_SECONDS: u32 = 5;
pub const MAX_DURATION_SECONDS: u32 = 120;

/// Preferred narrator voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoicePreference {
    Male,
    Female,
}

/// A request to produce a teaser. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub title: String,

    /// Full script or free-form prompt
    pub source_text: String,

    pub target_duration_seconds: u32,

    #[serde(default)]
    pub voice_preference: Option<VoicePreference>,

    /// Explicit voice name, wins over `voice_preference`
    #[serde(default)]
    pub voice_id: Option<String>,

    /// Pre-written headline that replaces the extracted one
    #[serde(default)]
    pub headline: Option<String>,
}

impl GenerationRequest {
    pub fn new(
        title: impl Into<String>,
        source_text: impl Into<String>,
        target_duration_seconds: u32,
    ) -> Self {
        Self {
            title: title.into(),
            source_text: source_text.into(),
            target_duration_seconds,
            voice_preference: None,
            voice_id: None,
            headline: None,
        }
    }

    pub fn with_voice_preference(mut self, preference: VoicePreference) -> Self {
        self.voice_preference = Some(preference);
        self
    }

    pub fn with_voice_id(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    pub fn with_headline(mut self, headline: impl Into<String>) -> Self {
        self.headline = Some(headline.into());
        self
    }

    /// Cache/resume key of this request
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(&self.title, &self.source_text)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.title.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("title cannot be empty".into()));
        }
        if self.source_text.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "source text cannot be empty".into(),
            ));
        }
        if !(MIN_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(&self.target_duration_seconds) {
            return Err(PipelineError::InvalidRequest(format!(
                "target duration {}s outside {}..={}s",
                self.target_duration_seconds, MIN_DURATION_SECONDS, MAX_DURATION_SECONDS
            )));
        }
        Ok(())
    }
}

/// Per-stage cache bypass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceFlags {
    pub content: bool,
    pub audio: bool,
    pub video: bool,
    pub compose: bool,
}

impl ForceFlags {
    pub fn all() -> Self {
        Self {
            content: true,
            audio: true,
            video: true,
            compose: true,
        }
    }
}

/// Request-scoped configuration threaded through every stage call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Locale for extraction and speech (e.g. `en-US`, `he-IL`)
    pub language: String,
    pub force: ForceFlags,
}

impl RunOptions {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            force: ForceFlags::default(),
        }
    }

    pub fn with_force(mut self, force: ForceFlags) -> Self {
        self.force = force;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new("en-US")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_and_duration_do_not_change_fingerprint() {
        let base = GenerationRequest::new("Ep1", "text", 15);
        let other = GenerationRequest::new("Ep1", "text", 30)
            .with_voice_preference(VoicePreference::Female);
        assert_eq!(base.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_validation() {
        assert!(GenerationRequest::new("Ep1", "text", 15).validate().is_ok());
        assert!(GenerationRequest::new(" ", "text", 15).validate().is_err());
        assert!(GenerationRequest::new("Ep1", "", 15).validate().is_err());
        assert!(GenerationRequest::new("Ep1", "text", 2).validate().is_err());
        assert!(GenerationRequest::new("Ep1", "text", 500).validate().is_err());
    }
}
