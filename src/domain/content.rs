//! Teaser content produced by the extraction stage.

use serde::{Deserialize, Serialize};

use super::request::VoicePreference;

/// What the teaser says and shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeaserContent {
    pub headline: String,

    /// Narration read by the speech stage
    #[serde(rename = "script")]
    pub narration_script: String,

    pub key_points: Vec<String>,

    pub visual_description: String,

    pub duration_seconds: u32,
}

/// Layout of `teaser_content.json`: the content plus the voice and language
/// choices downstream stages should reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredContent {
    #[serde(flatten)]
    pub content: TeaserContent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_preference: Option<VoicePreference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl StoredContent {
    pub fn new(content: TeaserContent) -> Self {
        Self {
            content,
            language: None,
            voice_preference: None,
            voice_id: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
