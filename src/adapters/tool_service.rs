//! Remote tool service: one HTTP endpoint per named tool.
//!
//! `POST {base}/tools/{name}` with `{"arguments": {...}}`; the reply is a JSON
//! object, optionally wrapped in `{"result": {...}}`. File-producing tools are
//! told where to write and answer with the path they actually wrote.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;
use tracing::{debug, info};

use super::prompt::{truncate_source, video_prompt};
use super::{ExtractionInput, SpeechInput, SpeechOutput, VideoInput, VideoOutput};
use crate::core::chain::Provider;
use crate::domain::TeaserContent;
use crate::error::ProviderError;

/// HTTP client for the tool service
pub struct ToolServiceClient {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl ToolServiceClient {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Invoke a tool and return its result object
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ProviderError> {
        let base = self.base_url.as_deref().ok_or_else(|| {
            ProviderError::Unavailable("TEASER_TOOL_SERVICE_URL is not set".into())
        })?;
        let url = format!("{}/tools/{}", base.trim_end_matches('/'), name);
        debug!(%url, "Calling tool");

        let response = self
            .client
            .post(&url)
            .json(&json!({ "arguments": arguments }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Failure(format!(
                "tool '{name}' returned HTTP {status}: {}",
                text.trim()
            )));
        }

        let mut body: Value = response.json().await?;
        if let Some(result) = body.get_mut("result") {
            return Ok(result.take());
        }
        Ok(body)
    }
}

/// Copy `produced` to `dest` unless they are the same file; `dest` must end
/// up non-empty
async fn settle_output(produced: &Path, dest: &Path) -> Result<(), ProviderError> {
    if produced != dest {
        fs::copy(produced, dest).await?;
    }
    let len = fs::metadata(dest).await?.len();
    if len == 0 {
        return Err(ProviderError::InvalidResponse(format!(
            "{} is empty",
            dest.display()
        )));
    }
    Ok(())
}

fn path_field(result: &Value, field: &str) -> Result<PathBuf, ProviderError> {
    result
        .get(field)
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| ProviderError::InvalidResponse(format!("tool reply has no '{field}'")))
}

#[derive(Debug, Deserialize)]
struct ToolContent {
    headline: Option<String>,
    script: Option<String>,
    key_points: Option<Vec<String>>,
    visual_description: Option<String>,
    duration_seconds: Option<u32>,
}

/// `extract_teaser_content` tool
pub struct ToolServiceExtractor {
    client: Arc<ToolServiceClient>,
}

impl ToolServiceExtractor {
    pub fn new(client: Arc<ToolServiceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provider<ExtractionInput, TeaserContent> for ToolServiceExtractor {
    fn name(&self) -> &str {
        "tool-service-content"
    }

    async fn run(&self, input: &ExtractionInput) -> Result<TeaserContent, ProviderError> {
        let result = self
            .client
            .call_tool(
                "extract_teaser_content",
                json!({
                    "title": input.title,
                    "content": truncate_source(&input.source_text),
                    "max_duration": input.target_duration_seconds,
                    "language": input.language,
                }),
            )
            .await?;

        let content = result
            .get("content")
            .cloned()
            .ok_or_else(|| ProviderError::InvalidResponse("tool reply has no 'content'".into()))?;
        let content: ToolContent = serde_json::from_value(content)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(TeaserContent {
            headline: content
                .headline
                .unwrap_or_else(|| "Engaging Podcast Moment".to_string()),
            narration_script: content
                .script
                .unwrap_or_else(|| "Check out this amazing insight!".to_string()),
            key_points: content
                .key_points
                .unwrap_or_else(|| vec!["Interesting content ahead".to_string()]),
            visual_description: content
                .visual_description
                .unwrap_or_else(|| "Dynamic podcast visuals".to_string()),
            duration_seconds: content
                .duration_seconds
                .unwrap_or(input.target_duration_seconds),
        })
    }
}

/// `synthesize_speech` tool
pub struct ToolServiceSpeech {
    client: Arc<ToolServiceClient>,
}

impl ToolServiceSpeech {
    pub fn new(client: Arc<ToolServiceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provider<SpeechInput, SpeechOutput> for ToolServiceSpeech {
    fn name(&self) -> &str {
        "tool-service-speech"
    }

    async fn run(&self, input: &SpeechInput) -> Result<SpeechOutput, ProviderError> {
        let format = input
            .dest
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("wav");

        let result = self
            .client
            .call_tool(
                "synthesize_speech",
                json!({
                    "text": input.script,
                    "language": input.language,
                    "voice": input.voice,
                    "voice_gender": input.voice_preference,
                    "format": format,
                    "output_path": input.dest,
                }),
            )
            .await?;

        let produced = path_field(&result, "audio_path")?;
        settle_output(&produced, &input.dest).await?;
        info!(path = %input.dest.display(), "Speech synthesized by tool service");

        Ok(SpeechOutput {
            path: input.dest.clone(),
            voice: result
                .get("voice")
                .and_then(Value::as_str)
                .map(String::from)
                .or_else(|| input.voice.clone()),
        })
    }
}

/// `generate_video` tool
pub struct ToolServiceVideo {
    client: Arc<ToolServiceClient>,
}

impl ToolServiceVideo {
    pub fn new(client: Arc<ToolServiceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provider<VideoInput, VideoOutput> for ToolServiceVideo {
    fn name(&self) -> &str {
        "tool-service-video"
    }

    async fn run(&self, input: &VideoInput) -> Result<VideoOutput, ProviderError> {
        let format = input
            .dest
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");

        let result = self
            .client
            .call_tool(
                "generate_video",
                json!({
                    "prompt": video_prompt(&input.content),
                    "duration": input.target_duration_seconds,
                    "format": format,
                    "output_path": input.dest,
                    "aspect_ratio": "9:16",
                }),
            )
            .await?;

        let produced = path_field(&result, "video_path")?;
        settle_output(&produced, &input.dest).await?;
        info!(path = %input.dest.display(), "Video generated by tool service");

        Ok(VideoOutput {
            path: input.dest.clone(),
            note: None,
        })
    }
}
