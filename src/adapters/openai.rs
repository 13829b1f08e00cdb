//! OpenAI-compatible HTTP providers: chat-completion extraction and speech.
//!
//! Both need an API key. Without one they report
//! [`ProviderError::Unavailable`] and the chain moves on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use super::prompt::{extraction_prompt, parse_extraction, EXTRACTION_SYSTEM_PROMPT};
use super::{ExtractionInput, SpeechInput, SpeechOutput};
use crate::core::chain::Provider;
use crate::domain::TeaserContent;
use crate::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SPEECH_MODEL: &str = "tts-1";
pub const DEFAULT_VOICE: &str = "alloy";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

async fn error_body(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    ProviderError::Failure(format!("HTTP {status}: {}", text.trim()))
}

/// Chat-completion content extractor
pub struct OpenAiExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiExtractor {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl Provider<ExtractionInput, TeaserContent> for OpenAiExtractor {
    fn name(&self) -> &str {
        "openai-chat"
    }

    async fn run(&self, input: &ExtractionInput) -> Result<TeaserContent, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Unavailable("OPENAI_API_KEY is not set".into()))?;

        let prompt = extraction_prompt(input);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: EXTRACTION_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.7,
            max_tokens: 1000,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_body(response).await);
        }

        let chat: ChatResponse = response.json().await?;
        let reply = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("empty chat completion".into()))?;

        debug!(chars = reply.len(), "Extraction reply received");
        parse_extraction(&reply, input.target_duration_seconds)
    }
}

/// Text-to-speech through `/audio/speech`
pub struct OpenAiSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    default_voice: String,
}

impl OpenAiSpeech {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: DEFAULT_SPEECH_MODEL.to_string(),
            default_voice: DEFAULT_VOICE.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl Provider<SpeechInput, SpeechOutput> for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai-speech"
    }

    async fn run(&self, input: &SpeechInput) -> Result<SpeechOutput, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Unavailable("OPENAI_API_KEY is not set".into()))?;

        let voice = input.voice.as_deref().unwrap_or(&self.default_voice);
        let format = input
            .dest
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("wav");

        let response = self
            .client
            .post(endpoint(&self.base_url, "audio/speech"))
            .bearer_auth(api_key)
            .json(&SpeechRequest {
                model: &self.model,
                input: &input.script,
                voice,
                response_format: format,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_body(response).await);
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(ProviderError::InvalidResponse("empty audio body".into()));
        }
        fs::write(&input.dest, &audio).await?;
        info!(voice, bytes = audio.len(), "Speech synthesized");

        Ok(SpeechOutput {
            path: input.dest.clone(),
            voice: Some(voice.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_endpoint_join() {
        assert_eq!(
            endpoint("https://api.openai.com/v1/", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable() {
        let extractor = OpenAiExtractor::new(DEFAULT_BASE_URL, None);
        let input = ExtractionInput {
            title: "Ep1".into(),
            source_text: "text".into(),
            target_duration_seconds: 15,
            language: "en-US".into(),
        };
        assert!(matches!(
            extractor.run(&input).await,
            Err(ProviderError::Unavailable(_))
        ));

        let speech = OpenAiSpeech::new(DEFAULT_BASE_URL, None);
        let input = SpeechInput {
            script: "hi".into(),
            language: "en-US".into(),
            voice: None,
            voice_preference: None,
            target_duration_seconds: 15,
            dest: PathBuf::from("/nonexistent/audio.wav"),
        };
        assert!(matches!(
            speech.run(&input).await,
            Err(ProviderError::Unavailable(_))
        ));
    }
}
