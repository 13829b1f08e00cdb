//! Deterministic chain tails. None of these touch the network.

use std::sync::Arc;

use async_trait::async_trait;

use super::media::{Card, MediaBackend};
use super::{ExtractionInput, SpeechInput, SpeechOutput, VideoInput, VideoOutput};
use crate::core::chain::{Placeholder, Provider};
use crate::core::poller::JobResult;
use crate::domain::TeaserContent;
use crate::error::ProviderError;

/// Background of the placeholder card
pub const PLACEHOLDER_COLOR: (u8, u8, u8) = (30, 30, 40);

/// Background of the "generated but not retrieved" card
pub const RETRIEVAL_COLOR: (u8, u8, u8) = (20, 50, 35);

pub const RETRIEVAL_BANNER: &str = "VIDEO GENERATED SUCCESSFULLY";

/// Canned content built from the title alone
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultContent;

impl DefaultContent {
    pub fn content_for(title: &str, target_duration_seconds: u32) -> TeaserContent {
        TeaserContent {
            headline: format!("Amazing Insights from {title}"),
            narration_script: "Check out this incredible podcast episode with amazing insights!"
                .to_string(),
            key_points: vec![
                "Engaging content".to_string(),
                "Expert insights".to_string(),
                "Must-listen episode".to_string(),
            ],
            visual_description: "Dynamic podcast studio visuals with text overlay".to_string(),
            duration_seconds: target_duration_seconds,
        }
    }
}

#[async_trait]
impl Provider<ExtractionInput, TeaserContent> for DefaultContent {
    fn name(&self) -> &str {
        "default-content"
    }

    async fn run(&self, input: &ExtractionInput) -> Result<TeaserContent, ProviderError> {
        Ok(Self::content_for(&input.title, input.target_duration_seconds))
    }
}

impl Placeholder<ExtractionInput, TeaserContent> for DefaultContent {}

/// Silence as long as the target duration
pub struct SilentSpeech {
    backend: Arc<dyn MediaBackend>,
}

impl SilentSpeech {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Provider<SpeechInput, SpeechOutput> for SilentSpeech {
    fn name(&self) -> &str {
        "silent-speech"
    }

    async fn run(&self, input: &SpeechInput) -> Result<SpeechOutput, ProviderError> {
        self.backend
            .render_silence(input.target_duration_seconds as f64, &input.dest)
            .await?;
        Ok(SpeechOutput {
            path: input.dest.clone(),
            voice: None,
        })
    }
}

impl Placeholder<SpeechInput, SpeechOutput> for SilentSpeech {}

/// Solid-color card bearing the headline
pub struct PlaceholderVideo {
    backend: Arc<dyn MediaBackend>,
    width: u32,
    height: u32,
    fps: u32,
}

impl PlaceholderVideo {
    pub fn new(backend: Arc<dyn MediaBackend>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            backend,
            width,
            height,
            fps,
        }
    }

    pub fn card(&self, input: &VideoInput) -> Card {
        Card {
            width: self.width,
            height: self.height,
            fps: self.fps,
            seconds: input.target_duration_seconds.max(1) as f64,
            color: PLACEHOLDER_COLOR,
            lines: vec![input.content.headline.clone()],
        }
    }
}

#[async_trait]
impl Provider<VideoInput, VideoOutput> for PlaceholderVideo {
    fn name(&self) -> &str {
        "placeholder-video"
    }

    async fn run(&self, input: &VideoInput) -> Result<VideoOutput, ProviderError> {
        self.backend
            .render_card(&self.card(input), &input.dest)
            .await?;
        Ok(VideoOutput {
            path: input.dest.clone(),
            note: None,
        })
    }
}

impl Placeholder<VideoInput, VideoOutput> for PlaceholderVideo {}

/// Card standing in for a remote result that finished but could not be fetched
pub fn retrieval_card(
    job_id: &str,
    result: &JobResult,
    content: &TeaserContent,
    fallback_size: (u32, u32),
    fps: u32,
) -> Card {
    let width = result.width.unwrap_or(fallback_size.0);
    let height = result.height.unwrap_or(fallback_size.1);
    let seconds = result
        .duration_seconds
        .filter(|d| *d > 0.0)
        .unwrap_or(content.duration_seconds.max(1) as f64);

    Card {
        width,
        height,
        fps,
        seconds,
        color: RETRIEVAL_COLOR,
        lines: vec![
            RETRIEVAL_BANNER.to_string(),
            content.headline.clone(),
            format!("Generation {}", result.generation_id),
            format!("Job {job_id}"),
            format!("{width}x{height}, {seconds:.0}s"),
        ],
    }
}
