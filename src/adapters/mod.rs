//! Providers for the three pipeline capabilities, and the local media toolkit.
//!
//! Each capability has one input and one output type, shared by every
//! provider of that capability so they can sit in one [`ProviderChain`].
//!
//! [`ProviderChain`]: crate::core::chain::ProviderChain

pub mod media;
pub mod openai;
pub mod placeholder;
pub mod prompt;
pub mod sora;
pub mod tool_service;

use std::path::{Path, PathBuf};

use crate::core::chain::ChainOutput;
use crate::domain::{TeaserContent, VoicePreference};

pub use media::{FfmpegBackend, MediaBackend, StubBackend};
pub use openai::{OpenAiExtractor, OpenAiSpeech};
pub use placeholder::{DefaultContent, PlaceholderVideo, SilentSpeech};
pub use sora::{HttpVideoJobApi, RemoteJobVideo};
pub use tool_service::{ToolServiceClient, ToolServiceExtractor, ToolServiceSpeech, ToolServiceVideo};

/// Input of the content-extraction capability
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionInput {
    pub title: String,
    pub source_text: String,
    pub target_duration_seconds: u32,
    pub language: String,
}

impl ChainOutput for TeaserContent {}

/// Input of the speech-synthesis capability
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechInput {
    pub script: String,
    pub language: String,

    /// Concrete voice, already resolved from id or preference
    pub voice: Option<String>,
    pub voice_preference: Option<VoicePreference>,

    pub target_duration_seconds: u32,

    /// Where the provider must leave the audio
    pub dest: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechOutput {
    pub path: PathBuf,

    /// Voice the provider actually used, when known
    pub voice: Option<String>,
}

impl ChainOutput for SpeechOutput {
    fn artifact_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Input of the video-synthesis capability
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInput {
    pub content: TeaserContent,
    pub target_duration_seconds: u32,

    /// Where the provider must leave the video
    pub dest: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoOutput {
    pub path: PathBuf,

    /// Set when the video is a stand-in for a result that exists remotely
    pub note: Option<String>,
}

impl ChainOutput for VideoOutput {
    fn artifact_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
