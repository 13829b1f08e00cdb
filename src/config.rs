//! Pipeline settings.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TEASER_HOME, TEASER_OUTPUT_DIR, OPENAI_API_KEY,
//!    OPENAI_BASE_URL, SORA_ENDPOINT, SORA_API_KEY, TEASER_TOOL_SERVICE_URL)
//! 2. Config file (.teaser/config.yaml)
//! 3. Defaults (~/.teaser, output in ~/.teaser/output)
//!
//! Config file discovery:
//! - Searches current directory and parents for .teaser/config.yaml
//! - `paths.home` is relative to the .teaser/ directory, `paths.output` to the
//!   project root (the directory holding .teaser/)
//!
//! API keys are only read from the environment.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::openai::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_SPEECH_MODEL};
use crate::adapters::sora::DEFAULT_MODEL as DEFAULT_JOB_MODEL;
use crate::core::poller::{DownloadPolicy, PollPolicy};
use crate::domain::request::{MAX_DURATION_SECONDS, MIN_DURATION_SECONDS};
use crate::domain::VoicePreference;

const CONFIG_DIR: &str = ".teaser";
const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub poll: Option<PollPolicy>,
    #[serde(default)]
    pub download: Option<DownloadPolicy>,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub voices: VoiceSettings,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    pub home: Option<String>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    pub audio_format: Option<String>,
    pub video_format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsConfig {
    pub language: Option<String>,
    pub target_duration_seconds: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoConfig {
    pub max_job_seconds: Option<u32>,
    pub job_width: Option<u32>,
    pub job_height: Option<u32>,
    pub placeholder_width: Option<u32>,
    pub placeholder_height: Option<u32>,
    pub placeholder_fps: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    pub openai_base_url: Option<String>,
    pub chat_model: Option<String>,
    pub speech_model: Option<String>,
    pub job_endpoint: Option<String>,
    pub job_model: Option<String>,
    pub tool_service_url: Option<String>,
}

/// Default voices per preference
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VoiceSettings {
    pub female: Option<String>,
    pub male: Option<String>,
}

impl VoiceSettings {
    /// Explicit id wins, then the preference's configured voice, else none
    /// (provider default)
    pub fn resolve(
        &self,
        voice_id: Option<&str>,
        preference: Option<VoicePreference>,
    ) -> Option<String> {
        if let Some(id) = voice_id.filter(|id| !id.trim().is_empty()) {
            return Some(id.to_string());
        }
        match preference? {
            VoicePreference::Female => self.female.clone(),
            VoicePreference::Male => self.male.clone(),
        }
    }
}

/// Render sizes for generated video
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    /// Longest clip a remote job may be asked for
    pub max_job_seconds: u32,
    pub job_width: u32,
    pub job_height: u32,
    pub placeholder_width: u32,
    pub placeholder_height: u32,
    pub placeholder_fps: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            max_job_seconds: 10,
            job_width: 1920,
            job_height: 1080,
            placeholder_width: 720,
            placeholder_height: 1280,
            placeholder_fps: 24,
        }
    }
}

/// Endpoints, models and credentials of the remote providers
#[derive(Clone, PartialEq)]
pub struct ProviderSettings {
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub chat_model: String,
    pub speech_model: String,
    pub job_endpoint: Option<String>,
    pub job_api_key: Option<String>,
    pub job_model: String,
    pub tool_service_url: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            openai_api_key: None,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            speech_model: DEFAULT_SPEECH_MODEL.to_string(),
            job_endpoint: None,
            job_api_key: None,
            job_model: DEFAULT_JOB_MODEL.to_string(),
            tool_service_url: None,
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| if key.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("ProviderSettings")
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("chat_model", &self.chat_model)
            .field("speech_model", &self.speech_model)
            .field("job_endpoint", &self.job_endpoint)
            .field("job_api_key", &redact(&self.job_api_key))
            .field("job_model", &self.job_model)
            .field("tool_service_url", &self.tool_service_url)
            .finish()
    }
}

impl ProviderSettings {
    /// Job API endpoint and key, when both are set
    pub fn job_api(&self) -> Option<(&str, &str)> {
        Some((self.job_endpoint.as_deref()?, self.job_api_key.as_deref()?))
    }
}

/// Fully resolved settings, passed by value into the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub home: PathBuf,

    /// Root of the per-fingerprint artifact directories
    pub output_dir: PathBuf,

    pub config_file: Option<PathBuf>,

    pub audio_format: String,
    pub video_format: String,

    pub default_language: String,
    pub default_duration_seconds: u32,

    pub poll: PollPolicy,
    pub download: DownloadPolicy,
    pub video: VideoSettings,
    pub voices: VoiceSettings,
    pub providers: ProviderSettings,
}

impl Settings {
    /// Defaults rooted at `home`
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            output_dir: home.join("output"),
            home,
            config_file: None,
            audio_format: "wav".to_string(),
            video_format: "mp4".to_string(),
            default_language: "en-US".to_string(),
            default_duration_seconds: 15,
            poll: PollPolicy::default(),
            download: DownloadPolicy::default(),
            video: VideoSettings::default(),
            voices: VoiceSettings::default(),
            providers: ProviderSettings::default(),
        }
    }

    /// Load from the process environment and the discovered config file
    pub fn load() -> Result<Self> {
        let config_file = find_config_file();
        Self::resolve(config_file.as_deref(), |key| std::env::var(key).ok())
    }

    /// Resolve settings from an optional config file and an environment lookup
    pub fn resolve<F>(config_path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_home = dirs::home_dir()
            .context("Failed to determine home directory")?
            .join(CONFIG_DIR);

        let config = match config_path {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };

        // .teaser/ and the project root holding it
        let config_dir = config_path.and_then(Path::parent);
        let project_root = config_dir.and_then(Path::parent);

        let home = match (env("TEASER_HOME"), &config.paths.home, config_dir) {
            (Some(env_home), _, _) => PathBuf::from(env_home),
            (None, Some(home), Some(dir)) => resolve_path(dir, home),
            _ => default_home,
        };

        let mut settings = Self::with_home(&home);
        settings.config_file = config_path.map(Path::to_path_buf);

        settings.output_dir = match (env("TEASER_OUTPUT_DIR"), &config.paths.output, project_root) {
            (Some(env_out), _, _) => PathBuf::from(env_out),
            (None, Some(out), Some(root)) => resolve_path(root, out),
            _ => home.join("output"),
        };

        if let Some(format) = config.output.audio_format {
            settings.audio_format = format;
        }
        if let Some(format) = config.output.video_format {
            settings.video_format = format;
        }
        if let Some(language) = config.defaults.language {
            settings.default_language = language;
        }
        if let Some(duration) = config.defaults.target_duration_seconds {
            settings.default_duration_seconds =
                duration.clamp(MIN_DURATION_SECONDS, MAX_DURATION_SECONDS);
        }
        if let Some(poll) = config.poll {
            settings.poll = poll;
        }
        if let Some(download) = config.download {
            settings.download = download;
        }

        let video = config.video;
        let defaults = VideoSettings::default();
        settings.video = VideoSettings {
            max_job_seconds: video.max_job_seconds.unwrap_or(defaults.max_job_seconds),
            job_width: video.job_width.unwrap_or(defaults.job_width),
            job_height: video.job_height.unwrap_or(defaults.job_height),
            placeholder_width: video.placeholder_width.unwrap_or(defaults.placeholder_width),
            placeholder_height: video.placeholder_height.unwrap_or(defaults.placeholder_height),
            placeholder_fps: video.placeholder_fps.unwrap_or(defaults.placeholder_fps),
        };
        settings.voices = config.voices;

        let providers = config.providers;
        let base = ProviderSettings::default();
        settings.providers = ProviderSettings {
            openai_base_url: env("OPENAI_BASE_URL")
                .or(providers.openai_base_url)
                .unwrap_or(base.openai_base_url),
            openai_api_key: env("OPENAI_API_KEY").filter(|k| !k.is_empty()),
            chat_model: providers.chat_model.unwrap_or(base.chat_model),
            speech_model: providers.speech_model.unwrap_or(base.speech_model),
            job_endpoint: env("SORA_ENDPOINT").or(providers.job_endpoint),
            job_api_key: env("SORA_API_KEY").filter(|k| !k.is_empty()),
            job_model: providers.job_model.unwrap_or(base.job_model),
            tool_service_url: env("TEASER_TOOL_SERVICE_URL").or(providers.tool_service_url),
        };

        Ok(settings)
    }
}

/// Find config file by searching current directory and parents
pub fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}
