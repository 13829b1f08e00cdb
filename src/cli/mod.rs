//! Command-line interface for teaser.
//!
//! `generate` runs the whole pipeline; `extract`, `tts`, `video` and
//! `compose` run one stage, producing missing predecessors first. Every
//! command is idempotent and reuses cached artifacts unless forced.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::Settings;
use crate::core::{Pipeline, StatusReport};
use crate::domain::{
    Fingerprint, ForceFlags, GenerationRequest, PipelineRun, RunOptions, RunStatus, Stage,
    VoicePreference,
};

/// teaser - Resumable promotional clip generator
#[derive(Parser, Debug)]
#[command(name = "teaser")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every stage and produce the final clip
    Generate {
        #[command(flatten)]
        request: RequestArgs,

        /// Regenerate every stage
        #[arg(long)]
        force: bool,

        /// Regenerate the extracted content
        #[arg(long)]
        force_content: bool,

        /// Regenerate the narration audio
        #[arg(long)]
        force_audio: bool,

        /// Regenerate the video
        #[arg(long)]
        force_video: bool,

        /// Recompose the final clip
        #[arg(long)]
        force_compose: bool,
    },

    /// Extract headline, script and key points
    Extract {
        #[command(flatten)]
        request: RequestArgs,

        /// Ignore the cached content
        #[arg(long)]
        force: bool,
    },

    /// Synthesize the narration audio
    Tts {
        #[command(flatten)]
        request: RequestArgs,

        /// Ignore the cached audio
        #[arg(long)]
        force: bool,
    },

    /// Generate the video
    Video {
        #[command(flatten)]
        request: RequestArgs,

        /// Ignore the cached video
        #[arg(long)]
        force: bool,
    },

    /// Compose audio and video into the final clip
    Compose {
        #[command(flatten)]
        request: RequestArgs,

        /// Ignore the cached final clip
        #[arg(long)]
        force: bool,
    },

    /// Show the last run and artifacts of a fingerprint, or list all
    Status {
        /// Fingerprint (16 hex chars); lists every fingerprint if omitted
        fingerprint: Option<String>,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// What to produce
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Teaser title
    pub title: String,

    /// Script or prompt text
    #[arg(short, long, conflicts_with = "file")]
    pub text: Option<String>,

    /// Read the script or prompt from a file (reads stdin if neither is given)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Target duration in seconds
    #[arg(short, long)]
    pub duration: Option<u32>,

    /// Language tag (e.g. en-US, he-IL)
    #[arg(short, long)]
    pub language: Option<String>,

    /// Preferred narrator voice
    #[arg(long, value_enum)]
    pub voice: Option<VoiceArg>,

    /// Explicit voice name (wins over --voice)
    #[arg(long)]
    pub voice_id: Option<String>,

    /// Use this headline instead of the extracted one
    #[arg(long)]
    pub headline: Option<String>,
}

/// Voice preference for CLI (maps to VoicePreference)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum VoiceArg {
    Female,
    Male,
}

impl From<VoiceArg> for VoicePreference {
    fn from(v: VoiceArg) -> Self {
        match v {
            VoiceArg::Female => VoicePreference::Female,
            VoiceArg::Male => VoicePreference::Male,
        }
    }
}

impl RequestArgs {
    /// Build the request, filling gaps from settings
    fn into_request(self, settings: &Settings) -> Result<(GenerationRequest, RunOptions)> {
        let source_text = match (self.text, &self.file) {
            (Some(text), _) => text,
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read input file: {}", path.display()))?,
            (None, None) if !io::stdin().is_terminal() => {
                let mut buffer = String::new();
                io::stdin()
                    .read_to_string(&mut buffer)
                    .context("Failed to read from stdin")?;
                buffer
            }
            (None, None) => {
                anyhow::bail!("No input provided. Use --text, --file <path> or pipe to stdin")
            }
        };

        let duration = self.duration.unwrap_or(settings.default_duration_seconds);
        let mut request = GenerationRequest::new(self.title, source_text, duration);
        if let Some(voice) = self.voice {
            request = request.with_voice_preference(voice.into());
        }
        if let Some(voice_id) = self.voice_id {
            request = request.with_voice_id(voice_id);
        }
        if let Some(headline) = self.headline {
            request = request.with_headline(headline);
        }
        request.validate()?;

        let language = self
            .language
            .unwrap_or_else(|| settings.default_language.clone());
        Ok((request, RunOptions::new(language)))
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::load()?;

        match self.command {
            Commands::Generate {
                request,
                force,
                force_content,
                force_audio,
                force_video,
                force_compose,
            } => {
                let flags = if force {
                    ForceFlags::all()
                } else {
                    ForceFlags {
                        content: force_content,
                        audio: force_audio,
                        video: force_video,
                        compose: force_compose,
                    }
                };
                generate(settings, request, flags).await
            }
            Commands::Extract { request, force } => {
                run_step(settings, request, Stage::Content, force).await
            }
            Commands::Tts { request, force } => {
                run_step(settings, request, Stage::Audio, force).await
            }
            Commands::Video { request, force } => {
                run_step(settings, request, Stage::Video, force).await
            }
            Commands::Compose { request, force } => {
                run_step(settings, request, Stage::Final, force).await
            }
            Commands::Status { fingerprint } => show_status(settings, fingerprint).await,
            Commands::Config => show_config(&settings),
        }
    }
}

/// Run the whole pipeline
async fn generate(settings: Settings, args: RequestArgs, force: ForceFlags) -> Result<()> {
    let (request, options) = args.into_request(&settings)?;
    let options = options.with_force(force);

    let pipeline = Pipeline::new(settings);
    let run = pipeline.run(&request, &options).await?;

    match run.status {
        RunStatus::Completed => {
            if let Some(path) = run.artifact(Stage::Final) {
                println!("{}", path.display());
            }
            eprintln!("\n[Run {} completed for {}]", run.run_id, run.fingerprint);
            print_degraded(&pipeline, &run.fingerprint).await?;
        }
        RunStatus::Failed => {
            eprintln!(
                "\n[Run {} failed: {}]",
                run.run_id,
                run.error_message.as_deref().unwrap_or("unknown error")
            );
            std::process::exit(1);
        }
        _ => {
            eprintln!("\n[Run {} in state: {:?}]", run.run_id, run.status);
        }
    }

    Ok(())
}

/// Run one stage, producing missing predecessors first
async fn run_step(settings: Settings, args: RequestArgs, stage: Stage, force: bool) -> Result<()> {
    let (request, options) = args.into_request(&settings)?;
    let options = options.with_force(ForceFlags {
        content: force && stage == Stage::Content,
        audio: force && stage == Stage::Audio,
        video: force && stage == Stage::Video,
        compose: force && stage == Stage::Final,
    });

    let pipeline = Pipeline::new(settings);
    let path = match stage {
        Stage::Content => pipeline.step_extract(&request, &options).await,
        Stage::Audio => pipeline.step_tts(&request, &options).await,
        Stage::Video => pipeline.step_video(&request, &options).await,
        Stage::Final => pipeline.step_compose(&request, &options).await,
    }
    .with_context(|| format!("{stage} step failed"))?;

    println!("{}", path.display());
    print_degraded(&pipeline, &request.fingerprint()).await
}

/// Note artifacts that are placeholders
async fn print_degraded(pipeline: &Pipeline, fingerprint: &Fingerprint) -> Result<()> {
    let metadata = pipeline.store().read_metadata(fingerprint).await?;
    for (stage, record) in &metadata.stages {
        if record.placeholder {
            eprintln!("  {stage}: placeholder from '{}'", record.provider);
        }
        if let Some(note) = &record.note {
            if record.placeholder {
                eprintln!("    {note}");
            }
        }
    }
    Ok(())
}

/// Show one fingerprint in detail, or a table of all of them
async fn show_status(settings: Settings, fingerprint: Option<String>) -> Result<()> {
    let pipeline = Pipeline::new(settings);

    let Some(raw) = fingerprint else {
        let fingerprints = pipeline.list().await?;
        if fingerprints.is_empty() {
            println!("No runs found");
            return Ok(());
        }

        println!("{:<18} {:<20} {:<30}", "FINGERPRINT", "STATE", "TITLE");
        println!("{}", "-".repeat(70));
        for fp in fingerprints {
            let report = pipeline.status(&fp).await?;
            println!(
                "{:<18} {:<20} {:<30}",
                fp,
                state_label(report.last_run.as_ref()),
                report.metadata.parameters.title
            );
        }
        return Ok(());
    };

    let fingerprint = Fingerprint::parse(raw.trim())
        .with_context(|| format!("Invalid fingerprint: {raw}"))?;
    let report = pipeline.status(&fingerprint).await?;
    print_report(&report);
    Ok(())
}

fn state_label(run: Option<&PipelineRun>) -> String {
    match run {
        Some(run) => serde_json::to_value(run.status)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", run.status)),
        None => "-".to_string(),
    }
}

fn print_report(report: &StatusReport) {
    let params = &report.metadata.parameters;
    println!("Fingerprint: {}", report.fingerprint);
    println!("Directory:   {}", report.directory.display());
    println!("Title:       {}", params.title);
    println!("Language:    {}", params.language);
    println!("Duration:    {}s", params.target_duration_seconds);

    match &report.last_run {
        Some(run) => {
            println!("\nLast run: {}", run.run_id);
            println!("  State:   {}", state_label(Some(run)));
            println!("  Started: {}", run.started_at);
            if let Some(completed) = run.completed_at {
                println!("  Ended:   {}", completed);
            }
            if let Some(error) = &run.error_message {
                println!("  Error:   {}", error);
            }
        }
        None => println!("\nNo runs recorded"),
    }

    println!("\nArtifacts:");
    for artifact in &report.artifacts {
        let record = report.metadata.stage(artifact.stage);
        let source = match record {
            Some(r) if r.placeholder => format!("{} (placeholder)", r.provider),
            Some(r) => r.provider.clone(),
            None => "-".to_string(),
        };
        println!(
            "  {:<8} {:<8} {:<28} {}",
            artifact.stage,
            if artifact.present { "present" } else { "missing" },
            source,
            artifact.path.display()
        );
    }
}

/// Show resolved configuration
fn show_config(settings: &Settings) -> Result<()> {
    println!("Teaser Configuration");
    println!();
    println!(
        "Config file: {}",
        settings
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:    {}", settings.home.display());
    println!("  Output:  {}", settings.output_dir.display());
    println!();
    println!("Defaults:");
    println!("  Language: {}", settings.default_language);
    println!("  Duration: {}s", settings.default_duration_seconds);
    println!("  Formats:  audio {}, video {}", settings.audio_format, settings.video_format);
    println!();
    println!("Remote jobs:");
    println!("  Poll interval: {:?}", settings.poll.interval);
    println!("  Poll timeout:  {:?}", settings.poll.timeout);
    println!("  Download:      {} attempts within {:?}", settings.download.max_attempts, settings.download.max_total);
    println!("  Max job clip:  {}s", settings.video.max_job_seconds);
    println!();
    println!("Providers:");
    println!("{:#?}", settings.providers);

    Ok(())
}
