//! Pipeline orchestrator.
//!
//! Stages run as `extract -> {audio, video} -> compose`, audio and video
//! concurrently. Each stage reuses its cached artifact unless forced. Every
//! invocation (a full run or a single step) is recorded as a run in the
//! fingerprint's `events.jsonl`, and same-fingerprint invocations are
//! serialized in-process by the [`RunRegistry`] and across processes by the
//! directory lock.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::media::{self, MediaBackend};
use crate::adapters::{
    DefaultContent, ExtractionInput, OpenAiExtractor, OpenAiSpeech, PlaceholderVideo,
    RemoteJobVideo, SilentSpeech, SpeechInput, SpeechOutput, ToolServiceClient,
    ToolServiceExtractor, ToolServiceSpeech, ToolServiceVideo, VideoInput, VideoOutput,
};
use crate::adapters::sora::HttpVideoJobApi;
use crate::config::Settings;
use crate::domain::{
    Event, EventType, Fingerprint, ForceFlags, GenerationRequest, PipelineRun, ProviderAttempt,
    RunMetadata, RunOptions, RunParameters, Stage, StageRecord, StageStatus, StoredContent,
    TeaserContent,
};
use crate::error::{PipelineError, PipelineResult, StoreError};

use super::chain::{Capability, ProviderChain};
use super::poller::AsyncJobPoller;
use super::reconcile::DurationReconciler;
use super::registry::RunRegistry;
use super::store::ArtifactStore;

/// The three provider chains of a pipeline
pub struct Chains {
    pub extraction: ProviderChain<ExtractionInput, TeaserContent>,
    pub speech: ProviderChain<SpeechInput, SpeechOutput>,
    pub video: ProviderChain<VideoInput, VideoOutput>,
}

impl Chains {
    /// Chains in priority order: tool service, direct API, placeholder
    pub fn from_settings(settings: &Settings, backend: Arc<dyn MediaBackend>) -> Self {
        let providers = &settings.providers;
        let video = &settings.video;
        let tools = Arc::new(ToolServiceClient::new(providers.tool_service_url.clone()));

        let extraction = ProviderChain::<ExtractionInput, TeaserContent>::new(
            Capability::ContentExtraction,
            Arc::new(DefaultContent),
        )
        .with_provider(Arc::new(ToolServiceExtractor::new(tools.clone())))
        .with_provider(Arc::new(
            OpenAiExtractor::new(&providers.openai_base_url, providers.openai_api_key.clone())
                .with_model(&providers.chat_model),
        ));

        let speech = ProviderChain::<SpeechInput, SpeechOutput>::new(
            Capability::SpeechSynthesis,
            Arc::new(SilentSpeech::new(backend.clone())),
        )
        .with_provider(Arc::new(ToolServiceSpeech::new(tools.clone())))
        .with_provider(Arc::new(
            OpenAiSpeech::new(&providers.openai_base_url, providers.openai_api_key.clone())
                .with_model(&providers.speech_model),
        ));

        let poller = providers.job_api().map(|(endpoint, key)| {
            let api = HttpVideoJobApi::new(endpoint, key).with_model(&providers.job_model);
            AsyncJobPoller::new(Arc::new(api), settings.poll.clone(), settings.download.clone())
        });

        let video_chain = ProviderChain::<VideoInput, VideoOutput>::new(
            Capability::VideoSynthesis,
            Arc::new(PlaceholderVideo::new(
                backend.clone(),
                video.placeholder_width,
                video.placeholder_height,
                video.placeholder_fps,
            )),
        )
        .with_provider(Arc::new(ToolServiceVideo::new(tools)))
        .with_provider(Arc::new(RemoteJobVideo::new(
            poller,
            backend,
            video.max_job_seconds,
            (video.job_width, video.job_height),
            video.placeholder_fps,
        )));

        Self {
            extraction,
            speech,
            video: video_chain,
        }
    }
}

/// Result of one invocation
#[derive(Debug)]
pub struct Invocation {
    pub run: PipelineRun,

    /// Artifact of the requested stage, when the run completed
    pub artifact: Option<PathBuf>,

    /// Why the run failed
    pub error: Option<PipelineError>,
}

/// What `status` reports about a fingerprint
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub fingerprint: Fingerprint,
    pub directory: PathBuf,

    /// Latest recorded invocation
    pub last_run: Option<PipelineRun>,

    pub metadata: RunMetadata,

    /// Each stage's canonical path and whether it is a valid artifact
    pub artifacts: Vec<ArtifactStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStatus {
    pub stage: Stage,
    pub path: PathBuf,
    pub present: bool,
}

/// Per-invocation state shared by concurrently running stages
struct RunContext<'a> {
    run_id: Uuid,
    fingerprint: Fingerprint,
    request: &'a GenerationRequest,
    options: &'a RunOptions,
    run: Mutex<PipelineRun>,
}

impl RunContext<'_> {
    fn event(
        &self,
        stage: Option<Stage>,
        event_type: EventType,
        summary: impl Into<String>,
        status: StageStatus,
    ) -> Event {
        Event::new(
            self.run_id,
            self.fingerprint.clone(),
            stage,
            event_type,
            summary,
            status,
        )
    }

    fn record_artifact(&self, stage: Stage, path: &Path) {
        let mut run = self.run.lock().unwrap_or_else(|e| e.into_inner());
        run.artifacts.insert(stage, path.to_path_buf());
    }

    fn snapshot(&self) -> PipelineRun {
        self.run.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// The production pipeline
pub struct Pipeline {
    settings: Settings,
    store: ArtifactStore,
    registry: RunRegistry,
    chains: Chains,
    reconciler: DurationReconciler,
}

impl Pipeline {
    /// Pipeline with providers from `settings` and the detected media backend
    pub fn new(settings: Settings) -> Self {
        let backend = media::detect();
        let chains = Chains::from_settings(&settings, backend.clone());
        Self::from_parts(settings, backend, chains)
    }

    /// Pipeline with explicit chains and media backend
    pub fn from_parts(settings: Settings, backend: Arc<dyn MediaBackend>, chains: Chains) -> Self {
        let store = ArtifactStore::new(
            &settings.output_dir,
            &settings.audio_format,
            &settings.video_format,
        );
        Self {
            store,
            registry: RunRegistry::new(),
            chains,
            reconciler: DurationReconciler::new(backend),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Cache/resume identity of a request
    pub fn fingerprint(&self, request: &GenerationRequest) -> Fingerprint {
        request.fingerprint()
    }

    /// Run every stage, reusing valid cached artifacts unless forced
    pub async fn run(
        &self,
        request: &GenerationRequest,
        options: &RunOptions,
    ) -> PipelineResult<PipelineRun> {
        let outcome = self
            .invoke(request, options, Stage::Final, options.force, true)
            .await?;
        Ok(outcome.run)
    }

    /// Ensure `teaser_content.json` exists
    pub async fn step_extract(
        &self,
        request: &GenerationRequest,
        options: &RunOptions,
    ) -> PipelineResult<PathBuf> {
        self.step(request, options, Stage::Content).await
    }

    /// Ensure the narration audio exists, extracting content first if missing
    pub async fn step_tts(
        &self,
        request: &GenerationRequest,
        options: &RunOptions,
    ) -> PipelineResult<PathBuf> {
        self.step(request, options, Stage::Audio).await
    }

    /// Ensure the video exists, extracting content first if missing
    pub async fn step_video(
        &self,
        request: &GenerationRequest,
        options: &RunOptions,
    ) -> PipelineResult<PathBuf> {
        self.step(request, options, Stage::Video).await
    }

    /// Ensure the final clip exists, producing missing audio/video first
    pub async fn step_compose(
        &self,
        request: &GenerationRequest,
        options: &RunOptions,
    ) -> PipelineResult<PathBuf> {
        self.step(request, options, Stage::Final).await
    }

    /// Latest run, metadata and artifact presence of a fingerprint
    pub async fn status(&self, fingerprint: &Fingerprint) -> PipelineResult<StatusReport> {
        let events = self.store.replay(fingerprint).await?;
        let metadata = self.store.read_metadata(fingerprint).await?;

        let mut artifacts = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            artifacts.push(ArtifactStatus {
                stage,
                path: self.store.path(fingerprint, stage),
                present: self.store.has(fingerprint, stage).await,
            });
        }

        Ok(StatusReport {
            fingerprint: fingerprint.clone(),
            directory: self.store.dir(fingerprint),
            last_run: PipelineRun::from_events(&events),
            metadata,
            artifacts,
        })
    }

    /// Fingerprints that have an artifact directory
    pub async fn list(&self) -> PipelineResult<Vec<Fingerprint>> {
        Ok(self.store.list_fingerprints().await?)
    }

    /// Single-stage entry: only the target stage honors its force flag
    async fn step(
        &self,
        request: &GenerationRequest,
        options: &RunOptions,
        target: Stage,
    ) -> PipelineResult<PathBuf> {
        let requested = options.force;
        let force = ForceFlags {
            content: target == Stage::Content && requested.content,
            audio: target == Stage::Audio && requested.audio,
            video: target == Stage::Video && requested.video,
            compose: target == Stage::Final && requested.compose,
        };

        let outcome = self.invoke(request, options, target, force, false).await?;
        if let Some(e) = outcome.error {
            return Err(e);
        }
        outcome
            .artifact
            .ok_or_else(|| PipelineError::Store(StoreError::NotFound {
                path: self.store.path(&outcome.run.fingerprint, target),
            }))
    }

    /// Claim the fingerprint, record a run, and drive stages up to `target`.
    ///
    /// Stage failures do not surface as `Err`: the returned run is failed and
    /// carries the error. `full_run` records the force flags in metadata.
    #[instrument(skip_all, fields(fingerprint = tracing::field::Empty, target = %target))]
    async fn invoke(
        &self,
        request: &GenerationRequest,
        options: &RunOptions,
        target: Stage,
        force: ForceFlags,
        full_run: bool,
    ) -> PipelineResult<Invocation> {
        request.validate()?;
        let fingerprint = request.fingerprint();
        tracing::Span::current().record("fingerprint", fingerprint.as_str());

        let _claim = self.registry.claim(&fingerprint).await;
        let _lock = self.store.lock(&fingerprint).await?;

        let run_id = Uuid::new_v4();
        let ctx = RunContext {
            run_id,
            fingerprint: fingerprint.clone(),
            request,
            options,
            run: Mutex::new(PipelineRun::new(run_id, fingerprint.clone())),
        };

        info!(%run_id, "Starting run");
        self.emit(
            &ctx,
            ctx.event(
                None,
                EventType::RunStarted,
                format!("'{}' up to {target}", request.title),
                StageStatus::Running,
            ),
        )
        .await?;

        let parameters = RunParameters {
            title: request.title.clone(),
            language: options.language.clone(),
            target_duration_seconds: request.target_duration_seconds,
            voice_preference: request.voice_preference,
            voice_id: request.voice_id.clone(),
        };
        let started = Instant::now();

        let result = match self
            .store
            .update_metadata(&fingerprint, |m| {
                m.fingerprint = fingerprint.to_string();
                m.parameters = parameters;
                if full_run {
                    m.forced = options.force;
                }
            })
            .await
        {
            Ok(_) => self.drive(&ctx, target, force).await,
            Err(e) => Err(e.into()),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(path) => {
                info!(%run_id, path = %path.display(), duration_ms, "Run completed");
                self.emit(
                    &ctx,
                    ctx.event(
                        Some(target),
                        EventType::RunCompleted,
                        format!("{target} ready at {}", path.display()),
                        StageStatus::Completed,
                    )
                    .with_duration(duration_ms),
                )
                .await?;
                Ok(Invocation {
                    run: ctx.snapshot(),
                    artifact: Some(path),
                    error: None,
                })
            }
            Err(e) => {
                error!(%run_id, error = %e, "Run failed");
                let event = ctx
                    .event(
                        Some(target),
                        EventType::RunFailed,
                        "Run failed",
                        StageStatus::Failed,
                    )
                    .with_duration(duration_ms)
                    .with_error(e.to_string());
                if let Err(store_err) = self.emit(&ctx, event).await {
                    warn!(error = %store_err, "Could not record run failure");
                }
                // The in-memory run fails even when the event could not be written
                ctx.run
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .fail(e.to_string());
                Ok(Invocation {
                    run: ctx.snapshot(),
                    artifact: None,
                    error: Some(e),
                })
            }
        }
    }

    async fn drive(
        &self,
        ctx: &RunContext<'_>,
        target: Stage,
        force: ForceFlags,
    ) -> PipelineResult<PathBuf> {
        let content = self.ensure_content(ctx, force.content).await?;

        match target {
            Stage::Content => Ok(self.store.path(&ctx.fingerprint, Stage::Content)),
            Stage::Audio => self.ensure_audio(ctx, &content, force.audio).await,
            Stage::Video => self.ensure_video(ctx, &content, force.video).await,
            Stage::Final => {
                let (audio, video) = tokio::join!(
                    self.ensure_audio(ctx, &content, force.audio),
                    self.ensure_video(ctx, &content, force.video),
                );
                let (audio, video) = (audio?, video?);
                self.ensure_final(ctx, &audio, &video, force.compose).await
            }
        }
    }

    /// Append an event and fold it into the in-memory run
    async fn emit(&self, ctx: &RunContext<'_>, event: Event) -> PipelineResult<()> {
        self.store.append_event(&event).await?;
        ctx.run
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .apply_event(&event);
        Ok(())
    }

    /// Reuse a valid cached artifact; returns its path if one was reused
    async fn reuse(
        &self,
        ctx: &RunContext<'_>,
        stage: Stage,
        force: bool,
    ) -> PipelineResult<Option<PathBuf>> {
        if force || !self.store.has(&ctx.fingerprint, stage).await {
            return Ok(None);
        }
        let path = self.store.path(&ctx.fingerprint, stage);
        info!(%stage, path = %path.display(), "Reusing cached artifact");
        self.emit(
            ctx,
            ctx.event(
                Some(stage),
                EventType::StageSkipped,
                format!("Reused {}", path.display()),
                StageStatus::Skipped,
            ),
        )
        .await?;
        ctx.record_artifact(stage, &path);
        Ok(Some(path))
    }

    async fn stage_started(
        &self,
        ctx: &RunContext<'_>,
        stage: Stage,
        forced: bool,
    ) -> PipelineResult<()> {
        info!(%stage, forced, "Producing artifact");
        self.emit(
            ctx,
            ctx.event(
                Some(stage),
                EventType::StageStarted,
                if forced {
                    format!("Regenerating {stage} (forced)")
                } else {
                    format!("Generating {stage}")
                },
                StageStatus::Running,
            ),
        )
        .await
    }

    async fn provider_failures(
        &self,
        ctx: &RunContext<'_>,
        stage: Stage,
        attempts: &[ProviderAttempt],
    ) -> PipelineResult<()> {
        for attempt in attempts.iter().filter(|a| !a.succeeded) {
            let event = ctx
                .event(
                    Some(stage),
                    EventType::ProviderFailed,
                    format!("{} failed, falling back", attempt.provider_name),
                    StageStatus::Failed,
                )
                .with_provider(&attempt.provider_name)
                .with_duration(attempt.elapsed_ms)
                .with_error(attempt.error.clone().unwrap_or_default());
            self.emit(ctx, event).await?;
        }
        Ok(())
    }

    async fn stage_completed(
        &self,
        ctx: &RunContext<'_>,
        stage: Stage,
        path: &Path,
        record: StageRecord,
        duration_ms: u64,
    ) -> PipelineResult<()> {
        let provider = record.provider.clone();
        let placeholder = record.placeholder;
        self.store
            .update_metadata(&ctx.fingerprint, |m| {
                m.stages.insert(stage, record);
            })
            .await?;

        let summary = if placeholder {
            format!("{stage} produced by placeholder '{provider}'")
        } else {
            format!("{stage} produced by '{provider}'")
        };
        self.emit(
            ctx,
            ctx.event(Some(stage), EventType::StageCompleted, summary, StageStatus::Completed)
                .with_provider(provider)
                .with_duration(duration_ms),
        )
        .await?;
        ctx.record_artifact(stage, path);
        debug!(%stage, path = %path.display(), "Stage recorded");
        Ok(())
    }

    async fn ensure_content(
        &self,
        ctx: &RunContext<'_>,
        force: bool,
    ) -> PipelineResult<StoredContent> {
        let stage = Stage::Content;
        if self.reuse(ctx, stage, force).await?.is_some() {
            let bytes = self.store.read(&ctx.fingerprint, stage).await?;
            match StoredContent::from_json(&bytes) {
                Ok(stored) => return Ok(stored),
                Err(e) => warn!(error = %e, "Cached content is unreadable, extracting again"),
            }
        }

        self.stage_started(ctx, stage, force).await?;
        let started = Instant::now();
        let request = ctx.request;
        let input = ExtractionInput {
            title: request.title.clone(),
            source_text: request.source_text.clone(),
            target_duration_seconds: request.target_duration_seconds,
            language: ctx.options.language.clone(),
        };

        let outcome = match self.chains.extraction.execute(&input).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.provider_failures(ctx, stage, &e.attempts).await?;
                return Err(PipelineError::ExtractionFailure(e.to_string()));
            }
        };
        self.provider_failures(ctx, stage, &outcome.attempts).await?;

        let mut content = outcome.output;
        if let Some(headline) = request.headline.as_ref().filter(|h| !h.trim().is_empty()) {
            content.headline = headline.clone();
        }
        content.duration_seconds = request.target_duration_seconds;

        let stored = StoredContent {
            content,
            language: Some(ctx.options.language.clone()),
            voice_preference: request.voice_preference,
            voice_id: request.voice_id.clone(),
        };
        let json = stored.to_json().map_err(StoreError::from)?;
        let path = self.store.write(&ctx.fingerprint, stage, &json).await?;

        let record = StageRecord {
            provider: outcome.provider,
            placeholder: outcome.placeholder,
            degraded: false,
            note: None,
            attempts: outcome.attempts,
            produced_at: Utc::now(),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        self.stage_completed(ctx, stage, &path, record, duration_ms).await?;
        Ok(stored)
    }

    async fn ensure_audio(
        &self,
        ctx: &RunContext<'_>,
        content: &StoredContent,
        force: bool,
    ) -> PipelineResult<PathBuf> {
        let stage = Stage::Audio;
        if let Some(path) = self.reuse(ctx, stage, force).await? {
            return Ok(path);
        }

        self.stage_started(ctx, stage, force).await?;
        let started = Instant::now();
        let request = ctx.request;

        let voice_id = request.voice_id.as_deref().or(content.voice_id.as_deref());
        let preference = request.voice_preference.or(content.voice_preference);
        let dest = self.store.staging_path(&ctx.fingerprint, stage).await?;
        let input = SpeechInput {
            script: content.content.narration_script.clone(),
            language: content
                .language
                .clone()
                .unwrap_or_else(|| ctx.options.language.clone()),
            voice: self.settings.voices.resolve(voice_id, preference),
            voice_preference: preference,
            target_duration_seconds: content.content.duration_seconds,
            dest: dest.clone(),
        };

        let outcome = match self.chains.speech.execute(&input).await {
            Ok(outcome) => outcome,
            Err(e) => {
                discard(&dest).await;
                self.provider_failures(ctx, stage, &e.attempts).await?;
                return Err(PipelineError::SynthesisFailure {
                    stage,
                    message: e.to_string(),
                });
            }
        };
        self.provider_failures(ctx, stage, &outcome.attempts).await?;

        let path = self.store.commit(&ctx.fingerprint, stage, &outcome.output.path).await?;
        let record = StageRecord {
            provider: outcome.provider,
            placeholder: outcome.placeholder,
            degraded: false,
            note: outcome.output.voice.map(|v| format!("voice {v}")),
            attempts: outcome.attempts,
            produced_at: Utc::now(),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        self.stage_completed(ctx, stage, &path, record, duration_ms).await?;
        Ok(path)
    }

    async fn ensure_video(
        &self,
        ctx: &RunContext<'_>,
        content: &StoredContent,
        force: bool,
    ) -> PipelineResult<PathBuf> {
        let stage = Stage::Video;
        if let Some(path) = self.reuse(ctx, stage, force).await? {
            return Ok(path);
        }

        self.stage_started(ctx, stage, force).await?;
        let started = Instant::now();

        let dest = self.store.staging_path(&ctx.fingerprint, stage).await?;
        let input = VideoInput {
            content: content.content.clone(),
            target_duration_seconds: content.content.duration_seconds,
            dest: dest.clone(),
        };

        let outcome = match self.chains.video.execute(&input).await {
            Ok(outcome) => outcome,
            Err(e) => {
                discard(&dest).await;
                self.provider_failures(ctx, stage, &e.attempts).await?;
                return Err(PipelineError::SynthesisFailure {
                    stage,
                    message: e.to_string(),
                });
            }
        };
        self.provider_failures(ctx, stage, &outcome.attempts).await?;

        let path = self.store.commit(&ctx.fingerprint, stage, &outcome.output.path).await?;
        let note = outcome.output.note;
        if let Some(note) = &note {
            warn!(%note, "Video is a stand-in for a remote result");
        }
        let record = StageRecord {
            provider: outcome.provider,
            placeholder: outcome.placeholder || note.is_some(),
            degraded: false,
            note,
            attempts: outcome.attempts,
            produced_at: Utc::now(),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        self.stage_completed(ctx, stage, &path, record, duration_ms).await?;
        Ok(path)
    }

    async fn ensure_final(
        &self,
        ctx: &RunContext<'_>,
        audio: &Path,
        video: &Path,
        force: bool,
    ) -> PipelineResult<PathBuf> {
        let stage = Stage::Final;
        if let Some(path) = self.reuse(ctx, stage, force).await? {
            return Ok(path);
        }

        self.stage_started(ctx, stage, force).await?;
        let started = Instant::now();

        let dest = self.store.staging_path(&ctx.fingerprint, stage).await?;
        let target_seconds = f64::from(ctx.request.target_duration_seconds);
        let plan = match self
            .reconciler
            .reconcile(audio, video, &dest, Some(target_seconds))
            .await
        {
            Ok((_, plan)) => plan,
            Err(e) => {
                discard(&dest).await;
                return Err(e);
            }
        };
        let path = self.store.commit(&ctx.fingerprint, stage, &dest).await?;

        let metadata = self.store.read_metadata(&ctx.fingerprint).await?;
        let degraded = metadata.is_placeholder(Stage::Audio) || metadata.is_placeholder(Stage::Video);
        let backend = self.reconciler.backend();
        let record = StageRecord {
            provider: backend.name().to_string(),
            placeholder: degraded || !backend.renders_media(),
            degraded,
            note: Some(format!(
                "{} segment(s) of {:.2}s video for {:.2}s audio",
                plan.segments.len(),
                plan.video_seconds,
                plan.audio_seconds
            )),
            attempts: Vec::new(),
            produced_at: Utc::now(),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        self.stage_completed(ctx, stage, &path, record, duration_ms).await?;
        Ok(path)
    }
}

/// Remove a staging file left behind by a failed stage
async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Could not remove staging file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::media::StubBackend;
    use crate::domain::RunStatus;
    use tempfile::TempDir;

    fn pipeline(temp: &TempDir) -> Pipeline {
        let settings = Settings::with_home(temp.path());
        let backend: Arc<dyn MediaBackend> = Arc::new(StubBackend);
        let chains = Chains::from_settings(&settings, backend.clone());
        Pipeline::from_parts(settings, backend, chains)
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_any_run() {
        let temp = TempDir::new().unwrap();
        let pipeline = pipeline(&temp);
        let request = GenerationRequest::new("Ep1", "text", 2);

        let result = pipeline.run(&request, &RunOptions::default()).await;
        assert!(matches!(result, Err(PipelineError::InvalidRequest(_))));
        assert!(pipeline.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_headline_override_and_duration() {
        let temp = TempDir::new().unwrap();
        let pipeline = pipeline(&temp);
        let request = GenerationRequest::new("Ep1", "text", 20).with_headline("Custom Headline");

        let path = pipeline
            .step_extract(&request, &RunOptions::new("he-IL"))
            .await
            .unwrap();
        let stored = StoredContent::from_json(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(stored.content.headline, "Custom Headline");
        assert_eq!(stored.content.duration_seconds, 20);
        assert_eq!(stored.language.as_deref(), Some("he-IL"));
    }

    #[tokio::test]
    async fn test_status_reflects_last_invocation() {
        let temp = TempDir::new().unwrap();
        let pipeline = pipeline(&temp);
        let request = GenerationRequest::new("Ep1", "text", 15);

        pipeline
            .step_tts(&request, &RunOptions::default())
            .await
            .unwrap();
        let report = pipeline.status(&request.fingerprint()).await.unwrap();

        let last = report.last_run.unwrap();
        assert_eq!(last.status, RunStatus::Completed);
        let present: Vec<Stage> = report
            .artifacts
            .iter()
            .filter(|a| a.present)
            .map(|a| a.stage)
            .collect();
        assert_eq!(present, vec![Stage::Content, Stage::Audio]);
        assert_eq!(report.metadata.parameters.title, "Ep1");
    }
}
