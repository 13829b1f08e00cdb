//! Idempotency Integration Tests
//!
//! Re-running a stage whose artifact is valid must not call any provider and
//! must leave the artifact directory untouched.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use teaser::adapters::media::{Card, MediaBackend, MediaResult, StubBackend};
use teaser::adapters::{
    DefaultContent, ExtractionInput, PlaceholderVideo, SilentSpeech, SpeechInput, SpeechOutput,
    VideoInput, VideoOutput,
};
use teaser::config::Settings;
use teaser::core::{Capability, Chains, CompositionPlan, Pipeline, Provider, ProviderChain};
use teaser::domain::{
    ForceFlags, GenerationRequest, RunOptions, RunStatus, Stage, StoredContent, TeaserContent,
};
use teaser::error::ProviderError;

/// Stub media padded past the video presence minimum, so its output counts
/// as a valid cached artifact
struct PaddedBackend;

async fn pad(dest: &Path) -> MediaResult<()> {
    let mut bytes = tokio::fs::read(dest).await?;
    bytes.extend_from_slice(format!("pad={}\n", "x".repeat(2048)).as_bytes());
    tokio::fs::write(dest, bytes).await?;
    Ok(())
}

#[async_trait]
impl MediaBackend for PaddedBackend {
    fn name(&self) -> &str {
        "padded-stub"
    }

    fn renders_media(&self) -> bool {
        false
    }

    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        StubBackend.probe_duration(path).await
    }

    async fn render_card(&self, card: &Card, dest: &Path) -> MediaResult<()> {
        StubBackend.render_card(card, dest).await?;
        pad(dest).await
    }

    async fn render_silence(&self, seconds: f64, dest: &Path) -> MediaResult<()> {
        StubBackend.render_silence(seconds, dest).await
    }

    async fn compose(
        &self,
        plan: &CompositionPlan,
        video: &Path,
        audio: &Path,
        dest: &Path,
    ) -> MediaResult<()> {
        StubBackend.compose(plan, video, audio, dest).await?;
        pad(dest).await
    }
}

/// Extractor that counts its calls
#[derive(Default)]
struct CountingExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl Provider<ExtractionInput, TeaserContent> for CountingExtractor {
    fn name(&self) -> &str {
        "counting-extractor"
    }

    async fn run(&self, input: &ExtractionInput) -> Result<TeaserContent, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TeaserContent {
            headline: format!("Inside {}", input.title),
            narration_script: "A short narration.".to_string(),
            key_points: vec!["one".to_string(), "two".to_string()],
            visual_description: "studio lights".to_string(),
            duration_seconds: 99,
        })
    }
}

/// Speech provider that counts calls and remembers the voice it was given
#[derive(Default)]
struct CountingSpeech {
    calls: AtomicUsize,
    last_voice: Mutex<Option<String>>,
}

#[async_trait]
impl Provider<SpeechInput, SpeechOutput> for CountingSpeech {
    fn name(&self) -> &str {
        "counting-speech"
    }

    async fn run(&self, input: &SpeechInput) -> Result<SpeechOutput, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_voice.lock().unwrap() = input.voice.clone();
        StubBackend
            .render_silence(input.target_duration_seconds as f64, &input.dest)
            .await?;
        Ok(SpeechOutput {
            path: input.dest.clone(),
            voice: input.voice.clone(),
        })
    }
}

struct Harness {
    _temp: TempDir,
    pipeline: Pipeline,
    extractor: Arc<CountingExtractor>,
    speech: Arc<CountingSpeech>,
}

fn harness() -> Harness {
    let temp = TempDir::new().unwrap();
    let settings = Settings::with_home(temp.path());
    let backend: Arc<dyn MediaBackend> = Arc::new(PaddedBackend);
    let extractor = Arc::new(CountingExtractor::default());
    let speech = Arc::new(CountingSpeech::default());

    let chains = Chains {
        extraction: ProviderChain::<ExtractionInput, TeaserContent>::new(
            Capability::ContentExtraction,
            Arc::new(DefaultContent),
        )
        .with_provider(extractor.clone()),
        speech: ProviderChain::<SpeechInput, SpeechOutput>::new(
            Capability::SpeechSynthesis,
            Arc::new(SilentSpeech::new(backend.clone())),
        )
        .with_provider(speech.clone()),
        video: ProviderChain::<VideoInput, VideoOutput>::new(
            Capability::VideoSynthesis,
            Arc::new(PlaceholderVideo::new(backend.clone(), 720, 1280, 24)),
        ),
    };

    Harness {
        pipeline: Pipeline::from_parts(settings, backend, chains),
        _temp: temp,
        extractor,
        speech,
    }
}

fn request() -> GenerationRequest {
    GenerationRequest::new("Ep1", "We talked about sleep and memory.", 15)
}

#[tokio::test]
async fn test_second_extract_invokes_no_provider() {
    let h = harness();
    let request = request();
    let options = RunOptions::default();

    let path = h.pipeline.step_extract(&request, &options).await.unwrap();
    let content_before = std::fs::read(&path).unwrap();
    let metadata_path = h.pipeline.store().dir(&request.fingerprint()).join("metadata.json");
    let metadata_before = std::fs::read(&metadata_path).unwrap();
    let modified_before = std::fs::metadata(&metadata_path).unwrap().modified().unwrap();

    let again = h.pipeline.step_extract(&request, &options).await.unwrap();

    assert_eq!(again, path);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read(&path).unwrap(), content_before);
    assert_eq!(std::fs::read(&metadata_path).unwrap(), metadata_before);
    assert_eq!(
        std::fs::metadata(&metadata_path).unwrap().modified().unwrap(),
        modified_before
    );
}

#[tokio::test]
async fn test_extracted_duration_is_forced_to_target() {
    let h = harness();
    let request = request();

    let path = h
        .pipeline
        .step_extract(&request, &RunOptions::default())
        .await
        .unwrap();

    let stored = StoredContent::from_json(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(stored.content.duration_seconds, 15);
    assert_eq!(stored.content.headline, "Inside Ep1");
}

#[tokio::test]
async fn test_force_reextracts() {
    let h = harness();
    let request = request();

    h.pipeline
        .step_extract(&request, &RunOptions::default())
        .await
        .unwrap();
    let forced = RunOptions::default().with_force(ForceFlags {
        content: true,
        ..Default::default()
    });
    h.pipeline.step_extract(&request, &forced).await.unwrap();

    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_full_rerun_reuses_every_stage() {
    let h = harness();
    let request = request();
    let options = RunOptions::default();

    let first = h.pipeline.run(&request, &options).await.unwrap();
    assert_eq!(first.status, RunStatus::Completed);

    let final_path = h.pipeline.store().path(&request.fingerprint(), Stage::Final);
    let final_before = std::fs::read(&final_path).unwrap();
    let metadata_path = h.pipeline.store().dir(&request.fingerprint()).join("metadata.json");
    let metadata_before = std::fs::read(&metadata_path).unwrap();

    let second = h.pipeline.run(&request, &options).await.unwrap();

    assert_eq!(second.status, RunStatus::Completed);
    assert_ne!(second.run_id, first.run_id);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read(&final_path).unwrap(), final_before);
    assert_eq!(std::fs::read(&metadata_path).unwrap(), metadata_before);
}

#[tokio::test]
async fn test_forcing_one_stage_leaves_the_others_cached() {
    let h = harness();
    let request = request();

    h.pipeline
        .run(&request, &RunOptions::default())
        .await
        .unwrap();
    let forced = RunOptions::default().with_force(ForceFlags {
        audio: true,
        ..Default::default()
    });
    let run = h.pipeline.run(&request, &forced).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_truncated_artifact_is_regenerated() {
    let h = harness();
    let request = request();
    let options = RunOptions::default();

    let audio = h.pipeline.step_tts(&request, &options).await.unwrap();
    std::fs::write(&audio, b"").unwrap();

    h.pipeline.step_tts(&request, &options).await.unwrap();

    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 2);
    assert!(std::fs::metadata(&audio).unwrap().len() > 0);
}

#[tokio::test]
async fn test_tts_reuses_voice_saved_with_content() {
    let h = harness();
    let options = RunOptions::default();

    h.pipeline
        .step_extract(&request().with_voice_id("nova"), &options)
        .await
        .unwrap();
    h.pipeline.step_tts(&request(), &options).await.unwrap();

    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.speech.last_voice.lock().unwrap().as_deref(),
        Some("nova")
    );
}

#[tokio::test]
async fn test_step_compose_produces_missing_predecessors() {
    let h = harness();
    let request = request();

    let path = h
        .pipeline
        .step_compose(&request, &RunOptions::default())
        .await
        .unwrap();

    assert!(path.exists());
    for stage in Stage::ALL {
        assert!(h.pipeline.store().has(&request.fingerprint(), stage).await);
    }
}
