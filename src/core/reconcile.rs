//! Duration reconciliation: make the final clip exactly as long as the narration.
//!
//! A video shorter than its audio is extended by ping-pong looping (forward,
//! reversed, forward, ...) which avoids the visible jump of a plain loop. The
//! concatenation is then trimmed to the audio length. A video that already
//! covers the audio within tolerance is used once, trimmed if it runs long.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::adapters::media::MediaBackend;
use crate::error::{PipelineError, PipelineResult};

/// Allowed overshoot before a trim is required
pub const DEFAULT_TOLERANCE_SECONDS: f64 = 0.05;

/// Ping-pong cycles (forward + reverse) after which looping stops
pub const DEFAULT_MAX_CYCLES: usize = 20;

/// Direction of one concatenated copy of the video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Forward,
    Reverse,
}

/// How to turn a video and an audio track into the final clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionPlan {
    pub audio_seconds: f64,
    pub video_seconds: f64,

    /// Copies of the video to concatenate, in order
    pub segments: Vec<Segment>,

    /// Cut the concatenation at this many seconds
    pub trim_to: Option<f64>,
}

impl CompositionPlan {
    /// Length of the untrimmed concatenation
    pub fn covered_seconds(&self) -> f64 {
        self.video_seconds * self.segments.len() as f64
    }

    /// Length of the composed clip
    pub fn output_seconds(&self) -> f64 {
        self.trim_to.unwrap_or_else(|| self.covered_seconds())
    }

    pub fn is_looped(&self) -> bool {
        self.segments.len() > 1
    }
}

/// Compute a composition plan. Pure: no I/O.
pub fn plan(
    audio_seconds: f64,
    video_seconds: f64,
    tolerance: f64,
    max_cycles: usize,
) -> PipelineResult<CompositionPlan> {
    if !audio_seconds.is_finite() || audio_seconds <= 0.0 {
        return Err(PipelineError::ReconciliationFailure(format!(
            "audio duration must be positive, got {audio_seconds}"
        )));
    }
    if !video_seconds.is_finite() || video_seconds <= 0.0 {
        return Err(PipelineError::ReconciliationFailure(format!(
            "video duration must be positive, got {video_seconds}"
        )));
    }

    if audio_seconds <= video_seconds + tolerance {
        return Ok(CompositionPlan {
            audio_seconds,
            video_seconds,
            segments: vec![Segment::Forward],
            trim_to: (video_seconds > audio_seconds).then_some(audio_seconds),
        });
    }

    let mut segments = Vec::new();
    let mut covered = 0.0;
    'cycles: for _ in 0..max_cycles.max(1) {
        for segment in [Segment::Forward, Segment::Reverse] {
            segments.push(segment);
            covered += video_seconds;
            if covered >= audio_seconds {
                break 'cycles;
            }
        }
    }

    if covered < audio_seconds {
        warn!(
            video_seconds,
            audio_seconds,
            max_cycles,
            covered,
            "Cycle ceiling reached, composing a clip shorter than the audio"
        );
    }

    Ok(CompositionPlan {
        audio_seconds,
        video_seconds,
        segments,
        trim_to: (covered - audio_seconds > tolerance).then_some(audio_seconds),
    })
}

/// Probes, plans and composes through a [`MediaBackend`]
pub struct DurationReconciler {
    backend: Arc<dyn MediaBackend>,
    tolerance: f64,
    max_cycles: usize,
}

impl DurationReconciler {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            tolerance: DEFAULT_TOLERANCE_SECONDS,
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }

    pub fn backend(&self) -> &Arc<dyn MediaBackend> {
        &self.backend
    }

    /// Compose `video` and `audio` into `dest`, matching the audio length.
    ///
    /// A backend that cannot render media may also be unable to read what a
    /// remote provider delivered; `fallback_seconds` then stands in for the
    /// unreadable duration. Rendering backends never fall back.
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn reconcile(
        &self,
        audio: &Path,
        video: &Path,
        dest: &Path,
        fallback_seconds: Option<f64>,
    ) -> PipelineResult<(PathBuf, CompositionPlan)> {
        let audio_seconds = self.probe("audio", audio, fallback_seconds).await?;
        let video_seconds = self.probe("video", video, fallback_seconds).await?;

        let plan = plan(audio_seconds, video_seconds, self.tolerance, self.max_cycles)?;
        info!(
            audio_seconds,
            video_seconds,
            segments = plan.segments.len(),
            trim_to = ?plan.trim_to,
            "Reconciling durations"
        );

        self.backend
            .compose(&plan, video, audio, dest)
            .await
            .map_err(|e| PipelineError::ReconciliationFailure(e.to_string()))?;

        Ok((dest.to_path_buf(), plan))
    }

    async fn probe(
        &self,
        kind: &str,
        path: &Path,
        fallback_seconds: Option<f64>,
    ) -> PipelineResult<f64> {
        match self.backend.probe_duration(path).await {
            Ok(seconds) => Ok(seconds),
            Err(e) => match fallback_seconds.filter(|_| !self.backend.renders_media()) {
                Some(seconds) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        seconds,
                        "Cannot read {kind} duration, assuming the target duration"
                    );
                    Ok(seconds)
                }
                None => Err(PipelineError::ReconciliationFailure(format!(
                    "{kind} probe: {e}"
                ))),
            },
        }
    }
}
