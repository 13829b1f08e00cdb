//! Reconciliation Integration Tests
//!
//! Probe, plan and compose through the stub media backend.

use std::sync::Arc;

use tempfile::TempDir;
use teaser::adapters::media::{Card, MediaBackend, StubBackend};
use teaser::core::{DurationReconciler, Segment};
use teaser::error::PipelineError;

async fn card(backend: &StubBackend, seconds: f64, dest: &std::path::Path) {
    let card = Card {
        width: 720,
        height: 1280,
        fps: 24,
        seconds,
        color: (0, 0, 0),
        lines: vec!["Headline".to_string()],
    };
    backend.render_card(&card, dest).await.unwrap();
}

#[tokio::test]
async fn test_short_video_is_looped_to_audio_length() {
    let temp = TempDir::new().unwrap();
    let audio = temp.path().join("audio.wav");
    let video = temp.path().join("video.mp4");
    let dest = temp.path().join("final.mp4");
    StubBackend.render_silence(22.0, &audio).await.unwrap();
    card(&StubBackend, 7.0, &video).await;

    let reconciler = DurationReconciler::new(Arc::new(StubBackend));
    let (path, plan) = reconciler.reconcile(&audio, &video, &dest, None).await.unwrap();

    assert_eq!(path, dest);
    assert_eq!(
        plan.segments,
        vec![Segment::Forward, Segment::Reverse, Segment::Forward, Segment::Reverse]
    );
    assert_eq!(plan.trim_to, Some(22.0));

    let composed = StubBackend.probe_duration(&dest).await.unwrap();
    assert!((composed - 22.0).abs() <= 0.05);
    let manifest = std::fs::read_to_string(&dest).unwrap();
    assert!(manifest.contains("segments=forward,reverse,forward,reverse"));
}

#[tokio::test]
async fn test_long_video_is_trimmed_once() {
    let temp = TempDir::new().unwrap();
    let audio = temp.path().join("audio.wav");
    let video = temp.path().join("video.mp4");
    let dest = temp.path().join("final.mp4");
    StubBackend.render_silence(10.0, &audio).await.unwrap();
    card(&StubBackend, 12.0, &video).await;

    let reconciler = DurationReconciler::new(Arc::new(StubBackend));
    let (_, plan) = reconciler.reconcile(&audio, &video, &dest, None).await.unwrap();

    assert_eq!(plan.segments, vec![Segment::Forward]);
    assert_eq!(plan.trim_to, Some(10.0));
}

#[tokio::test]
async fn test_unreadable_input_fails_reconciliation() {
    let temp = TempDir::new().unwrap();
    let audio = temp.path().join("audio.wav");
    let video = temp.path().join("video.mp4");
    std::fs::write(&audio, b"not audio").unwrap();
    card(&StubBackend, 5.0, &video).await;

    let reconciler = DurationReconciler::new(Arc::new(StubBackend));
    let result = reconciler
        .reconcile(&audio, &video, &temp.path().join("final.mp4"), None)
        .await;

    assert!(matches!(result, Err(PipelineError::ReconciliationFailure(_))));
}

#[tokio::test]
async fn test_unreadable_remote_video_falls_back_to_target_duration() {
    let temp = TempDir::new().unwrap();
    let audio = temp.path().join("audio.wav");
    let video = temp.path().join("video.mp4");
    let dest = temp.path().join("final.mp4");
    StubBackend.render_silence(15.0, &audio).await.unwrap();
    std::fs::write(&video, vec![0u8; 50 * 1024]).unwrap();

    let reconciler = DurationReconciler::new(Arc::new(StubBackend));
    let (_, plan) = reconciler
        .reconcile(&audio, &video, &dest, Some(15.0))
        .await
        .unwrap();

    assert_eq!(plan.video_seconds, 15.0);
    assert_eq!(plan.segments, vec![Segment::Forward]);
    let manifest = std::fs::read_to_string(&dest).unwrap();
    assert!(manifest.contains("kind=composite"));
}
