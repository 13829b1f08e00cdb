//! Local media toolkit.
//!
//! Two backends implement [`MediaBackend`]:
//! - [`FfmpegBackend`] shells out to `ffmpeg`/`ffprobe` and produces real media.
//! - [`StubBackend`] needs no tools. Video placeholders and composites are
//!   small text manifests, audio is a silent PCM WAV.
//!
//! Manifests stay below the video presence minimum, so once a real backend is
//! available the next run regenerates them instead of treating them as cache.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::core::reconcile::{CompositionPlan, Segment};
use crate::error::MediaError;

pub type MediaResult<T> = Result<T, MediaError>;

/// First line of every stub manifest
pub const MANIFEST_MAGIC: &str = "# teaser media manifest";

/// Longest text line kept in a manifest
const MANIFEST_TEXT_LIMIT: usize = 160;

/// Sample rate of generated silence
const SILENCE_SAMPLE_RATE: u32 = 16_000;

/// A solid-color title card
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub seconds: f64,
    pub color: (u8, u8, u8),

    /// Text lines, centered top to bottom
    pub lines: Vec<String>,
}

impl Card {
    fn hex_color(&self) -> String {
        let (r, g, b) = self.color;
        format!("0x{r:02x}{g:02x}{b:02x}")
    }
}

/// Media operations the pipeline needs
#[async_trait]
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this backend writes playable media
    fn renders_media(&self) -> bool;

    /// Duration of an audio or video file in seconds
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;

    /// Render a title card clip to `dest`
    async fn render_card(&self, card: &Card, dest: &Path) -> MediaResult<()>;

    /// Write `seconds` of silence to `dest`
    async fn render_silence(&self, seconds: f64, dest: &Path) -> MediaResult<()>;

    /// Compose `video` and `audio` into `dest` following `plan`
    async fn compose(
        &self,
        plan: &CompositionPlan,
        video: &Path,
        audio: &Path,
        dest: &Path,
    ) -> MediaResult<()>;
}

/// Pick ffmpeg when both tools are on PATH, else the stub
pub fn detect() -> Arc<dyn MediaBackend> {
    match FfmpegBackend::detect() {
        Some(backend) => {
            info!("Using ffmpeg media backend");
            Arc::new(backend)
        }
        None => {
            warn!("ffmpeg/ffprobe not found, media placeholders will be text stubs");
            Arc::new(StubBackend)
        }
    }
}

// ---------------------------------------------------------------------------
// ffmpeg
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// ffmpeg/ffprobe subprocess backend
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegBackend {
    /// `None` unless both binaries are found
    pub fn detect() -> Option<Self> {
        let ffmpeg = which::which("ffmpeg").ok()?;
        let ffprobe = which::which("ffprobe").ok()?;
        Some(Self {
            ffmpeg: ffmpeg.to_string_lossy().to_string(),
            ffprobe: ffprobe.to_string_lossy().to_string(),
        })
    }

    async fn run_ffmpeg(&self, args: &[String]) -> MediaResult<()> {
        debug!(args = ?args, "Running ffmpeg");
        let output = Command::new(&self.ffmpeg)
            .args(["-y", "-v", "error"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::CommandFailed {
                tool: "ffmpeg",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn card_args(card: &Card, dest: &Path, with_text: bool) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!(
                "color=c={}:s={}x{}:r={}:d={:.3}",
                card.hex_color(),
                card.width,
                card.height,
                card.fps,
                card.seconds
            ),
        ];

        if with_text && !card.lines.is_empty() {
            args.push("-vf".to_string());
            args.push(drawtext_filter(card));
        }

        args.extend(
            ["-c:v", "libx264", "-pix_fmt", "yuv420p", "-movflags", "+faststart"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(dest.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn renders_media(&self) -> bool {
        true
    }

    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        if !path.exists() {
            return Err(MediaError::InvalidMedia(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::CommandFailed {
                tool: "ffprobe",
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)?;
        let duration = probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);
        if duration <= 0.0 {
            return Err(MediaError::InvalidMedia(format!(
                "{} has no duration",
                path.display()
            )));
        }
        Ok(duration)
    }

    async fn render_card(&self, card: &Card, dest: &Path) -> MediaResult<()> {
        match self.run_ffmpeg(&Self::card_args(card, dest, true)).await {
            Ok(()) => Ok(()),
            Err(e) if !card.lines.is_empty() => {
                // drawtext needs an ffmpeg built with libfreetype
                warn!(error = %e, "Text overlay failed, rendering plain card");
                self.run_ffmpeg(&Self::card_args(card, dest, false)).await
            }
            Err(e) => Err(e),
        }
    }

    async fn render_silence(&self, seconds: f64, dest: &Path) -> MediaResult<()> {
        if is_wav(dest) {
            return write_silent_wav(dest, seconds).await;
        }
        let args = vec![
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            format!("anullsrc=r={SILENCE_SAMPLE_RATE}:cl=mono"),
            "-t".to_string(),
            format!("{seconds:.3}"),
            dest.to_string_lossy().to_string(),
        ];
        self.run_ffmpeg(&args).await
    }

    async fn compose(
        &self,
        plan: &CompositionPlan,
        video: &Path,
        audio: &Path,
        dest: &Path,
    ) -> MediaResult<()> {
        let args = vec![
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-i".to_string(),
            audio.to_string_lossy().to_string(),
            "-filter_complex".to_string(),
            compose_filter(plan),
            "-map".to_string(),
            "[v]".to_string(),
            "-map".to_string(),
            "1:a".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            dest.to_string_lossy().to_string(),
        ];
        self.run_ffmpeg(&args).await
    }
}

/// `filter_complex` graph for a plan; the output label is `[v]`
pub fn compose_filter(plan: &CompositionPlan) -> String {
    let n = plan.segments.len();
    let mut graph = Vec::new();

    if n == 1 {
        graph.push("[0:v]setpts=PTS-STARTPTS[cat]".to_string());
    } else {
        let splits: String = (0..n).map(|i| format!("[s{i}]")).collect();
        graph.push(format!("[0:v]split={n}{splits}"));

        let mut inputs = String::new();
        for (i, segment) in plan.segments.iter().enumerate() {
            match segment {
                Segment::Forward => inputs.push_str(&format!("[s{i}]")),
                Segment::Reverse => {
                    graph.push(format!("[s{i}]reverse[r{i}]"));
                    inputs.push_str(&format!("[r{i}]"));
                }
            }
        }
        graph.push(format!("{inputs}concat=n={n}:v=1:a=0[cat]"));
    }

    match plan.trim_to {
        Some(seconds) => graph.push(format!(
            "[cat]trim=duration={seconds:.3},setpts=PTS-STARTPTS[v]"
        )),
        None => graph.push("[cat]null[v]".to_string()),
    }

    graph.join(";")
}

fn drawtext_filter(card: &Card) -> String {
    let line_height = (card.height / 20).max(24);
    let first = -((card.lines.len() as i64 - 1) * line_height as i64) / 2;
    card.lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let offset = first + (i as i64) * line_height as i64;
            format!(
                "drawtext=text='{}':fontcolor=white:fontsize={}:x=(w-text_w)/2:y=(h-text_h)/2+({})",
                escape_drawtext(line),
                line_height * 3 / 4,
                offset
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | ':' | '\'' | '%' | ',' | ';' | '[' | ']' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Stub
// ---------------------------------------------------------------------------

/// Backend used when no media toolkit is installed
#[derive(Debug, Clone, Copy, Default)]
pub struct StubBackend;

#[async_trait]
impl MediaBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn renders_media(&self) -> bool {
        false
    }

    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        let bytes = fs::read(path).await?;
        if let Some(seconds) = wav_duration(&bytes) {
            return Ok(seconds);
        }
        if let Some(seconds) = manifest_duration(&bytes) {
            return Ok(seconds);
        }
        Err(MediaError::InvalidMedia(format!(
            "{} is neither a WAV file nor a media manifest",
            path.display()
        )))
    }

    async fn render_card(&self, card: &Card, dest: &Path) -> MediaResult<()> {
        let mut fields = vec![
            ("kind", "card".to_string()),
            ("size", format!("{}x{}", card.width, card.height)),
            ("fps", card.fps.to_string()),
            ("color", card.hex_color()),
            ("duration", format!("{:.3}", card.seconds)),
        ];
        fields.extend(card.lines.iter().map(|l| ("text", l.clone())));
        fs::write(dest, manifest(&fields)).await?;
        Ok(())
    }

    async fn render_silence(&self, seconds: f64, dest: &Path) -> MediaResult<()> {
        write_silent_wav(dest, seconds).await
    }

    async fn compose(
        &self,
        plan: &CompositionPlan,
        video: &Path,
        audio: &Path,
        dest: &Path,
    ) -> MediaResult<()> {
        let segments = plan
            .segments
            .iter()
            .map(|s| match s {
                Segment::Forward => "forward",
                Segment::Reverse => "reverse",
            })
            .collect::<Vec<_>>()
            .join(",");

        let fields = vec![
            ("kind", "composite".to_string()),
            ("video", file_name(video)),
            ("audio", file_name(audio)),
            ("segments", segments),
            ("duration", format!("{:.3}", plan.output_seconds())),
        ];
        fs::write(dest, manifest(&fields)).await?;
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn manifest(fields: &[(&str, String)]) -> String {
    let mut out = String::from(MANIFEST_MAGIC);
    out.push('\n');
    for (key, value) in fields {
        let value: String = value
            .chars()
            .filter(|c| *c != '\n')
            .take(MANIFEST_TEXT_LIMIT)
            .collect();
        out.push_str(&format!("{key}={value}\n"));
    }
    out
}

fn manifest_duration(bytes: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(bytes).ok()?;
    let mut lines = text.lines();
    if lines.next()? != MANIFEST_MAGIC {
        return None;
    }
    lines
        .filter_map(|l| l.strip_prefix("duration="))
        .find_map(|d| d.trim().parse::<f64>().ok())
        .filter(|d| *d > 0.0)
}

// ---------------------------------------------------------------------------
// WAV
// ---------------------------------------------------------------------------

fn is_wav(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

/// Silent 16-bit mono PCM
pub fn silent_wav(seconds: f64) -> Vec<u8> {
    let samples = (seconds.max(0.0) * SILENCE_SAMPLE_RATE as f64).round() as u32;
    let data_len = samples * 2;
    let byte_rate = SILENCE_SAMPLE_RATE * 2;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&SILENCE_SAMPLE_RATE.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(44 + data_len as usize, 0);
    out
}

async fn write_silent_wav(dest: &Path, seconds: f64) -> MediaResult<()> {
    fs::write(dest, silent_wav(seconds)).await?;
    Ok(())
}

/// Duration of a RIFF/WAVE file from its `fmt ` and `data` chunks
pub fn wav_duration(bytes: &[u8]) -> Option<f64> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let read_u32 = |at: usize| -> Option<u32> {
        bytes
            .get(at..at + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    };

    let mut pos = 12;
    let mut byte_rate = None;
    let mut data_len = None;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = read_u32(pos + 4)? as usize;
        match id {
            b"fmt " => byte_rate = read_u32(pos + 16),
            b"data" => data_len = Some(size),
            _ => {}
        }
        pos += 8 + size + (size & 1);
    }

    let byte_rate = byte_rate.filter(|r| *r > 0)?;
    let seconds = data_len? as f64 / byte_rate as f64;
    (seconds > 0.0).then_some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reconcile::plan;
    use tempfile::TempDir;

    #[test]
    fn test_silent_wav_duration() {
        let wav = silent_wav(15.0);
        let seconds = wav_duration(&wav).unwrap();
        assert!((seconds - 15.0).abs() < 1e-3);
        assert!(wav_duration(b"not a wav").is_none());
    }

    #[test]
    fn test_compose_filter_ping_pong() {
        let plan = plan(22.0, 7.0, 0.05, 20).unwrap();
        let filter = compose_filter(&plan);
        assert!(filter.starts_with("[0:v]split=4[s0][s1][s2][s3]"));
        assert!(filter.contains("[s1]reverse[r1]"));
        assert!(filter.contains("[s3]reverse[r3]"));
        assert!(filter.contains("[s0][r1][s2][r3]concat=n=4:v=1:a=0[cat]"));
        assert!(filter.ends_with("[cat]trim=duration=22.000,setpts=PTS-STARTPTS[v]"));
    }

    #[test]
    fn test_compose_filter_single_segment() {
        let plan = plan(15.0, 15.0, 0.05, 20).unwrap();
        assert_eq!(
            compose_filter(&plan),
            "[0:v]setpts=PTS-STARTPTS[cat];[cat]null[v]"
        );
    }

    #[test]
    fn test_drawtext_escaping() {
        assert_eq!(escape_drawtext("Ep 1: it's 100%"), "Ep 1\\: it\\'s 100\\%");
    }

    #[tokio::test]
    async fn test_stub_manifests_round_trip_duration() {
        let temp = TempDir::new().unwrap();
        let card = Card {
            width: 720,
            height: 1280,
            fps: 24,
            seconds: 15.0,
            color: (30, 30, 40),
            lines: vec!["A headline".repeat(100)],
        };

        let video = temp.path().join("video.mp4");
        StubBackend.render_card(&card, &video).await.unwrap();
        assert!((StubBackend.probe_duration(&video).await.unwrap() - 15.0).abs() < 1e-6);
        assert!(std::fs::metadata(&video).unwrap().len() < 1024);

        let audio = temp.path().join("audio.wav");
        StubBackend.render_silence(22.0, &audio).await.unwrap();
        assert!((StubBackend.probe_duration(&audio).await.unwrap() - 22.0).abs() < 1e-3);

        let plan = plan(22.0, 15.0, 0.05, 20).unwrap();
        let out = temp.path().join("final.mp4");
        StubBackend.compose(&plan, &video, &audio, &out).await.unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains("segments=forward,reverse"));
        assert!((StubBackend.probe_duration(&out).await.unwrap() - 22.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_stub_rejects_unknown_files() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("junk.mp4");
        std::fs::write(&path, b"garbage").unwrap();
        assert!(matches!(
            StubBackend.probe_duration(&path).await,
            Err(MediaError::InvalidMedia(_))
        ));
    }
}
