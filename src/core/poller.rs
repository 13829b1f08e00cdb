//! Submit/poll/download driver for job-based remote providers.
//!
//! Lifecycle: `Submitted -> {Queued, Running} -> {Completed, Failed, TimedOut}`.
//!
//! - Submission errors fail fast (the provider chain falls back).
//! - Polling runs every `poll_interval` under a hard `poll_timeout` ceiling.
//!   Unknown statuses are logged and tolerated.
//! - Downloads retry with capped exponential backoff plus jitter, bounded by
//!   an attempt count and their own elapsed-time ceiling. Bodies stream to a
//!   `.part` file that is only renamed into place when complete.
//! - Exhausted downloads are not an error: the caller gets
//!   [`JobOutcome::Unretrievable`] with the job metadata, because the remote
//!   work itself succeeded and should not be paid for twice.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::error::JobError;

/// Structured job description sent on submit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub prompt: String,
    pub duration_seconds: u32,
    pub width: u32,
    pub height: u32,
}

/// Where and what a finished job produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub generation_id: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,

    /// Opaque handle passed back to [`JobApi::fetch`] (usually a URL)
    pub handle: String,
}

/// Remote job status as reported by a poll
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Preprocessing,
    Processing,
    Completed(Option<JobResult>),
    Failed(String),
    Unknown(String),
}

impl JobStatus {
    /// Map a provider status string; `result`/`error` are attached to the
    /// terminal states.
    pub fn from_remote(status: &str, result: Option<JobResult>, error: Option<String>) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "pending" => JobStatus::Pending,
            "queued" => JobStatus::Queued,
            "running" | "in_progress" => JobStatus::Running,
            "preprocessing" => JobStatus::Preprocessing,
            "processing" => JobStatus::Processing,
            "completed" | "succeeded" => JobStatus::Completed(result),
            "failed" => JobStatus::Failed(error.unwrap_or_else(|| "Unknown error".to_string())),
            other => JobStatus::Unknown(other.to_string()),
        }
    }
}

/// Response to a download request. The body is consumed as a stream.
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, JobError>>,
}

impl FetchResponse {
    fn looks_like_media(&self, min_declared_length: u64) -> bool {
        let media_type = self
            .content_type
            .as_deref()
            .map(|t| t.starts_with("video/") || t.starts_with("audio/"))
            .unwrap_or(false);
        let long_enough = self.content_length.unwrap_or(0) > min_declared_length;
        (200..300).contains(&self.status) && (media_type || long_enough)
    }
}

/// A job-based remote API
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn submit(&self, spec: &JobSpec) -> Result<String, JobError>;

    async fn status(&self, job_id: &str) -> Result<JobStatus, JobError>;

    async fn fetch(&self, result: &JobResult) -> Result<FetchResponse, JobError>;
}

/// Retry schedule for result downloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadPolicy {
    pub max_attempts: u32,

    /// Ceiling on the whole download loop, independent of the poll ceiling
    #[serde(with = "secs_f64")]
    pub max_total: Duration,

    #[serde(with = "secs_f64")]
    pub initial_delay: Duration,

    pub backoff_factor: f64,

    /// Upper bound of the uniform random jitter added to each delay
    #[serde(with = "secs_f64")]
    pub max_jitter: Duration,

    /// No single sleep exceeds this
    #[serde(with = "secs_f64")]
    pub cap: Duration,

    /// A response without a media content-type must declare more bytes than this
    pub min_declared_length: u64,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            max_total: Duration::from_secs(180),
            initial_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_jitter: Duration::from_millis(500),
            cap: Duration::from_secs(30),
            min_declared_length: 1000,
        }
    }
}

impl DownloadPolicy {
    /// Deterministic part of the delay after `attempt` (1-indexed), capped
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs.max(0.0))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// `min(base + jitter, cap)`
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        (self.base_delay(attempt) + jitter).min(self.cap)
    }

    /// Delay after `attempt` with freshly sampled jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let secs = rand::rng().random_range(0.0..=self.max_jitter.as_secs_f64());
            Duration::try_from_secs_f64(secs).unwrap_or(self.max_jitter)
        };
        self.delay_with_jitter(attempt, jitter)
    }
}

/// Timing of the poll loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    #[serde(with = "secs_f64")]
    pub interval: Duration,

    /// Hard ceiling on the whole poll loop
    #[serde(with = "secs_f64")]
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

/// How a job ended from the caller's point of view
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The result is at `path`
    Downloaded {
        job_id: String,
        result: JobResult,
        path: PathBuf,
        bytes: u64,
    },

    /// The job succeeded remotely but its result could not be retrieved
    Unretrievable {
        job_id: String,
        result: JobResult,
        reason: String,
    },
}

pub struct AsyncJobPoller {
    api: Arc<dyn JobApi>,
    poll: PollPolicy,
    download: DownloadPolicy,
}

impl AsyncJobPoller {
    pub fn new(api: Arc<dyn JobApi>, poll: PollPolicy, download: DownloadPolicy) -> Self {
        Self {
            api,
            poll,
            download,
        }
    }

    /// Submit `spec`, wait for it, and download the result to `dest`
    #[instrument(skip(self, spec), fields(duration = spec.duration_seconds))]
    pub async fn run(&self, spec: &JobSpec, dest: &Path) -> Result<JobOutcome, JobError> {
        let job_id = self.submit(spec).await?;
        let result = self.wait_for_completion(&job_id).await?;

        info!(
            %job_id,
            generation_id = %result.generation_id,
            width = ?result.width,
            height = ?result.height,
            "Job completed, downloading result"
        );

        match self.download(&result, dest).await {
            Ok(bytes) => Ok(JobOutcome::Downloaded {
                job_id,
                result,
                path: dest.to_path_buf(),
                bytes,
            }),
            Err(JobError::DownloadExhausted { attempts, last_error }) => {
                error!(%job_id, attempts, %last_error, "Could not retrieve finished job result");
                Ok(JobOutcome::Unretrievable {
                    job_id,
                    result,
                    reason: format!("download failed after {attempts} attempts: {last_error}"),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Create the remote job. No retry: a failed submit is a provider failure.
    pub async fn submit(&self, spec: &JobSpec) -> Result<String, JobError> {
        let job_id = self.api.submit(spec).await.map_err(|e| match e {
            JobError::Submission(_) => e,
            other => JobError::Submission(other.to_string()),
        })?;
        info!(%job_id, "Job submitted");
        Ok(job_id)
    }

    /// Poll until the job completes, fails, or the ceiling is hit
    pub async fn wait_for_completion(&self, job_id: &str) -> Result<JobResult, JobError> {
        let ceiling = self.poll.timeout;
        match timeout(ceiling, self.poll_loop(job_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%job_id, seconds = ceiling.as_secs(), "Job poll timed out");
                Err(JobError::PollTimeout {
                    job_id: job_id.to_string(),
                    seconds: ceiling.as_secs(),
                })
            }
        }
    }

    async fn poll_loop(&self, job_id: &str) -> Result<JobResult, JobError> {
        let started = Instant::now();
        loop {
            sleep(self.poll.interval).await;
            let elapsed = started.elapsed().as_secs();

            let status = match self.api.status(job_id).await {
                Ok(status) => status,
                Err(e) => {
                    debug!(%job_id, error = %e, "Status query failed, polling again");
                    continue;
                }
            };

            match status {
                JobStatus::Completed(Some(result)) => return Ok(result),
                JobStatus::Completed(None) => {
                    return Err(JobError::MissingResult {
                        job_id: job_id.to_string(),
                        detail: "no generations in completed job".to_string(),
                    })
                }
                JobStatus::Failed(message) => {
                    return Err(JobError::Failed {
                        job_id: job_id.to_string(),
                        message,
                    })
                }
                JobStatus::Unknown(raw) => {
                    warn!(%job_id, status = %raw, elapsed, "Unknown job status, continuing to wait");
                }
                in_flight => {
                    info!(%job_id, status = ?in_flight, elapsed, "Job in progress");
                }
            }
        }
    }

    /// Download a result with retry/backoff. Returns the bytes written.
    pub async fn download(&self, result: &JobResult, dest: &Path) -> Result<u64, JobError> {
        let policy = &self.download;
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut last_error = String::from("no attempt made");

        while attempts < policy.max_attempts && started.elapsed() < policy.max_total {
            attempts += 1;
            let remaining = policy.max_total.saturating_sub(started.elapsed());

            match timeout(remaining, self.try_download(result, dest)).await {
                Ok(Ok(bytes)) => {
                    info!(attempt = attempts, bytes, path = %dest.display(), "Result downloaded");
                    return Ok(bytes);
                }
                Ok(Err(e)) => {
                    info!(attempt = attempts, error = %e, "Download attempt failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    // The dropped attempt cannot clean up after itself
                    let _ = fs::remove_file(part_path(dest)).await;
                    last_error = format!("attempt {attempts} exceeded the download ceiling");
                    break;
                }
            }

            if attempts >= policy.max_attempts {
                break;
            }
            let delay = policy.delay(attempts);
            debug!(
                delay_ms = delay.as_millis() as u64,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Retrying download"
            );
            sleep(delay).await;
        }

        Err(JobError::DownloadExhausted {
            attempts,
            last_error,
        })
    }

    /// One download attempt. Never leaves a partial file at `dest`.
    async fn try_download(&self, result: &JobResult, dest: &Path) -> Result<u64, JobError> {
        let response = self.api.fetch(result).await?;
        debug!(
            status = response.status,
            content_type = ?response.content_type,
            content_length = ?response.content_length,
            "Download response"
        );

        if !response.looks_like_media(self.download.min_declared_length) {
            return Err(JobError::NotReady(format!(
                "HTTP {}, type={}, len={}",
                response.status,
                response.content_type.as_deref().unwrap_or("unknown"),
                response
                    .content_length
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "unknown".into()),
            )));
        }

        let expected = response.content_length;
        let part = part_path(dest);
        let written = match stream_to_file(response.body, &part).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                return Err(e);
            }
        };

        if let Some(expected) = expected {
            if written < expected {
                let _ = fs::remove_file(&part).await;
                return Err(JobError::PartialContent { written, expected });
            }
        }

        fs::rename(&part, dest).await?;
        Ok(written)
    }
}

/// `<dest>.part`
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn stream_to_file(
    mut body: BoxStream<'static, Result<Bytes, JobError>>,
    path: &Path,
) -> Result<u64, JobError> {
    let mut file = fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

mod secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|e| {
            serde::de::Error::custom(format!("invalid duration {secs} seconds: {e}"))
        })
    }
}
