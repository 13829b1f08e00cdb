//! Error taxonomy for the production pipeline.
//!
//! Provider-level errors are absorbed by the provider chain and turned into
//! fallbacks; only [`PipelineError`] ever reaches a caller of the orchestrator.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::Stage;

/// A single provider attempt failed. Never fatal on its own.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider is missing configuration (endpoint, key, ...)
    #[error("provider not configured: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failure(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the submit/poll/download lifecycle of a remote job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job submission failed: {0}")]
    Submission(String),

    #[error("job {job_id} did not finish within {seconds}s")]
    PollTimeout { job_id: String, seconds: u64 },

    #[error("job {job_id} failed: {message}")]
    Failed { job_id: String, message: String },

    #[error("job {job_id} completed without a result: {detail}")]
    MissingResult { job_id: String, detail: String },

    /// Retryable: the body was shorter than the declared content-length
    #[error("partial content: wrote {written} of {expected} bytes")]
    PartialContent { written: u64, expected: u64 },

    /// Retryable: the response does not look like media yet
    #[error("result not ready: {0}")]
    NotReady(String),

    #[error("download exhausted after {attempts} attempts: {last_error}")]
    DownloadExhausted { attempts: u32, last_error: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for JobError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Errors from the local media toolkit (ffmpeg/ffprobe or the stub backend).
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(&'static str),

    #[error("{tool} failed: {stderr}")]
    CommandFailed { tool: &'static str, stderr: String },

    #[error("invalid media: {0}")]
    InvalidMedia(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse probe output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors from the per-fingerprint artifact directory.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to lock {}: {reason}", path.display())]
    Lock { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that end a pipeline run with status `failed`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Every extraction provider, placeholder included, failed
    #[error("content extraction failed: {0}")]
    ExtractionFailure(String),

    /// Even the placeholder of a synthesis chain failed
    #[error("{stage} synthesis failed: {message}")]
    SynthesisFailure { stage: Stage, message: String },

    /// Malformed or zero-duration media handed to the reconciler
    #[error("duration reconciliation failed: {0}")]
    ReconciliationFailure(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
