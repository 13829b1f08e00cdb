//! Job-based text-to-video API and the video provider built on it.
//!
//! Endpoint conventions:
//! - submit: `POST {endpoint}` (the endpoint ends in `/jobs`, optionally with a query)
//! - status: the endpoint with `/jobs` replaced by `/jobs/{id}`
//! - content: `{base}/openai/v1/video/generations/{generation}/content/video?api-version=preview`,
//!   where `base` is everything before `/openai/` in the endpoint
//!
//! All requests carry the key in an `api-key` header.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::media::MediaBackend;
use super::placeholder::retrieval_card;
use super::prompt::video_prompt;
use super::{VideoInput, VideoOutput};
use crate::core::chain::Provider;
use crate::core::poller::{AsyncJobPoller, FetchResponse, JobApi, JobOutcome, JobResult, JobSpec, JobStatus};
use crate::error::{JobError, ProviderError};

pub const DEFAULT_MODEL: &str = "sora";

/// HTTP client for the job API
pub struct HttpVideoJobApi {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpVideoJobApi {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn status_url(&self, job_id: &str) -> String {
        self.endpoint.replacen("/jobs", &format!("/jobs/{job_id}"), 1)
    }

    pub fn content_url(&self, generation_id: &str) -> String {
        let base = match self.endpoint.split_once("/openai/") {
            Some((base, _)) => base.trim_end_matches('/'),
            None => self.endpoint.trim_end_matches('/'),
        };
        format!(
            "{base}/openai/v1/video/generations/{generation_id}/content/video?api-version=preview"
        )
    }

    /// Map a status document to a [`JobStatus`]
    pub fn parse_status(&self, body: &Value) -> JobStatus {
        let status = body.get("status").and_then(Value::as_str).unwrap_or("");

        let result = body
            .get("generations")
            .and_then(Value::as_array)
            .and_then(|generations| generations.first())
            .and_then(|generation| {
                let id = lenient_string(generation.get("id")?)?;
                Some(JobResult {
                    handle: self.content_url(&id),
                    generation_id: id,
                    width: generation.get("width").and_then(lenient_u32),
                    height: generation.get("height").and_then(lenient_u32),
                    duration_seconds: generation.get("n_seconds").and_then(lenient_f64),
                })
            });

        let error = body.get("error").map(|e| match e {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

        JobStatus::from_remote(status, result, error)
    }
}

fn lenient_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_u32(value: &Value) -> Option<u32> {
    lenient_f64(value)
        .filter(|v| *v >= 0.0 && *v <= u32::MAX as f64)
        .map(|v| v as u32)
}

#[async_trait]
impl JobApi for HttpVideoJobApi {
    async fn submit(&self, spec: &JobSpec) -> Result<String, JobError> {
        let payload = json!({
            "model": self.model,
            "prompt": spec.prompt,
            "height": spec.height.to_string(),
            "width": spec.width.to_string(),
            "n_seconds": spec.duration_seconds.to_string(),
            "n_variants": "1",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !matches!(status.as_u16(), 200..=202) {
            let text = response.text().await.unwrap_or_default();
            return Err(JobError::Submission(format!("HTTP {status}: {}", text.trim())));
        }

        let body: Value = response.json().await?;
        body.get("id")
            .and_then(lenient_string)
            .ok_or_else(|| JobError::Submission("no job id in response".to_string()))
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, JobError> {
        let response = self
            .client
            .get(self.status_url(job_id))
            .header("api-key", &self.api_key)
            .send()
            .await?;

        if response.status().as_u16() != 200 {
            return Err(JobError::Transport(format!(
                "status query returned HTTP {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        Ok(self.parse_status(&body))
    }

    async fn fetch(&self, result: &JobResult) -> Result<FetchResponse, JobError> {
        let response = self
            .client
            .get(&result.handle)
            .header("api-key", &self.api_key)
            .send()
            .await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Ok(FetchResponse {
            status: response.status().as_u16(),
            content_type,
            content_length: response.content_length(),
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map_err(JobError::from))
                .boxed(),
        })
    }
}

/// Video provider backed by a job API.
///
/// A job that finished remotely but could not be downloaded still counts as a
/// success: the provider renders a labeled card carrying the job metadata and
/// notes why, rather than letting the chain pay for a second generation.
pub struct RemoteJobVideo {
    poller: Option<AsyncJobPoller>,
    backend: Arc<dyn MediaBackend>,
    max_job_seconds: u32,
    size: (u32, u32),
    fps: u32,
}

impl RemoteJobVideo {
    /// `poller` is `None` when the API is not configured
    pub fn new(
        poller: Option<AsyncJobPoller>,
        backend: Arc<dyn MediaBackend>,
        max_job_seconds: u32,
        size: (u32, u32),
        fps: u32,
    ) -> Self {
        Self {
            poller,
            backend,
            max_job_seconds,
            size,
            fps,
        }
    }

    pub fn job_spec(&self, input: &VideoInput) -> JobSpec {
        JobSpec {
            prompt: video_prompt(&input.content),
            duration_seconds: input.target_duration_seconds.min(self.max_job_seconds).max(1),
            width: self.size.0,
            height: self.size.1,
        }
    }
}

#[async_trait]
impl Provider<VideoInput, VideoOutput> for RemoteJobVideo {
    fn name(&self) -> &str {
        "video-job-api"
    }

    async fn run(&self, input: &VideoInput) -> Result<VideoOutput, ProviderError> {
        let poller = self.poller.as_ref().ok_or_else(|| {
            ProviderError::Unavailable("SORA_ENDPOINT/SORA_API_KEY are not set".into())
        })?;

        match poller.run(&self.job_spec(input), &input.dest).await? {
            JobOutcome::Downloaded { job_id, bytes, .. } => {
                info!(%job_id, bytes, "Remote video downloaded");
                Ok(VideoOutput {
                    path: input.dest.clone(),
                    note: None,
                })
            }
            JobOutcome::Unretrievable {
                job_id,
                result,
                reason,
            } => {
                warn!(%job_id, generation_id = %result.generation_id, "Rendering retrieval placeholder");
                let card = retrieval_card(&job_id, &result, &input.content, self.size, self.fps);
                self.backend.render_card(&card, &input.dest).await?;
                Ok(VideoOutput {
                    path: input.dest.clone(),
                    note: Some(format!(
                        "job {job_id} generation {} succeeded remotely but was not retrieved: {reason}",
                        result.generation_id
                    )),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> HttpVideoJobApi {
        HttpVideoJobApi::new(
            "https://example.openai.azure.com/openai/v1/video/generations/jobs?api-version=preview",
            "key",
        )
    }

    #[test]
    fn test_urls() {
        let api = api();
        assert_eq!(
            api.status_url("job-1"),
            "https://example.openai.azure.com/openai/v1/video/generations/jobs/job-1?api-version=preview"
        );
        assert_eq!(
            api.content_url("gen-9"),
            "https://example.openai.azure.com/openai/v1/video/generations/gen-9/content/video?api-version=preview"
        );
    }

    #[test]
    fn test_parse_completed_status() {
        let body = json!({
            "status": "succeeded",
            "generations": [{ "id": "gen-9", "width": "1920", "height": 1080, "n_seconds": 10 }]
        });
        match api().parse_status(&body) {
            JobStatus::Completed(Some(result)) => {
                assert_eq!(result.generation_id, "gen-9");
                assert_eq!(result.width, Some(1920));
                assert_eq!(result.height, Some(1080));
                assert_eq!(result.duration_seconds, Some(10.0));
                assert!(result.handle.contains("/generations/gen-9/content/video"));
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn test_parse_other_statuses() {
        let api = api();
        assert_eq!(
            api.parse_status(&json!({ "status": "completed", "generations": [] })),
            JobStatus::Completed(None)
        );
        assert_eq!(
            api.parse_status(&json!({ "status": "failed", "error": { "code": "moderation" } })),
            JobStatus::Failed(r#"{"code":"moderation"}"#.to_string())
        );
        assert_eq!(api.parse_status(&json!({ "status": "queued" })), JobStatus::Queued);
        assert!(matches!(
            api.parse_status(&json!({})),
            JobStatus::Unknown(_)
        ));
    }
}
