//! Timeout Integration Tests
//!
//! Poll loop behavior: the wall-clock ceiling, tolerated unknown statuses,
//! transient status errors, and remote failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use teaser::core::{
    AsyncJobPoller, DownloadPolicy, FetchResponse, JobApi, JobResult, JobSpec, JobStatus,
    PollPolicy,
};
use teaser::error::JobError;

/// Job API that answers status queries from a script, repeating the last entry
struct StatusScript {
    statuses: Mutex<Vec<Result<JobStatus, JobError>>>,
    polls: AtomicUsize,
    submit_error: Option<String>,
}

impl StatusScript {
    fn new(statuses: Vec<Result<JobStatus, JobError>>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses),
            polls: AtomicUsize::new(0),
            submit_error: None,
        })
    }

    fn rejecting(message: &str) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(vec![Ok(JobStatus::Queued)]),
            polls: AtomicUsize::new(0),
            submit_error: Some(message.to_string()),
        })
    }
}

fn result() -> JobResult {
    JobResult {
        generation_id: "gen-1".to_string(),
        width: Some(720),
        height: Some(1280),
        duration_seconds: Some(5.0),
        handle: "memory://gen-1".to_string(),
    }
}

fn clone_status(status: &Result<JobStatus, JobError>) -> Result<JobStatus, JobError> {
    match status {
        Ok(s) => Ok(s.clone()),
        Err(e) => Err(JobError::Transport(e.to_string())),
    }
}

#[async_trait]
impl JobApi for StatusScript {
    async fn submit(&self, _spec: &JobSpec) -> Result<String, JobError> {
        match &self.submit_error {
            Some(message) => Err(JobError::Transport(message.clone())),
            None => Ok("job-42".to_string()),
        }
    }

    async fn status(&self, _job_id: &str) -> Result<JobStatus, JobError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            statuses.remove(0)
        } else {
            clone_status(&statuses[0])
        }
    }

    async fn fetch(&self, _result: &JobResult) -> Result<FetchResponse, JobError> {
        Err(JobError::Transport("downloads are not scripted".into()))
    }
}

fn poller(api: Arc<StatusScript>, timeout: Duration) -> AsyncJobPoller {
    AsyncJobPoller::new(
        api,
        PollPolicy {
            interval: Duration::from_millis(5),
            timeout,
        },
        DownloadPolicy::default(),
    )
}

#[tokio::test]
async fn test_poll_ceiling_raises_timeout() {
    let api = StatusScript::new(vec![Ok(JobStatus::Running)]);
    let poller = poller(api.clone(), Duration::from_millis(60));

    let started = Instant::now();
    let err = poller.wait_for_completion("job-42").await.unwrap_err();

    assert!(matches!(err, JobError::PollTimeout { ref job_id, .. } if job_id == "job-42"));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(api.polls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_unknown_status_is_tolerated() {
    let api = StatusScript::new(vec![
        Ok(JobStatus::Queued),
        Ok(JobStatus::Unknown("warming_up".into())),
        Ok(JobStatus::Preprocessing),
        Ok(JobStatus::Completed(Some(result()))),
    ]);
    let poller = poller(api.clone(), Duration::from_secs(2));

    let done = tokio_test::assert_ok!(poller.wait_for_completion("job-42").await);

    assert_eq!(done, result());
    assert_eq!(api.polls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_status_errors_keep_polling() {
    let api = StatusScript::new(vec![
        Err(JobError::Transport("status query returned HTTP 503".into())),
        Ok(JobStatus::Pending),
        Ok(JobStatus::Completed(Some(result()))),
    ]);
    let poller = poller(api, Duration::from_secs(2));

    tokio_test::assert_ok!(poller.wait_for_completion("job-42").await);
}

#[tokio::test]
async fn test_remote_failure_stops_immediately() {
    let api = StatusScript::new(vec![
        Ok(JobStatus::Running),
        Ok(JobStatus::Failed("content policy".into())),
        Ok(JobStatus::Running),
    ]);
    let poller = poller(api.clone(), Duration::from_secs(2));

    let err = poller.wait_for_completion("job-42").await.unwrap_err();

    match err {
        JobError::Failed { job_id, message } => {
            assert_eq!(job_id, "job-42");
            assert_eq!(message, "content policy");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(api.polls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_completed_without_result_is_an_error() {
    let api = StatusScript::new(vec![Ok(JobStatus::Completed(None))]);
    let poller = poller(api, Duration::from_secs(2));

    let err = tokio_test::assert_err!(poller.wait_for_completion("job-42").await);
    assert!(matches!(err, JobError::MissingResult { .. }));
}

#[tokio::test]
async fn test_submission_failure_fails_fast() {
    let api = StatusScript::rejecting("HTTP 401");
    let poller = poller(api.clone(), Duration::from_secs(2));
    let spec = JobSpec {
        prompt: "p".into(),
        duration_seconds: 5,
        width: 720,
        height: 1280,
    };
    let dest = std::env::temp_dir().join("never-written.mp4");

    let err = poller.run(&spec, &dest).await.unwrap_err();

    assert!(matches!(err, JobError::Submission(ref m) if m.contains("HTTP 401")));
    assert_eq!(api.polls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_backoff_schedule_is_capped() {
    let policy = DownloadPolicy::default();
    let delays: Vec<u64> = (1..=6).map(|a| policy.base_delay(a).as_secs()).collect();
    assert_eq!(delays, vec![2, 4, 8, 16, 30, 30]);

    for attempt in 1..=10 {
        let delay = policy.delay(attempt);
        assert!(delay <= policy.cap);
        assert!(delay >= policy.base_delay(attempt).min(policy.cap));
    }
}
