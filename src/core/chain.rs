//! Ordered provider chains.
//!
//! A chain holds the providers of one capability in priority order and ends
//! in a placeholder. Providers are tried in turn; any error is logged and the
//! next one is tried. The placeholder is a separate type so that a chain
//! cannot be built without one: a chain only fails if its placeholder does.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::ProviderAttempt;
use crate::error::ProviderError;

/// What a chain produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ContentExtraction,
    SpeechSynthesis,
    VideoSynthesis,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::ContentExtraction => "content-extraction",
            Capability::SpeechSynthesis => "speech-synthesis",
            Capability::VideoSynthesis => "video-synthesis",
        })
    }
}

/// Output of a provider, with the file it produced if any
pub trait ChainOutput: Send {
    fn artifact_path(&self) -> Option<&Path> {
        None
    }
}

/// One concrete backend of a capability
#[async_trait]
pub trait Provider<I, O>: Send + Sync
where
    I: Send + Sync + 'static,
    O: ChainOutput + 'static,
{
    /// Human-readable provider name
    fn name(&self) -> &str;

    async fn run(&self, input: &I) -> Result<O, ProviderError>;
}

/// Deterministic, always-available tail of a chain.
///
/// Implementations must not depend on the network or on credentials.
pub trait Placeholder<I, O>: Provider<I, O>
where
    I: Send + Sync + 'static,
    O: ChainOutput + 'static,
{
}

/// Result of running a chain
#[derive(Debug)]
pub struct ChainOutcome<O> {
    pub output: O,

    /// Provider that produced `output`
    pub provider: String,

    /// `output` came from the placeholder
    pub placeholder: bool,

    /// Every attempt, failed ones included, in order
    pub attempts: Vec<ProviderAttempt>,
}

/// Every provider in the chain failed, placeholder included
#[derive(Debug, Error)]
#[error("all {capability} providers failed; last error from '{provider}': {message}")]
pub struct ChainError {
    pub capability: Capability,
    pub provider: String,
    pub message: String,
    pub attempts: Vec<ProviderAttempt>,
}

pub struct ProviderChain<I, O>
where
    I: Send + Sync + 'static,
    O: ChainOutput + 'static,
{
    capability: Capability,
    providers: Vec<Arc<dyn Provider<I, O>>>,
    placeholder: Arc<dyn Placeholder<I, O>>,
}

impl<I, O> ProviderChain<I, O>
where
    I: Send + Sync + 'static,
    O: ChainOutput + 'static,
{
    /// A chain that only has its placeholder
    pub fn new(capability: Capability, placeholder: Arc<dyn Placeholder<I, O>>) -> Self {
        Self {
            capability,
            providers: Vec::new(),
            placeholder,
        }
    }

    /// Append a provider, tried after those already added
    pub fn with_provider(mut self, provider: Arc<dyn Provider<I, O>>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Provider names in the order they are tried, placeholder last
    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.name().to_string())
            .chain(std::iter::once(self.placeholder.name().to_string()))
            .collect()
    }

    /// Try providers in order until one succeeds
    pub async fn execute(&self, input: &I) -> Result<ChainOutcome<O>, ChainError> {
        let capability = self.capability;
        let mut attempts = Vec::with_capacity(self.providers.len() + 1);

        for provider in &self.providers {
            let name = provider.name().to_string();
            let started = Instant::now();
            let result = provider.run(input).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    info!(%capability, provider = %name, elapsed_ms, "Provider succeeded");
                    attempts.push(success(&name, &output, elapsed_ms));
                    return Ok(ChainOutcome {
                        output,
                        provider: name,
                        placeholder: false,
                        attempts,
                    });
                }
                Err(ProviderError::Unavailable(reason)) => {
                    debug!(%capability, provider = %name, %reason, "Provider not configured, skipping");
                    attempts.push(failure(&name, format!("not configured: {reason}"), elapsed_ms));
                }
                Err(e) => {
                    warn!(%capability, provider = %name, elapsed_ms, error = %e, "Provider failed, falling back");
                    attempts.push(failure(&name, e.to_string(), elapsed_ms));
                }
            }
        }

        let name = self.placeholder.name().to_string();
        let started = Instant::now();
        let result = self.placeholder.run(input).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                warn!(%capability, provider = %name, elapsed_ms, "Using placeholder");
                attempts.push(success(&name, &output, elapsed_ms));
                Ok(ChainOutcome {
                    output,
                    provider: name,
                    placeholder: true,
                    attempts,
                })
            }
            Err(e) => {
                error!(%capability, provider = %name, error = %e, "Placeholder failed");
                attempts.push(failure(&name, e.to_string(), elapsed_ms));
                Err(ChainError {
                    capability,
                    provider: name,
                    message: e.to_string(),
                    attempts,
                })
            }
        }
    }
}

fn success<O: ChainOutput>(provider: &str, output: &O, elapsed_ms: u64) -> ProviderAttempt {
    ProviderAttempt {
        provider_name: provider.to_string(),
        succeeded: true,
        error: None,
        artifact_path: output
            .artifact_path()
            .map(|p| p.display().to_string()),
        elapsed_ms,
    }
}

fn failure(provider: &str, error: String, elapsed_ms: u64) -> ProviderAttempt {
    ProviderAttempt {
        provider_name: provider.to_string(),
        succeeded: false,
        error: Some(error),
        artifact_path: None,
        elapsed_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Text(String);
    impl ChainOutput for Text {}

    struct Failing {
        name: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider<String, Text> for Failing {
        fn name(&self) -> &str {
            self.name
        }
        async fn run(&self, _input: &String) -> Result<Text, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Failure(format!("{} is down", self.name)))
        }
    }

    struct Echo;

    #[async_trait]
    impl Provider<String, Text> for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn run(&self, input: &String) -> Result<Text, ProviderError> {
            Ok(Text(input.clone()))
        }
    }

    struct Stand;

    #[async_trait]
    impl Provider<String, Text> for Stand {
        fn name(&self) -> &str {
            "stand-in"
        }
        async fn run(&self, _input: &String) -> Result<Text, ProviderError> {
            Ok(Text("placeholder".into()))
        }
    }
    impl Placeholder<String, Text> for Stand {}

    struct Broken;

    #[async_trait]
    impl Provider<String, Text> for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn run(&self, _input: &String) -> Result<Text, ProviderError> {
            Err(ProviderError::Failure("disk full".into()))
        }
    }
    impl Placeholder<String, Text> for Broken {}

    fn failing(name: &'static str) -> Arc<Failing> {
        Arc::new(Failing {
            name,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let late = failing("late");
        let chain = ProviderChain::new(Capability::ContentExtraction, Arc::new(Stand))
            .with_provider(Arc::new(Echo))
            .with_provider(late.clone());

        let outcome = chain.execute(&"hello".to_string()).await.unwrap();
        assert_eq!(outcome.output, Text("hello".into()));
        assert_eq!(outcome.provider, "echo");
        assert!(!outcome.placeholder);
        assert_eq!(late.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_failures_fall_back_to_placeholder() {
        for n in 0..4 {
            let mut chain = ProviderChain::new(Capability::VideoSynthesis, Arc::new(Stand));
            for _ in 0..n {
                chain = chain.with_provider(failing("remote"));
            }

            let outcome = chain.execute(&"x".to_string()).await.unwrap();
            assert!(outcome.placeholder);
            assert_eq!(outcome.output, Text("placeholder".into()));
            assert_eq!(outcome.attempts.len(), n + 1);
            assert!(outcome.attempts[..n].iter().all(|a| !a.succeeded));
            assert!(outcome.attempts[n].succeeded);
        }
    }

    #[tokio::test]
    async fn test_broken_placeholder_is_reported() {
        let chain = ProviderChain::new(Capability::ContentExtraction, Arc::new(Broken))
            .with_provider(failing("remote"));

        let err = chain.execute(&"x".to_string()).await.unwrap_err();
        assert_eq!(err.provider, "broken");
        assert_eq!(err.attempts.len(), 2);
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_provider_names_end_with_placeholder() {
        let chain = ProviderChain::new(Capability::SpeechSynthesis, Arc::new(Stand))
            .with_provider(failing("a"))
            .with_provider(Arc::new(Echo));
        assert_eq!(chain.provider_names(), vec!["a", "echo", "stand-in"]);
    }
}
