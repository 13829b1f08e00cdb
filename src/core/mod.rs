//! Core orchestration logic.
//!
//! This module contains:
//! - ArtifactStore: Per-fingerprint artifact directories, metadata and run log
//! - ProviderChain: Ordered providers with a placeholder tail
//! - AsyncJobPoller: Submit/poll/download for remote generation jobs
//! - DurationReconciler: Fit video to audio length
//! - RunRegistry: In-process per-fingerprint exclusion
//! - Pipeline: Stage orchestration

pub mod chain;
pub mod orchestrator;
pub mod poller;
pub mod reconcile;
pub mod registry;
pub mod store;

// Re-export commonly used types
pub use chain::{Capability, ChainError, ChainOutcome, ChainOutput, Placeholder, Provider, ProviderChain};
pub use orchestrator::{ArtifactStatus, Chains, Invocation, Pipeline, StatusReport};
pub use poller::{
    AsyncJobPoller, DownloadPolicy, FetchResponse, JobApi, JobOutcome, JobResult, JobSpec,
    JobStatus, PollPolicy,
};
pub use reconcile::{plan, CompositionPlan, DurationReconciler, Segment};
pub use registry::{RunClaim, RunRegistry};
pub use store::ArtifactStore;
