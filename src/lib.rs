//! teaser - Resumable AI production pipeline for promotional clips
//!
//! Turns a title and a script (or prompt) into a short narrated clip:
//! extract teaser content, synthesize narration and video in parallel, then
//! fit the video to the narration and compose the final file.
//!
//! # Architecture
//!
//! The system is built around content-addressed artifacts:
//! - Each request hashes to a fingerprint naming its artifact directory
//! - A stage whose artifact is already valid is skipped, so re-runs resume
//! - Every capability is a provider chain ending in a placeholder, so a run
//!   degrades to labeled stand-ins instead of failing
//! - Each invocation is recorded as JSONL events next to the artifacts
//!
//! # Modules
//!
//! - `adapters`: Providers (OpenAI, tool service, job video API), placeholders, media
//! - `core`: ArtifactStore, ProviderChain, AsyncJobPoller, DurationReconciler, Pipeline
//! - `domain`: Data structures (Fingerprint, Request, Content, Event, Run)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Produce a teaser
//! teaser generate "Ep1" --file script.txt --duration 15
//!
//! # Redo only the narration
//! teaser tts "Ep1" --file script.txt --force
//!
//! # Inspect a fingerprint
//! teaser status <fingerprint>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;

// Re-export main types at crate root for convenience
pub use config::Settings;
pub use core::{ArtifactStore, Pipeline};
pub use domain::{
    Fingerprint, ForceFlags, GenerationRequest, PipelineRun, RunOptions, RunStatus, Stage,
};
pub use error::{PipelineError, PipelineResult};
