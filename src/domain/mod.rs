//! Domain types for the teaser pipeline.
//!
//! This module contains the core data structures:
//! - Fingerprint: Cache/resume identity of a request
//! - Request: What to produce and how (voice, duration, force flags)
//! - Content: Extracted teaser content
//! - Artifact: Stage files, presence minimums, metadata.json
//! - Events/Run: Per-invocation run log and status

pub mod artifact;
pub mod content;
pub mod events;
pub mod fingerprint;
pub mod request;
pub mod run;

// Re-export commonly used types
pub use artifact::{ProviderAttempt, RunMetadata, RunParameters, Stage, StageRecord};
pub use content::{StoredContent, TeaserContent};
pub use events::{Event, EventType, StageStatus};
pub use fingerprint::{fingerprint, Fingerprint};
pub use request::{ForceFlags, GenerationRequest, RunOptions, VoicePreference};
pub use run::{PipelineRun, RunStatus};
