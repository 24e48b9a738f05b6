//! Shared data models for the reel render pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Source clip configuration and preprocessed clip artifacts
//! - Platform-agnostic edit plans
//! - Target platforms and encoding configuration
//! - Render jobs and their lifecycle
//! - Structured video reviews

pub mod clip;
pub mod encoding;
pub mod job;
pub mod plan;
pub mod platform;
pub mod review;

// Re-export common types
pub use clip::{effective_duration, ClipConfig, ClipConfigError, ClipId, PreprocessedClip};
pub use encoding::EncodingConfig;
pub use job::{
    FailureKind, JobId, RenderBackend, RenderJob, RenderJobKey, RenderState, RenderStateParseError,
    ReviewState, RevisionError, MAX_REVISIONS,
};
pub use plan::{EditMode, EditPlan, PlanId, PlannedClip};
pub use platform::{AspectRatio, Platform, PlatformParseError, PlatformSpec};
pub use review::{IssueSeverity, Regression, ReviewIssue, StoryArc, VideoReview};
