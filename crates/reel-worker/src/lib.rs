//! Render worker.
//!
//! This crate provides:
//! - Render job orchestration across cloud and local backends
//! - Bounded cloud status polling
//! - The review-revise loop with regression detection
//! - The end-to-end manifest pipeline
//! - Configuration, structured logging, metrics and retry helpers

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod review;

pub use backend::{ClipStager, CloudBackend, LibrarySink, LocalBackend, Reviewer};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use manifest::Manifest;
pub use orchestrator::{OrchestratorSettings, RenderEvent, RenderOrchestrator};
pub use pipeline::{bind_plan, PipelineReport, RenderPipeline, TargetOutcome};
pub use review::{ReviewController, ReviewSettings, ReviewVerdict};
