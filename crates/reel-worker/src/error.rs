//! Worker error types.

use thiserror::Error;

use reel_client::ClientError;
use reel_media::MediaError;
use reel_models::{RenderJobKey, RevisionError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Submission rejected: {0}")]
    Submission(String),

    #[error("Render did not finish after {attempts} poll attempts")]
    PollTimeout { attempts: u32 },

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Review failed: {0}")]
    Review(String),

    #[error("Clip staging failed: {0}")]
    Staging(String),

    #[error("Revision refused: {0}")]
    Revision(#[from] RevisionError),

    #[error("Job {0} is already in flight")]
    JobInFlight(RenderJobKey),

    #[error("No job for {0}")]
    JobNotFound(RenderJobKey),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn submission(msg: impl Into<String>) -> Self {
        Self::Submission(msg.into())
    }

    pub fn render_failed(msg: impl Into<String>) -> Self {
        Self::RenderFailed(msg.into())
    }

    pub fn review(msg: impl Into<String>) -> Self {
        Self::Review(msg.into())
    }

    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Client(e) => e.is_retryable(),
            WorkerError::Media(e) => e.is_download(),
            _ => false,
        }
    }

    /// Poll budget ran out, as opposed to a backend-reported failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WorkerError::PollTimeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            WorkerError::Cancelled | WorkerError::Media(MediaError::Cancelled)
        )
    }
}
