//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use reel_models::ClipConfigError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("Download of {source_id} failed: {message}")]
    DownloadFailed { source_id: String, message: String },

    #[error("Transcode failed: {message}")]
    TranscodeFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Transcoder produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("Invalid clip config: {0}")]
    InvalidClip(#[from] ClipConfigError),

    #[error("Invalid edit plan: {0}")]
    InvalidPlan(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create a download failure error.
    pub fn download_failed(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Create a transcode failure error.
    pub fn transcode_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::TranscodeFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Source fetch failures.
    pub fn is_download(&self) -> bool {
        matches!(self, MediaError::DownloadFailed { .. })
    }

    /// Transcoder process failures, including a missing output artifact
    /// and a transcoder that ran past its timeout.
    pub fn is_transcode(&self) -> bool {
        matches!(
            self,
            MediaError::TranscodeFailed { .. }
                | MediaError::MissingOutput(_)
                | MediaError::Timeout(_)
                | MediaError::FfmpegNotFound
        )
    }
}
