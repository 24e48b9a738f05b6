//! Source clip configuration and preprocessed clip artifacts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a preprocessed clip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ClipId(pub String);

impl ClipId {
    /// Generate a new random clip ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timeline length of a clip after speed adjustment.
///
/// Callers must ensure `speed > 0`.
pub fn effective_duration(duration: f64, speed: f64) -> f64 {
    duration / speed
}

/// One source clip and the transform to apply to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipConfig {
    /// Source identifier (URL, bare asset id or local path)
    pub source_id: String,

    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Offset into the source where the kept range starts (seconds)
    #[serde(default)]
    pub trim_start: f64,

    /// Length of source material to keep (seconds)
    pub duration: f64,

    /// Playback speed multiplier
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Apply the sharpening stage
    #[serde(default = "default_sharpen")]
    pub sharpen: bool,
}

fn default_speed() -> f64 {
    1.0
}

fn default_sharpen() -> bool {
    true
}

/// Clip configuration validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClipConfigError {
    #[error("source id is empty")]
    EmptySource,
    #[error("trim start must be a finite value >= 0, got {0}")]
    InvalidTrimStart(f64),
    #[error("duration must be a finite value > 0, got {0}")]
    InvalidDuration(f64),
    #[error("speed must be a finite value > 0, got {0}")]
    InvalidSpeed(f64),
}

impl ClipConfig {
    /// Create a clip config with default speed and sharpening.
    pub fn new(source_id: impl Into<String>, trim_start: f64, duration: f64) -> Self {
        Self {
            source_id: source_id.into(),
            name: None,
            trim_start,
            duration,
            speed: default_speed(),
            sharpen: default_sharpen(),
        }
    }

    /// Returns a new config with the given speed.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Returns a new config with sharpening toggled.
    pub fn with_sharpen(mut self, sharpen: bool) -> Self {
        self.sharpen = sharpen;
        self
    }

    /// Returns a new config with a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check the config before any I/O happens.
    pub fn validate(&self) -> Result<(), ClipConfigError> {
        if self.source_id.trim().is_empty() {
            return Err(ClipConfigError::EmptySource);
        }
        if !self.trim_start.is_finite() || self.trim_start < 0.0 {
            return Err(ClipConfigError::InvalidTrimStart(self.trim_start));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ClipConfigError::InvalidDuration(self.duration));
        }
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(ClipConfigError::InvalidSpeed(self.speed));
        }
        Ok(())
    }

    /// Timeline length once the speed ramp is applied.
    pub fn effective_duration(&self) -> f64 {
        effective_duration(self.duration, self.speed)
    }

    /// Name used in logs: display name if set, otherwise the source id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.source_id)
    }
}

/// Output of clip preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PreprocessedClip {
    /// Generated identifier, stable for one batch run
    pub id: ClipId,

    /// Local artifact path
    pub local_path: PathBuf,

    /// Originating source identifier
    pub source_id: String,

    /// Display name carried over from the config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Timeline length after the speed ramp (duration / speed)
    pub effective_duration: f64,

    /// Speed actually applied
    pub speed: f64,

    /// Output size in bytes
    pub size_bytes: u64,
}
