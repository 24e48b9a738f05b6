//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use reel_models::MAX_REVISIONS;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory for raw downloads and preprocessed clips
    pub work_dir: PathBuf,
    /// Directory for local render outputs
    pub output_dir: PathBuf,
    /// Timeout for one clip transcode
    pub transcode_timeout: Duration,
    /// Timeout for one local render
    pub render_timeout: Duration,
    /// Delay between cloud status polls
    pub poll_interval: Duration,
    /// Status polls before a cloud job is failed with a timeout
    pub poll_max_attempts: u32,
    /// Revision cap per job, clamped to [`MAX_REVISIONS`]
    pub max_revisions: u32,
    /// Run revisions automatically when a review allows one
    pub auto_revise: bool,
    /// Retries for transient cloud submission errors
    pub submit_retries: u32,
    /// Deadline for one target's render and review cycle
    pub job_timeout: Duration,
    /// Base URL for bare source ids
    pub source_base_url: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/reel"),
            output_dir: PathBuf::from("/tmp/reel/out"),
            transcode_timeout: Duration::from_secs(600),
            render_timeout: Duration::from_secs(1800),
            poll_interval: Duration::from_secs(5),
            poll_max_attempts: 120, // ~10 minutes
            max_revisions: MAX_REVISIONS,
            auto_revise: true,
            submit_retries: 2,
            job_timeout: Duration::from_secs(3600),
            source_base_url: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_parse::<u64>(key).map(Duration::from_secs).unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("REEL_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("REEL_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            transcode_timeout: env_secs("REEL_TRANSCODE_TIMEOUT_SECS", defaults.transcode_timeout),
            render_timeout: env_secs("REEL_RENDER_TIMEOUT_SECS", defaults.render_timeout),
            poll_interval: env_secs("REEL_POLL_INTERVAL_SECS", defaults.poll_interval),
            poll_max_attempts: env_parse("REEL_POLL_MAX_ATTEMPTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.poll_max_attempts),
            max_revisions: env_parse("REEL_MAX_REVISIONS").unwrap_or(defaults.max_revisions),
            auto_revise: std::env::var("REEL_AUTO_REVISE")
                .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(defaults.auto_revise),
            submit_retries: env_parse("REEL_SUBMIT_RETRIES").unwrap_or(defaults.submit_retries),
            job_timeout: env_secs("REEL_JOB_TIMEOUT_SECS", defaults.job_timeout),
            source_base_url: std::env::var("REEL_SOURCE_BASE_URL")
                .ok()
                .filter(|u| !u.is_empty()),
        }
    }

    /// Effective revision cap.
    pub fn revision_cap(&self) -> u32 {
        self.max_revisions.min(MAX_REVISIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.poll_max_attempts, 120);
        assert_eq!(config.revision_cap(), 2);
    }

    #[test]
    fn test_revision_cap_is_clamped() {
        let config = WorkerConfig {
            max_revisions: 7,
            ..Default::default()
        };
        assert_eq!(config.revision_cap(), MAX_REVISIONS);

        let config = WorkerConfig {
            max_revisions: 1,
            ..Default::default()
        };
        assert_eq!(config.revision_cap(), 1);
    }
}
