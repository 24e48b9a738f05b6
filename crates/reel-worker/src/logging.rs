//! Structured job logging.

use tracing::{error, info, warn};

use reel_models::RenderJob;

/// Logs render job lifecycle lines with consistent fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    key: String,
    revision: u32,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job: &RenderJob, operation: &'static str) -> Self {
        Self {
            job_id: job.id.to_string(),
            key: job.key().to_string(),
            revision: job.revision,
            operation,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            key = %self.key,
            revision = self.revision,
            operation = self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            key = %self.key,
            revision = self.revision,
            operation = self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            key = %self.key,
            revision = self.revision,
            operation = self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            key = %self.key,
            revision = self.revision,
            operation = self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            key = %self.key,
            revision = self.revision,
            operation = self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }
}
