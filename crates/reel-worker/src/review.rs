//! Review-revise loop.
//!
//! After a render reaches `done` its artifact is sent to the reviewer along
//! with the exact plan that produced it. A review with actionable issues and
//! a revised plan makes the job eligible for a revision, which re-renders
//! through the orchestrator under the same job identity. Revisions stop at
//! the cap no matter what the reviews say.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use reel_client::ReviewRequest;
use reel_media::CancelSignal;
use reel_models::{
    EditPlan, JobId, PlanId, Regression, RenderJob, RenderJobKey, RenderState, RevisionError,
    VideoReview, MAX_REVISIONS,
};

use crate::backend::Reviewer;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::orchestrator::RenderOrchestrator;

#[derive(Debug, Clone)]
pub struct ReviewSettings {
    /// Revision cap, clamped to [`MAX_REVISIONS`]
    pub max_revisions: u32,
    /// Start eligible revisions without waiting for a caller
    pub auto_revise: bool,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            max_revisions: MAX_REVISIONS,
            auto_revise: true,
        }
    }
}

impl ReviewSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            max_revisions: config.revision_cap(),
            auto_revise: config.auto_revise,
        }
    }

    pub fn cap(&self) -> u32 {
        self.max_revisions.min(MAX_REVISIONS)
    }
}

/// Where a job ended up after its review cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewVerdict {
    pub key: RenderJobKey,
    pub job_id: JobId,
    pub state: RenderState,
    pub revision: u32,
    pub prior_scores: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<VideoReview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression: Option<Regression>,
    pub revision_eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    /// Fallback when the latest revision regressed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_artifact_url: Option<String>,
}

impl ReviewVerdict {
    pub fn from_job(job: &RenderJob, cap: u32) -> Self {
        Self {
            key: job.key(),
            job_id: job.id.clone(),
            state: job.state,
            revision: job.revision,
            prior_scores: job.prior_scores.clone(),
            review: job.review.clone(),
            review_error: job.review_error.clone(),
            regression: job.regression,
            revision_eligible: job.revision_eligible(cap),
            artifact_url: job.artifact_url.clone(),
            original_artifact_url: job.original_artifact_url.clone(),
        }
    }

    pub fn regressed(&self) -> bool {
        self.regression.is_some()
    }
}

/// Drives reviews and revisions for jobs owned by one orchestrator.
#[derive(Clone)]
pub struct ReviewController {
    orchestrator: Arc<RenderOrchestrator>,
    reviewer: Arc<dyn Reviewer>,
    settings: ReviewSettings,
}

impl ReviewController {
    pub fn new(
        orchestrator: Arc<RenderOrchestrator>,
        reviewer: Arc<dyn Reviewer>,
        settings: ReviewSettings,
    ) -> Self {
        Self {
            orchestrator,
            reviewer,
            settings,
        }
    }

    pub fn settings(&self) -> &ReviewSettings {
        &self.settings
    }

    pub fn with_auto_revise(mut self, auto_revise: bool) -> Self {
        self.settings.auto_revise = auto_revise;
        self
    }

    /// Review the job's current render.
    ///
    /// A reviewer error is recorded on the job and returned as
    /// [`WorkerError::Review`]; the render stays `done`.
    pub async fn review(&self, key: RenderJobKey, cancel: &CancelSignal) -> WorkerResult<RenderJob> {
        let request = self
            .orchestrator
            .with_job(key, |job| {
                if job.state != RenderState::Done {
                    return Err(RevisionError::NotDone(job.state));
                }
                let artifact_url = job
                    .artifact_url
                    .clone()
                    .ok_or(RevisionError::NotDone(job.state))?;
                job.begin_review();
                Ok(ReviewRequest {
                    artifact_url,
                    platform: job.platform,
                    mode: job.used_plan.mode,
                    edit_plan: job.used_plan.clone(),
                })
            })
            .await??;

        let response = tokio::select! {
            response = self.reviewer.review(&request) => response,
            _ = cancel.cancelled() => {
                self.orchestrator
                    .with_job(key, |job| job.record_review_failure("review cancelled"))
                    .await?;
                return Err(WorkerError::Cancelled);
            }
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let message = e.to_string();
                let job = self
                    .orchestrator
                    .with_job(key, |job| {
                        job.record_review_failure(message.clone());
                        job.clone()
                    })
                    .await?;
                metrics::record_review(&key, "failed");
                JobLogger::new(&job, "review").log_warning(&format!("review failed: {message}"));
                return Err(WorkerError::Review(message));
            }
        };

        let review = response.review.normalized();
        let revised_plan = response
            .revised_plan
            .map(|plan| as_revision(&request.edit_plan, plan));

        let (job, regression) = self
            .orchestrator
            .with_job(key, |job| {
                let regression = job.record_review(review, revised_plan);
                (job.clone(), regression)
            })
            .await?;

        metrics::record_review(&key, "ok");
        if let Some(regression) = regression {
            metrics::record_regression(&key);
            warn!(
                job_id = %job.id,
                key = %key,
                revision = job.revision,
                previous_score = regression.previous_score,
                current_score = regression.current_score,
                original = job.original_artifact_url.as_deref().unwrap_or_default(),
                "Revision scored lower than the render it replaced"
            );
        }

        info!(
            job_id = %job.id,
            key = %key,
            revision = job.revision,
            score = job.current_score().unwrap_or_default(),
            eligible = job.revision_eligible(self.settings.cap()),
            "Review recorded"
        );
        Ok(job)
    }

    /// Start one revision cycle with the reviewer's plan.
    pub async fn revise(&self, key: RenderJobKey, cancel: &CancelSignal) -> WorkerResult<RenderJob> {
        self.orchestrator
            .resubmit(key, self.settings.cap(), cancel)
            .await
    }

    /// Review, then revise and review again while the job stays eligible
    /// and auto-revise is on.
    ///
    /// Review failures end the cycle with a verdict rather than an error.
    /// Render failures during a revision propagate.
    pub async fn run_cycle(
        &self,
        key: RenderJobKey,
        cancel: &CancelSignal,
    ) -> WorkerResult<ReviewVerdict> {
        let cap = self.settings.cap();

        loop {
            let job = match self.review(key, cancel).await {
                Ok(job) => job,
                Err(WorkerError::Review(_)) => return self.verdict(key).await,
                Err(e) => return Err(e),
            };

            if !self.settings.auto_revise || !job.revision_eligible(cap) {
                return Ok(ReviewVerdict::from_job(&job, cap));
            }
            self.revise(key, cancel).await?;
        }
    }

    /// Current verdict for a job without calling the reviewer.
    pub async fn verdict(&self, key: RenderJobKey) -> WorkerResult<ReviewVerdict> {
        self.orchestrator
            .job(key)
            .await
            .map(|job| ReviewVerdict::from_job(&job, self.settings.cap()))
            .ok_or(WorkerError::JobNotFound(key))
    }
}

/// The reviewer's plan as a new value derived from the rendered one.
fn as_revision(current: &EditPlan, mut proposed: EditPlan) -> EditPlan {
    if proposed.id == current.id {
        proposed.id = PlanId::new();
    }
    proposed.parent_id.get_or_insert_with(|| current.id.clone());
    proposed
}
