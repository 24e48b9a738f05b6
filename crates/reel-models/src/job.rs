//! Render job definitions and lifecycle.
//!
//! A [`RenderJob`] is one (platform, backend) unit of work. All state
//! changes go through methods on the job so the lifecycle rules live in
//! one place:
//!
//! ```text
//! local:  pending -> submitting -> done | failed
//! cloud:  pending -> submitting -> queued -> fetching -> rendering -> saving -> done
//!                                     \-> failed (from any intermediate state)
//! ```
//!
//! A revision re-enters `submitting` from `done` under the same job identity.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::{EditPlan, Platform, Regression, VideoReview};

/// Hard ceiling on revisions per job (three renders including the original).
pub const MAX_REVISIONS: u32 = 2;

/// Unique identifier for a render job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which renderer executes the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderBackend {
    /// Asynchronous cloud renderer (submit + poll)
    Cloud,
    /// Synchronous local transcoder
    Local,
}

impl RenderBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderBackend::Cloud => "cloud",
            RenderBackend::Local => "local",
        }
    }
}

impl fmt::Display for RenderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct RenderJobKey {
    pub platform: Platform,
    pub backend: RenderBackend,
}

impl RenderJobKey {
    pub fn new(platform: Platform, backend: RenderBackend) -> Self {
        Self { platform, backend }
    }
}

impl fmt::Display for RenderJobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.backend)
    }
}

/// Render job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    #[default]
    Pending,
    Submitting,
    Queued,
    Fetching,
    Rendering,
    Saving,
    Done,
    Failed,
}

impl RenderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderState::Pending => "pending",
            RenderState::Submitting => "submitting",
            RenderState::Queued => "queued",
            RenderState::Fetching => "fetching",
            RenderState::Rendering => "rendering",
            RenderState::Saving => "saving",
            RenderState::Done => "done",
            RenderState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderState::Done | RenderState::Failed)
    }

    /// Submitted and not yet terminal.
    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal() && *self != RenderState::Pending
    }

    /// Position along the happy path; `Failed` has none.
    fn rank(&self) -> Option<u8> {
        match self {
            RenderState::Pending => Some(0),
            RenderState::Submitting => Some(1),
            RenderState::Queued => Some(2),
            RenderState::Fetching => Some(3),
            RenderState::Rendering => Some(4),
            RenderState::Saving => Some(5),
            RenderState::Done => Some(6),
            RenderState::Failed => None,
        }
    }

    /// Whether `next` is a legal successor of this state.
    ///
    /// Cloud backends may skip intermediate states, so any forward move is
    /// allowed. Backward moves are not. Terminal states only re-enter
    /// `submitting` (a resubmission).
    pub fn can_transition_to(&self, next: RenderState) -> bool {
        match (self, next) {
            (RenderState::Done | RenderState::Failed, RenderState::Submitting) => true,
            (current, _) if current.is_terminal() => false,
            (_, RenderState::Failed) => true,
            (RenderState::Pending, next) => next == RenderState::Submitting,
            (current, next) => match (current.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Unknown render state: {0}")]
pub struct RenderStateParseError(pub String);

impl FromStr for RenderState {
    type Err = RenderStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(RenderState::Pending),
            "submitting" => Ok(RenderState::Submitting),
            "queued" => Ok(RenderState::Queued),
            "fetching" => Ok(RenderState::Fetching),
            "rendering" => Ok(RenderState::Rendering),
            "saving" => Ok(RenderState::Saving),
            "done" | "succeeded" | "completed" => Ok(RenderState::Done),
            "failed" | "error" => Ok(RenderState::Failed),
            _ => Err(RenderStateParseError(s.to_string())),
        }
    }
}

/// Why a job ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The backend rejected the submission
    Submission,
    /// The backend reported a failed render
    Backend,
    /// The poll budget ran out before a terminal state
    Timeout,
    /// The local transcoder failed
    Transcode,
    /// The caller stopped tracking the job
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Submission => "submission",
            FailureKind::Backend => "backend",
            FailureKind::Timeout => "timeout",
            FailureKind::Transcode => "transcode",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review lifecycle for the job's current render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    #[default]
    NotStarted,
    Reviewing,
    Done,
    Failed,
}

/// Reasons a revision cycle is refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RevisionError {
    #[error("revision cap reached ({revision}/{cap})")]
    CapReached { revision: u32, cap: u32 },

    #[error("render is {0}, revisions start from a finished render")]
    NotDone(RenderState),

    #[error("review has not completed")]
    NotReviewed,

    #[error("reviewer did not supply a revised plan")]
    NoRevisedPlan,

    #[error("review has no critical or warning issues")]
    NoActionableIssues,
}

/// One (platform, backend) unit of render work.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenderJob {
    pub id: JobId,
    pub platform: Platform,
    pub backend: RenderBackend,
    pub state: RenderState,

    /// Cloud job handle once submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,

    /// Result artifact location once done
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,

    /// Error message once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,

    /// Plan that produced the current submission
    pub used_plan: EditPlan,

    /// 0 = original render
    pub revision: u32,

    /// Overall scores of earlier renders, oldest first
    #[serde(default)]
    pub prior_scores: Vec<f64>,

    /// Artifact of the original render, kept for rollback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_artifact_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<VideoReview>,

    #[serde(default)]
    pub review_state: ReviewState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_error: Option<String>,

    /// Plan the reviewer proposed for the next revision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_plan: Option<EditPlan>,

    /// Set when the latest review scored below the previous render
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression: Option<Regression>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    /// Create a pending job for the given plan.
    pub fn new(platform: Platform, backend: RenderBackend, plan: EditPlan) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            platform,
            backend,
            state: RenderState::Pending,
            handle: None,
            artifact_url: None,
            error: None,
            failure: None,
            used_plan: plan,
            revision: 0,
            prior_scores: Vec::new(),
            original_artifact_url: None,
            review: None,
            review_state: ReviewState::NotStarted,
            review_error: None,
            revised_plan: None,
            regression: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> RenderJobKey {
        RenderJobKey::new(self.platform, self.backend)
    }

    /// Overall score of the current render's review.
    pub fn current_score(&self) -> Option<f64> {
        self.review.as_ref().map(|r| r.overall_score)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn clear_result(&mut self) {
        self.handle = None;
        self.artifact_url = None;
        self.error = None;
        self.failure = None;
        self.review = None;
        self.review_state = ReviewState::NotStarted;
        self.review_error = None;
        self.revised_plan = None;
        self.regression = None;
    }

    /// Move to `next` if the lifecycle allows it. Returns whether the state changed.
    fn advance(&mut self, next: RenderState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.touch();
        true
    }

    /// Enter `submitting` for a fresh render of the current plan.
    pub fn begin_submission(&mut self) -> bool {
        if !self.advance(RenderState::Submitting) {
            return false;
        }
        self.clear_result();
        true
    }

    /// Record the cloud handle and enter `queued`.
    pub fn mark_queued(&mut self, handle: impl Into<String>) -> bool {
        self.handle = Some(handle.into());
        self.advance(RenderState::Queued)
    }

    /// Apply an intermediate state reported by the cloud backend.
    ///
    /// Terminal states must go through [`mark_done`](Self::mark_done) or
    /// [`mark_failed`](Self::mark_failed).
    pub fn apply_remote_state(&mut self, state: RenderState) -> bool {
        if state.is_terminal() {
            return false;
        }
        self.advance(state)
    }

    /// Finish the render with its artifact location.
    pub fn mark_done(&mut self, artifact_url: impl Into<String>) -> bool {
        if !self.advance(RenderState::Done) {
            return false;
        }
        let artifact_url = artifact_url.into();
        if self.revision == 0 && self.original_artifact_url.is_none() {
            self.original_artifact_url = Some(artifact_url.clone());
        }
        self.artifact_url = Some(artifact_url);
        true
    }

    /// Fail the render.
    pub fn mark_failed(&mut self, kind: FailureKind, message: impl Into<String>) -> bool {
        if !self.advance(RenderState::Failed) {
            return false;
        }
        self.failure = Some(kind);
        self.error = Some(message.into());
        true
    }

    /// Mark the review as started.
    pub fn begin_review(&mut self) {
        self.review_state = ReviewState::Reviewing;
        self.review_error = None;
        self.touch();
    }

    /// Attach a finished review and detect a regression against the
    /// immediately preceding render's score.
    pub fn record_review(
        &mut self,
        review: VideoReview,
        revised_plan: Option<EditPlan>,
    ) -> Option<Regression> {
        let regression = self
            .prior_scores
            .last()
            .and_then(|previous| Regression::detect(*previous, review.overall_score));

        self.review = Some(review);
        self.revised_plan = revised_plan;
        self.review_state = ReviewState::Done;
        self.review_error = None;
        self.regression = regression;
        self.touch();
        regression
    }

    /// The review call failed. The render itself stays usable.
    pub fn record_review_failure(&mut self, message: impl Into<String>) {
        self.review_state = ReviewState::Failed;
        self.review_error = Some(message.into());
        self.revised_plan = None;
        self.touch();
    }

    /// Check whether a revision cycle may start, with the reason if not.
    pub fn check_revision(&self, cap: u32) -> Result<(), RevisionError> {
        let cap = cap.min(MAX_REVISIONS);
        if self.revision >= cap {
            return Err(RevisionError::CapReached {
                revision: self.revision,
                cap,
            });
        }
        if self.state != RenderState::Done {
            return Err(RevisionError::NotDone(self.state));
        }
        let review = match (&self.review, self.review_state) {
            (Some(review), ReviewState::Done) => review,
            _ => return Err(RevisionError::NotReviewed),
        };
        if self.revised_plan.is_none() {
            return Err(RevisionError::NoRevisedPlan);
        }
        if !review.has_actionable_issues() {
            return Err(RevisionError::NoActionableIssues);
        }
        Ok(())
    }

    /// True when the latest review allows a revision under `cap`.
    pub fn revision_eligible(&self, cap: u32) -> bool {
        self.check_revision(cap).is_ok()
    }

    /// Start a revision cycle with the reviewer's plan.
    ///
    /// Snapshots the current score, preserves the original artifact, swaps
    /// in the revised plan, bumps the revision counter and re-enters
    /// `submitting`. Returns the plan to render.
    pub fn prepare_revision(&mut self, cap: u32) -> Result<EditPlan, RevisionError> {
        self.check_revision(cap)?;

        let plan = match self.revised_plan.take() {
            Some(plan) => plan,
            None => return Err(RevisionError::NoRevisedPlan),
        };

        if let Some(score) = self.current_score() {
            self.prior_scores.push(score);
        }
        if self.original_artifact_url.is_none() {
            self.original_artifact_url = self.artifact_url.clone();
        }

        self.used_plan = plan.clone();
        self.revision += 1;
        self.advance(RenderState::Submitting);
        self.clear_result();
        Ok(plan)
    }
}
