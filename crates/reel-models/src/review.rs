//! Structured video reviews.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lowest score a reviewer can give.
pub const MIN_SCORE: f64 = 0.0;
/// Highest score a reviewer can give.
pub const MAX_SCORE: f64 = 10.0;

/// Whether the render tells a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StoryArc {
    Clear,
    Weak,
    Missing,
}

/// Issue severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Critical,
    Warning,
    Suggestion,
}

impl IssueSeverity {
    /// Critical and warning issues justify a revision; suggestions do not.
    pub fn is_actionable(&self) -> bool {
        matches!(self, IssueSeverity::Critical | IssueSeverity::Warning)
    }
}

/// One problem found by the reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReviewIssue {
    pub severity: IssueSeverity,
    /// e.g. "pacing", "hook", "audio"
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub suggested_fix: String,
}

/// Structured critique of a finished render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoReview {
    pub overall_score: f64,
    pub storytelling_score: f64,
    pub pacing_score: f64,
    pub platform_fit_score: f64,
    pub story_arc: StoryArc,
    #[serde(default)]
    pub hook_assessment: String,
    #[serde(default)]
    pub ending_assessment: String,
    #[serde(default)]
    pub issues: Vec<ReviewIssue>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        MIN_SCORE
    } else {
        score.clamp(MIN_SCORE, MAX_SCORE)
    }
}

impl VideoReview {
    /// Clamp every score into [0, 10].
    pub fn normalized(mut self) -> Self {
        self.overall_score = clamp_score(self.overall_score);
        self.storytelling_score = clamp_score(self.storytelling_score);
        self.pacing_score = clamp_score(self.pacing_score);
        self.platform_fit_score = clamp_score(self.platform_fit_score);
        self
    }

    /// True when at least one issue is critical or a warning.
    pub fn has_actionable_issues(&self) -> bool {
        self.issues.iter().any(|issue| issue.severity.is_actionable())
    }

    /// Number of issues with the given severity.
    pub fn count_issues(&self, severity: IssueSeverity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

/// A revision scored lower than the render it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Regression {
    pub previous_score: f64,
    pub current_score: f64,
}

impl Regression {
    /// Compare a new score with the one immediately before it.
    pub fn detect(previous_score: f64, current_score: f64) -> Option<Self> {
        (current_score < previous_score).then_some(Self {
            previous_score,
            current_score,
        })
    }

    pub fn delta(&self) -> f64 {
        self.current_score - self.previous_score
    }
}
