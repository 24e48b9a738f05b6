//! Platform-agnostic edit plans.
//!
//! Plans are produced by an external generator and may be revised by the
//! reviewer. A revision is always a new value with its own id; the plan it
//! replaced stays available for rollback.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::PreprocessedClip;

/// Unique identifier for an edit plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PlanId(pub String);

impl PlanId {
    /// Generate a new random plan ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Editing intent the plan was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    /// Story-driven cut with a beginning, middle and end
    #[default]
    Narrative,
    /// Best moments, fast cuts
    Highlight,
    /// Music-driven montage
    Montage,
    /// Short promotional teaser
    Promo,
}

impl EditMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditMode::Narrative => "narrative",
            EditMode::Highlight => "highlight",
            EditMode::Montage => "montage",
            EditMode::Promo => "promo",
        }
    }
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One clip reference placed on the plan's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlannedClip {
    /// Preprocessed clip this entry refers to
    pub clip_id: String,

    /// Location of the clip artifact (local path or URL)
    pub source: String,

    /// Offset into the clip artifact (seconds)
    #[serde(default)]
    pub in_point: f64,

    /// Length taken from the artifact (seconds)
    pub duration: f64,

    /// Position on the output timeline (seconds)
    #[serde(default)]
    pub timeline_start: f64,
}

/// Ordered clip sequence with timing; the unit of work a render consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EditPlan {
    #[serde(default)]
    pub id: PlanId,

    /// Plan this one was revised from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<PlanId>,

    #[serde(default)]
    pub mode: EditMode,

    pub clips: Vec<PlannedClip>,

    /// Free-form notes from the generator or reviewer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl EditPlan {
    /// Create a plan from an ordered clip list.
    pub fn new(mode: EditMode, clips: Vec<PlannedClip>) -> Self {
        Self {
            id: PlanId::new(),
            parent_id: None,
            mode,
            clips,
            notes: None,
        }
    }

    /// Lay out preprocessed clips back to back in the given order.
    pub fn sequential(clips: &[PreprocessedClip], mode: EditMode) -> Self {
        let mut cursor = 0.0;
        let planned = clips
            .iter()
            .map(|clip| {
                let entry = PlannedClip {
                    clip_id: clip.id.to_string(),
                    source: clip.local_path.to_string_lossy().to_string(),
                    in_point: 0.0,
                    duration: clip.effective_duration,
                    timeline_start: cursor,
                };
                cursor += clip.effective_duration;
                entry
            })
            .collect();

        Self::new(mode, planned)
    }

    /// Build a revision of this plan. The result is a new plan value.
    pub fn revised(&self, clips: Vec<PlannedClip>) -> Self {
        Self {
            id: PlanId::new(),
            parent_id: Some(self.id.clone()),
            mode: self.mode,
            clips,
            notes: None,
        }
    }

    /// Number of clips in the plan.
    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    /// Total timeline length in seconds.
    pub fn total_duration(&self) -> f64 {
        self.clips.iter().map(|c| c.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClipId;
    use std::path::PathBuf;

    fn preprocessed(path: &str, effective: f64) -> PreprocessedClip {
        PreprocessedClip {
            id: ClipId::new(),
            local_path: PathBuf::from(path),
            source_id: format!("src-{path}"),
            name: None,
            effective_duration: effective,
            speed: 1.0,
            size_bytes: 1,
        }
    }

    #[test]
    fn test_sequential_layout() {
        let clips = vec![preprocessed("/tmp/a.mp4", 5.0), preprocessed("/tmp/b.mp4", 2.5)];
        let plan = EditPlan::sequential(&clips, EditMode::Highlight);

        assert_eq!(plan.clip_count(), 2);
        assert_eq!(plan.clips[0].timeline_start, 0.0);
        assert_eq!(plan.clips[1].timeline_start, 5.0);
        assert_eq!(plan.clips[1].source, "/tmp/b.mp4");
        assert!((plan.total_duration() - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_revision_is_a_new_value() {
        let original = EditPlan::sequential(&[preprocessed("/tmp/a.mp4", 5.0)], EditMode::Promo);
        let revised = original.revised(Vec::new());

        assert_ne!(revised.id, original.id);
        assert_eq!(revised.parent_id.as_ref(), Some(&original.id));
        assert_eq!(revised.mode, EditMode::Promo);
        assert_eq!(original.clip_count(), 1);
    }

    #[test]
    fn test_deserialize_minimal_plan() {
        let plan: EditPlan = serde_json::from_str(
            r#"{"clips":[{"clip_id":"c1","source":"/tmp/c1.mp4","duration":3.0}]}"#,
        )
        .unwrap();
        assert_eq!(plan.mode, EditMode::Narrative);
        assert_eq!(plan.clips[0].in_point, 0.0);
        assert!(!plan.id.as_str().is_empty());
    }
}
