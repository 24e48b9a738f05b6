//! JSON job description read by the worker binary.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use reel_models::{ClipConfig, EditMode, EditPlan, RenderJobKey};

use crate::error::{WorkerError, WorkerResult};

/// Clips to preprocess, an optional externally generated plan and the
/// (platform, backend) targets to render.
///
/// ```json
/// {
///   "clips": [{ "source_id": "https://cdn/a.mp4", "duration": 8, "speed": 1.5 }],
///   "targets": [{ "platform": "tiktok", "backend": "cloud" }],
///   "mode": "highlight"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub clips: Vec<ClipConfig>,

    /// Plan from the edit-plan generator. Its entries name clips by
    /// source id, display name or preprocessed clip id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<EditPlan>,

    pub targets: Vec<RenderJobKey>,

    #[serde(default)]
    pub mode: EditMode,

    /// Overrides `REEL_AUTO_REVISE` for this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_revise: Option<bool>,
}

impl Manifest {
    /// Read and validate a manifest file.
    pub async fn load(path: impl AsRef<Path>) -> WorkerResult<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> WorkerResult<Self> {
        let manifest: Self = serde_json::from_str(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> WorkerResult<()> {
        if self.clips.is_empty() {
            return Err(WorkerError::manifest("no clips"));
        }
        if self.targets.is_empty() {
            return Err(WorkerError::manifest("no render targets"));
        }

        for (i, clip) in self.clips.iter().enumerate() {
            clip.validate()
                .map_err(|e| WorkerError::manifest(format!("clip {} ({}): {}", i, clip.label(), e)))?;
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(*target) {
                return Err(WorkerError::manifest(format!("duplicate target {target}")));
            }
        }

        if let Some(plan) = &self.plan {
            if plan.clips.is_empty() {
                return Err(WorkerError::manifest("plan has no clips"));
            }
        }
        Ok(())
    }
}
