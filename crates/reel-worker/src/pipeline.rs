//! End-to-end run of one manifest.
//!
//! Clips are preprocessed once, then every target renders and goes through
//! its review cycle concurrently. Local targets render from the preprocessed
//! files; cloud targets render from staged copies of them. The preprocessed
//! clips are removed after all targets finish, whatever their outcome.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use reel_media::{cleanup, BatchPreprocessor, CancelSignal};
use reel_models::{EditPlan, PlanId, PreprocessedClip, RenderBackend, RenderJob, RenderJobKey};

use crate::backend::ClipStager;
use crate::error::{WorkerError, WorkerResult};
use crate::manifest::Manifest;
use crate::metrics;
use crate::orchestrator::RenderOrchestrator;
use crate::review::{ReviewController, ReviewVerdict};

/// Result for one (platform, backend) target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    pub key: RenderJobKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<RenderJob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ReviewVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub plan_id: PlanId,
    pub clips: usize,
    pub clips_removed: usize,
    pub targets: Vec<TargetOutcome>,
}

impl PipelineReport {
    pub fn failed_count(&self) -> usize {
        self.targets.iter().filter(|t| !t.succeeded()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_count() == 0
    }
}

pub struct RenderPipeline {
    batch: BatchPreprocessor,
    orchestrator: Arc<RenderOrchestrator>,
    reviews: Option<ReviewController>,
    stager: Option<Arc<dyn ClipStager>>,
    job_timeout: Duration,
}

impl RenderPipeline {
    pub fn new(
        batch: BatchPreprocessor,
        orchestrator: Arc<RenderOrchestrator>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            batch,
            orchestrator,
            reviews: None,
            stager: None,
            job_timeout,
        }
    }

    pub fn with_reviews(mut self, reviews: ReviewController) -> Self {
        self.reviews = Some(reviews);
        self
    }

    /// Required for cloud targets.
    pub fn with_stager(mut self, stager: Arc<dyn ClipStager>) -> Self {
        self.stager = Some(stager);
        self
    }

    pub fn orchestrator(&self) -> &Arc<RenderOrchestrator> {
        &self.orchestrator
    }

    /// Preprocess, render every target, review, then clean up.
    ///
    /// Only preprocessing failures fail the whole run. Per-target failures
    /// are reported in the returned [`PipelineReport`].
    pub async fn run(&self, manifest: &Manifest, cancel: &CancelSignal) -> WorkerResult<PipelineReport> {
        manifest.validate()?;

        let clips = self.batch.preprocess_all(&manifest.clips, cancel).await?;
        metrics::record_clips_preprocessed(clips.len());

        let plan = match &manifest.plan {
            Some(plan) => bind_plan(plan, &clips),
            None => EditPlan::sequential(&clips, manifest.mode),
        };
        info!(
            plan_id = %plan.id,
            clips = plan.clip_count(),
            duration = plan.total_duration(),
            targets = manifest.targets.len(),
            "Rendering plan"
        );

        let reviews = match (&self.reviews, manifest.auto_revise) {
            (Some(reviews), Some(auto)) => Some(reviews.clone().with_auto_revise(auto)),
            (reviews, _) => reviews.clone(),
        };

        let has_cloud = manifest
            .targets
            .iter()
            .any(|key| key.backend == RenderBackend::Cloud);
        let cloud_plan = if has_cloud {
            Some(self.stage_plan(&plan, &clips, cancel).await)
        } else {
            None
        };
        if let Some(Err(e)) = &cloud_plan {
            warn!(plan_id = %plan.id, "Cloud targets cannot render: {}", e);
        }

        let targets = join_all(manifest.targets.iter().map(|key| {
            let target_plan = match (key.backend, &cloud_plan) {
                (RenderBackend::Cloud, Some(Ok(staged))) => Ok(staged.clone()),
                (RenderBackend::Cloud, Some(Err(WorkerError::Staging(msg)))) => {
                    Err(WorkerError::staging(msg.clone()))
                }
                (RenderBackend::Cloud, Some(Err(e))) => Err(WorkerError::staging(e.to_string())),
                _ => Ok(plan.clone()),
            };
            self.run_target(*key, target_plan, reviews.as_ref(), cancel)
        }))
        .await;

        let clips_removed = cleanup(&clips).await;

        Ok(PipelineReport {
            plan_id: plan.id,
            clips: clips.len(),
            clips_removed,
            targets,
        })
    }

    /// Copy of `plan` whose entries point at staged URLs instead of the
    /// worker's local files.
    async fn stage_plan(
        &self,
        plan: &EditPlan,
        clips: &[PreprocessedClip],
        cancel: &CancelSignal,
    ) -> WorkerResult<EditPlan> {
        let stager = self
            .stager
            .as_ref()
            .ok_or_else(|| WorkerError::staging("no clip stager configured for cloud targets"))?;

        let mut staged = plan.clone();
        for clip in clips {
            let local = clip.local_path.to_string_lossy();
            if !staged.clips.iter().any(|entry| entry.source == local) {
                continue;
            }

            let url = tokio::select! {
                url = stager.stage(clip) => url,
                _ = cancel.cancelled() => return Err(WorkerError::Cancelled),
            }
            .map_err(|e| WorkerError::staging(format!("clip {}: {e}", clip.id)))?;
            debug!(clip_id = %clip.id, url = %url, "Clip staged");

            for entry in staged.clips.iter_mut().filter(|entry| entry.source == local) {
                entry.source = url.clone();
            }
        }
        Ok(staged)
    }

    async fn run_target(
        &self,
        key: RenderJobKey,
        plan: WorkerResult<EditPlan>,
        reviews: Option<&ReviewController>,
        cancel: &CancelSignal,
    ) -> TargetOutcome {
        let deadline = cancel.with_deadline(self.job_timeout);

        let result = async {
            let plan = plan?;
            self.orchestrator
                .submit(plan, key.platform, key.backend, &deadline)
                .await?;
            match reviews {
                Some(reviews) => reviews.run_cycle(key, &deadline).await.map(Some),
                None => Ok::<_, WorkerError>(None),
            }
        }
        .await;

        let job = self.orchestrator.job(key).await;
        match result {
            Ok(verdict) => TargetOutcome {
                key,
                job,
                verdict,
                error: None,
            },
            Err(e) => {
                warn!(key = %key, "Target failed: {}", e);
                TargetOutcome {
                    key,
                    job,
                    verdict: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Point an externally generated plan at the preprocessed clips.
///
/// Entries are matched by clip id, source id or display name. Unmatched
/// entries are kept as they are.
pub fn bind_plan(plan: &EditPlan, clips: &[PreprocessedClip]) -> EditPlan {
    let mut bound = plan.clone();
    for entry in &mut bound.clips {
        let found = clips.iter().find(|clip| {
            clip.id.as_str() == entry.clip_id
                || clip.source_id == entry.clip_id
                || clip.source_id == entry.source
                || clip.name.as_deref() == Some(entry.clip_id.as_str())
        });

        match found {
            Some(clip) => {
                entry.clip_id = clip.id.to_string();
                entry.source = clip.local_path.to_string_lossy().to_string();
            }
            None => warn!(clip_id = %entry.clip_id, "Plan entry matches no preprocessed clip"),
        }
    }
    bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::fakes::{FakeCloud, FakeLocal, FakeReviewer, FakeStager};
    use crate::orchestrator::OrchestratorSettings;
    use crate::review::ReviewSettings;
    use async_trait::async_trait;
    use reel_media::{
        ClipPreprocessor, FfmpegCommand, MediaError, MediaResult, PreprocessOptions,
        SourceFetcher, Transcoder,
    };
    use reel_models::{ClipConfig, ClipId, EditMode, Platform, PlannedClip, RenderBackend};
    use reel_client::SubmitReceipt;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    struct StubFetcher;

    #[async_trait]
    impl SourceFetcher for StubFetcher {
        async fn fetch(&self, source_id: &str, dest: &Path, _cancel: &CancelSignal) -> MediaResult<u64> {
            if source_id.contains("missing") {
                return Err(MediaError::download_failed(source_id, "404"));
            }
            tokio::fs::write(dest, b"raw").await?;
            Ok(3)
        }
    }

    struct StubTranscoder;

    #[async_trait]
    impl Transcoder for StubTranscoder {
        async fn transcode(
            &self,
            cmd: &FfmpegCommand,
            _timeout: Duration,
            _cancel: &CancelSignal,
        ) -> MediaResult<()> {
            tokio::fs::write(cmd.output(), b"clip").await?;
            Ok(())
        }
    }

    fn pipeline(dir: &TempDir) -> RenderPipeline {
        pipeline_with_cloud(dir, None)
    }

    fn pipeline_with_cloud(dir: &TempDir, cloud: Option<Arc<FakeCloud>>) -> RenderPipeline {
        let batch = BatchPreprocessor::new(ClipPreprocessor::new(
            Arc::new(StubFetcher),
            Arc::new(StubTranscoder),
            PreprocessOptions::default().with_work_dir(dir.path()),
        ));
        let mut orchestrator = RenderOrchestrator::new(OrchestratorSettings::default())
            .with_local(Arc::new(FakeLocal::ok()));
        if let Some(cloud) = cloud {
            orchestrator = orchestrator.with_cloud(cloud);
        }
        RenderPipeline::new(batch, Arc::new(orchestrator), Duration::from_secs(30))
    }

    fn manifest(sources: &[&str], targets: Vec<RenderJobKey>) -> Manifest {
        Manifest {
            clips: sources
                .iter()
                .map(|s| ClipConfig::new(*s, 0.0, 4.0).with_speed(2.0))
                .collect(),
            plan: None,
            targets,
            mode: EditMode::Highlight,
            auto_revise: None,
        }
    }

    fn dir_is_empty(dir: &TempDir) -> bool {
        std::fs::read_dir(dir.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_run_renders_all_targets_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let report = pipeline(&dir)
            .run(
                &manifest(
                    &["a.mp4", "b.mp4"],
                    vec![
                        RenderJobKey::new(Platform::TikTok, RenderBackend::Local),
                        RenderJobKey::new(Platform::YouTube, RenderBackend::Local),
                    ],
                ),
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        assert!(report.all_succeeded());
        assert_eq!(report.clips, 2);
        assert_eq!(report.clips_removed, 2);
        assert_eq!(report.targets.len(), 2);
        let job = report.targets[0].job.as_ref().unwrap();
        assert_eq!(job.used_plan.clip_count(), 2);
        assert!((job.used_plan.total_duration() - 4.0).abs() < 1e-9);
        assert!(dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_target_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let report = pipeline(&dir)
            .run(
                &manifest(
                    &["a.mp4"],
                    vec![
                        RenderJobKey::new(Platform::TikTok, RenderBackend::Local),
                        RenderJobKey::new(Platform::TikTok, RenderBackend::Cloud),
                    ],
                ),
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        assert_eq!(report.failed_count(), 1);
        assert!(report.targets[0].succeeded());
        assert!(report.targets[1].error.is_some());
        assert!(dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_cloud_targets_render_from_staged_clips() {
        let dir = TempDir::new().unwrap();
        let cloud = Arc::new(
            FakeCloud::default()
                .with_submits(vec![Ok(SubmitReceipt::Completed("https://cdn/out.mp4".into()))]),
        );
        let stager = Arc::new(FakeStager::default());

        let report = pipeline_with_cloud(&dir, Some(cloud.clone()))
            .with_stager(stager.clone())
            .run(
                &manifest(
                    &["a.mp4", "b.mp4"],
                    vec![
                        RenderJobKey::new(Platform::TikTok, RenderBackend::Local),
                        RenderJobKey::new(Platform::TikTok, RenderBackend::Cloud),
                    ],
                ),
                &CancelSignal::never(),
            )
            .await
            .unwrap();

        assert!(report.all_succeeded());
        assert_eq!(stager.staged.lock().unwrap().len(), 2);

        let local = report.targets[0].job.as_ref().unwrap();
        for entry in &local.used_plan.clips {
            assert!(Path::new(&entry.source).starts_with(dir.path()), "{}", entry.source);
        }

        let requests = cloud.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let sent = &requests[0].edit_plan;
        assert_eq!(sent.id, local.used_plan.id);
        assert_eq!(sent.clip_count(), 2);
        for entry in &sent.clips {
            assert_eq!(
                entry.source,
                format!("https://stage.example/clips/{}.mp4", entry.clip_id)
            );
        }
        drop(requests);

        assert!(dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_cloud_target_fails_when_clips_cannot_be_staged() {
        let failing = Arc::new(FakeStager {
            fail: true,
            ..Default::default()
        });

        for stager in [None, Some(failing)] {
            let dir = TempDir::new().unwrap();
            let cloud = Arc::new(FakeCloud::default());
            let mut pipeline = pipeline_with_cloud(&dir, Some(cloud.clone()));
            if let Some(stager) = stager {
                pipeline = pipeline.with_stager(stager);
            }

            let report = pipeline
                .run(
                    &manifest(
                        &["a.mp4"],
                        vec![
                            RenderJobKey::new(Platform::YouTube, RenderBackend::Local),
                            RenderJobKey::new(Platform::YouTube, RenderBackend::Cloud),
                        ],
                    ),
                    &CancelSignal::never(),
                )
                .await
                .unwrap();

            assert!(report.targets[0].succeeded());
            let error = report.targets[1].error.as_deref().unwrap();
            assert!(error.starts_with("Clip staging failed"), "{error}");
            assert!(!error.contains("failed: Clip staging"), "{error}");
            assert!(report.targets[1].job.is_none());
            assert_eq!(cloud.submit_calls.load(Ordering::SeqCst), 0);
            assert!(dir_is_empty(&dir));
        }
    }

    #[tokio::test]
    async fn test_preprocess_failure_fails_run() {
        let dir = TempDir::new().unwrap();
        let err = pipeline(&dir)
            .run(
                &manifest(
                    &["a.mp4", "missing.mp4"],
                    vec![RenderJobKey::new(Platform::TikTok, RenderBackend::Local)],
                ),
                &CancelSignal::never(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::Media(ref e) if e.is_download()));
        assert!(dir_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_manifest_override_disables_auto_revise() {
        let dir = TempDir::new().unwrap();
        let base = pipeline(&dir);
        let reviews = ReviewController::new(
            base.orchestrator().clone(),
            Arc::new(FakeReviewer::scripted(vec![Ok(reel_client::ReviewResponse {
                review: serde_json::from_value(serde_json::json!({
                    "overall_score": 3.0,
                    "storytelling_score": 3.0,
                    "pacing_score": 3.0,
                    "platform_fit_score": 3.0,
                    "story_arc": "weak",
                    "issues": [{"severity": "critical", "category": "hook", "description": "no hook"}]
                }))
                .unwrap(),
                revised_plan: Some(EditPlan::new(EditMode::Highlight, Vec::new())),
            })])),
            ReviewSettings::default(),
        );
        let pipeline = base.with_reviews(reviews);

        let mut manifest = manifest(
            &["a.mp4"],
            vec![RenderJobKey::new(Platform::Twitter, RenderBackend::Local)],
        );
        manifest.auto_revise = Some(false);

        let report = pipeline.run(&manifest, &CancelSignal::never()).await.unwrap();
        let verdict = report.targets[0].verdict.as_ref().unwrap();
        assert_eq!(verdict.revision, 0);
        assert!(verdict.revision_eligible);
    }

    #[test]
    fn test_bind_plan_by_source_and_name() {
        let clips = vec![
            PreprocessedClip {
                id: ClipId::new(),
                local_path: PathBuf::from("/work/1.mp4"),
                source_id: "https://cdn/a.mp4".into(),
                name: None,
                effective_duration: 2.0,
                speed: 2.0,
                size_bytes: 1,
            },
            PreprocessedClip {
                id: ClipId::new(),
                local_path: PathBuf::from("/work/2.mp4"),
                source_id: "b.mp4".into(),
                name: Some("closer".into()),
                effective_duration: 3.0,
                speed: 1.0,
                size_bytes: 1,
            },
        ];
        let entry = |clip_id: &str| PlannedClip {
            clip_id: clip_id.into(),
            source: String::new(),
            in_point: 0.0,
            duration: 1.0,
            timeline_start: 0.0,
        };
        let plan = EditPlan::new(
            EditMode::Narrative,
            vec![entry("closer"), entry("https://cdn/a.mp4"), entry("unknown")],
        );

        let bound = bind_plan(&plan, &clips);
        assert_eq!(bound.id, plan.id);
        assert_eq!(bound.clips[0].source, "/work/2.mp4");
        assert_eq!(bound.clips[0].clip_id, clips[1].id.to_string());
        assert_eq!(bound.clips[1].source, "/work/1.mp4");
        assert_eq!(bound.clips[2].clip_id, "unknown");
        assert_eq!(bound.clips[2].source, "");
    }
}
