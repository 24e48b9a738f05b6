//! Render job orchestration.
//!
//! One [`RenderOrchestrator`] owns every [`RenderJob`], keyed by
//! (platform, backend). Jobs for different keys run fully independently.
//! The job map lock is only held for synchronous state updates, never
//! across a backend call.
//!
//! Local renders are synchronous: `submitting -> done | failed`.
//! Cloud renders are submitted and then polled on a fixed interval with a
//! bounded attempt budget. Transport errors while polling are logged and
//! retried on the next tick; only the backend's own terminal states or the
//! budget end the loop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use reel_client::{ClientError, LibraryEntry, RenderRequest, SubmitReceipt};
use reel_media::{CancelSignal, MediaError};
use reel_models::{
    EditPlan, FailureKind, JobId, Platform, RenderBackend, RenderJob, RenderJobKey, RenderState,
};

use crate::backend::{CloudBackend, LibrarySink, LocalBackend};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_transient, ErrorStreak, RetryConfig};

/// Consecutive poll errors logged before the rest are suppressed.
const MAX_LOGGED_POLL_FAILURES: u32 = 3;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Job lifecycle notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    StateChanged {
        key: RenderJobKey,
        job_id: JobId,
        state: RenderState,
    },
    Completed {
        key: RenderJobKey,
        job_id: JobId,
        artifact_url: String,
        revision: u32,
    },
    Failed {
        key: RenderJobKey,
        job_id: JobId,
        kind: FailureKind,
        error: String,
    },
}

/// Polling and submission settings.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
    pub submit_retry: RetryConfig,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            poll_max_attempts: config.poll_max_attempts.max(1),
            submit_retry: RetryConfig::new("cloud_submit").with_max_retries(config.submit_retries),
        }
    }
}

/// Owns render jobs and drives them through their backends.
pub struct RenderOrchestrator {
    jobs: RwLock<HashMap<RenderJobKey, RenderJob>>,
    cloud: Option<Arc<dyn CloudBackend>>,
    local: Option<Arc<dyn LocalBackend>>,
    library: Option<Arc<dyn LibrarySink>>,
    settings: OrchestratorSettings,
    events: broadcast::Sender<RenderEvent>,
}

impl RenderOrchestrator {
    pub fn new(settings: OrchestratorSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            jobs: RwLock::new(HashMap::new()),
            cloud: None,
            local: None,
            library: None,
            settings,
            events,
        }
    }

    pub fn with_cloud(mut self, backend: Arc<dyn CloudBackend>) -> Self {
        self.cloud = Some(backend);
        self
    }

    pub fn with_local(mut self, backend: Arc<dyn LocalBackend>) -> Self {
        self.local = Some(backend);
        self
    }

    pub fn with_library(mut self, sink: Arc<dyn LibrarySink>) -> Self {
        self.library = Some(sink);
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        self.events.subscribe()
    }

    /// Snapshot of one job.
    pub async fn job(&self, key: RenderJobKey) -> Option<RenderJob> {
        self.jobs.read().await.get(&key).cloned()
    }

    /// Snapshot of every job.
    pub async fn jobs(&self) -> Vec<RenderJob> {
        let mut jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Apply a synchronous change to a job under the map lock.
    pub async fn with_job<F, R>(&self, key: RenderJobKey, f: F) -> WorkerResult<R>
    where
        F: FnOnce(&mut RenderJob) -> R,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&key).ok_or(WorkerError::JobNotFound(key))?;
        Ok(f(job))
    }

    /// Start a fresh render of `plan` for (platform, backend).
    ///
    /// A finished job for the same key is replaced by a new job. A job
    /// still in flight for the key is left alone and the call fails with
    /// [`WorkerError::JobInFlight`].
    pub async fn submit(
        &self,
        plan: EditPlan,
        platform: Platform,
        backend: RenderBackend,
        cancel: &CancelSignal,
    ) -> WorkerResult<RenderJob> {
        let key = RenderJobKey::new(platform, backend);

        let job = {
            let mut jobs = self.jobs.write().await;
            if jobs.get(&key).is_some_and(|job| job.state.is_in_flight()) {
                return Err(WorkerError::JobInFlight(key));
            }
            let mut job = RenderJob::new(platform, backend, plan.clone());
            job.begin_submission();
            jobs.insert(key, job.clone());
            job
        };

        self.execute(job, plan, cancel).await
    }

    /// Re-render a finished job with the reviewer's revised plan, keeping
    /// the job identity.
    pub async fn resubmit(
        &self,
        key: RenderJobKey,
        revision_cap: u32,
        cancel: &CancelSignal,
    ) -> WorkerResult<RenderJob> {
        let (job, plan) = self
            .with_job(key, |job| {
                job.prepare_revision(revision_cap)
                    .map(|plan| (job.clone(), plan))
            })
            .await??;
        metrics::record_revision(&key);

        info!(
            job_id = %job.id,
            key = %key,
            revision = job.revision,
            plan_id = %plan.id,
            "Resubmitting revised plan"
        );
        self.execute(job, plan, cancel).await
    }

    /// Run [`submit`](Self::submit) on a background task.
    pub fn spawn_submit(
        self: &Arc<Self>,
        plan: EditPlan,
        platform: Platform,
        backend: RenderBackend,
        cancel: CancelSignal,
    ) -> JoinHandle<WorkerResult<RenderJob>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.submit(plan, platform, backend, &cancel).await })
    }

    async fn execute(
        &self,
        job: RenderJob,
        plan: EditPlan,
        cancel: &CancelSignal,
    ) -> WorkerResult<RenderJob> {
        let key = job.key();
        let logger = JobLogger::new(&job, "render");
        logger.log_start(&format!("{} clip(s), {:.1}s", plan.clip_count(), plan.total_duration()));
        metrics::record_render_submitted(&key, job.revision);
        self.emit_state(key, &job.id, RenderState::Submitting);

        let started = Instant::now();
        let result = match key.backend {
            RenderBackend::Local => self.render_local(&job, &plan, cancel).await,
            RenderBackend::Cloud => self.render_cloud(&job, plan, cancel).await,
        };

        match &result {
            Ok(done) => {
                metrics::record_render_completed(&key, started.elapsed().as_secs_f64());
                logger.log_completion(done.artifact_url.as_deref().unwrap_or_default());
            }
            Err(e) => logger.log_error(&e.to_string()),
        }
        result
    }

    async fn render_local(
        &self,
        job: &RenderJob,
        plan: &EditPlan,
        cancel: &CancelSignal,
    ) -> WorkerResult<RenderJob> {
        let key = job.key();
        let Some(local) = self.local.clone() else {
            let msg = "no local render backend configured";
            self.fail(key, FailureKind::Submission, msg).await;
            return Err(WorkerError::submission(msg));
        };

        match local.render(plan, key.platform, cancel).await {
            Ok(path) => self.complete(key, path.to_string_lossy().to_string()).await,
            Err(MediaError::Cancelled) => {
                self.fail(key, FailureKind::Cancelled, "render cancelled").await;
                Err(WorkerError::Cancelled)
            }
            Err(e) => {
                self.fail(key, FailureKind::Transcode, &e.to_string()).await;
                Err(WorkerError::Media(e))
            }
        }
    }

    async fn render_cloud(
        &self,
        job: &RenderJob,
        plan: EditPlan,
        cancel: &CancelSignal,
    ) -> WorkerResult<RenderJob> {
        let key = job.key();
        let Some(cloud) = self.cloud.clone() else {
            let msg = "no cloud render backend configured";
            self.fail(key, FailureKind::Submission, msg).await;
            return Err(WorkerError::submission(msg));
        };

        let request = RenderRequest {
            job_id: job.id.to_string(),
            platform: key.platform,
            spec: key.platform.spec(),
            edit_plan: plan,
            revision: job.revision,
        };

        let submitted = race(
            cancel,
            retry_transient(
                &self.settings.submit_retry,
                ClientError::is_retryable,
                || cloud.submit(&request),
            ),
        )
        .await;

        let receipt = match submitted {
            Some(result) => result,
            None => {
                self.fail(key, FailureKind::Cancelled, "submission cancelled").await;
                return Err(WorkerError::Cancelled);
            }
        };

        match receipt {
            Ok(SubmitReceipt::Completed(url)) => {
                debug!(job_id = %job.id, "Cloud render completed on submission");
                self.complete(key, url).await
            }
            Ok(SubmitReceipt::Handle(handle)) => {
                let queued = self.with_job(key, |job| job.mark_queued(handle.clone())).await?;
                if queued {
                    self.emit_state(key, &job.id, RenderState::Queued);
                }
                info!(job_id = %job.id, key = %key, handle = %handle, "Cloud render queued");
                self.poll(key, cancel).await
            }
            Err(e) => {
                let msg = e.to_string();
                self.fail(key, FailureKind::Submission, &msg).await;
                Err(WorkerError::Submission(msg))
            }
        }
    }

    /// Track a queued cloud job until it reaches a terminal state, the
    /// attempt budget runs out, or `cancel` fires.
    ///
    /// Sleeps one interval before each status request.
    pub async fn poll(&self, key: RenderJobKey, cancel: &CancelSignal) -> WorkerResult<RenderJob> {
        let cloud = self
            .cloud
            .clone()
            .ok_or_else(|| WorkerError::submission("no cloud render backend configured"))?;

        let job = self.job(key).await.ok_or(WorkerError::JobNotFound(key))?;
        let handle = match (&job.handle, job.state.is_in_flight()) {
            (Some(handle), true) => handle.clone(),
            _ => return Ok(job),
        };

        let logger = JobLogger::new(&job, "poll");
        let mut streak = ErrorStreak::new(MAX_LOGGED_POLL_FAILURES);
        let max_attempts = self.settings.poll_max_attempts;

        for attempt in 1..=max_attempts {
            let tick = async {
                tokio::time::sleep(self.settings.poll_interval).await;
                cloud.status(&handle).await
            };

            let status = match race(cancel, tick).await {
                Some(status) => status,
                None => {
                    logger.log_warning("polling cancelled, remote job is no longer tracked");
                    self.fail(key, FailureKind::Cancelled, "polling cancelled").await;
                    return Err(WorkerError::Cancelled);
                }
            };

            let status = match status {
                Ok(status) => {
                    let failures = streak.reset();
                    if failures > MAX_LOGGED_POLL_FAILURES {
                        debug!(job_id = %job.id, failures, "Status polling recovered");
                    }
                    metrics::record_poll_attempt(&key, true);
                    status
                }
                Err(e) => {
                    metrics::record_poll_attempt(&key, false);
                    if streak.fail() {
                        warn!(job_id = %job.id, attempt, "Status poll failed, will retry: {}", e);
                    }
                    continue;
                }
            };

            match status.state {
                RenderState::Done => {
                    return match status.artifact_url {
                        Some(url) => self.complete(key, url).await,
                        None => {
                            let msg = "backend reported done without an artifact url";
                            self.fail(key, FailureKind::Backend, msg).await;
                            Err(WorkerError::render_failed(msg))
                        }
                    };
                }
                RenderState::Failed => {
                    let msg = status
                        .error
                        .unwrap_or_else(|| "render failed without an error message".to_string());
                    self.fail(key, FailureKind::Backend, &msg).await;
                    return Err(WorkerError::RenderFailed(msg));
                }
                state => {
                    let changed = self.with_job(key, |job| job.apply_remote_state(state)).await?;
                    if changed {
                        logger.log_progress(state.as_str());
                        self.emit_state(key, &job.id, state);
                    }
                }
            }
        }

        self.fail(
            key,
            FailureKind::Timeout,
            &format!("render did not finish after {max_attempts} poll attempts"),
        )
        .await;
        Err(WorkerError::PollTimeout {
            attempts: max_attempts,
        })
    }

    async fn complete(&self, key: RenderJobKey, artifact_url: String) -> WorkerResult<RenderJob> {
        let (marked, job) = self
            .with_job(key, |job| (job.mark_done(artifact_url.clone()), job.clone()))
            .await?;
        if !marked {
            return Err(WorkerError::render_failed(format!(
                "job {key} could not move from {} to done",
                job.state
            )));
        }

        let _ = self.events.send(RenderEvent::Completed {
            key,
            job_id: job.id.clone(),
            artifact_url: artifact_url.clone(),
            revision: job.revision,
        });
        self.notify_library(&job, artifact_url);
        Ok(job)
    }

    async fn fail(&self, key: RenderJobKey, kind: FailureKind, message: &str) {
        let job = self
            .with_job(key, |job| job.mark_failed(kind, message).then(|| job.id.clone()))
            .await;

        if let Ok(Some(job_id)) = job {
            metrics::record_render_failed(&key, kind);
            let _ = self.events.send(RenderEvent::Failed {
                key,
                job_id,
                kind,
                error: message.to_string(),
            });
        }
    }

    fn emit_state(&self, key: RenderJobKey, job_id: &JobId, state: RenderState) {
        let _ = self.events.send(RenderEvent::StateChanged {
            key,
            job_id: job_id.clone(),
            state,
        });
    }

    /// Fire-and-forget library persistence.
    fn notify_library(&self, job: &RenderJob, artifact_url: String) {
        let Some(sink) = self.library.clone() else {
            return;
        };

        let entry = LibraryEntry {
            job_id: job.id.to_string(),
            platform: job.platform,
            backend: job.backend,
            artifact_url,
            revision: job.revision,
            plan_id: job.used_plan.id.to_string(),
            duration_secs: job.used_plan.total_duration(),
            completed_at: Utc::now(),
        };

        tokio::spawn(async move {
            if let Err(e) = sink.store(&entry).await {
                warn!(job_id = %entry.job_id, "Library persistence failed: {}", e);
            }
        });
    }
}

/// Run `fut` unless `cancel` fires first.
async fn race<F: Future>(cancel: &CancelSignal, fut: F) -> Option<F::Output> {
    if cancel.is_cancelled() {
        return None;
    }
    tokio::select! {
        out = fut => Some(out),
        _ = cancel.cancelled() => None,
    }
}
