//! Sequential batch preprocessing and clip cleanup.
//!
//! Clips are processed one at a time in caller order to bound disk and
//! memory use. A failure removes every clip the batch already produced
//! before the error is returned.

use tracing::{debug, info, warn};

use reel_models::{ClipConfig, PreprocessedClip};

use crate::cancel::CancelSignal;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::remove_file_if_exists;
use crate::preprocess::ClipPreprocessor;

/// Remove one clip's local artifact. Already-missing files are not an error.
pub async fn cleanup_clip(clip: &PreprocessedClip) -> MediaResult<bool> {
    remove_file_if_exists(&clip.local_path).await
}

/// Remove every clip's local artifact, logging failures.
///
/// Returns the number of files actually removed.
pub async fn cleanup(clips: &[PreprocessedClip]) -> usize {
    let mut removed = 0;
    for clip in clips {
        match cleanup_clip(clip).await {
            Ok(true) => removed += 1,
            Ok(false) => debug!(clip_id = %clip.id, "Clip artifact already gone"),
            Err(e) => warn!(
                clip_id = %clip.id,
                "Failed to remove clip artifact {}: {}",
                clip.local_path.display(),
                e
            ),
        }
    }
    removed
}

/// Runs a [`ClipPreprocessor`] over a list of clips.
#[derive(Clone)]
pub struct BatchPreprocessor {
    preprocessor: ClipPreprocessor,
}

impl BatchPreprocessor {
    pub fn new(preprocessor: ClipPreprocessor) -> Self {
        Self { preprocessor }
    }

    /// Preprocess all clips in order. All or nothing: on failure nothing
    /// from this batch is left on disk and the original error is returned.
    pub async fn preprocess_all(
        &self,
        configs: &[ClipConfig],
        cancel: &CancelSignal,
    ) -> MediaResult<Vec<PreprocessedClip>> {
        let mut done = Vec::with_capacity(configs.len());

        for (index, config) in configs.iter().enumerate() {
            let result = if cancel.is_cancelled() {
                Err(MediaError::Cancelled)
            } else {
                self.preprocessor.preprocess(config, cancel).await
            };

            match result {
                Ok(clip) => done.push(clip),
                Err(e) => {
                    warn!(
                        index,
                        total = configs.len(),
                        clip = config.label(),
                        "Batch preprocessing failed, removing {} finished clip(s)",
                        done.len()
                    );
                    cleanup(&done).await;
                    return Err(e);
                }
            }
        }

        info!(clips = done.len(), "Batch preprocessing complete");
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::preprocess::test_support::{cancel_on_call, FakeFetcher, FakeTranscoder, Outcome};
    use crate::preprocess::PreprocessOptions;
    use reel_models::ClipId;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn batch(dir: &TempDir, transcoder: Arc<FakeTranscoder>) -> BatchPreprocessor {
        BatchPreprocessor::new(ClipPreprocessor::new(
            Arc::new(FakeFetcher),
            transcoder,
            PreprocessOptions::default().with_work_dir(dir.path()),
        ))
    }

    fn configs(sources: &[&str]) -> Vec<ClipConfig> {
        sources
            .iter()
            .map(|s| ClipConfig::new(*s, 0.0, 3.0).with_name(*s))
            .collect()
    }

    fn file_count(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let dir = TempDir::new().unwrap();
        let clips = batch(&dir, Arc::new(FakeTranscoder::succeeding()))
            .preprocess_all(&configs(&["a", "b", "c"]), &CancelSignal::never())
            .await
            .unwrap();

        let names: Vec<_> = clips.iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(file_count(&dir), 3);
    }

    #[tokio::test]
    async fn test_cancel_during_clip_k_removes_everything() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(FakeTranscoder::scripted(vec![
            Outcome::Succeed,
            Outcome::Succeed,
            Outcome::WaitForCancel,
        ]));
        let (handle, cancel) = cancel_pair();
        let trigger = cancel_on_call(transcoder.clone(), 3, handle);

        let err = batch(&dir, transcoder.clone())
            .preprocess_all(&configs(&["a", "b", "c", "d"]), &cancel)
            .await
            .unwrap_err();
        trigger.await.unwrap();

        assert!(matches!(err, MediaError::Cancelled));
        assert_eq!(file_count(&dir), 0);
        assert_eq!(transcoder.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_batch_starts_nothing() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(FakeTranscoder::succeeding());
        let (handle, cancel) = cancel_pair();
        handle.cancel();

        let err = batch(&dir, transcoder.clone())
            .preprocess_all(&configs(&["a", "b"]), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Cancelled));
        assert_eq!(file_count(&dir), 0);
        assert_eq!(transcoder.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_at_k_removes_earlier_clips() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(FakeTranscoder::scripted(vec![
            Outcome::Succeed,
            Outcome::Succeed,
            Outcome::Fail,
        ]));

        let err = batch(&dir, transcoder.clone())
            .preprocess_all(&configs(&["a", "b", "c", "d"]), &CancelSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::TranscodeFailed { .. }));
        assert_eq!(file_count(&dir), 0);
        // clip d is never attempted
        assert_eq!(transcoder.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_download_failure_surfaces_original_error() {
        let dir = TempDir::new().unwrap();
        let err = batch(&dir, Arc::new(FakeTranscoder::succeeding()))
            .preprocess_all(&configs(&["a", "missing-b"]), &CancelSignal::never())
            .await
            .unwrap_err();

        assert!(err.is_download());
        assert_eq!(file_count(&dir), 0);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"x").unwrap();

        let clips = vec![
            PreprocessedClip {
                id: ClipId::new(),
                local_path: path.clone(),
                source_id: "a".into(),
                name: None,
                effective_duration: 1.0,
                speed: 1.0,
                size_bytes: 1,
            },
            PreprocessedClip {
                id: ClipId::new(),
                local_path: dir.path().join("never-existed.mp4"),
                source_id: "b".into(),
                name: None,
                effective_duration: 1.0,
                speed: 1.0,
                size_bytes: 1,
            },
        ];

        assert_eq!(cleanup(&clips).await, 1);
        assert_eq!(cleanup(&clips).await, 0);
        assert!(!path.exists());
    }
}
