//! Per-clip preprocessing: fetch, trim, speed-ramp, sharpen, re-encode.
//!
//! The raw download is removed on every exit path. A partial transcode
//! output is removed when the clip fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use reel_models::{ClipConfig, ClipId, EncodingConfig, PreprocessedClip};

use crate::cancel::CancelSignal;
use crate::command::{FfmpegCommand, Transcoder};
use crate::download::SourceFetcher;
use crate::error::{MediaError, MediaResult};
use crate::filters::{build_audio_filter, build_video_filter};
use crate::fs_utils::{file_size, remove_file_if_exists};

/// Default transcode timeout per clip.
pub const DEFAULT_TRANSCODE_TIMEOUT: Duration = Duration::from_secs(600);

/// Preprocessor settings.
#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    /// Directory for raw downloads and preprocessed clips
    pub work_dir: PathBuf,
    /// Encoding for the intermediate clip
    pub encoding: EncodingConfig,
    /// Upper bound on one transcoder run
    pub transcode_timeout: Duration,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("reel"),
            encoding: EncodingConfig::for_preprocess(),
            transcode_timeout: DEFAULT_TRANSCODE_TIMEOUT,
        }
    }
}

impl PreprocessOptions {
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transcode_timeout = timeout;
        self
    }
}

/// Turns one [`ClipConfig`] into a local, normalized clip.
#[derive(Clone)]
pub struct ClipPreprocessor {
    fetcher: Arc<dyn SourceFetcher>,
    transcoder: Arc<dyn Transcoder>,
    options: PreprocessOptions,
}

impl ClipPreprocessor {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        transcoder: Arc<dyn Transcoder>,
        options: PreprocessOptions,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            options,
        }
    }

    pub fn options(&self) -> &PreprocessOptions {
        &self.options
    }

    /// Build the transcode command for a clip. Filter flags are left out
    /// entirely when their chain is empty.
    pub fn build_command(&self, config: &ClipConfig, raw: &Path, output: &Path) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(raw, output)
            .seek(config.trim_start)
            .duration(config.duration);

        let video_filter = build_video_filter(config);
        if !video_filter.is_empty() {
            cmd = cmd.video_filter(video_filter);
        }

        let audio_filter = build_audio_filter(config.speed);
        if !audio_filter.is_empty() {
            cmd = cmd.audio_filter(audio_filter);
        }

        cmd.encoding(&self.options.encoding)
    }

    /// Preprocess one clip.
    ///
    /// Fails with a download error when the source cannot be fetched and a
    /// transcode error when the transcoder fails or leaves no output.
    pub async fn preprocess(
        &self,
        config: &ClipConfig,
        cancel: &CancelSignal,
    ) -> MediaResult<PreprocessedClip> {
        config.validate()?;
        tokio::fs::create_dir_all(&self.options.work_dir).await?;

        let id = ClipId::new();
        let raw = self.options.work_dir.join(format!("{id}.raw"));
        let output = self.options.work_dir.join(format!("{id}.mp4"));

        let result = self.run(&id, config, &raw, &output, cancel).await;

        if let Err(e) = remove_file_if_exists(&raw).await {
            warn!(clip = config.label(), "Failed to remove raw download {}: {}", raw.display(), e);
        }

        if let Err(ref err) = result {
            if let Err(e) = remove_file_if_exists(&output).await {
                warn!(clip = config.label(), "Failed to remove partial output {}: {}", output.display(), e);
            }
            warn!(clip = config.label(), error = %err, "Clip preprocessing failed");
        }

        result
    }

    async fn run(
        &self,
        id: &ClipId,
        config: &ClipConfig,
        raw: &Path,
        output: &Path,
        cancel: &CancelSignal,
    ) -> MediaResult<PreprocessedClip> {
        let fetched = self.fetcher.fetch(&config.source_id, raw, cancel).await?;
        debug!(clip = config.label(), bytes = fetched, "Source fetched");

        let cmd = self.build_command(config, raw, output);
        self.transcoder
            .transcode(&cmd, self.options.transcode_timeout, cancel)
            .await?;

        let size_bytes = match file_size(output).await? {
            Some(size) if size > 0 => size,
            _ => return Err(MediaError::MissingOutput(output.to_path_buf())),
        };

        let clip = PreprocessedClip {
            id: id.clone(),
            local_path: output.to_path_buf(),
            source_id: config.source_id.clone(),
            name: config.name.clone(),
            effective_duration: config.effective_duration(),
            speed: config.speed,
            size_bytes,
        };

        info!(
            clip = config.label(),
            clip_id = %clip.id,
            effective_duration = clip.effective_duration,
            size_bytes,
            "Clip preprocessed"
        );

        Ok(clip)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tempfile::TempDir;

    fn preprocessor(dir: &TempDir, transcoder: Arc<FakeTranscoder>) -> ClipPreprocessor {
        ClipPreprocessor::new(
            Arc::new(FakeFetcher),
            transcoder,
            PreprocessOptions::default().with_work_dir(dir.path()),
        )
    }

    fn leftover_files(dir: &TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_preprocess_success_removes_raw() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(FakeTranscoder::succeeding());
        let config = ClipConfig::new("https://cdn/a.mp4", 1.0, 10.0).with_speed(2.0);

        let clip = preprocessor(&dir, transcoder)
            .preprocess(&config, &CancelSignal::never())
            .await
            .unwrap();

        assert_eq!(clip.effective_duration, 5.0);
        assert_eq!(clip.size_bytes, 12);
        assert!(clip.local_path.exists());
        assert_eq!(leftover_files(&dir), vec![format!("{}.mp4", clip.id)]);
    }

    #[tokio::test]
    async fn test_transcode_failure_cleans_up_everything() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(FakeTranscoder::scripted(vec![Outcome::Fail]));
        let config = ClipConfig::new("a.mp4", 0.0, 4.0);

        let err = preprocessor(&dir, transcoder)
            .preprocess(&config, &CancelSignal::never())
            .await
            .unwrap_err();

        assert!(err.is_transcode());
        assert!(leftover_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_transcode_removes_raw_and_partial_output() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(FakeTranscoder::scripted(vec![Outcome::WaitForCancel]));
        let (handle, cancel) = crate::cancel::cancel_pair();
        let trigger = cancel_on_call(transcoder.clone(), 1, handle);

        let err = preprocessor(&dir, transcoder)
            .preprocess(&ClipConfig::new("a.mp4", 0.0, 4.0), &cancel)
            .await
            .unwrap_err();
        trigger.await.unwrap();

        assert!(matches!(err, MediaError::Cancelled));
        assert!(leftover_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_missing_output_is_transcode_error() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(FakeTranscoder::scripted(vec![Outcome::NoOutput]));

        let err = preprocessor(&dir, transcoder)
            .preprocess(&ClipConfig::new("a.mp4", 0.0, 4.0), &CancelSignal::never())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::MissingOutput(_)));
        assert!(leftover_files(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_download_failure_skips_transcode() {
        let dir = TempDir::new().unwrap();
        let transcoder = Arc::new(FakeTranscoder::succeeding());

        let err = preprocessor(&dir, transcoder.clone())
            .preprocess(&ClipConfig::new("missing.mp4", 0.0, 4.0), &CancelSignal::never())
            .await
            .unwrap_err();

        assert!(err.is_download());
        assert_eq!(transcoder.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_io() {
        let dir = TempDir::new().unwrap();
        let err = preprocessor(&dir, Arc::new(FakeTranscoder::succeeding()))
            .preprocess(&ClipConfig::new("a.mp4", 0.0, 4.0).with_speed(0.0), &CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidClip(_)));
    }

    #[test]
    fn test_command_omits_empty_filters() {
        let dir = TempDir::new().unwrap();
        let pre = preprocessor(&dir, Arc::new(FakeTranscoder::succeeding()));
        let config = ClipConfig::new("a.mp4", 2.0, 4.0).with_sharpen(false);

        let args = pre
            .build_command(&config, Path::new("raw"), Path::new("out.mp4"))
            .build_args();
        assert!(!args.contains(&"-vf".to_string()));
        assert!(!args.contains(&"-af".to_string()));
        assert!(args.contains(&"2.000".to_string()));

        let ramped = config.with_speed(4.0);
        let args = pre
            .build_command(&ramped, Path::new("raw"), Path::new("out.mp4"))
            .build_args();
        let af = args.iter().position(|a| a == "-af").unwrap();
        assert_eq!(args[af + 1], "atempo=2.0000,atempo=2.0000");
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "setpts=0.2500*PTS");
    }
}
