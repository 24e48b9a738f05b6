//! Synchronous local rendering of an edit plan.
//!
//! Every planned clip becomes its own input (seeked and trimmed), is
//! scaled and padded to the platform frame, then all of them are joined
//! with the `concat` filter.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use reel_models::{EditPlan, EncodingConfig, Platform, PlannedClip, PlatformSpec};

use crate::cancel::CancelSignal;
use crate::command::{FfmpegCommand, Transcoder};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{file_size, move_file, remove_file_if_exists};

/// Default timeout for one local render.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(1800);

/// Clips shorter than this are dropped when trimming to the platform limit.
const MIN_SEGMENT_SECS: f64 = 0.05;

/// Local render backend built on a [`Transcoder`].
#[derive(Clone)]
pub struct LocalRenderer {
    transcoder: Arc<dyn Transcoder>,
    output_dir: PathBuf,
    encoding: EncodingConfig,
    timeout: Duration,
}

impl LocalRenderer {
    pub fn new(transcoder: Arc<dyn Transcoder>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            transcoder,
            output_dir: output_dir.into(),
            encoding: EncodingConfig::for_render(),
            timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Build the concat command for `plan`, trimmed to the platform limit.
    pub fn build_command(
        &self,
        plan: &EditPlan,
        spec: &PlatformSpec,
        output: &Path,
    ) -> MediaResult<FfmpegCommand> {
        let segments = fit_to_duration(&plan.clips, spec.max_duration_secs);
        let (first, rest) = segments
            .split_first()
            .ok_or_else(|| MediaError::InvalidPlan(format!("plan {} has no usable clips", plan.id)))?;

        let mut cmd = FfmpegCommand::new(&first.source, output)
            .seek(first.in_point)
            .duration(first.duration);
        for segment in rest {
            cmd = cmd
                .add_input(&segment.source)
                .seek(segment.in_point)
                .duration(segment.duration);
        }

        Ok(cmd
            .filter_complex(concat_filter(segments.len(), spec))
            .map("[outv]")
            .map("[outa]")
            .encoding(&self.encoding))
    }

    /// Render `plan` for `platform` and return the final output path.
    pub async fn render(
        &self,
        plan: &EditPlan,
        platform: Platform,
        cancel: &CancelSignal,
    ) -> MediaResult<PathBuf> {
        let spec = platform.spec();
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let stem = format!("{}-{}", platform.as_str(), plan.id);
        let output = self.output_dir.join(format!("{stem}.mp4"));
        let staging = self.output_dir.join(format!("{stem}.part.mp4"));

        let cmd = self.build_command(plan, &spec, &staging)?;
        let started = Instant::now();

        let result = self.finish(&cmd, &staging, &output, cancel).await;
        if result.is_err() {
            if let Err(e) = remove_file_if_exists(&staging).await {
                warn!(platform = %platform, "Failed to remove staging file {}: {}", staging.display(), e);
            }
        }
        result?;

        info!(
            platform = %platform,
            plan_id = %plan.id,
            clips = plan.clip_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Local render complete: {}",
            output.display()
        );
        Ok(output)
    }

    async fn finish(
        &self,
        cmd: &FfmpegCommand,
        staging: &Path,
        output: &Path,
        cancel: &CancelSignal,
    ) -> MediaResult<()> {
        self.transcoder.transcode(cmd, self.timeout, cancel).await?;

        match file_size(staging).await? {
            Some(size) if size > 0 => move_file(staging, output).await,
            _ => Err(MediaError::MissingOutput(staging.to_path_buf())),
        }
    }
}

/// Keep clips in order until `max_secs` is used up; the last kept clip is
/// shortened to fit.
fn fit_to_duration(clips: &[PlannedClip], max_secs: f64) -> Vec<PlannedClip> {
    let mut remaining = max_secs;
    let mut kept = Vec::with_capacity(clips.len());

    for clip in clips {
        if remaining < MIN_SEGMENT_SECS {
            break;
        }
        if clip.duration <= 0.0 {
            continue;
        }
        let mut segment = clip.clone();
        segment.duration = segment.duration.min(remaining);
        remaining -= segment.duration;
        kept.push(segment);
    }

    kept
}

fn concat_filter(inputs: usize, spec: &PlatformSpec) -> String {
    let (w, h, fps) = (spec.width, spec.height, spec.fps);
    let mut graph = String::new();

    for i in 0..inputs {
        let _ = write!(
            graph,
            "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps}[v{i}];\
             [{i}:a]aresample=48000[a{i}];"
        );
    }
    for i in 0..inputs {
        let _ = write!(graph, "[v{i}][a{i}]");
    }
    let _ = write!(graph, "concat=n={inputs}:v=1:a=1[outv][outa]");

    graph
}
