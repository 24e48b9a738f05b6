#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for clip preprocessing and local rendering.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Cancellation and timeout support via tokio
//! - Speed-ramp and sharpen filter composition
//! - Source fetching (HTTP and local)
//! - Per-clip and batch preprocessing with guaranteed cleanup
//! - Synchronous local rendering of edit plans

pub mod batch;
pub mod cancel;
pub mod command;
pub mod download;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod preprocess;
pub mod render;

pub use batch::{cleanup, cleanup_clip, BatchPreprocessor};
pub use cancel::{cancel_after, cancel_pair, CancelHandle, CancelSignal};
pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner, FfmpegTranscoder, Transcoder};
pub use download::{HttpSourceFetcher, LocalSourceFetcher, RoutingSourceFetcher, SourceFetcher};
pub use error::{MediaError, MediaResult};
pub use filters::{atempo_stages, build_audio_filter, build_video_filter};
pub use preprocess::{ClipPreprocessor, PreprocessOptions};
pub use render::LocalRenderer;
