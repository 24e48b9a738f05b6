//! FFmpeg filter chains for per-clip preprocessing.
//!
//! A speed ramp needs two coordinated filters: `setpts` rescales video
//! timestamps and `atempo` time-stretches audio without changing pitch.
//! `atempo` only accepts factors in [0.5, 2.0] per instance, so arbitrary
//! speeds are decomposed into a chain of stages.

use reel_models::ClipConfig;

/// Fixed-parameter luma sharpening.
pub const SHARPEN_FILTER: &str = "unsharp=5:5:1.0:5:5:0.0";

/// Lowest factor a single `atempo` instance accepts.
pub const ATEMPO_MIN: f64 = 0.5;
/// Highest factor a single `atempo` instance accepts.
pub const ATEMPO_MAX: f64 = 2.0;

const UNIT_SPEED_EPSILON: f64 = 1e-9;

fn is_unit_speed(speed: f64) -> bool {
    (speed - 1.0).abs() < UNIT_SPEED_EPSILON
}

fn is_usable_speed(speed: f64) -> bool {
    speed.is_finite() && speed > 0.0
}

/// Build the `-vf` chain for a clip: sharpen first, then the timestamp
/// rescale. Empty when neither applies.
pub fn build_video_filter(config: &ClipConfig) -> String {
    let mut stages = Vec::with_capacity(2);

    if config.sharpen {
        stages.push(SHARPEN_FILTER.to_string());
    }

    if is_usable_speed(config.speed) && !is_unit_speed(config.speed) {
        stages.push(format!("setpts={:.4}*PTS", 1.0 / config.speed));
    }

    stages.join(",")
}

/// Decompose `speed` into `atempo` factors that each lie in [0.5, 2.0].
///
/// High speeds are halved first, low speeds doubled next, and the
/// remainder is emitted last. Returns an empty list for a non-positive or
/// non-finite speed.
pub fn atempo_stages(speed: f64) -> Vec<f64> {
    if !is_usable_speed(speed) {
        return Vec::new();
    }

    let mut stages = Vec::new();
    let mut remaining = speed;

    while remaining > ATEMPO_MAX {
        stages.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }

    while remaining < ATEMPO_MIN {
        stages.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }

    stages.push(remaining);
    stages
}

/// Build the `-af` chain for a speed. Empty at 1.0.
pub fn build_audio_filter(speed: f64) -> String {
    if is_unit_speed(speed) {
        return String::new();
    }

    atempo_stages(speed)
        .iter()
        .map(|factor| format!("atempo={:.4}", factor))
        .collect::<Vec<_>>()
        .join(",")
}
