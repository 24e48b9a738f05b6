//! Target platforms and their output specifications.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Aspect ratio as width:height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Portrait (9:16) for TikTok/Reels/Shorts
    pub const PORTRAIT: AspectRatio = AspectRatio::new(9, 16);

    /// Landscape (16:9)
    pub const LANDSCAPE: AspectRatio = AspectRatio::new(16, 9);

    /// Square (1:1)
    pub const SQUARE: AspectRatio = AspectRatio::new(1, 1);

    /// Create a new aspect ratio.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the aspect ratio as a decimal.
    pub fn as_f64(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Output specification for one platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlatformSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Longest video the platform accepts (seconds)
    pub max_duration_secs: f64,
    pub aspect: AspectRatio,
}

/// Render target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[serde(rename = "tiktok")]
    TikTok,
    InstagramReels,
    #[serde(rename = "youtube_shorts")]
    YouTubeShorts,
    #[serde(rename = "youtube")]
    YouTube,
    #[serde(rename = "linkedin")]
    LinkedIn,
    Twitter,
}

impl Platform {
    pub const ALL: &'static [Platform] = &[
        Platform::TikTok,
        Platform::InstagramReels,
        Platform::YouTubeShorts,
        Platform::YouTube,
        Platform::LinkedIn,
        Platform::Twitter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::TikTok => "tiktok",
            Platform::InstagramReels => "instagram_reels",
            Platform::YouTubeShorts => "youtube_shorts",
            Platform::YouTube => "youtube",
            Platform::LinkedIn => "linkedin",
            Platform::Twitter => "twitter",
        }
    }

    /// Output spec the renderers target for this platform.
    pub fn spec(&self) -> PlatformSpec {
        match self {
            Platform::TikTok => PlatformSpec {
                width: 1080,
                height: 1920,
                fps: 30,
                max_duration_secs: 600.0,
                aspect: AspectRatio::PORTRAIT,
            },
            Platform::InstagramReels => PlatformSpec {
                width: 1080,
                height: 1920,
                fps: 30,
                max_duration_secs: 90.0,
                aspect: AspectRatio::PORTRAIT,
            },
            Platform::YouTubeShorts => PlatformSpec {
                width: 1080,
                height: 1920,
                fps: 30,
                max_duration_secs: 60.0,
                aspect: AspectRatio::PORTRAIT,
            },
            Platform::YouTube => PlatformSpec {
                width: 1920,
                height: 1080,
                fps: 30,
                max_duration_secs: 43_200.0,
                aspect: AspectRatio::LANDSCAPE,
            },
            Platform::LinkedIn => PlatformSpec {
                width: 1080,
                height: 1080,
                fps: 30,
                max_duration_secs: 600.0,
                aspect: AspectRatio::SQUARE,
            },
            Platform::Twitter => PlatformSpec {
                width: 1280,
                height: 720,
                fps: 30,
                max_duration_secs: 140.0,
                aspect: AspectRatio::LANDSCAPE,
            },
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Unknown platform: {0}")]
pub struct PlatformParseError(pub String);

impl FromStr for Platform {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "tiktok" => Ok(Platform::TikTok),
            "instagram_reels" | "instagram" | "reels" => Ok(Platform::InstagramReels),
            "youtube_shorts" | "shorts" => Ok(Platform::YouTubeShorts),
            "youtube" => Ok(Platform::YouTube),
            "linkedin" => Ok(Platform::LinkedIn),
            "twitter" | "x" => Ok(Platform::Twitter),
            _ => Err(PlatformParseError(s.to_string())),
        }
    }
}
