//! Encode target handed to the media adapter.

use serde::{Deserialize, Serialize};

use crate::config::{AspectMode, SplicerConfig};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default pixel format
pub const DEFAULT_PIX_FMT: &str = "yuv420p";

/// Mid-gray used for buffer clips and as the neutral luma fallback.
pub const NEUTRAL_GRAY: u8 = 0x80;

/// Everything an encode needs to produce uniform, concat-compatible output.
///
/// Derived from [`SplicerConfig`] once per run; every normalize, extract,
/// buffer and brightness call encodes to this exact target so the final
/// concat can stream-copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pix_fmt: String,
    pub colorspace: String,
    pub color_primaries: String,
    pub color_trc: String,
    pub aspect_mode: AspectMode,
    pub codec: String,
    pub preset: String,
}

impl TargetSpec {
    /// Duration in seconds of `frames` frames at the target rate.
    pub fn frames_to_secs(&self, frames: u32) -> f64 {
        if self.fps == 0 {
            return 0.0;
        }
        frames as f64 / self.fps as f64
    }
}

impl From<&SplicerConfig> for TargetSpec {
    fn from(config: &SplicerConfig) -> Self {
        Self {
            width: config.target_width,
            height: config.target_height,
            fps: config.target_fps,
            pix_fmt: config.target_pix_fmt.clone(),
            colorspace: config.target_colorspace.clone(),
            color_primaries: config.color_primaries().to_string(),
            color_trc: config.color_trc().to_string(),
            aspect_mode: config.aspect_mode,
            codec: config.codec.clone(),
            preset: config.preset.clone(),
        }
    }
}
