//! Probe metadata.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Immutable snapshot of one file at probe time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub path: PathBuf,
    pub codec: String,
    /// Width in pixels, already swapped for 90/270 rotation
    pub width: u32,
    /// Height in pixels, already swapped for 90/270 rotation
    pub height: u32,
    pub pix_fmt: String,
    pub fps: f64,
    /// Duration in seconds
    pub duration: f64,
    /// Exact when the container reports it, else estimated
    pub frame_count: u64,
    pub colorspace: String,
    pub color_primaries: String,
    pub color_trc: String,
    pub is_image: bool,
    /// Variable frame rate detected
    pub is_vfr: bool,
    /// Rotation in degrees
    pub rotation: u32,
    pub format_name: String,
}

impl MediaMetadata {
    /// Minimal metadata for a constant-rate video.
    pub fn video(path: impl Into<PathBuf>, frame_count: u64, fps: f64) -> Self {
        Self {
            path: path.into(),
            codec: "h264".to_string(),
            width: 0,
            height: 0,
            pix_fmt: "yuv420p".to_string(),
            fps,
            duration: if fps > 0.0 {
                frame_count as f64 / fps
            } else {
                0.0
            },
            frame_count,
            colorspace: "unknown".to_string(),
            color_primaries: "unknown".to_string(),
            color_trc: "unknown".to_string(),
            is_image: false,
            is_vfr: false,
            rotation: 0,
            format_name: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }
}

/// Frame count estimate when the container does not report one.
///
/// `round(duration * fps)`, never below 1 for a positive duration.
pub fn estimate_frame_count(duration: f64, fps: f64) -> u64 {
    if duration > 0.0 && fps > 0.0 {
        ((duration * fps).round() as u64).max(1)
    } else {
        0
    }
}
