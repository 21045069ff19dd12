//! Run configuration.
//!
//! A [`SplicerConfig`] is immutable for the duration of one run and is
//! captured verbatim into the manifest, so every field here must serialize.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::encoding::{DEFAULT_PIX_FMT, DEFAULT_PRESET, DEFAULT_VIDEO_CODEC};

/// Default output width.
pub const DEFAULT_WIDTH: u32 = 1920;
/// Default output height.
pub const DEFAULT_HEIGHT: u32 = 1080;
/// Default output frame rate.
pub const DEFAULT_FPS: u32 = 24;
/// Default output colorspace.
pub const DEFAULT_COLORSPACE: &str = "bt709";

/// Luma deltas (0-255 scale) below this are not worth a re-encode.
///
/// A policy choice, not a perceptual constant.
pub const DEFAULT_LUMA_NEGLIGIBLE_DELTA: f64 = 2.0;

/// Default grain length for prep mode, in seconds.
pub const DEFAULT_GRAIN_DURATION: u32 = 60;

/// How sources with a different aspect ratio are fitted to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectMode {
    /// Scale down to fit, pad the rest
    #[default]
    Letterbox,
    /// Scale up to cover, crop the overflow
    Crop,
    /// Scale to the exact target, ignoring aspect
    Stretch,
}

impl AspectMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectMode::Letterbox => "letterbox",
            AspectMode::Crop => "crop",
            AspectMode::Stretch => "stretch",
        }
    }
}

impl fmt::Display for AspectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AspectMode {
    type Err = AspectModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "letterbox" => Ok(AspectMode::Letterbox),
            "crop" => Ok(AspectMode::Crop),
            "stretch" => Ok(AspectMode::Stretch),
            _ => Err(AspectModeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown aspect mode: {0}")]
pub struct AspectModeParseError(String);

/// Configuration validation failure.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{min_field} ({min}) exceeds {max_field} ({max})")]
    InvertedRange {
        min_field: &'static str,
        max_field: &'static str,
        min: u32,
        max: u32,
    },

    #[error("{field} must be within [{lo}, {hi}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        lo: f64,
        hi: f64,
    },
}

/// All pipeline parameters for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplicerConfig {
    // Resolution / format
    pub target_width: u32,
    pub target_height: u32,
    pub target_fps: u32,
    pub target_pix_fmt: String,
    /// "bt709" or "smpte170m"
    pub target_colorspace: String,
    pub aspect_mode: AspectMode,

    // Codec
    pub codec: String,
    pub preset: String,

    // Chunk timing (frames, inclusive range)
    pub chunk_frames_min: u32,
    pub chunk_frames_max: u32,

    // Image timing (frames, inclusive range)
    pub image_frames_min: u32,
    pub image_frames_max: u32,

    // Anti-strobe
    pub antistrobe_enabled: bool,
    /// Gray frames between cuts; 0 disables buffering
    pub antistrobe_buffer_frames: u32,
    /// 0.0 disables normalization, 1.0 pulls fully toward the global mean
    pub antistrobe_luma_strength: f64,
    /// Adjacent luma delta that raises a flag; 0 disables the scan
    pub antistrobe_delta_threshold: f64,
    /// Deltas from the global mean below this are left unencoded
    pub luma_negligible_delta: f64,

    /// Bounded worker pool size for every parallel stage
    pub max_workers: usize,

    /// None = draw a random seed at run start
    pub rng_seed: Option<u64>,

    /// Prep mode: length of each stream-copied grain, in seconds
    pub grain_duration: u32,

    // Paths
    pub output_dir: String,
    /// Empty = a fresh temporary directory per run
    pub temp_dir: String,
}

impl Default for SplicerConfig {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_WIDTH,
            target_height: DEFAULT_HEIGHT,
            target_fps: DEFAULT_FPS,
            target_pix_fmt: DEFAULT_PIX_FMT.to_string(),
            target_colorspace: DEFAULT_COLORSPACE.to_string(),
            aspect_mode: AspectMode::default(),
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            chunk_frames_min: 3,
            chunk_frames_max: 5,
            image_frames_min: 3,
            image_frames_max: 8,
            antistrobe_enabled: true,
            antistrobe_buffer_frames: 1,
            antistrobe_luma_strength: 0.5,
            antistrobe_delta_threshold: 80.0,
            luma_negligible_delta: DEFAULT_LUMA_NEGLIGIBLE_DELTA,
            max_workers: 4,
            rng_seed: None,
            grain_duration: DEFAULT_GRAIN_DURATION,
            output_dir: "output".to_string(),
            temp_dir: String::new(),
        }
    }
}

impl SplicerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for NTSC CRT output.
    pub fn ntsc_crt() -> Self {
        Self {
            target_width: 720,
            target_height: 480,
            target_colorspace: "smpte170m".to_string(),
            ..Default::default()
        }
    }

    /// Preset for PAL CRT output.
    pub fn pal_crt() -> Self {
        Self {
            target_width: 720,
            target_height: 576,
            target_colorspace: "smpte170m".to_string(),
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_chunk_frames(mut self, min: u32, max: u32) -> Self {
        self.chunk_frames_min = min;
        self.chunk_frames_max = max;
        self
    }

    /// Turn off buffering, normalization and the luma scan in one go.
    pub fn without_antistrobe(mut self) -> Self {
        self.antistrobe_enabled = false;
        self
    }

    pub fn color_primaries(&self) -> &'static str {
        if self.target_colorspace == "smpte170m" {
            "smpte170m"
        } else {
            "bt709"
        }
    }

    pub fn color_trc(&self) -> &'static str {
        self.color_primaries()
    }

    /// Whether buffer clips are inserted between cuts.
    pub fn buffers_enabled(&self) -> bool {
        self.antistrobe_enabled && self.antistrobe_buffer_frames > 0
    }

    /// Whether the probe-then-encode luma normalization runs.
    pub fn luma_normalization_enabled(&self) -> bool {
        self.antistrobe_enabled && self.antistrobe_luma_strength > 0.0
    }

    /// Whether the post-assembly luma delta scan runs.
    pub fn luma_scan_enabled(&self) -> bool {
        self.antistrobe_enabled && self.antistrobe_delta_threshold > 0.0
    }

    /// Check internal consistency before a run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("target_width", self.target_width),
            ("target_height", self.target_height),
            ("target_fps", self.target_fps),
            ("chunk_frames_min", self.chunk_frames_min),
            ("image_frames_min", self.image_frames_min),
            ("grain_duration", self.grain_duration),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Zero {
                field: "max_workers",
            });
        }

        if self.chunk_frames_min > self.chunk_frames_max {
            return Err(ConfigError::InvertedRange {
                min_field: "chunk_frames_min",
                max_field: "chunk_frames_max",
                min: self.chunk_frames_min,
                max: self.chunk_frames_max,
            });
        }
        if self.image_frames_min > self.image_frames_max {
            return Err(ConfigError::InvertedRange {
                min_field: "image_frames_min",
                max_field: "image_frames_max",
                min: self.image_frames_min,
                max: self.image_frames_max,
            });
        }

        check_range("antistrobe_luma_strength", self.antistrobe_luma_strength, 0.0, 1.0)?;
        check_range("antistrobe_delta_threshold", self.antistrobe_delta_threshold, 0.0, 255.0)?;
        check_range("luma_negligible_delta", self.luma_negligible_delta, 0.0, 255.0)?;

        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, lo: f64, hi: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value < lo || value > hi {
        return Err(ConfigError::OutOfRange { field, value, lo, hi });
    }
    Ok(())
}
