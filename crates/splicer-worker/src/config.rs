//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;

use splicer_media::ToolTimeouts;
use splicer_models::SplicerConfig;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Run configuration captured into the manifest
    pub splicer: SplicerConfig,
    /// Scratch directory; a fresh temp dir when unset
    pub work_dir: Option<PathBuf>,
    /// Where the output and manifest land
    pub output_dir: PathBuf,
    pub timeouts: ToolTimeouts,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let splicer = SplicerConfig::default();
        let output_dir = PathBuf::from(&splicer.output_dir);
        Self {
            splicer,
            work_dir: None,
            output_dir,
            timeouts: ToolTimeouts::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Parse a `WIDTHxHEIGHT` resolution.
pub fn parse_resolution(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.trim().split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// `SPLICER_PROFILE` (`ntsc` or `pal`) picks the base preset; every other
    /// `SPLICER_*` variable overrides one field of it.
    pub fn from_env() -> WorkerResult<Self> {
        let mut splicer = match std::env::var("SPLICER_PROFILE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "" | "default" => SplicerConfig::default(),
            "ntsc" => SplicerConfig::ntsc_crt(),
            "pal" => SplicerConfig::pal_crt(),
            other => {
                return Err(WorkerError::config_error(format!(
                    "unknown SPLICER_PROFILE '{}'",
                    other
                )))
            }
        };

        if let Ok(value) = std::env::var("SPLICER_RESOLUTION") {
            let (w, h) = parse_resolution(&value).ok_or_else(|| {
                WorkerError::config_error(format!("invalid SPLICER_RESOLUTION '{}'", value))
            })?;
            splicer.target_width = w;
            splicer.target_height = h;
        }
        if let Ok(value) = std::env::var("SPLICER_ASPECT_MODE") {
            splicer.aspect_mode = value
                .parse()
                .map_err(|e| WorkerError::config_error(format!("{}", e)))?;
        }

        splicer.target_fps = env_or("SPLICER_FPS", splicer.target_fps);
        splicer.target_pix_fmt = env_or("SPLICER_PIX_FMT", splicer.target_pix_fmt);
        splicer.target_colorspace = env_or("SPLICER_COLORSPACE", splicer.target_colorspace);
        splicer.codec = env_or("SPLICER_CODEC", splicer.codec);
        splicer.preset = env_or("SPLICER_PRESET", splicer.preset);
        splicer.chunk_frames_min = env_or("SPLICER_CHUNK_FRAMES_MIN", splicer.chunk_frames_min);
        splicer.chunk_frames_max = env_or("SPLICER_CHUNK_FRAMES_MAX", splicer.chunk_frames_max);
        splicer.image_frames_min = env_or("SPLICER_IMAGE_FRAMES_MIN", splicer.image_frames_min);
        splicer.image_frames_max = env_or("SPLICER_IMAGE_FRAMES_MAX", splicer.image_frames_max);
        splicer.antistrobe_enabled = env_or("SPLICER_ANTISTROBE", splicer.antistrobe_enabled);
        splicer.antistrobe_buffer_frames =
            env_or("SPLICER_BUFFER_FRAMES", splicer.antistrobe_buffer_frames);
        splicer.antistrobe_luma_strength =
            env_or("SPLICER_LUMA_STRENGTH", splicer.antistrobe_luma_strength);
        splicer.antistrobe_delta_threshold =
            env_or("SPLICER_DELTA_THRESHOLD", splicer.antistrobe_delta_threshold);
        splicer.luma_negligible_delta =
            env_or("SPLICER_LUMA_NEGLIGIBLE_DELTA", splicer.luma_negligible_delta);
        splicer.max_workers = env_or("SPLICER_MAX_WORKERS", splicer.max_workers);
        splicer.grain_duration = env_or("SPLICER_GRAIN_DURATION", splicer.grain_duration);
        splicer.rng_seed = env_opt("SPLICER_SEED").or(splicer.rng_seed);
        splicer.output_dir = env_or("SPLICER_OUTPUT_DIR", splicer.output_dir);
        splicer.temp_dir = env_or("SPLICER_WORK_DIR", splicer.temp_dir);

        let defaults = ToolTimeouts::default();
        let timeouts = ToolTimeouts {
            probe: env_or("SPLICER_PROBE_TIMEOUT_SECS", defaults.probe),
            luma: env_or("SPLICER_LUMA_TIMEOUT_SECS", defaults.luma),
            normalize: env_or("SPLICER_NORMALIZE_TIMEOUT_SECS", defaults.normalize),
            extract: env_or("SPLICER_EXTRACT_TIMEOUT_SECS", defaults.extract),
            buffer: env_or("SPLICER_BUFFER_TIMEOUT_SECS", defaults.buffer),
            brightness: env_or("SPLICER_BRIGHTNESS_TIMEOUT_SECS", defaults.brightness),
            segment: env_or("SPLICER_SEGMENT_TIMEOUT_SECS", defaults.segment),
            greyscale: env_or("SPLICER_GREYSCALE_TIMEOUT_SECS", defaults.greyscale),
        };

        splicer.validate()?;

        let work_dir = (!splicer.temp_dir.is_empty()).then(|| PathBuf::from(&splicer.temp_dir));
        let output_dir = PathBuf::from(&splicer.output_dir);

        Ok(Self {
            splicer,
            work_dir,
            output_dir,
            timeouts,
        })
    }
}
