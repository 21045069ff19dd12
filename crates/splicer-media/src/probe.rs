//! FFprobe metadata and mean-luma measurement.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use splicer_models::{estimate_frame_count, MediaMetadata};

use crate::command::{check_ffprobe, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::LUMA_PROBE_FILTER;

/// Metadata key the luma filter prints per frame.
const YAVG_KEY: &str = "lavfi.signalstats.YAVG";

/// Container formats ffprobe reports for still images.
const IMAGE_FORMATS: &[&str] = &[
    "image2",
    "png_pipe",
    "jpeg_pipe",
    "webp_pipe",
    "bmp_pipe",
    "tiff_pipe",
    "svg_pipe",
];

/// Codecs that only ever carry still images.
const IMAGE_CODECS: &[&str] = &["png", "mjpeg", "jpeg2000", "webp", "bmp", "tiff"];

/// Average and nominal rates further apart than this mean variable frame rate.
const VFR_TOLERANCE_FPS: f64 = 0.5;

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    nb_frames: Option<String>,
    color_space: Option<String>,
    color_primaries: Option<String>,
    color_transfer: Option<String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<i64>,
}

/// Probe a media file for metadata.
pub async fn probe_media(path: impl AsRef<Path>, timeout_secs: u64) -> MediaResult<MediaMetadata> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let ffprobe = check_ffprobe()?;

    let child = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), child)
        .await
        .map_err(|_| MediaError::Timeout(timeout_secs))??;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            format!("FFprobe failed on {}", path.display()),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    parse_probe_output(path, &output.stdout)
}

/// Turn ffprobe's JSON into [`MediaMetadata`] for the first video stream.
pub fn parse_probe_output(path: &Path, json: &[u8]) -> MediaResult<MediaMetadata> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::NoVideoStream(path.to_path_buf()))?;

    let format_name = probe.format.format_name.clone().unwrap_or_default();
    let codec = stream
        .codec_name
        .clone()
        .unwrap_or_else(|| "unknown".to_string());

    let is_image = format_name
        .split(',')
        .any(|f| IMAGE_FORMATS.contains(&f))
        || IMAGE_CODECS.contains(&codec.as_str());

    let r_fps = stream.r_frame_rate.as_deref().and_then(parse_frame_rate);
    let avg_fps = stream.avg_frame_rate.as_deref().and_then(parse_frame_rate);
    let fps = r_fps.or(avg_fps).unwrap_or(0.0);
    let is_vfr = match (avg_fps, r_fps) {
        (Some(avg), Some(r)) => (avg - r).abs() > VFR_TOLERANCE_FPS,
        _ => false,
    };

    let duration = stream
        .duration
        .as_deref()
        .or(probe.format.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or_else(|| estimate_frame_count(duration, fps));

    let rotation = rotation_of(stream);
    let (mut width, mut height) = (stream.width.unwrap_or(0), stream.height.unwrap_or(0));
    if rotation == 90 || rotation == 270 {
        std::mem::swap(&mut width, &mut height);
    }

    let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| "unknown".to_string());

    Ok(MediaMetadata {
        path: path.to_path_buf(),
        codec,
        width,
        height,
        pix_fmt: or_unknown(&stream.pix_fmt),
        fps,
        duration,
        frame_count,
        colorspace: or_unknown(&stream.color_space),
        color_primaries: or_unknown(&stream.color_primaries),
        color_trc: or_unknown(&stream.color_transfer),
        is_image,
        is_vfr,
        rotation,
        format_name,
    })
}

/// Rotation in degrees from display-matrix side data, else the legacy tag.
fn rotation_of(stream: &FfprobeStream) -> u32 {
    if let Some(rotation) = stream.side_data_list.iter().find_map(|sd| sd.rotation) {
        return rotation.unsigned_abs() as u32;
    }
    stream
        .tags
        .get("rotate")
        .and_then(|r| r.trim().parse::<i64>().ok())
        .map(|r| r.unsigned_abs() as u32)
        .unwrap_or(0)
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok().filter(|v: &f64| *v > 0.0)
}

/// Mean luma (0-255) across every frame of a file.
pub async fn probe_mean_luma(path: impl AsRef<Path>, timeout_secs: u64) -> MediaResult<f64> {
    let path = path.as_ref();

    let cmd = FfmpegCommand::analyze(path)
        .video_filter(LUMA_PROBE_FILTER)
        .log_level("info");

    let stderr = FfmpegRunner::new()
        .with_timeout(timeout_secs)
        .run_capture_stderr(&cmd, &format!("measuring luma of {}", path.display()))
        .await?;

    parse_mean_luma(&stderr).ok_or_else(|| MediaError::LumaUnavailable(path.to_path_buf()))
}

/// Average the per-frame YAVG values printed by the luma filter.
pub fn parse_mean_luma(stderr: &str) -> Option<f64> {
    let values: Vec<f64> = stderr
        .lines()
        .filter(|line| line.contains(YAVG_KEY))
        .filter_map(|line| line.rsplit('=').next()?.trim().parse::<f64>().ok())
        .collect();

    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
