//! Media service capability boundary.
//!
//! The core engine only ever talks to media through [`MediaService`], so it
//! can be driven by [`FfmpegMediaService`] in production and by an in-memory
//! fake in tests. Every method is a potentially slow, fallible external call.

use async_trait::async_trait;
use metrics::histogram;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use splicer_models::{MediaMetadata, TargetSpec};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::concat::{concat_timeout_secs, write_concat_list};
use crate::error::MediaResult;
use crate::filters::{
    brightness_filter, buffer_source, normalize_filter, segment_args, trim_filter,
    GREYSCALE_FILTER,
};
use crate::probe::{probe_mean_luma, probe_media};

/// Histogram of external tool call durations, labelled by operation.
pub const TOOL_DURATION_SECONDS: &str = "splicer_tool_duration_seconds";

/// Operations the core needs from the external media tool.
#[async_trait]
pub trait MediaService: Send + Sync {
    /// Read metadata of a file.
    async fn probe(&self, path: &Path) -> MediaResult<MediaMetadata>;

    /// Mean luma (0-255) over every frame.
    async fn mean_luma(&self, path: &Path) -> MediaResult<f64>;

    /// Conform a video to the target; returns the written path.
    async fn normalize_video(
        &self,
        input: &Path,
        output: &Path,
        spec: &TargetSpec,
    ) -> MediaResult<PathBuf>;

    /// Render a still image as a clip of `duration_frames` frames.
    async fn normalize_image(
        &self,
        input: &Path,
        output: &Path,
        spec: &TargetSpec,
        duration_frames: u32,
    ) -> MediaResult<PathBuf>;

    /// Extract frames `[start_frame, end_frame)` exactly.
    async fn extract_segment(
        &self,
        input: &Path,
        output: &Path,
        start_frame: u64,
        end_frame: u64,
        spec: &TargetSpec,
    ) -> MediaResult<PathBuf>;

    /// Render a solid mid-gray clip of `frame_count` frames.
    async fn render_buffer_clip(
        &self,
        output: &Path,
        spec: &TargetSpec,
        frame_count: u32,
    ) -> MediaResult<PathBuf>;

    /// Re-encode with a brightness shift in `[-1, 1]`.
    async fn adjust_brightness(
        &self,
        input: &Path,
        output: &Path,
        brightness: f64,
        spec: &TargetSpec,
    ) -> MediaResult<PathBuf>;

    /// Join `paths` in order into `output` without re-encoding.
    async fn concatenate(&self, paths: &[PathBuf], output: &Path) -> MediaResult<PathBuf>;

    /// Stream-copy `input` into `segment_secs`-second pieces named
    /// `{stem}_grain_NNN.mp4` under `out_dir`, audio dropped. Returns the
    /// pieces in order.
    async fn segment_copy(
        &self,
        input: &Path,
        out_dir: &Path,
        stem: &str,
        segment_secs: u32,
    ) -> MediaResult<Vec<PathBuf>>;

    /// Re-encode fully desaturated, audio dropped.
    async fn greyscale(
        &self,
        input: &Path,
        output: &Path,
        spec: &TargetSpec,
    ) -> MediaResult<PathBuf>;
}

/// Name prefix shared by every grain of `stem`.
pub fn grain_prefix(stem: &str) -> String {
    format!("{}_grain_", stem)
}

/// Per-tool timeouts in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolTimeouts {
    pub probe: u64,
    pub luma: u64,
    pub normalize: u64,
    pub extract: u64,
    pub buffer: u64,
    pub brightness: u64,
    pub segment: u64,
    pub greyscale: u64,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            probe: 30,
            luma: 120,
            normalize: 600,
            extract: 120,
            buffer: 30,
            brightness: 60,
            segment: 300,
            greyscale: 1800,
        }
    }
}

/// [`MediaService`] backed by the ffmpeg and ffprobe binaries on `PATH`.
#[derive(Debug, Clone)]
pub struct FfmpegMediaService {
    /// Scratch directory for concat lists
    work_dir: PathBuf,
    timeouts: ToolTimeouts,
}

impl FfmpegMediaService {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeouts: ToolTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: ToolTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn timeouts(&self) -> &ToolTimeouts {
        &self.timeouts
    }

    async fn run(
        &self,
        cmd: FfmpegCommand,
        timeout: u64,
        op: &'static str,
        what: String,
    ) -> MediaResult<PathBuf> {
        let started = Instant::now();
        let result = FfmpegRunner::new().with_timeout(timeout).run(&cmd, &what).await;
        histogram!(TOOL_DURATION_SECONDS, "op" => op).record(started.elapsed().as_secs_f64());
        result?;
        Ok(cmd.output_path().to_path_buf())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Files in `dir` named `{prefix}*.mp4`, sorted.
async fn collect_segments(dir: &Path, prefix: &str) -> MediaResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(prefix) && name.ends_with(".mp4") {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

#[async_trait]
impl MediaService for FfmpegMediaService {
    async fn probe(&self, path: &Path) -> MediaResult<MediaMetadata> {
        let started = Instant::now();
        let result = probe_media(path, self.timeouts.probe).await;
        histogram!(TOOL_DURATION_SECONDS, "op" => "probe").record(started.elapsed().as_secs_f64());
        result
    }

    async fn mean_luma(&self, path: &Path) -> MediaResult<f64> {
        let started = Instant::now();
        let result = probe_mean_luma(path, self.timeouts.luma).await;
        histogram!(TOOL_DURATION_SECONDS, "op" => "luma").record(started.elapsed().as_secs_f64());
        result
    }

    async fn normalize_video(
        &self,
        input: &Path,
        output: &Path,
        spec: &TargetSpec,
    ) -> MediaResult<PathBuf> {
        let cmd = FfmpegCommand::new(input, output)
            .video_filter(normalize_filter(spec))
            .color_tags(spec)
            .encode_for(spec);

        self.run(cmd, self.timeouts.normalize, "normalize", format!("normalizing {}", file_name(input)))
            .await
    }

    async fn normalize_image(
        &self,
        input: &Path,
        output: &Path,
        spec: &TargetSpec,
        duration_frames: u32,
    ) -> MediaResult<PathBuf> {
        let cmd = FfmpegCommand::new(input, output)
            .loop_input()
            .duration(spec.frames_to_secs(duration_frames))
            .video_filter(normalize_filter(spec))
            .color_tags(spec)
            .encode_for(spec);

        self.run(
            cmd,
            self.timeouts.normalize,
            "normalize_image",
            format!("normalizing image {}", file_name(input)),
        )
        .await
    }

    async fn extract_segment(
        &self,
        input: &Path,
        output: &Path,
        start_frame: u64,
        end_frame: u64,
        spec: &TargetSpec,
    ) -> MediaResult<PathBuf> {
        debug!(
            "Extracting frames [{}, {}) of {} -> {}",
            start_frame,
            end_frame,
            input.display(),
            output.display()
        );

        let cmd = FfmpegCommand::new(input, output)
            .video_filter(trim_filter(start_frame, end_frame))
            .encode_for(spec);

        self.run(
            cmd,
            self.timeouts.extract,
            "extract",
            format!("extracting chunk from {}", file_name(input)),
        )
        .await
    }

    async fn render_buffer_clip(
        &self,
        output: &Path,
        spec: &TargetSpec,
        frame_count: u32,
    ) -> MediaResult<PathBuf> {
        let cmd = FfmpegCommand::lavfi(buffer_source(spec, frame_count), output)
            .video_filter(format!("format={}", spec.pix_fmt))
            .color_tags(spec)
            .encode_for(spec);

        self.run(cmd, self.timeouts.buffer, "buffer", "generating buffer clip".to_string())
            .await
    }

    async fn adjust_brightness(
        &self,
        input: &Path,
        output: &Path,
        brightness: f64,
        spec: &TargetSpec,
    ) -> MediaResult<PathBuf> {
        let cmd = FfmpegCommand::new(input, output)
            .video_filter(brightness_filter(brightness))
            .encode_for(spec);

        self.run(
            cmd,
            self.timeouts.brightness,
            "brightness",
            format!("adjusting brightness of {}", file_name(input)),
        )
        .await
    }

    async fn concatenate(&self, paths: &[PathBuf], output: &Path) -> MediaResult<PathBuf> {
        let list_path = self.work_dir.join("concat_list.txt");
        write_concat_list(paths, &list_path).await?;

        info!("Concatenating {} entries -> {}", paths.len(), output.display());

        let cmd = FfmpegCommand::new(&list_path, output)
            .input_args(["-f", "concat", "-safe", "0"])
            .codec_copy();

        self.run(
            cmd,
            concat_timeout_secs(paths.len()),
            "concat",
            format!("concatenating into {}", file_name(output)),
        )
        .await
    }

    async fn segment_copy(
        &self,
        input: &Path,
        out_dir: &Path,
        stem: &str,
        segment_secs: u32,
    ) -> MediaResult<Vec<PathBuf>> {
        let prefix = grain_prefix(stem);
        let pattern = out_dir.join(format!("{}%03d.mp4", prefix));

        let cmd = FfmpegCommand::new(input, &pattern)
            .codec_copy()
            .output_args(segment_args(segment_secs))
            .no_audio();

        self.run(
            cmd,
            self.timeouts.segment,
            "segment",
            format!("segmenting {}", file_name(input)),
        )
        .await?;

        let segments = collect_segments(out_dir, &prefix).await?;
        debug!("{} -> {} grains", input.display(), segments.len());
        Ok(segments)
    }

    async fn greyscale(
        &self,
        input: &Path,
        output: &Path,
        spec: &TargetSpec,
    ) -> MediaResult<PathBuf> {
        let cmd = FfmpegCommand::new(input, output)
            .video_filter(GREYSCALE_FILTER)
            .video_codec(&spec.codec)
            .preset(&spec.preset)
            .output_args(["-pix_fmt", spec.pix_fmt.as_str()])
            .no_audio();

        self.run(
            cmd,
            self.timeouts.greyscale,
            "greyscale",
            format!("desaturating {}", file_name(input)),
        )
        .await
    }
}
