//! In-memory media service for engine tests.
//!
//! Frame counts and luma values propagate from inputs to every derived file,
//! so a chunk of a 100-frame source with luma 40 probes as its slice length
//! and measures 40. Only `concatenate`, `segment_copy` and `greyscale`
//! touch the disk.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use splicer_media::{grain_prefix, MediaError, MediaResult, MediaService};
use splicer_models::{MediaMetadata, TargetSpec};

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Probe(PathBuf),
    MeanLuma(PathBuf),
    NormalizeVideo(PathBuf),
    NormalizeImage(PathBuf, u32),
    Extract(PathBuf, u64, u64),
    Buffer(u32),
    AdjustBrightness(PathBuf, f64),
    Concatenate(Vec<PathBuf>),
    SegmentCopy(PathBuf, u32),
    Greyscale(PathBuf),
}

#[derive(Default)]
struct State {
    frames: HashMap<PathBuf, u64>,
    lumas: HashMap<PathBuf, f64>,
    images: HashSet<PathBuf>,
    delays: HashMap<PathBuf, u64>,
    fail_probe: HashSet<PathBuf>,
    fail_normalize: HashSet<PathBuf>,
    fail_luma: HashSet<PathBuf>,
    fail_adjust: HashSet<PathBuf>,
    fail_image: HashSet<PathBuf>,
    fail_greyscale: HashSet<PathBuf>,
    fail_buffer: bool,
    fail_concat: bool,
    output_frame_offset: i64,
    calls: Vec<Call>,
}

#[derive(Clone, Default)]
pub struct FakeMediaService {
    state: Arc<Mutex<State>>,
}

impl FakeMediaService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(&self) -> Arc<dyn MediaService> {
        Arc::new(self.clone())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Register a source video.
    pub fn add_video(&self, path: impl Into<PathBuf>, frames: u64, luma: f64) -> &Self {
        let path = path.into();
        self.with_state(|s| {
            s.frames.insert(path.clone(), frames);
            s.lumas.insert(path, luma);
        });
        self
    }

    /// Register a source image.
    pub fn add_image(&self, path: impl Into<PathBuf>, luma: f64) -> &Self {
        let path = path.into();
        self.with_state(|s| {
            s.frames.insert(path.clone(), 1);
            s.lumas.insert(path.clone(), luma);
            s.images.insert(path);
        });
        self
    }

    pub fn set_luma(&self, path: impl Into<PathBuf>, luma: f64) -> &Self {
        let path = path.into();
        self.with_state(|s| {
            s.lumas.insert(path, luma);
        });
        self
    }

    /// Delay every call taking `path` as input.
    pub fn delay(&self, path: impl Into<PathBuf>, millis: u64) -> &Self {
        let path = path.into();
        self.with_state(|s| {
            s.delays.insert(path, millis);
        });
        self
    }

    pub fn fail_probe(&self, path: impl Into<PathBuf>) -> &Self {
        let path = path.into();
        self.with_state(|s| {
            s.fail_probe.insert(path);
        });
        self
    }

    pub fn fail_normalize(&self, path: impl Into<PathBuf>) -> &Self {
        let path = path.into();
        self.with_state(|s| {
            s.fail_normalize.insert(path);
        });
        self
    }

    pub fn fail_luma(&self, path: impl Into<PathBuf>) -> &Self {
        let path = path.into();
        self.with_state(|s| {
            s.fail_luma.insert(path);
        });
        self
    }

    pub fn fail_adjust(&self, path: impl Into<PathBuf>) -> &Self {
        let path = path.into();
        self.with_state(|s| {
            s.fail_adjust.insert(path);
        });
        self
    }

    pub fn fail_image(&self, path: impl Into<PathBuf>) -> &Self {
        let path = path.into();
        self.with_state(|s| {
            s.fail_image.insert(path);
        });
        self
    }

    pub fn fail_greyscale(&self, path: impl Into<PathBuf>) -> &Self {
        let path = path.into();
        self.with_state(|s| {
            s.fail_greyscale.insert(path);
        });
        self
    }

    pub fn fail_buffer(&self) -> &Self {
        self.with_state(|s| s.fail_buffer = true);
        self
    }

    pub fn fail_concat(&self) -> &Self {
        self.with_state(|s| s.fail_concat = true);
        self
    }

    /// Make the concatenated output probe `offset` frames off the true sum.
    pub fn output_frame_offset(&self, offset: i64) -> &Self {
        self.with_state(|s| s.output_frame_offset = offset);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with_state(|s| s.calls.clone())
    }

    /// Inputs passed to `adjust_brightness`, in call order.
    pub fn adjusted_inputs(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::AdjustBrightness(path, _) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn brightness_for(&self, input: &Path) -> Option<f64> {
        self.calls().into_iter().find_map(|c| match c {
            Call::AdjustBrightness(path, b) if path == input => Some(b),
            _ => None,
        })
    }

    pub fn concatenated(&self) -> Option<Vec<PathBuf>> {
        self.calls().into_iter().rev().find_map(|c| match c {
            Call::Concatenate(paths) => Some(paths),
            _ => None,
        })
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: Call) {
        self.with_state(|s| s.calls.push(call));
    }

    async fn pause(&self, input: &Path) {
        let delay = self.with_state(|s| s.delays.get(input).copied());
        if let Some(millis) = delay {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    /// Register `output` as derived from `input`, keeping luma.
    fn derive(&self, input: &Path, output: &Path, frames: u64) {
        self.with_state(|s| {
            let luma = s.lumas.get(input).copied();
            s.frames.insert(output.to_path_buf(), frames);
            if let Some(luma) = luma {
                s.lumas.insert(output.to_path_buf(), luma);
            }
        });
    }

    fn frames_of(&self, path: &Path) -> Option<u64> {
        self.with_state(|s| s.frames.get(path).copied())
    }
}

fn tool_failure(what: &str, path: &Path) -> MediaError {
    MediaError::ffmpeg_failed(
        format!("{} failed for {}", what, path.display()),
        Some("simulated failure".to_string()),
        Some(1),
    )
}

#[async_trait]
impl MediaService for FakeMediaService {
    async fn probe(&self, path: &Path) -> MediaResult<MediaMetadata> {
        self.record(Call::Probe(path.to_path_buf()));
        self.pause(path).await;

        let (failing, frames, is_image) = self.with_state(|s| {
            (
                s.fail_probe.contains(path),
                s.frames.get(path).copied(),
                s.images.contains(path),
            )
        });
        if failing {
            return Err(MediaError::NoVideoStream(path.to_path_buf()));
        }
        let frames = frames.ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))?;

        let mut metadata = MediaMetadata::video(path, frames, 24.0);
        metadata.is_image = is_image;
        Ok(metadata)
    }

    async fn mean_luma(&self, path: &Path) -> MediaResult<f64> {
        self.record(Call::MeanLuma(path.to_path_buf()));
        self.pause(path).await;

        let (failing, luma) =
            self.with_state(|s| (s.fail_luma.contains(path), s.lumas.get(path).copied()));
        if failing {
            return Err(MediaError::LumaUnavailable(path.to_path_buf()));
        }
        luma.ok_or_else(|| MediaError::LumaUnavailable(path.to_path_buf()))
    }

    async fn normalize_video(
        &self,
        input: &Path,
        output: &Path,
        _spec: &TargetSpec,
    ) -> MediaResult<PathBuf> {
        self.record(Call::NormalizeVideo(input.to_path_buf()));
        self.pause(input).await;

        if self.with_state(|s| s.fail_normalize.contains(input)) {
            return Err(tool_failure("normalize", input));
        }
        let frames = self
            .frames_of(input)
            .ok_or_else(|| MediaError::FileNotFound(input.to_path_buf()))?;
        self.derive(input, output, frames);
        Ok(output.to_path_buf())
    }

    async fn normalize_image(
        &self,
        input: &Path,
        output: &Path,
        _spec: &TargetSpec,
        duration_frames: u32,
    ) -> MediaResult<PathBuf> {
        self.record(Call::NormalizeImage(input.to_path_buf(), duration_frames));
        self.pause(input).await;

        if self.with_state(|s| s.fail_image.contains(input)) {
            return Err(tool_failure("image render", input));
        }
        self.derive(input, output, u64::from(duration_frames));
        Ok(output.to_path_buf())
    }

    async fn extract_segment(
        &self,
        input: &Path,
        output: &Path,
        start_frame: u64,
        end_frame: u64,
        _spec: &TargetSpec,
    ) -> MediaResult<PathBuf> {
        self.record(Call::Extract(input.to_path_buf(), start_frame, end_frame));
        self.pause(input).await;

        self.derive(input, output, end_frame - start_frame);
        Ok(output.to_path_buf())
    }

    async fn render_buffer_clip(
        &self,
        output: &Path,
        _spec: &TargetSpec,
        frame_count: u32,
    ) -> MediaResult<PathBuf> {
        self.record(Call::Buffer(frame_count));

        if self.with_state(|s| s.fail_buffer) {
            return Err(tool_failure("buffer", output));
        }
        self.with_state(|s| {
            s.frames.insert(output.to_path_buf(), u64::from(frame_count));
            s.lumas.insert(output.to_path_buf(), 128.0);
        });
        Ok(output.to_path_buf())
    }

    async fn adjust_brightness(
        &self,
        input: &Path,
        output: &Path,
        brightness: f64,
        _spec: &TargetSpec,
    ) -> MediaResult<PathBuf> {
        self.record(Call::AdjustBrightness(input.to_path_buf(), brightness));
        self.pause(input).await;

        if self.with_state(|s| s.fail_adjust.contains(input)) {
            return Err(tool_failure("brightness", input));
        }
        let frames = self.frames_of(input).unwrap_or(0);
        self.with_state(|s| {
            let luma = s.lumas.get(input).copied().unwrap_or(128.0) + brightness * 255.0;
            s.frames.insert(output.to_path_buf(), frames);
            s.lumas.insert(output.to_path_buf(), luma);
        });
        Ok(output.to_path_buf())
    }

    async fn concatenate(&self, paths: &[PathBuf], output: &Path) -> MediaResult<PathBuf> {
        self.record(Call::Concatenate(paths.to_vec()));

        if self.with_state(|s| s.fail_concat) {
            return Err(tool_failure("concat", output));
        }

        let (total, offset) = self.with_state(|s| {
            let total: u64 = paths.iter().filter_map(|p| s.frames.get(p)).sum();
            (total, s.output_frame_offset)
        });
        let frames = (total as i64 + offset).max(0) as u64;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        tokio::fs::write(output, body.join("\n")).await?;

        self.with_state(|s| {
            s.frames.insert(output.to_path_buf(), frames);
        });
        Ok(output.to_path_buf())
    }

    /// Frames are assumed to run at 24 fps, matching `probe`.
    async fn segment_copy(
        &self,
        input: &Path,
        out_dir: &Path,
        stem: &str,
        segment_secs: u32,
    ) -> MediaResult<Vec<PathBuf>> {
        self.record(Call::SegmentCopy(input.to_path_buf(), segment_secs));

        let frames = self
            .frames_of(input)
            .ok_or_else(|| MediaError::FileNotFound(input.to_path_buf()))?;
        let per_grain = u64::from(segment_secs) * 24;
        let count = frames.div_ceil(per_grain);

        let mut grains = Vec::new();
        for index in 0..count {
            let grain = out_dir.join(format!("{}{:03}.mp4", grain_prefix(stem), index));
            let length = per_grain.min(frames - index * per_grain);
            self.write_derived(input, &grain, length).await?;
            grains.push(grain);
        }
        Ok(grains)
    }

    async fn greyscale(
        &self,
        input: &Path,
        output: &Path,
        _spec: &TargetSpec,
    ) -> MediaResult<PathBuf> {
        self.record(Call::Greyscale(input.to_path_buf()));

        if self.with_state(|s| s.fail_greyscale.contains(input)) {
            return Err(tool_failure("greyscale", input));
        }
        let frames = self.frames_of(input).unwrap_or(0);
        self.write_derived(input, output, frames).await?;
        Ok(output.to_path_buf())
    }
}

impl FakeMediaService {
    async fn write_derived(&self, input: &Path, output: &Path, frames: u64) -> MediaResult<()> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, input.display().to_string()).await?;
        self.derive(input, output, frames);
        Ok(())
    }
}

/// A chunk already registered with `fake`.
pub fn registered_chunk(
    fake: &FakeMediaService,
    path: impl Into<PathBuf>,
    frames: u64,
    luma: f64,
    index: usize,
) -> splicer_models::ChunkDescriptor {
    let path = path.into();
    fake.add_video(path.clone(), frames, luma);
    splicer_models::ChunkDescriptor {
        source_file: PathBuf::from("norm_0000.mp4"),
        start_frame: 0,
        frame_count: frames,
        chunk_path: path,
        chunk_index: index,
    }
}
