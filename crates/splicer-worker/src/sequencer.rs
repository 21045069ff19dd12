//! Sequence assembly.
//!
//! Stages run strictly in order over one evolving `Vec<PathBuf>`: shuffle,
//! image interleave, buffer insertion, luma normalization, expected frame
//! count, concatenation, then the luma delta pass. Every random draw comes
//! from the run generator in that same order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use splicer_media::MediaService;
use splicer_models::{
    ChunkDescriptor, ImageInsertion, ImageSegment, SkippedInput, SplicerConfig, TargetSpec,
};

use crate::coordinator::run_bounded;
use crate::error::{WorkerError, WorkerResult};
use crate::luma::{LumaCache, LumaEngine};
use crate::manifest::ManifestRecorder;
use crate::metrics::record_source_skipped;
use crate::progress::{Phase, Progress};
use crate::reconcile::{count_expected_frames, FrameLedger};
use crate::rng::SplicerRng;

pub const BUFFER_FILE_NAME: &str = "buffer_gray.mp4";
pub const LUMA_DIR_NAME: &str = "luma_normalized";

/// Chunk paths in one uniform permutation.
pub fn shuffle_chunks(chunks: &[ChunkDescriptor], rng: &mut SplicerRng) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = chunks.iter().map(|c| c.chunk_path.clone()).collect();
    rng.shuffle(&mut paths);
    paths
}

/// One duration per image, drawn in input order.
pub fn draw_image_durations(count: usize, min: u32, max: u32, rng: &mut SplicerRng) -> Vec<u32> {
    (0..count).map(|_| rng.draw_frames(min, max)).collect()
}

/// Insert each segment at a position drawn over the sequence as it stands.
///
/// Positions range over `[0, len]` inclusive, so either end is possible, and
/// each draw sees the sequence grown by the previous insertions.
pub fn interleave_images(
    sequence: &mut Vec<PathBuf>,
    segments: &[ImageSegment],
    rng: &mut SplicerRng,
) -> Vec<ImageInsertion> {
    segments
        .iter()
        .map(|segment| {
            let position = rng.insertion_position(sequence.len());
            sequence.insert(position, segment.clip_path.clone());
            ImageInsertion::new(segment, position)
        })
        .collect()
}

/// Put `buffer` between every adjacent pair: N entries become `2N - 1`.
pub fn insert_buffers(sequence: &[PathBuf], buffer: &Path) -> Vec<PathBuf> {
    let mut buffered = Vec::with_capacity(sequence.len() * 2);
    for (i, path) in sequence.iter().enumerate() {
        if i > 0 {
            buffered.push(buffer.to_path_buf());
        }
        buffered.push(path.clone());
    }
    buffered
}

/// What an assembly produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyOutcome {
    pub output: PathBuf,
    pub sequence: Vec<PathBuf>,
    pub images_inserted: usize,
    pub buffers_inserted: usize,
    pub luma_encodes: usize,
    pub luma_flags: usize,
    pub expected_frames: u64,
    pub actual_frames: u64,
}

impl AssemblyOutcome {
    pub fn frame_mismatch(&self) -> i64 {
        self.actual_frames as i64 - self.expected_frames as i64
    }
}

/// Builds the final sequence and drives concatenation.
pub struct Assembler {
    service: Arc<dyn MediaService>,
    config: SplicerConfig,
    spec: TargetSpec,
    work_dir: PathBuf,
    luma: LumaEngine,
    progress: Progress,
}

impl Assembler {
    pub fn new(
        service: Arc<dyn MediaService>,
        config: SplicerConfig,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        let spec = TargetSpec::from(&config);
        let luma = LumaEngine::new(
            Arc::clone(&service),
            spec.clone(),
            LumaCache::new(),
            config.max_workers,
        );
        Self {
            service,
            config,
            spec,
            work_dir: work_dir.into(),
            luma,
            progress: Progress::new(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.luma = self.luma.with_progress(progress.clone());
        self.progress = progress;
        self
    }

    pub fn luma_cache(&self) -> &LumaCache {
        self.luma.cache()
    }

    /// Assemble `chunks` and `images` into `output`.
    ///
    /// Image and buffer render failures are recorded and skipped. Only a
    /// failed concatenation or an invalid configuration is fatal.
    pub async fn assemble(
        &self,
        chunks: &[ChunkDescriptor],
        images: &[PathBuf],
        rng: &mut SplicerRng,
        recorder: &mut ManifestRecorder,
        output: &Path,
    ) -> WorkerResult<AssemblyOutcome> {
        self.config.validate()?;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::create_dir_all(&self.work_dir).await?;

        info!(chunks = chunks.len(), "Shuffling chunks");
        let mut sequence = shuffle_chunks(chunks, rng);

        let segments = self.render_images(images, rng, recorder).await;
        let insertions = interleave_images(&mut sequence, &segments, rng);
        let images_inserted = insertions.len();
        for insertion in insertions {
            recorder.add_image(insertion);
        }
        if images_inserted > 0 {
            info!(images = images_inserted, entries = sequence.len(), "Images interleaved");
        }
        if sequence.is_empty() {
            return Err(WorkerError::NoSurvivingInputs);
        }

        let mut ledger = FrameLedger::new()
            .with_chunks(chunks)
            .with_images(&segments);

        let mut buffers_inserted = 0;
        if self.config.buffers_enabled() && sequence.len() > 1 {
            if let Some(buffer) = self.render_buffer().await {
                let before = sequence.len();
                sequence = insert_buffers(&sequence, &buffer);
                buffers_inserted = sequence.len() - before;
                info!(before, after = sequence.len(), "Inserted buffer clips");
                ledger = ledger.with_buffer(buffer, self.config.antistrobe_buffer_frames);
            }
        }

        let mut luma_encodes = 0;
        if self.config.luma_normalization_enabled() {
            let normalized = self
                .luma
                .normalize(
                    &sequence,
                    self.config.antistrobe_luma_strength,
                    self.config.luma_negligible_delta,
                    &self.work_dir.join(LUMA_DIR_NAME),
                )
                .await?;
            luma_encodes = normalized.encodes;
            sequence = normalized.sequence;
            ledger = ledger.with_adjusted(normalized.adjusted);
        }

        recorder.set_sequence(sequence.clone());

        let expected_frames =
            count_expected_frames(&sequence, &ledger, self.service.as_ref()).await;
        recorder.set_expected_frames(expected_frames);

        info!(entries = sequence.len(), output = %output.display(), "Concatenating");
        let output = self
            .service
            .concatenate(&sequence, output)
            .await
            .map_err(WorkerError::ConcatFailed)?;

        let actual_frames = match self.service.probe(&output).await {
            Ok(metadata) => metadata.frame_count,
            Err(e) => {
                warn!(path = %output.display(), error = %e, "Could not probe output");
                0
            }
        };
        recorder.set_output(&output, actual_frames).await?;

        if actual_frames != expected_frames {
            warn!(
                expected = expected_frames,
                actual = actual_frames,
                delta = actual_frames as i64 - expected_frames as i64,
                "Output frame count differs from sequence"
            );
        }

        let mut luma_flags = 0;
        if self.config.luma_scan_enabled() {
            let flags = self
                .luma
                .delta_pass(&sequence, self.config.antistrobe_delta_threshold)
                .await;
            luma_flags = flags.len();
            for flag in flags {
                recorder.add_luma_flag(flag);
            }
        }

        Ok(AssemblyOutcome {
            output,
            sequence,
            images_inserted,
            buffers_inserted,
            luma_encodes,
            luma_flags,
            expected_frames,
            actual_frames,
        })
    }

    /// Draw every image duration, then render the clips in parallel.
    ///
    /// Returns the rendered segments in input order; failures become skips.
    async fn render_images(
        &self,
        images: &[PathBuf],
        rng: &mut SplicerRng,
        recorder: &mut ManifestRecorder,
    ) -> Vec<ImageSegment> {
        if images.is_empty() {
            return Vec::new();
        }

        let durations = draw_image_durations(
            images.len(),
            self.config.image_frames_min,
            self.config.image_frames_max,
            rng,
        );
        let jobs: Vec<(&PathBuf, u32)> = images.iter().zip(durations).collect();

        let results = run_bounded(
            jobs,
            self.config.max_workers,
            Phase::ImageRender,
            &self.progress,
            |index, (image, duration)| async move {
                let output = self.work_dir.join(format!("img_segment_{:04}.mp4", index));
                let outcome = self
                    .service
                    .normalize_image(image, &output, &self.spec, duration)
                    .await;
                (image, duration, outcome)
            },
        )
        .await;

        let mut segments = Vec::with_capacity(results.len());
        for (image, duration, outcome) in results {
            match outcome {
                Ok(clip_path) => segments.push(ImageSegment {
                    source_image: image.clone(),
                    clip_path,
                    duration_frames: duration,
                }),
                Err(e) => {
                    warn!(
                        path = %image.display(),
                        error = %e,
                        "Image render failed, skipping"
                    );
                    record_source_skipped("image");
                    recorder.add_skipped(SkippedInput {
                        path: image.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        segments
    }

    /// Render the single shared buffer clip; `None` disables buffering.
    async fn render_buffer(&self) -> Option<PathBuf> {
        let output = self.work_dir.join(BUFFER_FILE_NAME);
        match self
            .service
            .render_buffer_clip(&output, &self.spec, self.config.antistrobe_buffer_frames)
            .await
        {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "Buffer clip render failed, continuing without buffers");
                None
            }
        }
    }
}
