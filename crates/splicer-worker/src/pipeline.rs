//! End-to-end run: prepare, chunk, assemble.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;

use splicer_media::MediaService;
use splicer_models::{Manifest, SplicerConfig, TargetSpec};

use crate::coordinator::Coordinator;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;
use crate::manifest::ManifestRecorder;
use crate::progress::Progress;
use crate::rng::SplicerRng;
use crate::sequencer::Assembler;

pub const OUTPUT_FILE_NAME: &str = "splicer_output.mp4";

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub seed: u64,
    pub output: PathBuf,
    pub videos_used: usize,
    pub images_used: usize,
    pub skipped: usize,
    pub chunks: usize,
    pub sequence_len: usize,
    pub luma_encodes: usize,
    pub luma_flags: usize,
    pub expected_frames: u64,
    pub actual_frames: u64,
}

/// One configured run over a [`MediaService`].
pub struct SplicerPipeline {
    service: Arc<dyn MediaService>,
    config: SplicerConfig,
    work_dir: PathBuf,
    output_dir: PathBuf,
    progress: Progress,
}

impl SplicerPipeline {
    pub fn new(
        service: Arc<dyn MediaService>,
        config: SplicerConfig,
        work_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service,
            config,
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
            progress: Progress::new(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(OUTPUT_FILE_NAME)
    }

    /// Run the whole pipeline over `videos` and `images`.
    ///
    /// The seed is resolved first and written back into the configuration
    /// snapshot, so the manifest always carries the seed that was used.
    pub async fn run(
        &self,
        videos: &[PathBuf],
        images: &[PathBuf],
    ) -> WorkerResult<(RunReport, Manifest)> {
        self.config.validate()?;

        let seed = self.config.rng_seed.unwrap_or_else(SplicerRng::random_seed);
        let config = self.config.clone().with_seed(seed);
        let logger = RunLogger::new(seed);

        self.run_seeded(config, &logger, videos, images)
            .instrument(logger.create_span())
            .await
    }

    async fn run_seeded(
        &self,
        config: SplicerConfig,
        logger: &RunLogger,
        videos: &[PathBuf],
        images: &[PathBuf],
    ) -> WorkerResult<(RunReport, Manifest)> {
        logger.log_start(&format!(
            "{} video(s), {} image(s), {} workers",
            videos.len(),
            images.len(),
            config.max_workers
        ));

        let mut rng = SplicerRng::from_seed(logger.seed());
        let mut recorder = ManifestRecorder::new(logger.seed(), config.clone());

        tokio::fs::create_dir_all(&self.work_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let spec = TargetSpec::from(&config);
        let coordinator = Coordinator::new(Arc::clone(&self.service), spec, config.max_workers)
            .with_progress(self.progress.clone());

        logger.log_progress("normalize", "Probing and normalizing inputs");
        let prepared = coordinator
            .prepare_sources(videos, images, &self.work_dir.join("normalized"))
            .await?;
        for skipped in &prepared.skipped {
            logger.log_warning(&format!(
                "skipped {}: {}",
                skipped.path.display(),
                skipped.reason
            ));
            recorder.add_skipped(skipped.clone());
        }

        logger.log_progress("chunk", "Chunking normalized videos");
        let chunked = coordinator
            .chunk_sources(
                &prepared.videos,
                &config,
                &mut rng,
                &self.work_dir.join("chunks"),
            )
            .await?;
        for skipped in &chunked.skipped {
            logger.log_warning(&format!(
                "skipped {}: {}",
                skipped.path.display(),
                skipped.reason
            ));
            recorder.add_skipped(skipped.clone());
        }
        if chunked.chunks.is_empty() && prepared.images.is_empty() {
            return Err(WorkerError::NoSurvivingInputs);
        }
        recorder.add_chunks(chunked.chunks.iter().cloned());

        logger.log_progress("assemble", "Assembling final output");
        let assembler = Assembler::new(Arc::clone(&self.service), config, &self.work_dir)
            .with_progress(self.progress.clone());
        let outcome = assembler
            .assemble(
                &chunked.chunks,
                &prepared.images,
                &mut rng,
                &mut recorder,
                &self.output_path(),
            )
            .await?;

        if outcome.frame_mismatch() != 0 {
            logger.log_warning(&format!(
                "expected {} frames, got {} (delta {})",
                outcome.expected_frames,
                outcome.actual_frames,
                outcome.frame_mismatch()
            ));
        }
        if outcome.luma_flags > 0 {
            logger.log_warning(&format!("{} luma transition(s) flagged", outcome.luma_flags));
        }

        let manifest = recorder.into_manifest();
        let report = RunReport {
            run_id: logger.run_id().to_string(),
            seed: logger.seed(),
            output: outcome.output,
            videos_used: prepared.videos.len() - chunked.skipped.len(),
            images_used: outcome.images_inserted,
            skipped: manifest.skipped_inputs.len(),
            chunks: chunked.chunks.len(),
            sequence_len: outcome.sequence.len(),
            luma_encodes: outcome.luma_encodes,
            luma_flags: outcome.luma_flags,
            expected_frames: outcome.expected_frames,
            actual_frames: outcome.actual_frames,
        };

        logger.log_completion(&format!(
            "{} ({} frames, expected {})",
            report.output.display(),
            report.actual_frames,
            report.expected_frames
        ));

        Ok((report, manifest))
    }
}

/// Manifest location for an output directory.
pub fn manifest_path(output_dir: &Path) -> PathBuf {
    output_dir.join(crate::manifest::MANIFEST_FILE_NAME)
}
