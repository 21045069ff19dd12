//! Bounded parallel execution of per-source work.
//!
//! Units run concurrently, limited by a semaphore of `max_workers` permits,
//! but results always come back in submission order. Per-unit failures turn
//! into skip records; they never abort the batch.

use futures::future::join_all;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use splicer_media::{MediaResult, MediaService};
use splicer_models::{ChunkDescriptor, MediaMetadata, SkippedInput, SplicerConfig, TargetSpec};

use crate::chunker::chunk_source;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics::{record_chunks_extracted, record_source_skipped};
use crate::progress::{Phase, Progress};
use crate::rng::SplicerRng;

/// Run `work` over `items` with at most `max_workers` in flight.
///
/// The returned vector is indexed like `items`, whatever order the units
/// finished in.
pub async fn run_bounded<I, T, F, Fut>(
    items: Vec<I>,
    max_workers: usize,
    phase: Phase,
    progress: &Progress,
    work: F,
) -> Vec<T>
where
    F: Fn(usize, I) -> Fut,
    Fut: Future<Output = T>,
{
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    progress.begin(phase, items.len());

    let futures = items.into_iter().enumerate().map(|(index, item)| {
        let sem = Arc::clone(&semaphore);
        let unit = work(index, item);
        async move {
            // The semaphore is never closed, so acquire cannot fail.
            let _permit = sem.acquire().await.ok();
            let result = unit.await;
            progress.advance(phase);
            result
        }
    });

    join_all(futures).await
}

/// A source video that survived probing and normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSource {
    /// Position in the submitted video list
    pub index: usize,
    pub original: PathBuf,
    pub normalized: PathBuf,
    /// Probe of the original file
    pub metadata: MediaMetadata,
}

/// Outcome of the probe/normalize stage.
#[derive(Debug, Clone, Default)]
pub struct PreparedInputs {
    pub videos: Vec<NormalizedSource>,
    /// Images that probed successfully, in input order
    pub images: Vec<PathBuf>,
    pub skipped: Vec<SkippedInput>,
}

/// Outcome of the chunk stage.
#[derive(Debug, Clone, Default)]
pub struct ChunkedSources {
    /// All chunks, source by source, with contiguous indices
    pub chunks: Vec<ChunkDescriptor>,
    pub skipped: Vec<SkippedInput>,
}

/// Runs the per-source stages over a shared [`MediaService`].
#[derive(Clone)]
pub struct Coordinator {
    service: Arc<dyn MediaService>,
    spec: TargetSpec,
    max_workers: usize,
    progress: Progress,
}

impl Coordinator {
    pub fn new(service: Arc<dyn MediaService>, spec: TargetSpec, max_workers: usize) -> Self {
        Self {
            service,
            spec,
            max_workers,
            progress: Progress::new(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Probe and normalize every video, probe every image.
    ///
    /// Fails only when neither kind has a survivor.
    pub async fn prepare_sources(
        &self,
        videos: &[PathBuf],
        images: &[PathBuf],
        norm_dir: &Path,
    ) -> WorkerResult<PreparedInputs> {
        tokio::fs::create_dir_all(norm_dir).await?;

        info!(
            videos = videos.len(),
            images = images.len(),
            "Probing and normalizing sources"
        );

        let video_results = run_bounded(
            videos.to_vec(),
            self.max_workers,
            Phase::Normalize,
            &self.progress,
            |index, path| async move {
                let output = norm_dir.join(format!("norm_{:04}.mp4", index));
                let outcome = self.normalize_one(&path, &output).await;
                (index, path, outcome)
            },
        )
        .await;

        let image_results = run_bounded(
            images.to_vec(),
            self.max_workers,
            Phase::ImageProbe,
            &self.progress,
            |_, path| async move {
                let outcome = self.service.probe(&path).await;
                (path, outcome)
            },
        )
        .await;

        let mut prepared = PreparedInputs::default();

        for (index, original, outcome) in video_results {
            match outcome {
                Ok((normalized, metadata)) => prepared.videos.push(NormalizedSource {
                    index,
                    original,
                    normalized,
                    metadata,
                }),
                Err(e) => {
                    warn!(path = %original.display(), error = %e, "Skipping video");
                    record_source_skipped("video");
                    prepared.skipped.push(SkippedInput {
                        path: original,
                        reason: e.to_string(),
                    });
                }
            }
        }

        for (path, outcome) in image_results {
            match outcome {
                Ok(_) => prepared.images.push(path),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping image");
                    record_source_skipped("image");
                    prepared.skipped.push(SkippedInput {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if prepared.videos.is_empty() && prepared.images.is_empty() {
            return Err(WorkerError::NoSurvivingInputs);
        }

        info!(
            videos = prepared.videos.len(),
            images = prepared.images.len(),
            skipped = prepared.skipped.len(),
            "Sources prepared"
        );

        Ok(prepared)
    }

    async fn normalize_one(
        &self,
        path: &Path,
        output: &Path,
    ) -> MediaResult<(PathBuf, MediaMetadata)> {
        let metadata = self.service.probe(path).await?;
        if metadata.is_vfr {
            warn!(
                path = %path.display(),
                fps = metadata.fps,
                "Variable frame rate source, forcing constant frame rate"
            );
        }
        let normalized = self.service.normalize_video(path, output, &self.spec).await?;
        Ok((normalized, metadata))
    }

    /// Chunk every normalized source.
    ///
    /// One sub-seed per source is drawn from `rng` in submission order before
    /// anything is dispatched, so chunk boundaries do not depend on which
    /// source finishes first. Chunk indices are then renumbered across all
    /// sources in submission order.
    ///
    /// Fails before drawing anything if `config` does not validate.
    pub async fn chunk_sources(
        &self,
        sources: &[NormalizedSource],
        config: &SplicerConfig,
        rng: &mut SplicerRng,
        chunk_dir: &Path,
    ) -> WorkerResult<ChunkedSources> {
        config.validate()?;

        let seeded: Vec<(&NormalizedSource, u64)> =
            sources.iter().map(|source| (source, rng.next_seed())).collect();

        let results = run_bounded(
            seeded,
            self.max_workers,
            Phase::Chunk,
            &self.progress,
            |_, (source, seed)| async move {
                let out_dir = chunk_dir.join(format!("v{:04}", source.index));
                let mut source_rng = SplicerRng::from_seed(seed);
                let outcome = chunk_source(
                    self.service.as_ref(),
                    &source.normalized,
                    &out_dir,
                    config,
                    &self.spec,
                    &mut source_rng,
                )
                .await;
                (source, outcome)
            },
        )
        .await;

        let mut chunked = ChunkedSources::default();
        for (source, outcome) in results {
            match outcome {
                Ok(chunks) => chunked.chunks.extend(chunks),
                Err(e) => {
                    warn!(
                        path = %source.original.display(),
                        error = %e,
                        "Chunking failed, skipping source"
                    );
                    record_source_skipped("video");
                    chunked.skipped.push(SkippedInput {
                        path: source.original.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        for (index, chunk) in chunked.chunks.iter_mut().enumerate() {
            chunk.chunk_index = index;
        }
        record_chunks_extracted(chunked.chunks.len());

        info!(
            sources = sources.len(),
            chunks = chunked.chunks.len(),
            "Chunking complete"
        );

        Ok(chunked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_bounded_keeps_submission_order() {
        // Earlier items sleep longer so they finish last.
        let progress = Progress::new();
        let results = run_bounded(
            vec![40u64, 30, 20, 10, 0],
            3,
            Phase::Chunk,
            &progress,
            |index, delay| async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                index
            },
        )
        .await;

        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        assert_eq!(progress.snapshot(Phase::Chunk), (5, 5));
    }

    #[tokio::test]
    async fn test_run_bounded_limits_concurrency() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let in_flight = &AtomicUsize::new(0);
        let peak = &AtomicUsize::new(0);
        let progress = Progress::new();

        run_bounded(
            (0..8).collect::<Vec<_>>(),
            2,
            Phase::LumaProbe,
            &progress,
            |_, _| async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            },
        )
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
