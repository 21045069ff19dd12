//! Seeded slicing of one normalized source into chunks.

use std::path::Path;
use tracing::{debug, warn};

use splicer_media::{MediaResult, MediaService};
use splicer_models::{ChunkDescriptor, SplicerConfig, TargetSpec};

use crate::rng::SplicerRng;

/// Frame range of one planned chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub start_frame: u64,
    pub frame_count: u64,
}

/// Plan chunk boundaries over `[0, total_frames)`.
///
/// One draw per chunk, taken before the remaining-frames check, so the
/// generator advances identically whether or not the last draw is clamped.
/// A trailing remainder shorter than `min_frames` is dropped.
pub fn plan_chunks(
    total_frames: u64,
    min_frames: u32,
    max_frames: u32,
    rng: &mut SplicerRng,
) -> Vec<ChunkPlan> {
    let mut plans = Vec::new();
    let mut current = 0u64;

    while current < total_frames {
        let drawn = u64::from(rng.draw_frames(min_frames, max_frames));
        let remaining = total_frames - current;
        if remaining < u64::from(min_frames) {
            break;
        }
        let frame_count = drawn.min(remaining);
        plans.push(ChunkPlan {
            start_frame: current,
            frame_count,
        });
        current += frame_count;
    }

    plans
}

/// Chunk one normalized source and extract every chunk into `out_dir`.
///
/// Chunk indices are local to the source; the coordinator renumbers them.
/// A zero-frame source yields no chunks. Any failed extraction fails the
/// whole source so no partial chunk list reaches the sequence.
pub async fn chunk_source(
    service: &dyn MediaService,
    normalized: &Path,
    out_dir: &Path,
    config: &SplicerConfig,
    spec: &TargetSpec,
    rng: &mut SplicerRng,
) -> MediaResult<Vec<ChunkDescriptor>> {
    let metadata = service.probe(normalized).await?;
    if metadata.frame_count == 0 {
        warn!(path = %normalized.display(), "Source has no frames, skipping");
        return Ok(Vec::new());
    }

    tokio::fs::create_dir_all(out_dir).await?;

    let plans = plan_chunks(
        metadata.frame_count,
        config.chunk_frames_min,
        config.chunk_frames_max,
        rng,
    );
    debug!(
        path = %normalized.display(),
        total_frames = metadata.frame_count,
        chunks = plans.len(),
        "Planned chunks"
    );

    let mut chunks = Vec::with_capacity(plans.len());
    for (index, plan) in plans.into_iter().enumerate() {
        let output = out_dir.join(format!("chunk_{:05}.mp4", index));
        let chunk_path = service
            .extract_segment(
                normalized,
                &output,
                plan.start_frame,
                plan.start_frame + plan.frame_count,
                spec,
            )
            .await?;

        chunks.push(ChunkDescriptor {
            source_file: normalized.to_path_buf(),
            start_frame: plan.start_frame,
            frame_count: plan.frame_count,
            chunk_path,
            chunk_index: index,
        });
    }

    Ok(chunks)
}
