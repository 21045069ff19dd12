//! Chunk and image segment descriptors.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One frame-accurate extract of a normalized source.
///
/// Invariant: `start_frame + frame_count <= source total frames`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// Normalized source the chunk was cut from
    pub source_file: PathBuf,
    /// First frame, inclusive
    pub start_frame: u64,
    pub frame_count: u64,
    /// Extracted clip
    pub chunk_path: PathBuf,
    /// Position across all sources, reassigned after collection
    pub chunk_index: usize,
}

impl ChunkDescriptor {
    /// One past the last frame.
    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.frame_count
    }
}

/// A still image rendered to a short clip for interleaving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSegment {
    pub source_image: PathBuf,
    pub clip_path: PathBuf,
    pub duration_frames: u32,
}
