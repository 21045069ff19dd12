//! Reproducibility manifest.
//!
//! Records every randomized decision of a run in the order it was made.
//! Given the same seed, configuration and inputs, the chunk, image and
//! sequence records are identical between runs; only `created_at`, the
//! checksum and (if the media tool's output differs) the luma flags and
//! actual frame count may vary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::chunk::{ChunkDescriptor, ImageSegment};
use crate::config::SplicerConfig;

/// An image clip inserted into the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInsertion {
    pub source_image: PathBuf,
    pub clip_path: PathBuf,
    /// Index in the sequence at the moment of insertion
    pub position: usize,
    pub duration_frames: u32,
}

impl ImageInsertion {
    pub fn new(segment: &ImageSegment, position: usize) -> Self {
        Self {
            source_image: segment.source_image.clone(),
            clip_path: segment.clip_path.clone(),
            position,
            duration_frames: segment.duration_frames,
        }
    }
}

/// A transition whose luma jump exceeded the configured threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LumaFlag {
    /// Index of the first clip of the pair in the final sequence
    pub position: usize,
    pub delta: f64,
    pub threshold: f64,
}

/// An input excluded from the run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedInput {
    pub path: PathBuf,
    pub reason: String,
}

/// Write-once record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub rng_seed: u64,
    pub config: SplicerConfig,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub skipped_inputs: Vec<SkippedInput>,
    #[serde(default)]
    pub chunks: Vec<ChunkDescriptor>,
    #[serde(default)]
    pub image_insertions: Vec<ImageInsertion>,
    #[serde(default)]
    pub luma_flags: Vec<LumaFlag>,
    /// Final concatenation order
    #[serde(default)]
    pub sequence_order: Vec<PathBuf>,
    #[serde(default)]
    pub expected_frame_count: u64,
    #[serde(default)]
    pub actual_frame_count: u64,
    /// `sha256:<hex>` of the output file
    #[serde(default)]
    pub output_checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl Manifest {
    pub fn new(rng_seed: u64, config: SplicerConfig) -> Self {
        Self {
            rng_seed,
            config,
            created_at: Utc::now(),
            skipped_inputs: Vec::new(),
            chunks: Vec::new(),
            image_insertions: Vec::new(),
            luma_flags: Vec::new(),
            sequence_order: Vec::new(),
            expected_frame_count: 0,
            actual_frame_count: 0,
            output_checksum: String::new(),
            output_path: None,
        }
    }

    /// Frame delta of the produced output against the sequence sum.
    pub fn frame_mismatch(&self) -> i64 {
        self.actual_frame_count as i64 - self.expected_frame_count as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_json_roundtrip_keeps_order() {
        let mut manifest = Manifest::new(42, SplicerConfig::default().with_seed(42));
        manifest.luma_flags.push(LumaFlag {
            position: 3,
            delta: 90.0,
            threshold: 80.0,
        });
        manifest.luma_flags.push(LumaFlag {
            position: 1,
            delta: 85.5,
            threshold: 80.0,
        });
        manifest.sequence_order = vec![PathBuf::from("b.mp4"), PathBuf::from("a.mp4")];

        let json = serde_json::to_string(&manifest).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();

        assert_eq!(back, manifest);
        assert_eq!(back.luma_flags[0].position, 3);
        assert_eq!(back.sequence_order[0], PathBuf::from("b.mp4"));
    }

    #[test]
    fn test_frame_mismatch_sign() {
        let mut manifest = Manifest::new(1, SplicerConfig::default());
        manifest.expected_frame_count = 100;
        manifest.actual_frame_count = 98;
        assert_eq!(manifest.frame_mismatch(), -2);
    }
}
