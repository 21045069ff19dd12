//! Expected frame count of a sequence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use splicer_media::MediaService;
use splicer_models::{ChunkDescriptor, ImageSegment};

/// Frame counts known without probing.
#[derive(Debug, Clone, Default)]
pub struct FrameLedger {
    chunks: HashMap<PathBuf, u64>,
    images: HashMap<PathBuf, u64>,
    buffer: Option<(PathBuf, u64)>,
    /// Adjusted variant → the clip it was made from
    adjusted: HashMap<PathBuf, PathBuf>,
}

impl FrameLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunks(mut self, chunks: &[ChunkDescriptor]) -> Self {
        self.chunks
            .extend(chunks.iter().map(|c| (c.chunk_path.clone(), c.frame_count)));
        self
    }

    pub fn with_images(mut self, images: &[ImageSegment]) -> Self {
        self.images.extend(
            images
                .iter()
                .map(|i| (i.clip_path.clone(), u64::from(i.duration_frames))),
        );
        self
    }

    pub fn with_buffer(mut self, path: PathBuf, frames: u32) -> Self {
        self.buffer = Some((path, u64::from(frames)));
        self
    }

    pub fn with_adjusted(mut self, adjusted: HashMap<PathBuf, PathBuf>) -> Self {
        self.adjusted.extend(adjusted);
        self
    }

    /// Frames of `path`, resolving adjusted variants to their originals.
    pub fn resolve(&self, path: &Path) -> Option<u64> {
        self.resolve_direct(path).or_else(|| {
            self.adjusted
                .get(path)
                .and_then(|original| self.resolve_direct(original))
        })
    }

    fn resolve_direct(&self, path: &Path) -> Option<u64> {
        match &self.buffer {
            Some((buffer, frames)) if buffer == path => Some(*frames),
            _ => self
                .chunks
                .get(path)
                .or_else(|| self.images.get(path))
                .copied(),
        }
    }

    /// Sum over `sequence`, or `None` if any entry is unresolved.
    pub fn sum_known(&self, sequence: &[PathBuf]) -> Option<u64> {
        sequence.iter().map(|p| self.resolve(p)).sum()
    }
}

/// Sum the frames of every entry of `sequence`.
///
/// Entries the ledger cannot resolve are probed once per distinct path; a
/// failed probe contributes zero.
pub async fn count_expected_frames(
    sequence: &[PathBuf],
    ledger: &FrameLedger,
    service: &dyn MediaService,
) -> u64 {
    let mut probed: HashMap<&Path, u64> = HashMap::new();
    let mut total = 0u64;

    for path in sequence {
        if let Some(frames) = ledger.resolve(path) {
            total += frames;
            continue;
        }
        if let Some(frames) = probed.get(path.as_path()) {
            total += frames;
            continue;
        }

        let frames = match service.probe(path).await {
            Ok(metadata) => metadata.frame_count,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Frame count unavailable, counting zero"
                );
                0
            }
        };
        probed.insert(path.as_path(), frames);
        total += frames;
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(path: &str, frames: u64) -> ChunkDescriptor {
        ChunkDescriptor {
            source_file: PathBuf::from("norm_0000.mp4"),
            start_frame: 0,
            frame_count: frames,
            chunk_path: PathBuf::from(path),
            chunk_index: 0,
        }
    }

    fn ledger() -> FrameLedger {
        FrameLedger::new()
            .with_chunks(&[chunk("a.mp4", 4), chunk("b.mp4", 5)])
            .with_images(&[ImageSegment {
                source_image: PathBuf::from("photo.png"),
                clip_path: PathBuf::from("img_segment_0000.mp4"),
                duration_frames: 6,
            }])
            .with_buffer(PathBuf::from("buffer_gray.mp4"), 1)
            .with_adjusted(HashMap::from([(
                PathBuf::from("lnorm_00000.mp4"),
                PathBuf::from("b.mp4"),
            )]))
    }

    #[test]
    fn test_resolve_each_kind() {
        let ledger = ledger();
        assert_eq!(ledger.resolve(Path::new("a.mp4")), Some(4));
        assert_eq!(ledger.resolve(Path::new("img_segment_0000.mp4")), Some(6));
        assert_eq!(ledger.resolve(Path::new("buffer_gray.mp4")), Some(1));
        assert_eq!(ledger.resolve(Path::new("lnorm_00000.mp4")), Some(5));
        assert_eq!(ledger.resolve(Path::new("unknown.mp4")), None);
    }

    #[test]
    fn test_sum_known_matches_manual_sum() {
        let sequence: Vec<PathBuf> = [
            "a.mp4",
            "buffer_gray.mp4",
            "img_segment_0000.mp4",
            "buffer_gray.mp4",
            "lnorm_00000.mp4",
            "buffer_gray.mp4",
            "a.mp4",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();

        assert_eq!(ledger().sum_known(&sequence), Some(4 + 1 + 6 + 1 + 5 + 1 + 4));
    }

    #[test]
    fn test_sum_known_none_with_unknown_entry() {
        let sequence = vec![PathBuf::from("a.mp4"), PathBuf::from("mystery.mp4")];
        assert_eq!(ledger().sum_known(&sequence), None);
    }
}
