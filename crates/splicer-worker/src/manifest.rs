//! Append-only recorder for the run manifest.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use splicer_models::{
    ChunkDescriptor, ImageInsertion, LumaFlag, Manifest, SkippedInput, SplicerConfig,
};

use crate::error::{WorkerError, WorkerResult};

/// Standard manifest file name inside the output directory.
pub const MANIFEST_FILE_NAME: &str = "splicer_manifest.json";

/// Records chunk, image and flag entries in call order.
///
/// The output is set exactly once; after that the recorder rejects a second
/// `set_output`.
#[derive(Debug, Clone)]
pub struct ManifestRecorder {
    manifest: Manifest,
    sealed: bool,
}

impl ManifestRecorder {
    pub fn new(seed: u64, config: SplicerConfig) -> Self {
        Self {
            manifest: Manifest::new(seed, config),
            sealed: false,
        }
    }

    pub fn add_chunk(&mut self, chunk: ChunkDescriptor) {
        self.manifest.chunks.push(chunk);
    }

    pub fn add_chunks(&mut self, chunks: impl IntoIterator<Item = ChunkDescriptor>) {
        self.manifest.chunks.extend(chunks);
    }

    pub fn add_image(&mut self, insertion: ImageInsertion) {
        self.manifest.image_insertions.push(insertion);
    }

    pub fn add_luma_flag(&mut self, flag: LumaFlag) {
        self.manifest.luma_flags.push(flag);
    }

    pub fn add_skipped(&mut self, skipped: SkippedInput) {
        self.manifest.skipped_inputs.push(skipped);
    }

    pub fn set_sequence(&mut self, sequence: Vec<PathBuf>) {
        self.manifest.sequence_order = sequence;
    }

    pub fn set_expected_frames(&mut self, frames: u64) {
        self.manifest.expected_frame_count = frames;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Record the produced file, its frame count and its checksum.
    ///
    /// A checksum failure is logged and leaves the checksum empty.
    pub async fn set_output(&mut self, path: &Path, frame_count: u64) -> WorkerResult<()> {
        if self.sealed {
            return Err(WorkerError::ManifestSealed);
        }
        self.sealed = true;

        self.manifest.output_path = Some(path.to_path_buf());
        self.manifest.actual_frame_count = frame_count;
        self.manifest.output_checksum = match file_checksum(path).await {
            Ok(checksum) => checksum,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not checksum output");
                String::new()
            }
        };

        debug!(checksum = %self.manifest.output_checksum, "Output recorded");
        Ok(())
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn into_manifest(self) -> Manifest {
        self.manifest
    }
}

/// `sha256:<hex>` of the file at `path`, streamed in 64 KiB blocks.
pub async fn file_checksum(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let hex: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    Ok(format!("sha256:{}", hex))
}

pub fn to_json(manifest: &Manifest) -> WorkerResult<String> {
    Ok(serde_json::to_string_pretty(manifest)?)
}

/// Write `manifest` as pretty JSON, creating parent directories.
pub async fn save_manifest(manifest: &Manifest, path: &Path) -> WorkerResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, to_json(manifest)?).await?;
    info!(path = %path.display(), "Manifest saved");
    Ok(())
}

pub async fn load_manifest(path: &Path) -> WorkerResult<Manifest> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}
