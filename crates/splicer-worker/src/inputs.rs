//! Input discovery: expand directories and sort files by media kind.

use std::path::{Path, PathBuf};
use tracing::warn;

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "m4v", "mpg", "mpeg", "ts", "gif",
];

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "tif", "webp"];

/// Media kind of a path, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Video,
    Image,
}

impl InputKind {
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(InputKind::Video)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(InputKind::Image)
        } else {
            None
        }
    }
}

/// Classified inputs, each list in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSet {
    pub videos: Vec<PathBuf>,
    pub images: Vec<PathBuf>,
    /// Paths that were neither a supported file nor a directory
    pub unsupported: Vec<PathBuf>,
}

impl InputSet {
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty() && self.images.is_empty()
    }

    fn push(&mut self, path: PathBuf, kind: InputKind) {
        match kind {
            InputKind::Video => self.videos.push(path),
            InputKind::Image => self.images.push(path),
        }
    }
}

/// Expand `paths` into videos and images.
///
/// Directories contribute their supported files, sorted by name, one level
/// deep. Unsupported files inside a directory are ignored silently.
pub async fn collect_inputs(paths: &[PathBuf]) -> std::io::Result<InputSet> {
    let mut set = InputSet::default();

    for path in paths {
        let metadata = tokio::fs::metadata(path).await.ok();

        if metadata.as_ref().is_some_and(|m| m.is_dir()) {
            let mut children = Vec::new();
            let mut entries = tokio::fs::read_dir(path).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    children.push(entry.path());
                }
            }
            children.sort();

            for child in children {
                if let Some(kind) = InputKind::of(&child) {
                    set.push(child, kind);
                }
            }
            continue;
        }

        match (metadata.is_some_and(|m| m.is_file()), InputKind::of(path)) {
            (true, Some(kind)) => set.push(path.clone(), kind),
            _ => {
                warn!(path = %path.display(), "Not a supported file or directory, skipping");
                set.unsupported.push(path.clone());
            }
        }
    }

    Ok(set)
}
