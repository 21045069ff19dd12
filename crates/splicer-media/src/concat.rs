//! Concat demuxer list files.

use std::path::{Path, PathBuf};

use crate::error::MediaResult;

/// Base timeout for the final stream-copy concat.
pub const CONCAT_BASE_TIMEOUT_SECS: u64 = 600;

/// Concat timeout grows by a second per hundred entries.
pub fn concat_timeout_secs(entries: usize) -> u64 {
    CONCAT_BASE_TIMEOUT_SECS + (entries / 100) as u64
}

/// Render the concat demuxer list for `paths`, in order.
///
/// Paths are made absolute and single quotes escaped. Lines always end in
/// `\n`; the demuxer rejects CRLF on some platforms.
pub fn concat_list(paths: &[PathBuf]) -> String {
    let mut list = String::new();
    for path in paths {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.clone());
        let escaped = absolute.to_string_lossy().replace('\'', "'\\''");
        list.push_str("file '");
        list.push_str(&escaped);
        list.push_str("'\n");
    }
    list
}

/// Write the concat list for `paths` to `list_path`.
pub async fn write_concat_list(paths: &[PathBuf], list_path: &Path) -> MediaResult<()> {
    if let Some(parent) = list_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(list_path, concat_list(paths)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[
            PathBuf::from("/work/chunk_00000.mp4"),
            PathBuf::from("/work/it's.mp4"),
        ]);
        assert_eq!(
            list,
            "file '/work/chunk_00000.mp4'\nfile '/work/it'\\''s.mp4'\n"
        );
        assert!(!list.contains('\r'));
    }

    #[test]
    fn test_relative_paths_made_absolute() {
        let list = concat_list(&[PathBuf::from("chunk.mp4")]);
        let line = list.lines().next().unwrap();
        let inner = line.trim_start_matches("file '").trim_end_matches('\'');
        assert!(Path::new(inner).is_absolute());
    }

    #[test]
    fn test_concat_timeout_scales() {
        assert_eq!(concat_timeout_secs(0), 600);
        assert_eq!(concat_timeout_secs(99), 600);
        assert_eq!(concat_timeout_secs(2500), 625);
    }

    #[tokio::test]
    async fn test_write_concat_list() {
        let dir = tempfile::tempdir().unwrap();
        let list_path = dir.path().join("lists").join("concat_list.txt");
        write_concat_list(&[PathBuf::from("/a.mp4"), PathBuf::from("/b.mp4")], &list_path)
            .await
            .unwrap();
        let written = tokio::fs::read_to_string(&list_path).await.unwrap();
        assert_eq!(written, "file '/a.mp4'\nfile '/b.mp4'\n");
    }
}
