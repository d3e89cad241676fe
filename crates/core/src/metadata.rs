//! Stat-based snapshot of a filesystem entry (C2).

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{FilexError, Result};

const TEXT_EXTENSIONS: &[&str] = &["txt", "docx"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Immutable snapshot of a file, taken at one point in time. Never mutated
/// after construction.
#[derive(Clone, Debug)]
pub struct FileMetadata {
    pub canonical_path: PathBuf,
    pub file_name: String,
    pub extension: String,
    pub size_bytes: u64,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub is_text_type: bool,
    pub is_image_type: bool,
}

impl FileMetadata {
    /// Resolve `path`, stat it, and classify by lowercased extension.
    pub fn from_path(path: &Path) -> Result<FileMetadata> {
        let canonical_path =
            path.canonicalize().map_err(|_| FilexError::NotFound(path.to_path_buf()))?;
        let stat = std::fs::metadata(&canonical_path)?;

        let file_name =
            canonical_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let extension = canonical_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mtime = stat.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let ctime = stat.created().unwrap_or(mtime);

        Ok(FileMetadata {
            is_text_type: TEXT_EXTENSIONS.contains(&extension.as_str()),
            is_image_type: IMAGE_EXTENSIONS.contains(&extension.as_str()),
            canonical_path,
            file_name,
            extension,
            size_bytes: stat.len(),
            mtime,
            ctime,
        })
    }

    pub fn size_kb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}
