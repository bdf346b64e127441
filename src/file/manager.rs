// Bookmate Downloader - books and audiobooks for offline reading
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! File operations used by the handlers and the merge
//!
//! # Key Operations
//! - Directory creation
//! - Atomic writes for descriptors
//! - Per-file cleanup that never aborts on the first failure
//! - Chapter discovery in an audiobook directory

use crate::error::{DownloaderError, Result};
use crate::file::paths::parse_chapter_index;
use crate::resource::Chapter;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Outcome of deleting a set of files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    /// Files that could not be removed, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ensure directory exists, creating parent directories as needed
pub async fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| DownloaderError::file_io("create directory", path, e))
}

/// Write to a temp file beside `path`, then rename over it
pub async fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&temp_path, contents)
        .await
        .map_err(|e| DownloaderError::file_io("write temp file", &temp_path, e))?;

    fs::rename(&temp_path, path).await.map_err(|e| {
        DownloaderError::FileIoError(format!(
            "Failed to rename temp file {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        ))
    })
}

/// Check if file exists
pub async fn file_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Get file size in bytes
pub async fn file_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|e| DownloaderError::file_io("stat", path, e))?;
    Ok(metadata.len())
}

/// Delete each file independently, logging and continuing past failures
///
/// Files that are already gone count as removed.
pub async fn remove_files<'a, I>(paths: I) -> CleanupReport
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut report = CleanupReport::default();

    for path in paths {
        match fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "removed");
                report.removed.push(path.to_path_buf());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                report.removed.push(path.to_path_buf());
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not remove file");
                report.failed.push((path.to_path_buf(), e.to_string()));
            }
        }
    }

    report
}

/// Remove a file if it exists
pub async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloaderError::file_io("remove file", path, e)),
    }
}

/// Remove a directory tree if it exists
pub async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloaderError::file_io("remove directory", path, e)),
    }
}

/// Chapter files in `dir`, ordered by their numeric index
///
/// Other files (cover, descriptor, merged output) are ignored.
pub async fn discover_chapters(dir: &Path) -> Result<Vec<Chapter>> {
    if !fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Err(DownloaderError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| DownloaderError::file_io("read directory", dir, e))?;

    let mut chapters = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DownloaderError::file_io("read directory", dir, e))?
    {
        let file_name = entry.file_name();
        if let Some(index) = file_name.to_str().and_then(parse_chapter_index) {
            chapters.push(Chapter::on_disk(index, entry.path()));
        }
    }

    if chapters.is_empty() {
        return Err(DownloaderError::NoChapterFiles(dir.to_path_buf()));
    }

    chapters.sort_by_key(|c| c.index);
    Ok(chapters)
}
