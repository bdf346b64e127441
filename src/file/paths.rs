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


//! Library layout and file naming
//!
//! Everything the downloader writes lives under one library root:
//!
//! ```text
//! <root>/<kind>/<name>/<name>.json          descriptor
//! <root>/<kind>/<name>/<name>.jpeg          cover
//! <root>/<kind>/<name>/<name>.{epub,fb2}    book
//! <root>/<kind>/<name>/<name>.{cbr,pdf}     comic
//! <root>/<kind>/<name>/Глава_<N>.m4a        audiobook chapters
//! <root>/<kind>/<name>/<name>_complete.m4a  merged audiobook
//! <root>/series/<series>/<n>. <name>/...    parts of a series
//! ```
//!
//! Serials are stored under `book/`, each episode in `<n>. <title>/` inside
//! the serial's directory.

use crate::resource::{ResourceKind, SeriesSlot};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Default library root, relative to the working directory
pub const DEFAULT_LIBRARY_ROOT: &str = "mybooks";

/// Top-level folder holding series and their parts
pub const SERIES_FOLDER: &str = "series";

/// Word used in chapter file names and chapter titles
pub const CHAPTER_WORD: &str = "Глава";

/// Chapter container extension
pub const CHAPTER_EXTENSION: &str = "m4a";

/// Cover extensions looked up by the merge, in priority order
pub const COVER_EXTENSIONS: [&str; 3] = ["jpeg", "jpg", "png"];

/// Suffix of the merged audiobook file stem
pub const MERGED_SUFFIX: &str = "_complete";

/// Characters removed from resource names
const FORBIDDEN_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Upper bound for a sanitized name, leaving room for suffix and extension
const MAX_NAME_BYTES: usize = 200;

lazy_static! {
    static ref CHAPTER_FILE_RE: Regex =
        Regex::new(&format!(r"^{}_(\d+)\.{}$", CHAPTER_WORD, CHAPTER_EXTENSION))
            .expect("chapter file pattern is valid");
}

/// Remove characters that are not allowed in file names
///
/// Strips `\/:*?"<>|` and control characters, trims surrounding whitespace and
/// truncates overly long names on a char boundary.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c) && !c.is_control())
        .collect();

    truncate_name(cleaned.trim(), MAX_NAME_BYTES).trim_end().to_string()
}

/// Sanitized `title`, or the sanitized `uuid` when nothing of the title is left
pub fn resource_name(title: &str, uuid: &str) -> String {
    let name = sanitize_file_name(title);
    if name.is_empty() {
        sanitize_file_name(uuid)
    } else {
        name
    }
}

fn truncate_name(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }

    let mut index = max_bytes;
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    &text[..index]
}

/// `Глава_<index>.m4a`
pub fn chapter_file_name(index: u32) -> String {
    format!("{}_{}.{}", CHAPTER_WORD, index, CHAPTER_EXTENSION)
}

/// Chapter number of a chapter file name, `None` for any other file
pub fn parse_chapter_index(file_name: &str) -> Option<u32> {
    CHAPTER_FILE_RE
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Chapter marker title: `Глава <index>`
pub fn chapter_title(index: u32) -> String {
    format!("{} {}", CHAPTER_WORD, index)
}

/// Library root and the directory rules below it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryLayout {
    root: PathBuf,
}

impl Default for LibraryLayout {
    fn default() -> Self {
        Self::new(DEFAULT_LIBRARY_ROOT)
    }
}

impl LibraryLayout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding standalone audiobooks; scanned by the batch merge
    pub fn audiobook_library(&self) -> PathBuf {
        self.root.join(ResourceKind::Audiobook.library_folder())
    }

    /// Paths for a resource with the given (unsanitized) title
    ///
    /// A title with no usable characters is replaced by the uuid.
    pub fn resource(
        &self,
        kind: ResourceKind,
        title: &str,
        uuid: &str,
        slot: Option<&SeriesSlot>,
    ) -> ResourcePaths {
        let name = resource_name(title, uuid);
        let dir = match slot {
            Some(slot) => self
                .root
                .join(SERIES_FOLDER)
                .join(sanitize_file_name(&slot.series_name))
                .join(format!("{}{}", slot.prefix(), name)),
            None => self.root.join(kind.library_folder()).join(&name),
        };
        ResourcePaths::new(dir, name)
    }
}

/// Files of one resource: a directory and the base name used inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePaths {
    dir: PathBuf,
    name: String,
}

impl ResourcePaths {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(dir: P, name: S) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    /// Paths for an existing directory whose name is also the base name
    pub fn for_directory(dir: &Path) -> Self {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audiobook".to_string());
        Self::new(dir, name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<dir>/<name>.<extension>`
    pub fn file(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, extension))
    }

    pub fn descriptor(&self) -> PathBuf {
        self.file("json")
    }

    pub fn cover(&self) -> PathBuf {
        self.file("jpeg")
    }

    pub fn chapter(&self, index: u32) -> PathBuf {
        self.dir.join(chapter_file_name(index))
    }

    /// `<dir>/<name>_complete.m4a`
    pub fn merged_output(&self) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", self.name, MERGED_SUFFIX, CHAPTER_EXTENSION))
    }

    /// `<dir>/<name>.m4a`, written by the re-encoding fallback
    pub fn fallback_output(&self) -> PathBuf {
        self.file(CHAPTER_EXTENSION)
    }

    /// Directory of the `position`-th (1-based) episode of a serial
    pub fn episode(&self, position: usize, title: &str) -> ResourcePaths {
        let name = format!("{}. {}", position, sanitize_file_name(title));
        ResourcePaths::new(self.dir.join(&name), name)
    }
}
