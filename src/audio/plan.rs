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


//! Merge planning: chapter timeline and the two ffmpeg descriptor files
//!
//! The timeline is kept in integer milliseconds. Each chapter's duration is
//! rounded once and the starts are running sums of the rounded values, so
//! `end[i] == start[i] + duration[i]` and `start[i + 1] == end[i]` hold exactly.
//!
//! ## Concat list
//! ```text
//! file '/abs/path/Глава_1.m4a'
//! ```
//!
//! ## ffmetadata
//! ```text
//! ;FFMETADATA1
//! TITLE=...
//!
//! [CHAPTER]
//! TIMEBASE=1/1000
//! START=0
//! END=100000
//! title=Глава 1
//! ```

use crate::audio::metadata::TagSet;
use crate::audio::probe::FALLBACK_CHAPTER_SECS;
use crate::file::paths::chapter_title;
use crate::resource::Chapter;
use std::fmt::Write;
use std::path::Path;

/// Name of the generated concat list inside the audiobook directory
pub const CONCAT_LIST_FILE: &str = "chapters_list.txt";

/// Name of the generated ffmetadata file inside the audiobook directory
pub const FFMETADATA_FILE: &str = "chapters_metadata.txt";

/// One chapter placed on the timeline
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub start_ms: u64,
    pub end_ms: u64,
    pub chapter: Chapter,
}

impl TimelineEntry {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Ordered timeline plus the tags for one merge
#[derive(Debug, Clone)]
pub struct MergePlan {
    entries: Vec<TimelineEntry>,
    tags: TagSet,
}

impl MergePlan {
    /// Order chapters by index and lay them end to end
    ///
    /// Chapters without a duration are placed with [`FALLBACK_CHAPTER_SECS`].
    pub fn build(mut chapters: Vec<Chapter>, tags: TagSet) -> Self {
        chapters.sort_by_key(|c| c.index);

        let mut cursor = 0u64;
        let entries = chapters
            .into_iter()
            .map(|chapter| {
                let duration_ms = seconds_to_ms(chapter.duration.unwrap_or(FALLBACK_CHAPTER_SECS));
                let entry = TimelineEntry {
                    start_ms: cursor,
                    end_ms: cursor + duration_ms,
                    chapter,
                };
                cursor = entry.end_ms;
                entry
            })
            .collect();

        Self { entries, tags }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn chapter_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_ms(&self) -> u64 {
        self.entries.last().map(|e| e.end_ms).unwrap_or(0)
    }

    /// Chapter files in timeline order
    pub fn chapter_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.chapter.local_path.as_path())
    }

    /// Concat demuxer input: one `file '<path>'` line per chapter
    pub fn concat_list(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "file '{}'",
                escape_concat_path(&entry.chapter.local_path.to_string_lossy())
            );
        }
        out
    }

    /// ffmetadata with global tags and one chapter block per entry
    pub fn ffmetadata(&self) -> String {
        let mut out = String::from(";FFMETADATA1\n");

        for (key, value) in self.tags.iter() {
            let _ = writeln!(out, "{}={}", key.to_uppercase(), escape_ffmetadata(value));
        }

        for (position, entry) in self.entries.iter().enumerate() {
            out.push_str("\n[CHAPTER]\n");
            out.push_str("TIMEBASE=1/1000\n");
            let _ = writeln!(out, "START={}", entry.start_ms);
            let _ = writeln!(out, "END={}", entry.end_ms);
            let _ = writeln!(
                out,
                "title={}",
                escape_ffmetadata(&chapter_title(position as u32 + 1))
            );
        }

        out
    }
}

/// Round seconds to whole milliseconds; negative and NaN become zero
pub fn seconds_to_ms(seconds: f64) -> u64 {
    let ms = (seconds * 1000.0).round();
    if ms.is_finite() && ms > 0.0 {
        ms as u64
    } else {
        0
    }
}

/// Quote a path for the concat demuxer's single-quoted `file` directive
pub fn escape_concat_path(path: &str) -> String {
    path.replace('\'', r"'\''")
}

/// Escape a value for an ffmetadata file
///
/// Backslash goes first so the escapes added for the other characters are
/// not doubled.
pub fn escape_ffmetadata(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '=' | ';' | '#' | '\n' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}
