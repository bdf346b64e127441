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


//! Audiobook assembly
//!
//! Turns a directory of per-chapter tracks into a single tagged file with
//! chapter markers and an embedded cover.
//!
//! # Module Organization
//!
//! ## metadata
//! - `AudiobookMetadata` - tags derived from the resource descriptor
//! - `TagSet` - ordered, de-duplicated tags with overrides
//!
//! ## probe
//! - `DurationProber` - duration capability, `FfprobeProber` implementation
//!
//! ## plan
//! - `MergePlan` - millisecond timeline, concat list and ffmetadata payloads
//!
//! ## transcoder / fallback
//! - `Transcoder` - stream-copy concatenation (`FfmpegTranscoder`)
//! - `FallbackMerger` - re-encoding join without markers (`ReencodeMerger`)
//!
//! ## merge
//! - `AudiobookAssembler` - drives the stages and cleanup, plus the batch merge
//!
//! # FFmpeg Integration
//!
//! The default implementations shell out to `ffmpeg` and `ffprobe`, taken
//! from PATH unless [`FfmpegTools`] names other binaries. The fallback merge
//! also needs an ffmpeg; it uses the primary one unless a separate binary is
//! configured.

pub mod fallback;
pub mod merge;
pub mod metadata;
pub mod plan;
pub mod probe;
pub mod transcoder;

// Re-export commonly used types
pub use fallback::{FallbackMerger, ReencodeMerger};
pub use merge::{AudiobookAssembler, BatchOptions, BatchSummary, MergeOutcome, MergeRequest, MergeStage};
pub use metadata::{AudiobookMetadata, TagSet};
pub use plan::MergePlan;
pub use probe::{DurationProber, FfprobeProber};
pub use transcoder::{ConcatRequest, FfmpegTranscoder, Transcoder};

use std::path::{Path, PathBuf};

/// Locations of the external audio tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// ffmpeg used by the fallback merge, when different from `ffmpeg`
    pub fallback_ffmpeg: Option<PathBuf>,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            fallback_ffmpeg: None,
        }
    }
}

impl FfmpegTools {
    pub fn with_ffmpeg<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.ffmpeg = path.into();
        self
    }

    pub fn with_ffprobe<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.ffprobe = path.into();
        self
    }

    pub fn with_fallback_ffmpeg<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.fallback_ffmpeg = Some(path.into());
        self
    }

    /// Binary the fallback merge runs
    pub fn fallback_binary(&self) -> &Path {
        self.fallback_ffmpeg.as_deref().unwrap_or(&self.ffmpeg)
    }
}
