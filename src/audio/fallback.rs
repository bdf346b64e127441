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


//! Degraded merge used when concatenation fails
//!
//! Decodes every chapter and re-encodes the joined stream to AAC. The result
//! has the tags but no chapter markers and no cover.

use crate::audio::metadata::TagSet;
use crate::audio::transcoder::{path_arg, run_ffmpeg};
use crate::error::{DownloaderError, Result};
use futures_util::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};

/// Capability to join chapters without chapter markers
pub trait FallbackMerger: Send + Sync {
    fn merge<'a>(
        &'a self,
        chapters: &'a [PathBuf],
        tags: &'a TagSet,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<()>>;
}

/// ffmpeg concat-filter re-encode
///
/// Needs a working ffmpeg of its own. When it is the same binary the
/// transcoder failed to start, the fallback fails as well and the merge ends
/// with `FallbackMergeFailed`; [`FfmpegTools::with_fallback_ffmpeg`] names a
/// separate one.
///
/// [`FfmpegTools::with_fallback_ffmpeg`]: crate::audio::FfmpegTools::with_fallback_ffmpeg
#[derive(Debug, Clone)]
pub struct ReencodeMerger {
    binary: PathBuf,
    bitrate: String,
}

impl Default for ReencodeMerger {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl ReencodeMerger {
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
            bitrate: "128k".to_string(),
        }
    }

    pub fn with_bitrate<S: Into<String>>(mut self, bitrate: S) -> Self {
        self.bitrate = bitrate.into();
        self
    }

    pub fn args(&self, chapters: &[PathBuf], tags: &TagSet, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into()];
        for chapter in chapters {
            args.push("-i".into());
            args.push(path_arg(chapter));
        }

        let inputs: String = (0..chapters.len()).map(|i| format!("[{}:a]", i)).collect();
        args.extend([
            "-filter_complex".into(),
            format!("{}concat=n={}:v=0:a=1[out]", inputs, chapters.len()),
            "-map".into(),
            "[out]".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            self.bitrate.clone(),
        ]);

        for (key, value) in tags.iter() {
            args.push("-metadata".into());
            args.push(format!("{}={}", key, value));
        }

        args.push(path_arg(output));
        args
    }
}

impl FallbackMerger for ReencodeMerger {
    fn merge<'a>(
        &'a self,
        chapters: &'a [PathBuf],
        tags: &'a TagSet,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if chapters.is_empty() {
                return Err(DownloaderError::FallbackMergeFailed(
                    "no chapters to merge".to_string(),
                ));
            }

            tracing::info!(chapters = chapters.len(), output = %output.display(), "re-encoding chapters");
            run_ffmpeg(&self.binary, self.args(chapters, tags, output))
                .await
                .map_err(|e| DownloaderError::FallbackMergeFailed(e.to_string()))
        }
        .boxed()
    }
}
