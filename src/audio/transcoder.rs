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


//! Chapter concatenation through ffmpeg
//!
//! Chapters are joined with the concat demuxer and stream copy, so no audio
//! is re-encoded. The ffmetadata file is the second input and supplies global
//! tags and chapter markers; every tag is additionally passed as an explicit
//! `-metadata` override.
//!
//! ```text
//! ffmpeg -y -f concat -safe 0 -i chapters_list.txt -i chapters_metadata.txt [-i cover.jpeg]
//!        -map 0:a [-map 2:v] -c copy [-disposition:v:0 attached_pic]
//!        -map_metadata 1 -map_chapters 1 -metadata title=... out.m4a
//! ```

use crate::audio::metadata::TagSet;
use crate::error::{DownloaderError, Result};
use futures_util::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Lines of ffmpeg's stderr kept in error messages
const STDERR_TAIL_LINES: usize = 20;

/// Everything one concatenation needs
#[derive(Debug, Clone)]
pub struct ConcatRequest {
    pub concat_list: PathBuf,
    pub ffmetadata: PathBuf,
    pub cover: Option<PathBuf>,
    pub tags: TagSet,
    pub output: PathBuf,
}

/// Capability to concatenate chapters into one tagged file with chapter markers
pub trait Transcoder: Send + Sync {
    fn concat<'a>(&'a self, request: &'a ConcatRequest) -> BoxFuture<'a, Result<()>>;
}

/// ffmpeg-backed transcoder
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegTranscoder {
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Build the ffmpeg argument list for a request
    pub fn args(request: &ConcatRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            path_arg(&request.concat_list),
            "-i".into(),
            path_arg(&request.ffmetadata),
        ];

        match &request.cover {
            Some(cover) => {
                args.extend([
                    "-i".into(),
                    path_arg(cover),
                    "-map".into(),
                    "0:a".into(),
                    "-map".into(),
                    "2:v".into(),
                    "-c:v".into(),
                    "copy".into(),
                    "-c:a".into(),
                    "copy".into(),
                    "-disposition:v:0".into(),
                    "attached_pic".into(),
                ]);
            }
            None => {
                args.extend(["-map", "0:a", "-c", "copy"].map(String::from));
            }
        }

        args.extend(["-map_metadata", "1", "-map_chapters", "1"].map(String::from));

        for (key, value) in request.tags.iter() {
            args.push("-metadata".into());
            args.push(format!("{}={}", key, value));
        }

        args.push(path_arg(&request.output));
        args
    }
}

impl Transcoder for FfmpegTranscoder {
    fn concat<'a>(&'a self, request: &'a ConcatRequest) -> BoxFuture<'a, Result<()>> {
        async move {
            tracing::debug!(binary = %self.binary.display(), output = %request.output.display(), "running ffmpeg concat");
            run_ffmpeg(&self.binary, Self::args(request)).await
        }
        .boxed()
    }
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Run ffmpeg to completion, mapping spawn and exit failures
pub(crate) async fn run_ffmpeg(binary: &Path, args: Vec<String>) -> Result<()> {
    let output = Command::new(binary)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DownloaderError::TranscoderNotFound
            } else {
                DownloaderError::TranscodeFailed(format!("Failed to execute ffmpeg: {}", e))
            }
        })?;

    if !output.status.success() {
        return Err(DownloaderError::TranscodeFailed(format!(
            "FFmpeg exited with status: {}\n{}",
            output.status,
            stderr_tail(&output.stderr)
        )));
    }

    Ok(())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
