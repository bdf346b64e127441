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


//! Chapter duration probing
//!
//! Durations come from ffprobe:
//! `ffprobe -v quiet -show_entries format=duration -of csv=p=0 <file>`
//!
//! A chapter whose duration cannot be determined is assigned
//! [`FALLBACK_CHAPTER_SECS`]; probing never aborts a merge.

use crate::error::{DownloaderError, Result};
use crate::resource::Chapter;
use futures_util::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Duration assumed for a chapter that could not be probed
pub const FALLBACK_CHAPTER_SECS: f64 = 180.0;

/// Capability to measure the playable duration of an audio file, in seconds
pub trait DurationProber: Send + Sync {
    fn probe<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<f64>>;
}

/// ffprobe-backed prober
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: PathBuf,
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl FfprobeProber {
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments passed to ffprobe for `path`
    pub fn args(path: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "csv=p=0".to_string(),
            path.to_string_lossy().to_string(),
        ]
    }
}

impl DurationProber for FfprobeProber {
    fn probe<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<f64>> {
        async move {
            let output = Command::new(&self.binary)
                .args(Self::args(path))
                .output()
                .await
                .map_err(|e| {
                    DownloaderError::probe_failed(path, format!("failed to execute ffprobe: {}", e))
                })?;

            if !output.status.success() {
                return Err(DownloaderError::probe_failed(
                    path,
                    format!("ffprobe exited with status: {}", output.status),
                ));
            }

            parse_duration(&String::from_utf8_lossy(&output.stdout))
                .ok_or_else(|| DownloaderError::probe_failed(path, "no usable duration in output"))
        }
        .boxed()
    }
}

/// Parse ffprobe's csv output; rejects negative and non-finite values
pub fn parse_duration(output: &str) -> Option<f64> {
    output
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Probe every chapter in order, filling in `duration`
///
/// Returns the number of chapters that fell back to [`FALLBACK_CHAPTER_SECS`].
pub async fn probe_chapters(prober: &dyn DurationProber, chapters: &mut [Chapter]) -> usize {
    let mut fallbacks = 0;

    for chapter in chapters.iter_mut() {
        match prober.probe(&chapter.local_path).await {
            Ok(seconds) => {
                tracing::debug!(chapter = chapter.index, seconds, "probed");
                chapter.duration = Some(seconds);
            }
            Err(e) => {
                tracing::warn!(
                    chapter = chapter.index,
                    error = %e,
                    "could not get duration, assuming {} s",
                    FALLBACK_CHAPTER_SECS
                );
                chapter.duration = Some(FALLBACK_CHAPTER_SECS);
                fallbacks += 1;
            }
        }
    }

    fallbacks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapProber(HashMap<PathBuf, f64>);

    impl DurationProber for MapProber {
        fn probe<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<f64>> {
            let result = self
                .0
                .get(path)
                .copied()
                .ok_or_else(|| DownloaderError::probe_failed(path, "unknown"));
            async move { result }.boxed()
        }
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("123.456000\n"), Some(123.456));
        assert_eq!(parse_duration("N/A\n"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("-1.0"), None);
    }

    #[test]
    fn test_ffprobe_args() {
        let args = FfprobeProber::args(Path::new("/a/Глава_1.m4a"));
        assert_eq!(
            args,
            vec!["-v", "quiet", "-show_entries", "format=duration", "-of", "csv=p=0", "/a/Глава_1.m4a"]
        );
    }

    #[tokio::test]
    async fn test_failed_probe_falls_back() {
        let prober = MapProber(HashMap::from([
            (PathBuf::from("/a/1"), 100.0),
            (PathBuf::from("/a/3"), 200.0),
        ]));
        let mut chapters = vec![
            Chapter::on_disk(1, PathBuf::from("/a/1")),
            Chapter::on_disk(2, PathBuf::from("/a/2")),
            Chapter::on_disk(3, PathBuf::from("/a/3")),
        ];

        let fallbacks = probe_chapters(&prober, &mut chapters).await;

        assert_eq!(fallbacks, 1);
        let durations: Vec<_> = chapters.iter().map(|c| c.duration).collect();
        assert_eq!(durations, vec![Some(100.0), Some(FALLBACK_CHAPTER_SECS), Some(200.0)]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_probe_failure() {
        let prober = FfprobeProber::new("/nonexistent/ffprobe-binary");
        let err = prober.probe(Path::new("x.m4a")).await.unwrap_err();
        assert!(matches!(err, DownloaderError::ProbeFailed { .. }));
    }
}
