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


//! Audiobook merge driver
//!
//! Stages of one merge:
//!
//! ```text
//! Probing → Planning → Concatenating ──────────────────────→ Cleanup? → Done
//!                            └─(transcode error)→ FallbackConcatenating ─┘
//!                                                        └─(error)→ Failed
//! ```
//!
//! The concat list and ffmetadata files are written into the audiobook
//! directory during planning and removed when the merge ends, whatever the
//! result. Chapter files are only deleted after a successful merge and only
//! when cleanup was requested.

use crate::audio::fallback::{FallbackMerger, ReencodeMerger};
use crate::audio::metadata::{fallback_tags, AudiobookMetadata, TagSet};
use crate::audio::plan::{MergePlan, CONCAT_LIST_FILE, FFMETADATA_FILE};
use crate::audio::probe::{probe_chapters, DurationProber, FfprobeProber};
use crate::audio::transcoder::{ConcatRequest, FfmpegTranscoder, Transcoder};
use crate::audio::FfmpegTools;
use crate::error::{DownloaderError, Result};
use crate::file::manager::{self, CleanupReport};
use crate::file::paths::{ResourcePaths, COVER_EXTENSIONS};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stage of a merge, in the order they can be visited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Probing,
    Planning,
    Concatenating,
    FallbackConcatenating,
    Cleanup,
    Done,
    Failed,
}

/// One merge: which directory, the base name inside it, and what to do
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub paths: ResourcePaths,
    pub tags: TagSet,
    pub cleanup_chapters: bool,
}

/// Result of a successful merge
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub output: PathBuf,
    /// `false` when the fallback path produced the file
    pub chapter_markers: bool,
    pub chapters: usize,
    /// Chapters whose duration was assumed rather than probed
    pub unprobed_chapters: usize,
    pub cover_embedded: bool,
    pub output_bytes: u64,
    /// Present when cleanup was requested
    pub cleanup: Option<CleanupReport>,
    /// Stages visited, in order
    pub stages: Vec<MergeStage>,
}

/// Options for merging every audiobook in a library folder
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Re-merge books whose merged output already exists
    pub force: bool,
    pub cleanup_chapters: bool,
    /// Applied on top of each book's own tags
    pub overrides: TagSet,
}

/// Outcome of a batch merge
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub merged: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Drives probing, planning, concatenation, fallback and cleanup
#[derive(Clone)]
pub struct AudiobookAssembler {
    prober: Arc<dyn DurationProber>,
    transcoder: Arc<dyn Transcoder>,
    fallback: Arc<dyn FallbackMerger>,
}

impl AudiobookAssembler {
    pub fn new(
        prober: Arc<dyn DurationProber>,
        transcoder: Arc<dyn Transcoder>,
        fallback: Arc<dyn FallbackMerger>,
    ) -> Self {
        Self {
            prober,
            transcoder,
            fallback,
        }
    }

    /// Assembler over the real ffprobe/ffmpeg binaries
    pub fn with_tools(tools: &FfmpegTools) -> Self {
        Self::new(
            Arc::new(FfprobeProber::new(&tools.ffprobe)),
            Arc::new(FfmpegTranscoder::new(&tools.ffmpeg)),
            Arc::new(ReencodeMerger::new(tools.fallback_binary())),
        )
    }

    /// Merge the chapters of one audiobook directory
    pub async fn merge(&self, request: &MergeRequest) -> Result<MergeOutcome> {
        let dir = tokio::fs::canonicalize(request.paths.dir())
            .await
            .map_err(|_| DownloaderError::DirectoryNotFound(request.paths.dir().to_path_buf()))?;
        let paths = ResourcePaths::new(&dir, request.paths.name());

        let mut chapters = manager::discover_chapters(&dir).await?;
        tracing::info!(dir = %dir.display(), chapters = chapters.len(), "merging audiobook");

        let mut stages = Vec::new();

        enter(&mut stages, MergeStage::Probing);
        let unprobed_chapters = probe_chapters(self.prober.as_ref(), &mut chapters).await;

        enter(&mut stages, MergeStage::Planning);
        let plan = MergePlan::build(chapters, request.tags.clone());
        let concat_list = dir.join(CONCAT_LIST_FILE);
        let ffmetadata = dir.join(FFMETADATA_FILE);

        let result = self
            .concatenate(&plan, &paths, &concat_list, &ffmetadata, &mut stages)
            .await;

        // The descriptor files never outlive the merge
        manager::remove_files([concat_list.as_path(), ffmetadata.as_path()]).await;

        let (output, chapter_markers, cover) = match result {
            Ok(done) => done,
            Err(e) => {
                enter(&mut stages, MergeStage::Failed);
                return Err(e);
            }
        };

        let output_bytes = manager::file_size(&output).await.unwrap_or(0);
        let size_mb = (output_bytes as f64 / (1024.0 * 1024.0) * 10.0).round() / 10.0;
        tracing::info!(
            output = %output.display(),
            size_mb,
            chapter_markers,
            "merged audiobook"
        );
        if let Some(cover) = &cover {
            tracing::info!(cover = %cover.display(), "cover image embedded");
        }

        let cleanup = if request.cleanup_chapters {
            enter(&mut stages, MergeStage::Cleanup);
            let report = manager::remove_files(plan.chapter_paths()).await;
            if report.is_complete() {
                tracing::info!(removed = report.removed.len(), "chapter files cleaned up");
            } else {
                tracing::warn!(failed = report.failed.len(), "some chapter files could not be removed");
            }
            Some(report)
        } else {
            tracing::info!("chapter files preserved");
            None
        };

        enter(&mut stages, MergeStage::Done);

        Ok(MergeOutcome {
            output,
            chapter_markers,
            chapters: plan.chapter_count(),
            unprobed_chapters,
            cover_embedded: cover.is_some(),
            output_bytes,
            cleanup,
            stages,
        })
    }

    /// Write the descriptors and run the transcoder, falling back on failure
    ///
    /// Returns the output path, whether it carries chapter markers and the
    /// cover that was used.
    async fn concatenate(
        &self,
        plan: &MergePlan,
        paths: &ResourcePaths,
        concat_list: &Path,
        ffmetadata: &Path,
        stages: &mut Vec<MergeStage>,
    ) -> Result<(PathBuf, bool, Option<PathBuf>)> {
        tokio::fs::write(concat_list, plan.concat_list())
            .await
            .map_err(|e| DownloaderError::file_io("write concat list", concat_list, e))?;
        tokio::fs::write(ffmetadata, plan.ffmetadata())
            .await
            .map_err(|e| DownloaderError::file_io("write ffmetadata", ffmetadata, e))?;

        let cover = find_cover(paths).await;

        enter(stages, MergeStage::Concatenating);
        let request = ConcatRequest {
            concat_list: concat_list.to_path_buf(),
            ffmetadata: ffmetadata.to_path_buf(),
            cover: cover.clone(),
            tags: plan.tags().clone(),
            output: paths.merged_output(),
        };

        match self.transcoder.concat(&request).await {
            Ok(()) => Ok((request.output, true, cover)),
            Err(e) if e.is_transcode_error() => {
                tracing::warn!(error = %e, "concatenation failed, falling back to re-encoding");
                enter(stages, MergeStage::FallbackConcatenating);

                // No `_complete` file may survive a failed concatenation
                manager::remove_file_if_exists(&request.output).await?;

                let output = paths.fallback_output();
                let chapter_paths: Vec<PathBuf> = plan.chapter_paths().map(Path::to_path_buf).collect();
                self.fallback
                    .merge(&chapter_paths, plan.tags(), &output)
                    .await
                    .map_err(|e| match e {
                        DownloaderError::FallbackMergeFailed(_) => e,
                        other => DownloaderError::FallbackMergeFailed(other.to_string()),
                    })?;
                Ok((output, false, None))
            }
            Err(e) => Err(e),
        }
    }

    /// Merge an existing directory, using `<dir>/<dirname>.json` for tags
    pub async fn merge_directory(
        &self,
        dir: &Path,
        overrides: &TagSet,
        cleanup_chapters: bool,
    ) -> Result<MergeOutcome> {
        let paths = ResourcePaths::for_directory(dir);
        let tags = resolve_tags(&paths, overrides).await?;
        self.merge(&MergeRequest {
            paths,
            tags,
            cleanup_chapters,
        })
        .await
    }

    /// Merge every audiobook directory under `library`
    ///
    /// Per-book failures are logged and counted; they do not stop the batch.
    pub async fn merge_library(&self, library: &Path, options: &BatchOptions) -> Result<BatchSummary> {
        let dirs = list_subdirectories(library).await?;
        let mut summary = BatchSummary {
            total: dirs.len(),
            ..Default::default()
        };

        for dir in dirs {
            let paths = ResourcePaths::for_directory(&dir);
            if !options.force && manager::file_exists(&paths.merged_output()).await {
                tracing::info!(dir = %dir.display(), "already merged, skipping");
                summary.skipped.push(dir);
                continue;
            }

            match self
                .merge_directory(&dir, &options.overrides, options.cleanup_chapters)
                .await
            {
                Ok(outcome) => summary.merged.push(outcome.output),
                Err(e) => {
                    tracing::error!(dir = %dir.display(), error = %e, "merge failed");
                    summary.failed.push((dir, e.to_string()));
                }
            }
        }

        tracing::info!(
            merged = summary.merged.len(),
            total = summary.total,
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "batch merge finished"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for AudiobookAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudiobookAssembler").finish_non_exhaustive()
    }
}

/// Tags for a directory: its descriptor if present, otherwise the minimal
/// set, with `overrides` applied last
pub async fn resolve_tags(paths: &ResourcePaths, overrides: &TagSet) -> Result<TagSet> {
    let mut tags = match AudiobookMetadata::load(&paths.descriptor(), paths.name()).await? {
        Some(metadata) => metadata.to_tags(),
        None => fallback_tags(paths.name()),
    };
    tags.apply(overrides);
    Ok(tags)
}

/// First of `<name>.jpeg`, `<name>.jpg`, `<name>.png` that exists
pub async fn find_cover(paths: &ResourcePaths) -> Option<PathBuf> {
    for extension in COVER_EXTENSIONS {
        let candidate = paths.file(extension);
        if manager::file_exists(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

fn enter(stages: &mut Vec<MergeStage>, stage: MergeStage) {
    tracing::debug!(?stage, "merge stage");
    stages.push(stage);
}

async fn list_subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    if !tokio::fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Err(DownloaderError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| DownloaderError::file_io("read directory", dir, e))?;

    let mut dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DownloaderError::file_io("read directory", dir, e))?
    {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.path());
        }
    }

    dirs.sort();
    Ok(dirs)
}
