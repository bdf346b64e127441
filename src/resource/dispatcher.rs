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


//! Resource dispatch
//!
//! Maps a `(kind, uuid)` pair to its handler. Every handler first fetches the
//! descriptor, stores it as `<name>.json` beside the cover `<name>.jpeg`, then
//! fetches the kind's content:
//!
//! - book: epub, converted to fb2
//! - audiobook: every missing chapter, then the merge
//! - comicbook: page archive, extracted and rendered to pdf
//! - serial: each episode as a book in `<n>. <title>/`
//! - series: each part dispatched again with its position in the series
//!
//! Work is strictly sequential: one resource, one file at a time.

use crate::api::endpoints::{content_url, direct_track_url, info_url};
use crate::api::models::{Bitrate, ComicMetadata, EpisodeList, PartList, TrackList};
use crate::audio::merge::{AudiobookAssembler, MergeOutcome, MergeRequest};
use crate::audio::metadata::{fallback_tags, AudiobookMetadata, TagSet};
use crate::convert::comic::{extract_archive, ComicAssembler, PdfComicAssembler, PREVIEW_FOLDER};
use crate::convert::ebook::{EbookConverter, Fb2Converter};
use crate::download::Downloader;
use crate::error::{DownloaderError, Result};
use crate::file::manager;
use crate::file::paths::{resource_name, LibraryLayout, ResourcePaths};
use crate::resource::{Resource, ResourceKind, SeriesSlot};
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Scratch folder comic pages are extracted into
const COMIC_PAGES_FOLDER: &str = "pages";

/// Options for a download run
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub layout: LibraryLayout,
    pub bitrate: Bitrate,
    /// Merge audiobook chapters after downloading them
    pub merge_chapters: bool,
    /// Delete chapter files after a successful merge
    pub cleanup_chapters: bool,
    /// Tags applied on top of the descriptor's tags when merging
    pub extra_tags: TagSet,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            layout: LibraryLayout::default(),
            bitrate: Bitrate::Max,
            merge_chapters: true,
            cleanup_chapters: true,
            extra_tags: TagSet::new(),
        }
    }
}

/// A resource whose handler ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledResource {
    pub kind: ResourceKind,
    pub uuid: String,
    pub dir: PathBuf,
    pub slot: Option<SeriesSlot>,
}

/// What a run did
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    pub resources: Vec<HandledResource>,
    pub chapters_downloaded: usize,
    /// Chapters already on disk
    pub chapters_skipped: usize,
    pub merges: Vec<MergeOutcome>,
}

/// Top-level control for one download run
pub struct Dispatcher {
    downloader: Downloader,
    options: DispatchOptions,
    assembler: AudiobookAssembler,
    ebook: Arc<dyn EbookConverter>,
    comic: Arc<dyn ComicAssembler>,
}

impl Dispatcher {
    pub fn new(downloader: Downloader, options: DispatchOptions, assembler: AudiobookAssembler) -> Self {
        Self {
            downloader,
            options,
            assembler,
            ebook: Arc::new(Fb2Converter),
            comic: Arc::new(PdfComicAssembler::default()),
        }
    }

    pub fn with_ebook_converter(mut self, converter: Arc<dyn EbookConverter>) -> Self {
        self.ebook = converter;
        self
    }

    pub fn with_comic_assembler(mut self, assembler: Arc<dyn ComicAssembler>) -> Self {
        self.comic = assembler;
        self
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Download one resource given its kind as a string
    ///
    /// An unknown kind fails before any request is made.
    pub async fn run(&self, kind: &str, uuid: &str) -> Result<DispatchSummary> {
        let kind: ResourceKind = kind.parse()?;
        let mut summary = DispatchSummary::default();
        self.dispatch(kind, uuid, None, &mut summary).await?;
        Ok(summary)
    }

    /// Run the handler for `kind`, placing the result in `slot` if given
    pub fn dispatch<'a>(
        &'a self,
        kind: ResourceKind,
        uuid: &'a str,
        slot: Option<SeriesSlot>,
        summary: &'a mut DispatchSummary,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            tracing::info!(%kind, uuid, position = slot.as_ref().map(|s| s.position), "dispatching");

            let (resource, paths) = self.fetch_resource(kind, uuid, slot.as_ref()).await?;

            summary.resources.push(HandledResource {
                kind,
                uuid: uuid.to_string(),
                dir: paths.dir().to_path_buf(),
                slot,
            });

            match kind {
                ResourceKind::Book => self.handle_book(uuid, &paths).await,
                ResourceKind::Audiobook => self.handle_audiobook(&resource, &paths, summary).await,
                ResourceKind::Comicbook => self.handle_comicbook(uuid, &paths).await,
                ResourceKind::Serial => self.handle_serial(uuid, &paths).await,
                ResourceKind::Series => self.handle_series(&resource, summary).await,
            }
        }
        .boxed()
    }

    /// Fetch and persist the descriptor and cover
    async fn fetch_resource(
        &self,
        kind: ResourceKind,
        uuid: &str,
        slot: Option<&SeriesSlot>,
    ) -> Result<(Resource, ResourcePaths)> {
        let base = self.downloader.config().base_url();
        let descriptor: Value = self.downloader.fetch_json(&info_url(base, kind, uuid)).await?;
        let resource = Resource::from_descriptor(kind, uuid, descriptor)?;

        let paths = self.options.layout.resource(kind, &resource.title, uuid, slot);
        manager::ensure_directory(paths.dir()).await?;

        self.downloader
            .download_to_file(&resource.cover_url, &paths.cover())
            .await?;

        let json = serde_json::to_vec(&resource.descriptor)?;
        manager::atomic_write(&paths.descriptor(), &json).await?;
        tracing::info!(path = %paths.descriptor().display(), "descriptor saved");

        Ok((resource, paths))
    }

    async fn handle_book(&self, uuid: &str, paths: &ResourcePaths) -> Result<()> {
        let base = self.downloader.config().base_url();
        let epub = paths.file("epub");

        self.downloader
            .download_to_file(&content_url(base, ResourceKind::Book, uuid), &epub)
            .await?;
        self.ebook.convert(&epub, &paths.file("fb2"), paths.name()).await
    }

    async fn handle_audiobook(
        &self,
        resource: &Resource,
        paths: &ResourcePaths,
        summary: &mut DispatchSummary,
    ) -> Result<()> {
        let base = self.downloader.config().base_url();
        let listing_url = content_url(base, ResourceKind::Audiobook, &resource.uuid);
        let tracks: TrackList = self.downloader.fetch_json(&listing_url).await?;

        for track in &tracks.tracks {
            let index = track.chapter_index().ok_or_else(|| {
                DownloaderError::invalid_response(
                    &listing_url,
                    format!("track number {} is out of range", track.number),
                )
            })?;
            let destination = paths.chapter(index);
            if manager::file_exists(&destination).await {
                tracing::debug!(chapter = index, "already downloaded");
                summary.chapters_skipped += 1;
                continue;
            }

            let url = track.url_for(self.options.bitrate).ok_or_else(|| {
                DownloaderError::invalid_response(
                    &listing_url,
                    format!("track {} has no offline url", track.number),
                )
            })?;
            self.downloader
                .download_to_file(&direct_track_url(url), &destination)
                .await?;
            summary.chapters_downloaded += 1;
        }

        if !self.options.merge_chapters {
            tracing::info!(dir = %paths.dir().display(), "chapters saved separately");
            return Ok(());
        }

        let mut tags = AudiobookMetadata::from_descriptor(&resource.descriptor, paths.name())
            .map(|metadata| metadata.to_tags())
            .unwrap_or_else(|| fallback_tags(paths.name()));
        tags.apply(&self.options.extra_tags);

        let outcome = self
            .assembler
            .merge(&MergeRequest {
                paths: paths.clone(),
                tags,
                cleanup_chapters: self.options.cleanup_chapters,
            })
            .await?;
        summary.merges.push(outcome);
        Ok(())
    }

    async fn handle_comicbook(&self, uuid: &str, paths: &ResourcePaths) -> Result<()> {
        let base = self.downloader.config().base_url();
        let metadata: ComicMetadata = self
            .downloader
            .fetch_json(&content_url(base, ResourceKind::Comicbook, uuid))
            .await?;

        let archive = paths.file("cbr");
        self.downloader.download_to_file(&metadata.uris.zip, &archive).await?;

        let pages_dir = paths.dir().join(COMIC_PAGES_FOLDER);
        let extract_dir = pages_dir.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_archive(&archive, &extract_dir)).await??;
        tracing::debug!(files = extracted, "comic archive extracted");

        manager::remove_dir_if_exists(&pages_dir.join(PREVIEW_FOLDER)).await?;
        self.comic.assemble(&pages_dir, &paths.file("pdf")).await?;
        manager::remove_dir_if_exists(&pages_dir).await
    }

    async fn handle_serial(&self, uuid: &str, paths: &ResourcePaths) -> Result<()> {
        let base = self.downloader.config().base_url();
        let listing: EpisodeList = self
            .downloader
            .fetch_json(&content_url(base, ResourceKind::Serial, uuid))
            .await?;

        tracing::info!(episodes = listing.episodes.len(), "downloading serial");
        for (i, episode) in listing.episodes.iter().enumerate() {
            let episode_paths = paths.episode(i + 1, &episode.title);
            manager::ensure_directory(episode_paths.dir()).await?;
            self.handle_book(&episode.uuid, &episode_paths).await?;
        }
        Ok(())
    }

    async fn handle_series(&self, series: &Resource, summary: &mut DispatchSummary) -> Result<()> {
        let base = self.downloader.config().base_url();
        let listing: PartList = self
            .downloader
            .fetch_json(&content_url(base, ResourceKind::Series, &series.uuid))
            .await?;

        tracing::info!(series = %series.title, parts = listing.parts.len(), "downloading series");
        for (i, part) in listing.parts.iter().enumerate() {
            let kind: ResourceKind = part.resource_type.parse()?;
            let slot = SeriesSlot::new(resource_name(&series.title, &series.uuid), i + 1);
            self.dispatch(kind, &part.resource.uuid, Some(slot), summary).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
