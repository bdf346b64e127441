//! Bookmate downloader core
//!
//! Downloads books, audiobooks, comics, serials and series from the Bookmate
//! content API into a local library, and merges audiobook chapters into a
//! single tagged file with chapter markers.
//!
//! # Module Organization
//!
//! - `api` - token, headers, endpoints and response models
//! - `download` - HTTP fetches with retry and redirect handling
//! - `file` - library layout and filesystem helpers
//! - `resource` - resource kinds and the per-kind dispatcher
//! - `audio` - chapter probing, planning and merging
//! - `convert` - epub to fb2 and comic pages to pdf
//! - `logging` - console tracing setup

pub mod api;
pub mod audio;
pub mod convert;
pub mod download;
pub mod error;
pub mod file;
pub mod logging;
pub mod resource;

pub use error::{DownloaderError, Result};

pub use api::{load_token, AuthToken, Bitrate, ClientConfig, HttpResponse, HttpTransport, ReqwestTransport};
pub use audio::{AudiobookAssembler, BatchOptions, BatchSummary, FfmpegTools, MergeOutcome, MergeRequest, TagSet};
pub use download::{Downloader, RetryPolicy};
pub use file::{LibraryLayout, ResourcePaths};
pub use resource::{DispatchOptions, DispatchSummary, Dispatcher, ResourceKind, SeriesSlot};
