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


//! Download primitive
//!
//! Every descriptor, listing, cover, book, comic archive and audio chapter is
//! fetched through [`Downloader`]. Failures are retried by [`RetryPolicy`]; a
//! download that exhausts its attempts ends the run with
//! [`DownloadFailed`](crate::error::DownloaderError::DownloadFailed).

pub mod fetch;
pub mod retry;

// Re-export commonly used types
pub use fetch::{DownloadJob, Downloader};
pub use retry::{Backoff, RetryPolicy};
