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


//! Format conversion for downloaded books and comics
//!
//! - `ebook` - epub to fb2 (`EbookConverter`, `Fb2Converter`)
//! - `comic` - page archive extraction and pdf assembly (`ComicAssembler`,
//!   `PdfComicAssembler`)

pub mod comic;
pub mod ebook;

// Re-export commonly used types
pub use comic::{ComicAssembler, PdfComicAssembler};
pub use ebook::{EbookConverter, Fb2Converter};
