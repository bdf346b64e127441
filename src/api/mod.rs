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


//! Bookmate content API
//!
//! The API is read-only from the downloader's point of view: every call is an
//! authenticated GET for a descriptor, a content listing or raw bytes. This
//! module owns the request side (configuration, headers, endpoints, wire
//! models); the retry behaviour lives in [`crate::download`].

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod models;

// Re-export commonly used types
pub use auth::{load_token, AuthToken};
pub use client::{ClientConfig, HttpResponse, HttpTransport, ReqwestTransport};
pub use models::Bitrate;
