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


//! Content API endpoints per resource kind
//!
//! | kind | descriptor | content |
//! |---|---|---|
//! | book | `/books/{uuid}` | `/books/{uuid}/content/v4` |
//! | audiobook | `/audiobooks/{uuid}` | `/audiobooks/{uuid}/playlists.json` |
//! | comicbook | `/comicbooks/{uuid}` | `/comicbooks/{uuid}/metadata.json` |
//! | serial | `/books/{uuid}` | `/books/{uuid}/episodes` |
//! | series | `/series/{uuid}` | `/series/{uuid}/parts` |

use crate::resource::ResourceKind;

/// Descriptor (info) URL for a resource
pub fn info_url(base_url: &str, kind: ResourceKind, uuid: &str) -> String {
    let collection = match kind {
        ResourceKind::Book | ResourceKind::Serial => "books",
        ResourceKind::Audiobook => "audiobooks",
        ResourceKind::Comicbook => "comicbooks",
        ResourceKind::Series => "series",
    };
    format!("{}/{}/{}", base_url, collection, uuid)
}

/// Content URL for a resource: raw epub bytes or a JSON listing
pub fn content_url(base_url: &str, kind: ResourceKind, uuid: &str) -> String {
    let info = info_url(base_url, kind, uuid);
    let suffix = match kind {
        ResourceKind::Book => "content/v4",
        ResourceKind::Audiobook => "playlists.json",
        ResourceKind::Comicbook => "metadata.json",
        ResourceKind::Serial => "episodes",
        ResourceKind::Series => "parts",
    };
    format!("{}/{}", info, suffix)
}

/// Turn a stream-manifest track URL into the direct-file URL
pub fn direct_track_url(url: &str) -> String {
    url.replace(".m3u8", ".m4a")
}
