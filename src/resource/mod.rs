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


//! Resource model and dispatch
//!
//! Every download starts from a `(kind, uuid)` pair. The kind is a closed
//! enum so the dispatcher's match over it is exhaustive: adding a kind is a
//! compile-time checked change.
//!
//! ## Kinds
//! - `book` - epub content, converted to fb2
//! - `audiobook` - per-chapter m4a tracks, optionally merged
//! - `comicbook` - zipped page images, rendered to pdf
//! - `serial` - a book split into episodes, each downloaded as a book
//! - `series` - an ordered list of parts of any other kind

pub mod dispatcher;

pub use dispatcher::{DispatchOptions, DispatchSummary, Dispatcher};

use crate::error::{DownloaderError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Resource kinds served by the content API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Book,
    Audiobook,
    Comicbook,
    Serial,
    Series,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Book,
        ResourceKind::Audiobook,
        ResourceKind::Comicbook,
        ResourceKind::Serial,
        ResourceKind::Series,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Audiobook => "audiobook",
            Self::Comicbook => "comicbook",
            Self::Serial => "serial",
            Self::Series => "series",
        }
    }

    /// Key under which the descriptor endpoint nests the resource.
    ///
    /// Serials are described by the book endpoint.
    pub fn descriptor_key(&self) -> &'static str {
        match self {
            Self::Serial => ResourceKind::Book.as_str(),
            other => other.as_str(),
        }
    }

    /// Top-level library folder for standalone resources of this kind
    pub fn library_folder(&self) -> &'static str {
        self.descriptor_key()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = DownloaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "book" => Ok(Self::Book),
            "audiobook" => Ok(Self::Audiobook),
            "comicbook" => Ok(Self::Comicbook),
            "serial" => Ok(Self::Serial),
            "series" => Ok(Self::Series),
            other => Err(DownloaderError::UnknownResourceType(other.to_string())),
        }
    }
}

/// Position of a resource inside a series
///
/// Parts of a series land in `<root>/series/<series name>/<position>. <name>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSlot {
    pub series_name: String,
    /// 1-based position in the parts list
    pub position: usize,
}

impl SeriesSlot {
    pub fn new<S: Into<String>>(series_name: S, position: usize) -> Self {
        Self {
            series_name: series_name.into(),
            position,
        }
    }

    /// Name prefix for the part's directory: `"<position>. "`
    pub fn prefix(&self) -> String {
        format!("{}. ", self.position)
    }
}

/// A resource whose descriptor has been fetched and persisted
#[derive(Debug, Clone)]
pub struct Resource {
    pub uuid: String,
    pub kind: ResourceKind,
    pub title: String,
    pub cover_url: String,
    /// Raw descriptor exactly as returned by the API
    pub descriptor: Value,
}

impl Resource {
    /// Build a resource from the descriptor endpoint's JSON
    pub fn from_descriptor(kind: ResourceKind, uuid: &str, descriptor: Value) -> Result<Self> {
        let body = descriptor.get(kind.descriptor_key()).ok_or_else(|| {
            DownloaderError::invalid_response(
                uuid,
                format!("descriptor has no '{}' object", kind.descriptor_key()),
            )
        })?;

        let title = body
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| DownloaderError::invalid_response(uuid, "descriptor has no title"))?
            .to_string();

        let cover_url = body
            .pointer("/cover/large")
            .and_then(Value::as_str)
            .ok_or_else(|| DownloaderError::invalid_response(uuid, "descriptor has no cover.large"))?
            .to_string();

        Ok(Self {
            uuid: uuid.to_string(),
            kind,
            title,
            cover_url,
            descriptor,
        })
    }
}

/// One downloaded audio track of an audiobook
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    /// 1-based chapter number (declared track number + 1)
    pub index: u32,
    /// Track URL, unknown when the chapter was discovered on disk
    pub source_url: Option<String>,
    pub local_path: PathBuf,
    /// Playable duration in seconds, `None` until probed
    pub duration: Option<f64>,
}

impl Chapter {
    pub fn on_disk(index: u32, local_path: PathBuf) -> Self {
        Self {
            index,
            source_url: None,
            local_path,
            duration: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_configuration_error() {
        let err = "podcast".parse::<ResourceKind>().unwrap_err();
        assert!(matches!(err, DownloaderError::UnknownResourceType(k) if k == "podcast"));
    }

    #[test]
    fn test_serial_uses_book_descriptor() {
        assert_eq!(ResourceKind::Serial.descriptor_key(), "book");
        assert_eq!(ResourceKind::Serial.library_folder(), "book");
        assert_eq!(ResourceKind::Comicbook.descriptor_key(), "comicbook");
    }

    #[test]
    fn test_series_slot_prefix() {
        assert_eq!(SeriesSlot::new("Saga", 1).prefix(), "1. ");
        assert_eq!(SeriesSlot::new("Saga", 12).prefix(), "12. ");
    }

    #[test]
    fn test_resource_from_descriptor() {
        let descriptor = json!({
            "audiobook": {
                "title": "Мастер и Маргарита",
                "cover": { "large": "https://img.example/cover.jpeg" }
            }
        });
        let resource =
            Resource::from_descriptor(ResourceKind::Audiobook, "abc", descriptor).unwrap();
        assert_eq!(resource.title, "Мастер и Маргарита");
        assert_eq!(resource.cover_url, "https://img.example/cover.jpeg");
    }

    #[test]
    fn test_resource_requires_kind_key() {
        let descriptor = json!({ "book": { "title": "x", "cover": { "large": "u" } } });
        let err = Resource::from_descriptor(ResourceKind::Audiobook, "abc", descriptor).unwrap_err();
        assert!(matches!(err, DownloaderError::InvalidApiResponse { .. }));
    }
}
