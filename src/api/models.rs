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


//! Content listings returned by the API
//!
//! Only the fields the downloader reads are modelled; everything else in the
//! payloads is ignored by serde.

use crate::error::{DownloaderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audio quality tier for audiobook tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bitrate {
    #[default]
    Max,
    Min,
}

impl Bitrate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bitrate::Max => "max",
            Bitrate::Min => "min",
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bitrate {
    type Err = DownloaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "max" => Ok(Bitrate::Max),
            "min" => Ok(Bitrate::Min),
            other => Err(DownloaderError::InvalidConfiguration(format!(
                "unknown bitrate '{}', expected max or min",
                other
            ))),
        }
    }
}

/// `playlists.json`
#[derive(Debug, Clone, Deserialize)]
pub struct TrackList {
    #[serde(default)]
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Track {
    /// 0-based track number
    pub number: u32,
    pub offline: OfflineVariants,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfflineVariants {
    pub max_bit_rate: Option<TrackVariant>,
    pub min_bit_rate: Option<TrackVariant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackVariant {
    pub url: String,
}

impl Track {
    /// 1-based chapter number, `None` when the track number has no successor
    pub fn chapter_index(&self) -> Option<u32> {
        self.number.checked_add(1)
    }

    /// Track URL for the requested tier, falling back to the other tier
    pub fn url_for(&self, bitrate: Bitrate) -> Option<&str> {
        let (preferred, other) = match bitrate {
            Bitrate::Max => (&self.offline.max_bit_rate, &self.offline.min_bit_rate),
            Bitrate::Min => (&self.offline.min_bit_rate, &self.offline.max_bit_rate),
        };
        preferred
            .as_ref()
            .or(other.as_ref())
            .map(|variant| variant.url.as_str())
    }
}

/// `metadata.json` of a comicbook
#[derive(Debug, Clone, Deserialize)]
pub struct ComicMetadata {
    pub uris: ComicUris,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComicUris {
    /// Page archive
    pub zip: String,
}

/// `episodes` listing of a serial
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeList {
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Episode {
    pub uuid: String,
    pub title: String,
}

/// `parts` listing of a series
#[derive(Debug, Clone, Deserialize)]
pub struct PartList {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Part {
    /// Kind string; parsed by the dispatcher so unknown kinds surface as errors
    pub resource_type: String,
    pub resource: PartResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartResource {
    pub uuid: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_track_list_parsing() {
        let list: TrackList = serde_json::from_value(json!({
            "tracks": [
                {
                    "number": 0,
                    "offline": {
                        "max_bit_rate": { "url": "https://cdn/a_hi.m3u8" },
                        "min_bit_rate": { "url": "https://cdn/a_lo.m3u8" }
                    }
                },
                { "number": 1, "offline": { "min_bit_rate": { "url": "https://cdn/b_lo.m3u8" } } }
            ]
        }))
        .unwrap();

        assert_eq!(list.tracks.len(), 2);
        assert_eq!(list.tracks[0].chapter_index(), Some(1));
        assert_eq!(list.tracks[0].url_for(Bitrate::Max), Some("https://cdn/a_hi.m3u8"));
        assert_eq!(list.tracks[0].url_for(Bitrate::Min), Some("https://cdn/a_lo.m3u8"));
        // Missing tier falls back to the one present
        assert_eq!(list.tracks[1].url_for(Bitrate::Max), Some("https://cdn/b_lo.m3u8"));
    }

    #[test]
    fn test_last_track_number_has_no_chapter_index() {
        let list: TrackList = serde_json::from_value(json!({
            "tracks": [{ "number": u32::MAX, "offline": {} }]
        }))
        .unwrap();

        assert_eq!(list.tracks[0].chapter_index(), None);
    }

    #[test]
    fn test_part_list_parsing() {
        let list: PartList = serde_json::from_value(json!({
            "parts": [
                { "resource_type": "book", "resource": { "uuid": "b1", "title": "ignored" } },
                { "resource_type": "audiobook", "resource": { "uuid": "a1" } }
            ]
        }))
        .unwrap();

        assert_eq!(list.parts[0].resource_type, "book");
        assert_eq!(list.parts[1].resource.uuid, "a1");
    }

    #[test]
    fn test_bitrate_from_str() {
        assert_eq!("MAX".parse::<Bitrate>().unwrap(), Bitrate::Max);
        assert_eq!("min".parse::<Bitrate>().unwrap(), Bitrate::Min);
        assert!("medium".parse::<Bitrate>().is_err());
        assert_eq!(Bitrate::default(), Bitrate::Max);
    }
}
