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


//! Audiobook metadata and the tag set written into the merged file
//!
//! Metadata comes from the persisted resource descriptor
//! (`{"audiobook": {...}}`). When no descriptor is available, a minimal tag
//! set is derived from the directory name instead.
//!
//! Tags are kept in a [`TagSet`]: insertion ordered, one value per key, and
//! empty values never stored.

use crate::error::{DownloaderError, Result};
use serde_json::Value;
use std::path::Path;

pub const DEFAULT_ARTIST: &str = "Unknown Author";
pub const DEFAULT_LANGUAGE: &str = "ru";
pub const AUDIOBOOK_GENRE: &str = "Audiobook";

/// iTunes media kind for audiobooks
pub const AUDIOBOOK_MEDIA_TYPE: &str = "2";

/// Ordered key/value tags with unique keys and no empty values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    entries: Vec<(String, String)>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any existing value in place.
    ///
    /// An empty (or whitespace only) value removes the key.
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();

        if value.trim().is_empty() {
            self.remove(&key);
            return;
        }

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Apply every entry of `overrides` on top of this set
    pub fn apply(&mut self, overrides: &TagSet) {
        for (key, value) in overrides.iter() {
            self.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `key=value` pairs; the value may itself contain `=`
    pub fn parse_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags = TagSet::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                DownloaderError::InvalidConfiguration(format!("tag '{}' is not key=value", pair))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(DownloaderError::InvalidConfiguration(format!(
                    "tag '{}' has an empty key",
                    pair
                )));
            }
            tags.insert(key, value);
        }
        Ok(tags)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut tags = TagSet::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

/// Metadata of one audiobook, derived once from its descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudiobookMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    pub composer: String,
    pub genre: String,
    pub media_type: String,
    /// Narrators joined with ", "
    pub narrator: Option<String>,
    pub publisher: Option<String>,
    pub language: String,
    /// Annotation
    pub comment: String,
}

impl AudiobookMetadata {
    /// Extract metadata from a descriptor
    ///
    /// Returns `None` when the descriptor has no `audiobook` object.
    /// `fallback_title` is used when the descriptor has no title.
    pub fn from_descriptor(descriptor: &Value, fallback_title: &str) -> Option<Self> {
        let book = descriptor.get("audiobook")?;

        let artist = first_name(book, "authors").unwrap_or_else(|| DEFAULT_ARTIST.to_string());

        let narrator = book
            .get("narrators")
            .and_then(Value::as_array)
            .map(|narrators| {
                narrators
                    .iter()
                    .filter_map(|n| n.get("name").and_then(Value::as_str))
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|joined| !joined.is_empty());

        let title = string_field(book, "title").unwrap_or_else(|| fallback_title.to_string());

        Some(Self {
            album: title.clone(),
            title,
            album_artist: artist.clone(),
            composer: artist.clone(),
            artist,
            genre: AUDIOBOOK_GENRE.to_string(),
            media_type: AUDIOBOOK_MEDIA_TYPE.to_string(),
            narrator,
            publisher: first_name(book, "publishers"),
            language: string_field(book, "language")
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            comment: string_field(book, "annotation").unwrap_or_default(),
        })
    }

    /// Read and extract the descriptor at `path`, if it exists
    pub async fn load(path: &Path, fallback_title: &str) -> Result<Option<Self>> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DownloaderError::file_io("read descriptor", path, e)),
        };

        let descriptor: Value = serde_json::from_slice(&raw)?;
        Ok(Self::from_descriptor(&descriptor, fallback_title))
    }

    /// Tag set in container-tag naming; empty fields are dropped
    pub fn to_tags(&self) -> TagSet {
        let mut tags = TagSet::new();
        tags.insert("title", self.title.as_str());
        tags.insert("artist", self.artist.as_str());
        tags.insert("album", self.album.as_str());
        tags.insert("album_artist", self.album_artist.as_str());
        tags.insert("composer", self.composer.as_str());
        tags.insert("genre", self.genre.as_str());
        tags.insert("media_type", self.media_type.as_str());
        tags.insert("comment", self.comment.as_str());
        tags.insert("publisher", self.publisher.clone().unwrap_or_default());
        tags.insert("language", self.language.as_str());
        tags.insert("performer", self.narrator.clone().unwrap_or_default());
        tags
    }
}

/// Minimal tag set used when no descriptor is available
pub fn fallback_tags(title: &str) -> TagSet {
    let mut tags = TagSet::new();
    tags.insert("title", title);
    tags.insert("genre", AUDIOBOOK_GENRE);
    tags.insert("media_type", AUDIOBOOK_MEDIA_TYPE);
    tags
}

fn string_field(object: &Value, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_name(object: &Value, list_key: &str) -> Option<String> {
    object
        .get(list_key)
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(|entry| string_field(entry, "name"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_descriptor() {
        let descriptor = json!({
            "audiobook": {
                "title": "Война и мир",
                "authors": [{ "name": "Лев Толстой" }, { "name": "Ignored" }],
                "narrators": [{ "name": "Чтец Один" }, { "name": "" }, { "name": "Чтец Два" }],
                "publishers": [{ "name": "Bookmate" }],
                "annotation": "Роман-эпопея",
                "language": "ru"
            }
        });

        let meta = AudiobookMetadata::from_descriptor(&descriptor, "dir").unwrap();

        assert_eq!(meta.title, "Война и мир");
        assert_eq!(meta.album, "Война и мир");
        assert_eq!(meta.artist, "Лев Толстой");
        assert_eq!(meta.album_artist, "Лев Толстой");
        assert_eq!(meta.composer, "Лев Толстой");
        assert_eq!(meta.narrator.as_deref(), Some("Чтец Один, Чтец Два"));
        assert_eq!(meta.publisher.as_deref(), Some("Bookmate"));
        assert_eq!(meta.genre, "Audiobook");
        assert_eq!(meta.media_type, "2");

        let tags = meta.to_tags();
        assert_eq!(tags.get("performer"), Some("Чтец Один, Чтец Два"));
        assert_eq!(tags.get("comment"), Some("Роман-эпопея"));
        assert_eq!(tags.len(), 11);
    }

    #[test]
    fn test_sparse_descriptor_uses_defaults() {
        let descriptor = json!({ "audiobook": { "authors": [{ "name": "" }] } });

        let meta = AudiobookMetadata::from_descriptor(&descriptor, "Folder Name").unwrap();

        assert_eq!(meta.title, "Folder Name");
        assert_eq!(meta.artist, DEFAULT_ARTIST);
        assert_eq!(meta.language, "ru");
        assert_eq!(meta.narrator, None);

        let tags = meta.to_tags();
        assert_eq!(tags.get("comment"), None);
        assert_eq!(tags.get("publisher"), None);
        assert_eq!(tags.get("performer"), None);
        assert!(tags.iter().all(|(_, v)| !v.is_empty()));
    }

    #[test]
    fn test_non_audiobook_descriptor() {
        let descriptor = json!({ "book": { "title": "x" } });
        assert!(AudiobookMetadata::from_descriptor(&descriptor, "x").is_none());
    }

    #[test]
    fn test_tag_set_insert_replaces_in_place() {
        let mut tags = TagSet::new();
        tags.insert("title", "Old");
        tags.insert("artist", "A");
        tags.insert("title", "New");

        let pairs: Vec<_> = tags.iter().collect();
        assert_eq!(pairs, vec![("title", "New"), ("artist", "A")]);

        tags.insert("artist", "");
        assert_eq!(tags.get("artist"), None);
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let mut tags = fallback_tags("Dir");
        let overrides = TagSet::parse_pairs(["title=Real Title", "comment=a=b"]).unwrap();
        tags.apply(&overrides);

        assert_eq!(tags.get("title"), Some("Real Title"));
        assert_eq!(tags.get("comment"), Some("a=b"));
        assert_eq!(tags.get("genre"), Some("Audiobook"));
        assert_eq!(tags.iter().filter(|(k, _)| *k == "title").count(), 1);
    }

    #[test]
    fn test_parse_pairs_rejects_garbage() {
        assert!(TagSet::parse_pairs(["novalue"]).is_err());
        assert!(TagSet::parse_pairs(["=value"]).is_err());
    }

    #[tokio::test]
    async fn test_load_missing_descriptor() {
        let dir = tempfile::TempDir::new().unwrap();
        let loaded = AudiobookMetadata::load(&dir.path().join("none.json"), "x")
            .await
            .unwrap();
        assert!(loaded.is_none());
    }
}
