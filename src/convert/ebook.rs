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


//! EPUB to FB2 conversion
//!
//! The text of every XHTML document, in manifest order, becomes one `<p>` of a
//! minimal FictionBook. Markup, styles and images are dropped.

use crate::error::{DownloaderError, Result};
use futures_util::future::{BoxFuture, FutureExt};
use quick_xml::events::attributes::Attributes;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// Capability to turn a downloaded epub into the library's text format
pub trait EbookConverter: Send + Sync {
    fn convert<'a>(&'a self, epub: &'a Path, output: &'a Path, title: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Writes FictionBook 2 files
#[derive(Debug, Clone, Default)]
pub struct Fb2Converter;

impl EbookConverter for Fb2Converter {
    fn convert<'a>(&'a self, epub: &'a Path, output: &'a Path, title: &'a str) -> BoxFuture<'a, Result<()>> {
        let epub = epub.to_path_buf();
        let output_path = output.to_path_buf();
        let title = title.to_string();

        async move {
            let paragraphs = tokio::task::spawn_blocking(move || read_documents(&epub)).await??;
            let fb2 = render_fb2(&title, &paragraphs);

            tokio::fs::write(&output_path, fb2)
                .await
                .map_err(|e| DownloaderError::file_io("write fb2", &output_path, e))?;

            tracing::info!(path = %output_path.display(), documents = paragraphs.len(), "fb2 file saved");
            Ok(())
        }
        .boxed()
    }
}

/// Plain text of each XHTML document in the epub
fn read_documents(epub: &Path) -> Result<Vec<String>> {
    let file = File::open(epub).map_err(|e| DownloaderError::file_io("open epub", epub, e))?;
    let mut archive = ZipArchive::new(file)?;

    let documents = match manifest_documents(&mut archive) {
        Some(documents) if !documents.is_empty() => documents,
        _ => archive_documents(&archive),
    };

    let mut texts = Vec::with_capacity(documents.len());
    for name in documents {
        let mut entry = match archive.by_name(&name) {
            Ok(entry) => entry,
            Err(_) => {
                tracing::debug!(document = %name, "listed in manifest but missing from archive");
                continue;
            }
        };
        let mut raw = Vec::new();
        entry
            .read_to_end(&mut raw)
            .map_err(|e| DownloaderError::ConversionFailed(format!("reading {}: {}", name, e)))?;
        texts.push(html_to_text(&String::from_utf8_lossy(&raw)));
    }

    if texts.is_empty() {
        return Err(DownloaderError::ConversionFailed(format!(
            "{} contains no text documents",
            epub.display()
        )));
    }
    Ok(texts)
}

/// XHTML entries of the OPF manifest, as archive paths, in manifest order
fn manifest_documents(archive: &mut ZipArchive<File>) -> Option<Vec<String>> {
    let container = read_entry(archive, "META-INF/container.xml")?;
    let opf_path = find_opf_path(&container)?;
    let opf = read_entry(archive, &opf_path)?;

    let opf_dir = Path::new(&opf_path).parent().map(Path::to_path_buf).unwrap_or_default();

    let documents = manifest_items(&opf)?
        .into_iter()
        .filter(|item| item.media_type == XHTML_MEDIA_TYPE)
        .map(|item| archive_path(&opf_dir, &item.href))
        .collect();

    Some(documents)
}

/// `full-path` of the first `<rootfile>` in container.xml
fn find_opf_path(container: &str) -> Option<String> {
    let mut reader = Reader::from_str(container);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"rootfile" {
                    if let Some(path) = attribute(e.attributes(), b"full-path") {
                        return Some(path);
                    }
                }
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "unreadable container.xml");
                return None;
            }
            _ => (),
        }
        buf.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ManifestItem {
    href: String,
    media_type: String,
}

/// `<item>` entries of the OPF manifest, in document order
fn manifest_items(opf: &str) -> Option<Vec<ManifestItem>> {
    let mut reader = Reader::from_str(opf);
    let mut buf = Vec::new();
    let mut items = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"item" {
                    let href = attribute(e.attributes(), b"href");
                    let media_type = attribute(e.attributes(), b"media-type");
                    if let (Some(href), Some(media_type)) = (href, media_type) {
                        items.push(ManifestItem { href, media_type });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, "unreadable OPF manifest");
                return None;
            }
            _ => (),
        }
        buf.clear();
    }

    Some(items)
}

/// Unescaped value of the attribute whose local name is `name`
fn attribute(attributes: Attributes<'_>, name: &[u8]) -> Option<String> {
    attributes
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(|value| value.into_owned()))
}

/// Every `.xhtml`/`.html`/`.htm` entry, in archive order
fn archive_documents(archive: &ZipArchive<File>) -> Vec<String> {
    archive
        .file_names()
        .filter(|name| {
            let lower = name.to_ascii_lowercase();
            lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
        })
        .map(str::to_string)
        .collect()
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut text = String::new();
    entry.read_to_string(&mut text).ok()?;
    Some(text)
}

fn archive_path(base: &Path, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let joined: PathBuf = base.join(href);
    joined.to_string_lossy().replace('\\', "/")
}

/// Elements whose content is never text
fn is_skipped_element(name: &[u8]) -> bool {
    matches!(name, b"head" | b"script" | b"style")
}

/// Text content of an XHTML document, without `<head>`, scripts and styles
///
/// Stops at the first malformed construct and keeps what was read so far.
pub fn html_to_text(html: &str) -> String {
    let mut reader = Reader::from_str(html);
    reader.check_end_names(false);
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if is_skipped_element(e.local_name().as_ref()) => skip_depth += 1,
            Ok(Event::End(e)) if is_skipped_element(e.local_name().as_ref()) => {
                skip_depth = skip_depth.saturating_sub(1)
            }
            Ok(Event::Text(e)) if skip_depth == 0 => match e.unescape_with(resolve_html_entity) {
                Ok(chunk) => text.push_str(&chunk),
                Err(_) => text.push_str(&String::from_utf8_lossy(&e)),
            },
            Ok(Event::CData(e)) if skip_depth == 0 => text.push_str(&String::from_utf8_lossy(&e)),
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, position = reader.buffer_position(), "malformed xhtml");
                break;
            }
            _ => (),
        }
        buf.clear();
    }

    text.trim().to_string()
}

/// XML's predefined entities plus the HTML ones common in books
fn resolve_html_entity(entity: &str) -> Option<&'static str> {
    let value = match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "hellip" => "\u{2026}",
        _ => return None,
    };
    Some(value)
}

/// Escape text for XML element content
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Minimal FictionBook document
pub fn render_fb2(title: &str, paragraphs: &[String]) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <FictionBook xmlns=\"http://www.gribuser.ru/xml/fictionbook/2.0\" xmlns:l=\"http://www.w3.org/1999/xlink\">\n",
    );
    out.push_str("<description><title-info><book-title>");
    out.push_str(&xml_escape(title));
    out.push_str("</book-title></title-info></description>\n<body><section>\n");
    for paragraph in paragraphs {
        out.push_str("<p>");
        out.push_str(&xml_escape(paragraph));
        out.push_str("</p>\n");
    }
    out.push_str("</section></body>\n</FictionBook>\n");
    out
}
