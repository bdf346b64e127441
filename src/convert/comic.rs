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


//! Comic archive extraction and PDF assembly
//!
//! A comic arrives as a zip archive (`.cbr`) of JPEG pages plus a `preview/`
//! folder. Pages are extracted beside the archive, the preview folder is
//! dropped, and the pages are laid out one per Letter-size PDF page.

use crate::error::{DownloaderError, Result};
use futures_util::future::{BoxFuture, FutureExt};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::fs::File;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Folder of low-resolution previews shipped inside comic archives
pub const PREVIEW_FOLDER: &str = "preview";

/// US Letter in PDF points
const PAGE_WIDTH: i64 = 612;
const PAGE_HEIGHT: i64 = 792;

const PAGE_JPEG_QUALITY: u8 = 90;

/// Capability to render a folder of page images into one document
pub trait ComicAssembler: Send + Sync {
    /// Returns the number of pages written
    fn assemble<'a>(&'a self, pages_dir: &'a Path, output: &'a Path) -> BoxFuture<'a, Result<usize>>;
}

/// Extract every entry of a zip archive into `dest`
///
/// Entries whose names would escape `dest` are skipped. Returns the number of
/// files written.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path).map_err(|e| DownloaderError::file_io("open archive", archive_path, e))?;
    let mut archive = ZipArchive::new(file)?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = match entry.enclosed_name() {
            Some(name) => name.to_path_buf(),
            None => {
                tracing::warn!(entry = %entry.name(), "skipping archive entry with unsafe path");
                continue;
            }
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| DownloaderError::file_io("create directory", &target, e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DownloaderError::file_io("create directory", parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| DownloaderError::file_io("create", &target, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| DownloaderError::file_io("extract", &target, e))?;
        written += 1;
    }

    Ok(written)
}

/// JPEG pages directly inside `dir`, in natural name order
pub fn list_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| DownloaderError::file_io("read directory", dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("jpeg") || ext.eq_ignore_ascii_case("jpg"))
                .unwrap_or(false)
        })
        .collect();

    pages.sort_by_key(|path| natural_key(path));
    Ok(pages)
}

/// Sort key splitting a file stem into text and number runs
fn natural_key(path: &Path) -> Vec<(String, u64)> {
    let stem = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let mut key = Vec::new();
    let mut text = String::new();
    let mut digits = String::new();

    for c in stem.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            if !digits.is_empty() {
                key.push((std::mem::take(&mut text), digits.parse().unwrap_or(u64::MAX)));
                digits.clear();
            }
            text.push(c);
        }
    }
    key.push((text, digits.parse().unwrap_or(0)));
    key
}

/// Writes one image per page, stretched to US Letter
#[derive(Debug, Clone, Default)]
pub struct PdfComicAssembler {
    /// Keep page images after the PDF is written
    pub keep_pages: bool,
}

impl PdfComicAssembler {
    fn build(pages: &[PathBuf], output: &Path) -> Result<()> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

        for page in pages {
            let (width, height, jpeg) = encode_page(page)?;

            let image = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8i64,
                    "Filter" => "DCTDecode",
                },
                jpeg,
            )
            .with_compression(false);
            let image_id = doc.add_object(image);

            let content = Content {
                operations: vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            Object::Integer(PAGE_WIDTH),
                            Object::Integer(0),
                            Object::Integer(0),
                            Object::Integer(PAGE_HEIGHT),
                            Object::Integer(0),
                            Object::Integer(0),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                    Operation::new("Q", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let resources_id = doc.add_object(dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            });

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(PAGE_WIDTH),
                    Object::Integer(PAGE_HEIGHT),
                ],
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        doc.save(output)?;
        Ok(())
    }
}

/// Decode a page and re-encode it as a baseline RGB JPEG
fn encode_page(path: &Path) -> Result<(u32, u32, Vec<u8>)> {
    let bytes = std::fs::read(path).map_err(|e| DownloaderError::file_io("read page", path, e))?;
    let rgb = image::load_from_memory(&bytes)?.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut jpeg = Vec::new();
    DynamicImage::ImageRgb8(rgb).write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, PAGE_JPEG_QUALITY))?;
    Ok((width, height, jpeg))
}

impl ComicAssembler for PdfComicAssembler {
    fn assemble<'a>(&'a self, pages_dir: &'a Path, output: &'a Path) -> BoxFuture<'a, Result<usize>> {
        let pages_dir = pages_dir.to_path_buf();
        let output = output.to_path_buf();
        let keep_pages = self.keep_pages;

        async move {
            let count = tokio::task::spawn_blocking(move || -> Result<usize> {
                let pages = list_pages(&pages_dir)?;
                if pages.is_empty() {
                    return Err(DownloaderError::ConversionFailed(format!(
                        "no page images in {}",
                        pages_dir.display()
                    )));
                }

                Self::build(&pages, &output)?;

                if !keep_pages {
                    for page in &pages {
                        if let Err(e) = std::fs::remove_file(page) {
                            tracing::warn!(page = %page.display(), error = %e, "could not remove page image");
                        }
                    }
                }

                tracing::info!(path = %output.display(), pages = pages.len(), "pdf saved");
                Ok(pages.len())
            })
            .await??;

            Ok(count)
        }
        .boxed()
    }
}
