//! EPUB extractor
//!
//! One content unit per spine document. The archive is read with `zip`,
//! package and navigation documents with quick-xml, chapter markup is
//! cleaned with lol_html.
//!
//! Parsing is CPU-bound and runs on the blocking pool.

mod content;
mod package;
mod toc;

use std::collections::HashSet;
use std::io::{Cursor, Read};

use async_trait::async_trait;
use zip::ZipArchive;

use crate::extraction::{
    finish, CancelToken, ContentUnit, Extractor, ExtractionRequest, ExtractionResult, InlineImage,
    Result, SourceFormat, TextSource, TocEntry, UnitType, WarningCode,
};
use crate::formats::xml::XmlError;

pub use content::clean_chapter;
pub use package::{normalize_path, parent_dir, resolve_href};

use package::{ManifestItem, Package};
use toc::NavPoint;

/// EPUB archive errors
#[derive(Debug, thiserror::Error)]
pub enum EpubError {
    #[error("Failed to read ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid XML: {0}")]
    Xml(#[from] XmlError),

    #[error("Invalid EPUB: {0}")]
    Invalid(String),
}

/// Extractor for `.epub`
#[derive(Debug, Default, Clone, Copy)]
pub struct EpubExtractor;

impl EpubExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for EpubExtractor {
    fn format(&self) -> SourceFormat {
        SourceFormat::Epub
    }

    async fn extract(&self, request: ExtractionRequest, cancel: &CancelToken) -> Result<ExtractionResult> {
        cancel.check()?;
        let options = request.options.clone();

        let result = tokio::task::spawn_blocking(move || extract_epub(&request.data))
            .await
            .unwrap_or_else(|e| {
                ExtractionResult::failed(
                    SourceFormat::Epub,
                    WarningCode::ParseError,
                    format!("EPUB extraction aborted: {}", e),
                )
            });

        cancel.check()?;
        Ok(finish(result, &options))
    }
}

/// Extract an EPUB held in memory; never fails
pub fn extract_epub(data: &[u8]) -> ExtractionResult {
    match EpubBook::open(data) {
        Ok(mut book) => book.extract(),
        Err(e) => ExtractionResult::failed(SourceFormat::Epub, WarningCode::ParseError, e.to_string()),
    }
}

struct EpubBook<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    package: Package,
}

impl<'a> EpubBook<'a> {
    fn open(data: &'a [u8]) -> std::result::Result<Self, EpubError> {
        let mut archive = ZipArchive::new(Cursor::new(data))?;

        let container = read_text(&mut archive, "META-INF/container.xml")?;
        let opf_path = package::rootfile_path(&container)?
            .ok_or_else(|| EpubError::Invalid("container.xml has no rootfile".to_string()))?;
        let opf = read_text(&mut archive, &opf_path)?;
        let package = package::parse_opf(&opf, parent_dir(&opf_path))?;
        if package.spine.is_empty() {
            return Err(EpubError::Invalid("package has an empty spine".to_string()));
        }

        Ok(Self { archive, package })
    }

    fn extract(&mut self) -> ExtractionResult {
        let mut result = ExtractionResult::new(SourceFormat::Epub);
        result.metadata = self.package.metadata.clone();

        let nav = self.read_navigation();
        let mut labels = Vec::new();
        toc::labels_by_path(&nav, &mut labels);

        let cover = self.package.cover_item().cloned();
        let spine: Vec<Option<ManifestItem>> = self
            .package
            .spine
            .iter()
            .map(|id| self.package.item(id).cloned())
            .collect();

        let mut unit_paths: Vec<String> = Vec::new();
        let mut referenced: Vec<String> = Vec::new();
        let mut failures = 0usize;

        for (position, item) in spine.into_iter().enumerate() {
            let Some(item) = item else {
                failures += 1;
                result.diagnostics.warn(
                    WarningCode::ChapterParseError,
                    format!("Spine item {} is missing from the manifest", position + 1),
                );
                continue;
            };
            if !item.is_document() {
                continue;
            }

            let chapter = match read_text(&mut self.archive, &item.path)
                .map_err(|e| e.to_string())
                .and_then(|raw| clean_chapter(&raw).map_err(|e| e.to_string()))
            {
                Ok(chapter) => chapter,
                Err(e) => {
                    failures += 1;
                    result
                        .diagnostics
                        .warn(WarningCode::ChapterParseError, format!("{}: {}", item.path, e));
                    continue;
                }
            };

            let chapter_dir = parent_dir(&item.path).to_string();
            let images: Vec<String> = chapter
                .image_sources
                .iter()
                .map(|src| resolve_href(&chapter_dir, src))
                .collect();

            let unit = ContentUnit::from_html(UnitType::Chapter, None, chapter.html, unit_paths.len());
            let only_cover = images
                .iter()
                .all(|path| cover.as_ref().is_some_and(|c| &c.path == path));
            if !unit.has_text() && only_cover {
                tracing::debug!(path = %item.path, "Skipping spine item without content");
                continue;
            }

            let title = labels
                .iter()
                .find(|(path, _)| path == &item.path)
                .map(|(_, label)| label.clone())
                .or(chapter.derived_title);

            for path in images {
                if !referenced.contains(&path) {
                    referenced.push(path);
                }
            }
            unit_paths.push(item.path.clone());
            result.units.push(ContentUnit { title, ..unit });
        }

        self.collect_images(&referenced, &mut result);
        self.read_cover(cover.as_ref(), &mut result);
        result.toc = resolve_toc(&nav, &unit_paths);

        if result.units.iter().any(ContentUnit::has_text) {
            result.diagnostics.text_source = TextSource::NativeText;
            if failures > 0 {
                result.diagnostics.warn(
                    WarningCode::PartialExtraction,
                    format!("{} spine item(s) could not be read", failures),
                );
            }
        } else if failures > 0 {
            result
                .diagnostics
                .warn(WarningCode::ParseError, "No spine item could be read");
        } else {
            result
                .diagnostics
                .warn(WarningCode::EmptyContent, "EPUB contains no text");
        }

        result
    }

    fn read_navigation(&mut self) -> Vec<NavPoint> {
        let (item, is_nav) = match (self.package.nav_item(), self.package.ncx_item()) {
            (Some(nav), _) => (nav.clone(), true),
            (None, Some(ncx)) => (ncx.clone(), false),
            (None, None) => return Vec::new(),
        };

        let base = parent_dir(&item.path).to_string();
        let parsed = read_text(&mut self.archive, &item.path).and_then(|content| {
            let points = if is_nav {
                toc::parse_nav(&content, &base)?
            } else {
                toc::parse_ncx(&content, &base)?
            };
            Ok(points)
        });

        match parsed {
            Ok(points) => points,
            Err(e) => {
                // Navigation is optional; spine order still stands
                tracing::warn!(path = %item.path, "Failed to read EPUB navigation: {}", e);
                Vec::new()
            }
        }
    }

    fn collect_images(&mut self, referenced: &[String], result: &mut ExtractionResult) {
        for path in referenced {
            let mime_type = match self.package.item_by_path(path) {
                Some(item) if item.is_image() => item.media_type.clone(),
                Some(_) => continue,
                None => mime_guess::from_path(path)
                    .first()
                    .filter(|m| m.type_() == mime_guess::mime::IMAGE)
                    .map(|m| m.essence_str().to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
            };

            match read_bytes(&mut self.archive, path) {
                Ok(data) => result.images.push(InlineImage {
                    path: path.clone(),
                    mime_type,
                    data,
                }),
                Err(e) => result.diagnostics.warn(
                    WarningCode::PartialExtraction,
                    format!("Image {} could not be read: {}", path, e),
                ),
            }
        }
    }

    fn read_cover(&mut self, cover: Option<&ManifestItem>, result: &mut ExtractionResult) {
        let Some(cover) = cover else {
            return;
        };
        match read_bytes(&mut self.archive, &cover.path) {
            Ok(data) if !data.is_empty() => {
                result.metadata.cover_image = Some(data);
                result.metadata.cover_mime_type = Some(cover.media_type.clone());
            }
            Ok(_) => result
                .diagnostics
                .warn(WarningCode::CoverExtractionFailed, format!("Cover {} is empty", cover.path)),
            Err(e) => result.diagnostics.warn(
                WarningCode::CoverExtractionFailed,
                format!("Cover {} could not be read: {}", cover.path, e),
            ),
        }
    }
}

/// Map navigation targets to the units extracted from those documents
fn resolve_toc(points: &[NavPoint], unit_paths: &[String]) -> Vec<TocEntry> {
    points
        .iter()
        .map(|point| TocEntry {
            label: if point.label.is_empty() {
                "Untitled".to_string()
            } else {
                point.label.clone()
            },
            unit_index: unit_paths.iter().position(|p| p == &point.path),
            children: resolve_toc(&point.children, unit_paths),
        })
        .collect()
}

/// Largest decompressed archive entry read into memory
const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

fn read_bytes(archive: &mut ZipArchive<Cursor<&[u8]>>, path: &str) -> std::result::Result<Vec<u8>, EpubError> {
    read_entry(archive, path, MAX_ENTRY_BYTES)
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    path: &str,
    limit: u64,
) -> std::result::Result<Vec<u8>, EpubError> {
    // Producers disagree on the case of archive names
    let name = archive
        .file_names()
        .find(|name| *name == path)
        .or_else(|| archive.file_names().find(|name| name.eq_ignore_ascii_case(path)))
        .map(str::to_string)
        .ok_or_else(|| EpubError::Invalid(format!("missing file {}", path)))?;

    // The declared size is untrusted; read at most one byte past the limit
    let file = archive.by_name(&name)?;
    let mut data = Vec::new();
    file.take(limit + 1).read_to_end(&mut data)?;
    if data.len() as u64 > limit {
        return Err(EpubError::Invalid(format!("{} exceeds {} bytes when decompressed", path, limit)));
    }
    Ok(data)
}

fn read_text(archive: &mut ZipArchive<Cursor<&[u8]>>, path: &str) -> std::result::Result<String, EpubError> {
    let data = read_bytes(archive, path)?;
    let text = String::from_utf8_lossy(&data);
    Ok(text.trim_start_matches('\u{FEFF}').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_a_zip_is_parse_error() {
        let result = extract_epub(b"definitely not a zip");
        assert_eq!(result.diagnostics.text_source, TextSource::None);
        assert!(result.units.is_empty());
        assert!(result.diagnostics.has_warning(WarningCode::ParseError));
    }

    #[test]
    fn test_resolve_toc() {
        let points = vec![NavPoint {
            label: "One".into(),
            path: "a.xhtml".into(),
            children: vec![NavPoint {
                label: String::new(),
                path: "missing.xhtml".into(),
                children: Vec::new(),
            }],
        }];
        let toc = resolve_toc(&points, &["a.xhtml".to_string()]);
        assert_eq!(toc[0].unit_index, Some(0));
        assert_eq!(toc[0].children[0].label, "Untitled");
        assert_eq!(toc[0].children[0].unit_index, None);
    }

    fn archive_with(name: &str, body: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(name, zip::write::SimpleFileOptions::default()).unwrap();
        zip.write_all(body).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_oversized_entry_is_rejected() {
        let bytes = archive_with("OEBPS/big.xhtml", &vec![b'a'; 4096]);
        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let err = read_entry(&mut archive, "OEBPS/big.xhtml", 1024).unwrap_err();
        assert!(matches!(err, EpubError::Invalid(_)));
        let data = read_entry(&mut archive, "oebps/BIG.xhtml", 4096).unwrap();
        assert_eq!(data.len(), 4096);
    }
}
