//! Blocking MuPDF pass over a PDF: text layer, metadata, outline and cover

use mupdf::{Document, MetadataName};

use crate::extraction::{ExtractionMetadata, TocEntry};
use crate::mupdf::{page_text, render_png, MupdfError, SafeDocument};

/// Longest side of the rendered cover, in pixels
const COVER_MAX_SIDE: f32 = 1200.0;

/// Everything read from the document's own text layer
pub struct NativePass {
    pub metadata: ExtractionMetadata,
    /// Outline entries with 0-based page targets
    pub outline: Vec<OutlineEntry>,
    /// Text per page; `Err` carries the reason a page could not be read
    pub pages: Vec<Result<String, String>>,
    pub cover: Result<Vec<u8>, String>,
}

/// Outline node before pages are mapped to units
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineEntry {
    pub label: String,
    pub page: Option<usize>,
    pub children: Vec<OutlineEntry>,
}

pub fn read_native(doc: &SafeDocument) -> NativePass {
    let (metadata, outline) = doc
        .with_doc(|d| Ok((read_metadata(d), read_outline(d))))
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read PDF metadata");
            (ExtractionMetadata::default(), Vec::new())
        });

    let pages = (0..doc.page_count())
        .map(|index| doc.with_page(index, page_text).map_err(|e| e.to_string()))
        .collect();

    let cover = render_cover(doc).map_err(|e| e.to_string());

    NativePass {
        metadata,
        outline,
        pages,
        cover,
    }
}

pub fn render_cover(doc: &SafeDocument) -> Result<Vec<u8>, MupdfError> {
    doc.with_page(0, |page| render_png(page, COVER_MAX_SIDE, 2.0))
}

fn read_metadata(doc: &Document) -> ExtractionMetadata {
    let get_meta = |name: MetadataName| -> Option<String> {
        doc.metadata(name)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    ExtractionMetadata {
        title: get_meta(MetadataName::Title),
        authors: get_meta(MetadataName::Author)
            .map(|a| split_authors(&a))
            .unwrap_or_default(),
        description: get_meta(MetadataName::Subject),
        ..ExtractionMetadata::default()
    }
}

fn split_authors(value: &str) -> Vec<String> {
    value
        .split([';', '&'])
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect()
}

fn read_outline(doc: &Document) -> Vec<OutlineEntry> {
    match doc.outlines() {
        Ok(outlines) => convert_outlines(&outlines),
        Err(e) => {
            tracing::debug!(error = %e, "PDF has no readable outline");
            Vec::new()
        }
    }
}

fn convert_outlines(outlines: &[mupdf::Outline]) -> Vec<OutlineEntry> {
    outlines
        .iter()
        .filter_map(|outline| {
            let label = outline.title.trim().to_string();
            let children = convert_outlines(&outline.down);
            if label.is_empty() && children.is_empty() {
                return None;
            }
            Some(OutlineEntry {
                label: if label.is_empty() {
                    "Untitled".to_string()
                } else {
                    label
                },
                page: outline.page.map(|p| p as usize),
                children,
            })
        })
        .collect()
}

/// Map outline page targets to unit indices
///
/// `page_units[p]` is the unit holding page `p`, if that page produced one.
/// A target page without a unit points at the next page that has one.
pub fn outline_to_toc(outline: &[OutlineEntry], page_units: &[Option<usize>]) -> Vec<TocEntry> {
    outline
        .iter()
        .map(|entry| TocEntry {
            label: entry.label.clone(),
            unit_index: entry
                .page
                .and_then(|page| page_units.iter().skip(page).flatten().next().copied()),
            children: outline_to_toc(&entry.children, page_units),
        })
        .collect()
}
