//! Extraction data model
//!
//! Format-agnostic types shared by every extractor, the splitter and the
//! ingestion worker.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source container format
///
/// Closed set: the registry maps each variant to exactly one extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Epub,
    Fb2,
    Pdf,
    Djvu,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 4] = [Self::Epub, Self::Fb2, Self::Pdf, Self::Djvu];

    /// Detect format from file extension (without the dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "epub" => Some(Self::Epub),
            "fb2" => Some(Self::Fb2),
            "pdf" => Some(Self::Pdf),
            "djvu" => Some(Self::Djvu),
            _ => None,
        }
    }

    /// Detect format from a file name
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Fb2 => "fb2",
            Self::Pdf => "pdf",
            Self::Djvu => "djvu",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::from_extension(value)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options that shape one extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOptions {
    /// Units above this many words are split into parts
    pub max_words_per_part: usize,
    /// Whether OCR may be used when no native text exists
    pub ocr_enabled: bool,
    /// OCR language hint (Tesseract code, e.g. "eng", "rus")
    pub ocr_language: String,
    /// Documents with more pages than this are never OCR'd
    pub max_pages_for_ocr: usize,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            max_words_per_part: 4000,
            ocr_enabled: false,
            ocr_language: "eng".to_string(),
            max_pages_for_ocr: 300,
        }
    }
}

/// Input to an extractor
///
/// The content is fully buffered: every supported container needs random
/// access (ZIP central directory, PDF xref) so a forward-only stream buys
/// nothing.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub data: Vec<u8>,
    pub file_name: String,
    /// Length announced by the uploader; informational only
    pub declared_length: u64,
    pub options: ExtractionOptions,
}

impl ExtractionRequest {
    pub fn new(data: Vec<u8>, file_name: impl Into<String>, options: ExtractionOptions) -> Self {
        let declared_length = data.len() as u64;
        Self {
            data,
            file_name: file_name.into(),
            declared_length,
            options,
        }
    }
}

/// Kind of content unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Chapter,
    Page,
}

/// One chapter- or page-sized piece of extracted content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUnit {
    pub unit_type: UnitType,
    pub title: Option<String>,
    pub html: Option<String>,
    pub plain_text: String,
    /// Unique and strictly increasing within one result
    pub order_index: usize,
    pub word_count: usize,
    pub original_chapter_number: Option<usize>,
    pub part_number: Option<usize>,
    pub total_parts: Option<usize>,
}

impl ContentUnit {
    /// Build a unit from HTML, deriving plain text and word count
    pub fn from_html(unit_type: UnitType, title: Option<String>, html: String, order_index: usize) -> Self {
        let plain_text = crate::html::html_to_text(&html);
        let word_count = crate::html::count_words(&plain_text);
        Self {
            unit_type,
            title,
            html: Some(html),
            plain_text,
            order_index,
            word_count,
            original_chapter_number: None,
            part_number: None,
            total_parts: None,
        }
    }

    /// Build a unit from plain text; HTML is one paragraph per text block
    pub fn from_text(unit_type: UnitType, title: Option<String>, text: &str, order_index: usize) -> Self {
        let html = crate::html::text_to_html(text);
        Self::from_html(unit_type, title, html, order_index)
    }

    /// Title for display, e.g. "Chapter 3 (2/3)"
    pub fn display_title(&self) -> String {
        let base = match (&self.title, self.unit_type) {
            (Some(title), _) if !title.trim().is_empty() => title.trim().to_string(),
            (_, UnitType::Page) => format!("Page {}", self.chapter_number()),
            (_, UnitType::Chapter) => format!("Chapter {}", self.chapter_number()),
        };
        match (self.part_number, self.total_parts) {
            (Some(part), Some(total)) => format!("{} ({}/{})", base, part, total),
            _ => base,
        }
    }

    /// 1-based number of the pre-split unit this came from
    pub fn chapter_number(&self) -> usize {
        self.original_chapter_number.unwrap_or(self.order_index + 1)
    }

    pub fn has_text(&self) -> bool {
        !self.plain_text.trim().is_empty()
    }
}

/// Descriptive metadata read from the container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    #[serde(skip)]
    pub cover_image: Option<Vec<u8>>,
    pub cover_mime_type: Option<String>,
}

/// Provenance of extracted text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextSource {
    NativeText,
    Ocr,
    None,
}

impl TextSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativeText => "NativeText",
            Self::Ocr => "Ocr",
            Self::None => "None",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NativeText" => Some(Self::NativeText),
            "Ocr" => Some(Self::Ocr),
            "None" => Some(Self::None),
            _ => None,
        }
    }
}

/// Closed set of diagnostic warning codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningCode {
    NoTextLayer,
    PartialExtraction,
    ChapterParseError,
    PageParseError,
    ParseError,
    EmptyContent,
    CoverExtractionFailed,
    OcrFailed,
    OcrPageLimitExceeded,
}

/// One diagnostic warning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Machine-readable summary of what happened during extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDiagnostics {
    pub text_source: TextSource,
    /// Only set when `text_source` is `Ocr`
    pub confidence: Option<f64>,
    pub warnings: Vec<Warning>,
}

impl Default for ExtractionDiagnostics {
    fn default() -> Self {
        Self {
            text_source: TextSource::None,
            confidence: None,
            warnings: Vec::new(),
        }
    }
}

impl ExtractionDiagnostics {
    pub fn warn(&mut self, code: WarningCode, message: impl Into<String>) {
        let warning = Warning::new(code, message);
        tracing::warn!(code = ?warning.code, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn has_warning(&self, code: WarningCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }
}

/// Image embedded in the source document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    /// Path as referenced from the unit HTML (archive-relative for EPUB,
    /// binary id for FB2)
    pub path: String,
    pub mime_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Table of contents entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TocEntry {
    pub label: String,
    /// Order index of the unit the entry points at, when resolvable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_index: Option<usize>,
    pub children: Vec<TocEntry>,
}

/// Complete output of one extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub format: SourceFormat,
    pub metadata: ExtractionMetadata,
    pub units: Vec<ContentUnit>,
    pub diagnostics: ExtractionDiagnostics,
    pub images: Vec<InlineImage>,
    pub toc: Vec<TocEntry>,
}

impl ExtractionResult {
    pub fn new(format: SourceFormat) -> Self {
        Self {
            format,
            metadata: ExtractionMetadata::default(),
            units: Vec::new(),
            diagnostics: ExtractionDiagnostics::default(),
            images: Vec::new(),
            toc: Vec::new(),
        }
    }

    /// A result with no text, carrying the failure as a warning
    pub fn failed(format: SourceFormat, code: WarningCode, message: impl Into<String>) -> Self {
        let mut result = Self::new(format);
        result.diagnostics.warn(code, message);
        result
    }

    /// Enforce `TextSource=None => no units` and `Confidence only for OCR`
    pub fn seal(mut self) -> Self {
        if self.diagnostics.text_source == TextSource::None {
            self.units.clear();
        }
        if self.diagnostics.text_source != TextSource::Ocr {
            self.diagnostics.confidence = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_file_name() {
        assert_eq!(SourceFormat::from_file_name("book.EPUB"), Some(SourceFormat::Epub));
        assert_eq!(SourceFormat::from_file_name("a.b.fb2"), Some(SourceFormat::Fb2));
        assert_eq!(SourceFormat::from_file_name("scan.djvu"), Some(SourceFormat::Djvu));
        assert_eq!(SourceFormat::from_file_name("notes.txt"), None);
        assert_eq!(SourceFormat::from_file_name("noextension"), None);
    }

    #[test]
    fn test_display_title_with_parts() {
        let mut unit = ContentUnit::from_text(UnitType::Chapter, None, "one two", 4);
        unit.original_chapter_number = Some(3);
        unit.part_number = Some(2);
        unit.total_parts = Some(3);
        assert_eq!(unit.display_title(), "Chapter 3 (2/3)");
    }

    #[test]
    fn test_seal_clears_units_without_text_source() {
        let mut result = ExtractionResult::new(SourceFormat::Pdf);
        result.units.push(ContentUnit::from_text(UnitType::Page, None, "x", 0));
        result.diagnostics.confidence = Some(0.5);
        let result = result.seal();
        assert!(result.units.is_empty());
        assert!(result.diagnostics.confidence.is_none());
    }
}
