//! PDF extractor
//!
//! Reads the text layer page by page with MuPDF. Documents whose text layer
//! is blank go through the OCR fallback, each page rendered to PNG.

mod native;

use std::sync::Arc;

use async_trait::async_trait;

use crate::extraction::{
    finish, CancelToken, ContentUnit, Extractor, ExtractionRequest, ExtractionResult, Result,
    SourceFormat, TextSource, UnitType, WarningCode,
};
use crate::mupdf::{render_png, SafeDocument};
use crate::ocr::{OcrError, OcrFallback, OcrService, PageRasterizer};

pub use native::{outline_to_toc, OutlineEntry};

/// Longest side of a page rendered for OCR, in pixels
const OCR_MAX_SIDE: f32 = 2400.0;

/// Extractor for `.pdf`
#[derive(Clone)]
pub struct PdfExtractor {
    ocr: OcrFallback,
}

impl PdfExtractor {
    pub fn new(ocr: Arc<OcrService>) -> Self {
        Self {
            ocr: OcrFallback::new(ocr),
        }
    }
}

#[async_trait]
impl Extractor for PdfExtractor {
    fn format(&self) -> SourceFormat {
        SourceFormat::Pdf
    }

    async fn extract(&self, request: ExtractionRequest, cancel: &CancelToken) -> Result<ExtractionResult> {
        cancel.check()?;
        let options = request.options.clone();

        let opened = tokio::task::spawn_blocking(move || SafeDocument::from_bytes(request.data))
            .await
            .map_err(|e| e.to_string())
            .and_then(|doc| doc.map_err(|e| e.to_string()));
        let doc = match opened {
            Ok(doc) => Arc::new(doc),
            Err(e) => {
                return Ok(ExtractionResult::failed(
                    SourceFormat::Pdf,
                    WarningCode::ParseError,
                    format!("Failed to open PDF: {}", e),
                ))
            }
        };

        let pass = {
            let doc = doc.clone();
            match tokio::task::spawn_blocking(move || native::read_native(&doc)).await {
                Ok(pass) => pass,
                Err(e) => {
                    return Ok(ExtractionResult::failed(
                        SourceFormat::Pdf,
                        WarningCode::ParseError,
                        format!("PDF extraction aborted: {}", e),
                    ))
                }
            }
        };
        cancel.check()?;

        let mut result = ExtractionResult::new(SourceFormat::Pdf);
        result.metadata = pass.metadata;

        match pass.cover {
            Ok(png) => {
                result.metadata.cover_image = Some(png);
                result.metadata.cover_mime_type = Some("image/png".to_string());
            }
            Err(e) => result
                .diagnostics
                .warn(WarningCode::CoverExtractionFailed, format!("Cover render failed: {}", e)),
        }

        let mut page_units: Vec<Option<usize>> = Vec::with_capacity(pass.pages.len());
        for (page, text) in pass.pages.iter().enumerate() {
            match text {
                Ok(text) if !text.trim().is_empty() => {
                    page_units.push(Some(result.units.len()));
                    let title = Some(format!("Page {}", page + 1));
                    let order = result.units.len();
                    result.units.push(ContentUnit::from_text(UnitType::Page, title, text, order));
                }
                Ok(_) => page_units.push(None),
                Err(e) => {
                    page_units.push(None);
                    result
                        .diagnostics
                        .warn(WarningCode::PageParseError, format!("Page {}: {}", page + 1, e));
                }
            }
        }

        if result.units.iter().any(ContentUnit::has_text) {
            result.diagnostics.text_source = TextSource::NativeText;
            result.toc = outline_to_toc(&pass.outline, &page_units);
        } else {
            tracing::info!(pages = doc.page_count(), "PDF has no text layer");
            let rasterizer = MupdfRasterizer { doc: doc.clone() };
            result.units = self
                .ocr
                .run(&rasterizer, &options, &mut result.diagnostics, cancel)
                .await?;
            let page_units: Vec<Option<usize>> = (0..result.units.len()).map(Some).collect();
            result.toc = outline_to_toc(&pass.outline, &page_units);
        }

        cancel.check()?;
        Ok(finish(result, &options))
    }
}

/// Renders PDF pages for OCR
struct MupdfRasterizer {
    doc: Arc<SafeDocument>,
}

#[async_trait]
impl PageRasterizer for MupdfRasterizer {
    fn page_count(&self) -> usize {
        self.doc.page_count()
    }

    async fn render_page(&self, index: usize) -> std::result::Result<Vec<u8>, OcrError> {
        let doc = self.doc.clone();
        tokio::task::spawn_blocking(move || doc.with_page(index, |page| render_png(page, OCR_MAX_SIDE, 4.0)))
            .await
            .map_err(|e| OcrError::Render(e.to_string()))?
            .map_err(|e| OcrError::Render(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionOptions;
    use crate::ocr::OcrServiceConfig;

    fn extractor() -> PdfExtractor {
        PdfExtractor::new(Arc::new(OcrService::with_providers(OcrServiceConfig::default(), Vec::new())))
    }

    #[tokio::test]
    async fn test_garbage_is_parse_error() {
        let request = ExtractionRequest::new(b"%PDF-nope".to_vec(), "bad.pdf", ExtractionOptions::default());
        let result = extractor().extract(request, &CancelToken::new()).await.unwrap();

        assert_eq!(result.diagnostics.text_source, TextSource::None);
        assert!(result.diagnostics.has_warning(WarningCode::ParseError));
        assert!(result.units.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let request = ExtractionRequest::new(Vec::new(), "x.pdf", ExtractionOptions::default());

        assert!(matches!(
            extractor().extract(request, &cancel).await,
            Err(crate::extraction::ExtractionError::Cancelled)
        ));
    }
}
