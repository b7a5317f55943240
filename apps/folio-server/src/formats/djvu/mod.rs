//! DjVu extractor
//!
//! DjVu has no Rust decoder, so the document is written to a scratch
//! directory and handed to the DjVuLibre tools. A hidden text layer becomes
//! one unit per page; otherwise pages are rasterized for OCR.

mod toolkit;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::extraction::{
    finish, CancelToken, ContentUnit, ExtractionError, ExtractionOptions, ExtractionRequest,
    ExtractionResult, Extractor, Result, SourceFormat, TextSource, UnitType, WarningCode,
};
use crate::ocr::{OcrError, OcrFallback, OcrService, PageRasterizer};

pub use toolkit::{pnm_to_png, CliDjvuToolkit, DjvuToolError, DjvuToolkit};

/// Extractor for `.djvu`
#[derive(Clone)]
pub struct DjvuExtractor {
    toolkit: Arc<dyn DjvuToolkit>,
    ocr: OcrFallback,
}

impl DjvuExtractor {
    pub fn new(toolkit: Arc<dyn DjvuToolkit>, ocr: Arc<OcrService>) -> Self {
        Self {
            toolkit,
            ocr: OcrFallback::new(ocr),
        }
    }

    async fn extract_file(
        &self,
        path: &Path,
        options: &ExtractionOptions,
        cancel: &CancelToken,
    ) -> Result<ExtractionResult> {
        let mut result = ExtractionResult::new(SourceFormat::Djvu);

        // Dropping a tool future kills its child process
        let counted = tokio::select! {
            counted = self.toolkit.page_count(path) => counted,
            _ = cancel.cancelled() => return Err(ExtractionError::Cancelled),
        };
        let page_count = match counted {
            Ok(n) => n,
            Err(e) => {
                return Ok(ExtractionResult::failed(
                    SourceFormat::Djvu,
                    WarningCode::ParseError,
                    format!("Failed to open DjVu: {}", e),
                ))
            }
        };
        cancel.check()?;

        let layer = tokio::select! {
            layer = self.toolkit.extract_text(path) => layer,
            _ = cancel.cancelled() => return Err(ExtractionError::Cancelled),
        };
        match layer {
            Ok(text) => {
                for (page, text) in split_pages(&text).into_iter().enumerate() {
                    if text.trim().is_empty() {
                        continue;
                    }
                    let order = result.units.len();
                    let title = Some(format!("Page {}", page + 1));
                    result.units.push(ContentUnit::from_text(UnitType::Page, title, text, order));
                }
            }
            Err(e) => result
                .diagnostics
                .warn(WarningCode::PageParseError, format!("Text layer unreadable: {}", e)),
        }
        cancel.check()?;

        if result.units.iter().any(ContentUnit::has_text) {
            result.diagnostics.text_source = TextSource::NativeText;
        } else {
            tracing::info!(pages = page_count, "DjVu has no text layer");
            let rasterizer = DjvuRasterizer {
                toolkit: self.toolkit.clone(),
                path: path.to_path_buf(),
                page_count,
            };
            result.units = self
                .ocr
                .run(&rasterizer, options, &mut result.diagnostics, cancel)
                .await?;
        }

        Ok(result)
    }
}

#[async_trait]
impl Extractor for DjvuExtractor {
    fn format(&self) -> SourceFormat {
        SourceFormat::Djvu
    }

    async fn extract(&self, request: ExtractionRequest, cancel: &CancelToken) -> Result<ExtractionResult> {
        cancel.check()?;

        if !self.toolkit.is_available().await {
            return Ok(ExtractionResult::failed(
                SourceFormat::Djvu,
                WarningCode::ParseError,
                "DjVu tools (djvused, djvutxt, ddjvu) are not installed",
            ));
        }

        // Removed on drop, after the tools have exited
        let dir = match tempfile::Builder::new().prefix("folio_djvu_").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return Ok(ExtractionResult::failed(
                    SourceFormat::Djvu,
                    WarningCode::ParseError,
                    format!("Failed to create scratch directory: {}", e),
                ))
            }
        };
        let path = dir.path().join("document.djvu");
        if let Err(e) = tokio::fs::write(&path, &request.data).await {
            return Ok(ExtractionResult::failed(
                SourceFormat::Djvu,
                WarningCode::ParseError,
                format!("Failed to write scratch file: {}", e),
            ));
        }

        let result = self.extract_file(&path, &request.options, cancel).await?;
        cancel.check()?;
        Ok(finish(result, &request.options))
    }
}

/// Split `djvutxt` output into pages on form feeds
fn split_pages(text: &str) -> Vec<&str> {
    let mut pages: Vec<&str> = text.split('\u{000C}').collect();
    // Output ends with a form feed after the last page
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

struct DjvuRasterizer {
    toolkit: Arc<dyn DjvuToolkit>,
    path: PathBuf,
    page_count: usize,
}

#[async_trait]
impl PageRasterizer for DjvuRasterizer {
    fn page_count(&self) -> usize {
        self.page_count
    }

    async fn render_page(&self, index: usize) -> std::result::Result<Vec<u8>, OcrError> {
        self.toolkit
            .render_page(&self.path, index)
            .await
            .map_err(|e| OcrError::Render(e.to_string()))
    }
}
