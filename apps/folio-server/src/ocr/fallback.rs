//! OCR fallback for documents without a text layer
//!
//! Renders each page independently and recognizes it through the
//! `OcrService`. A failed page becomes an empty unit with an `OcrFailed`
//! warning; the rest of the document still runs.

use std::sync::Arc;

use async_trait::async_trait;

use super::service::OcrService;
use super::types::OcrError;
use crate::extraction::{
    CancelToken, ContentUnit, ExtractionDiagnostics, ExtractionError, ExtractionOptions, TextSource,
    UnitType, WarningCode,
};

/// Source of page images for OCR
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Render one page (0-based) to an encoded image
    async fn render_page(&self, index: usize) -> Result<Vec<u8>, OcrError>;
}

/// Page-by-page OCR driver
#[derive(Clone)]
pub struct OcrFallback {
    service: Arc<OcrService>,
}

impl OcrFallback {
    pub fn new(service: Arc<OcrService>) -> Self {
        Self { service }
    }

    /// Recognize every page, updating `diagnostics` with the text source,
    /// confidence and warnings
    ///
    /// Only called when native extraction produced no usable text.
    pub async fn run(
        &self,
        rasterizer: &dyn PageRasterizer,
        options: &ExtractionOptions,
        diagnostics: &mut ExtractionDiagnostics,
        cancel: &CancelToken,
    ) -> Result<Vec<ContentUnit>, ExtractionError> {
        diagnostics.text_source = TextSource::None;
        diagnostics.confidence = None;

        if !options.ocr_enabled {
            diagnostics.warn(WarningCode::NoTextLayer, "Document has no text layer and OCR is disabled");
            return Ok(Vec::new());
        }

        let page_count = rasterizer.page_count();
        if page_count > options.max_pages_for_ocr {
            diagnostics.warn(
                WarningCode::OcrPageLimitExceeded,
                format!(
                    "Document has {} pages, OCR limit is {}",
                    page_count, options.max_pages_for_ocr
                ),
            );
            diagnostics.warn(WarningCode::NoTextLayer, "Document has no text layer");
            return Ok(Vec::new());
        }

        if !self.service.is_available().await {
            diagnostics.warn(WarningCode::OcrFailed, "No OCR provider is available");
            diagnostics.warn(WarningCode::NoTextLayer, "Document has no text layer");
            return Ok(Vec::new());
        }

        tracing::info!(pages = page_count, language = %options.ocr_language, "Running OCR fallback");

        let mut units = Vec::with_capacity(page_count);
        let mut confidences = Vec::new();

        for index in 0..page_count {
            cancel.check()?;

            let recognized = tokio::select! {
                outcome = self.recognize_page(rasterizer, index, &options.ocr_language) => outcome,
                _ = cancel.cancelled() => return Err(ExtractionError::Cancelled),
            };

            match recognized {
                Ok((text, confidence)) => {
                    if let Some(confidence) = confidence {
                        confidences.push(confidence);
                    }
                    units.push(ContentUnit::from_text(UnitType::Page, None, &text, index));
                }
                Err(e) => {
                    diagnostics.warn(WarningCode::OcrFailed, format!("Page {}: {}", index + 1, e));
                    units.push(ContentUnit::from_text(UnitType::Page, None, "", index));
                }
            }
        }

        if units.iter().any(ContentUnit::has_text) {
            diagnostics.text_source = TextSource::Ocr;
            diagnostics.confidence = mean_confidence(&confidences);
        } else {
            diagnostics.warn(WarningCode::NoTextLayer, "OCR produced no text");
        }

        Ok(units)
    }

    async fn recognize_page(
        &self,
        rasterizer: &dyn PageRasterizer,
        index: usize,
        language: &str,
    ) -> Result<(String, Option<f64>), OcrError> {
        let image = rasterizer.render_page(index).await?;
        let result = self.service.recognize(&image, Some(language)).await?;
        Ok((result.text, result.confidence))
    }
}

/// Mean of reported provider confidences, scaled from 0-100 to 0-1
fn mean_confidence(confidences: &[f64]) -> Option<f64> {
    if confidences.is_empty() {
        return None;
    }
    let mean = confidences.iter().sum::<f64>() / confidences.len() as f64;
    Some((mean / 100.0).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::engine::OcrEngine;
    use crate::ocr::types::{OcrProvider, OcrResult};
    use crate::ocr::OcrServiceConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Pages(usize);

    #[async_trait]
    impl PageRasterizer for Pages {
        fn page_count(&self) -> usize {
            self.0
        }

        async fn render_page(&self, index: usize) -> Result<Vec<u8>, OcrError> {
            Ok(vec![index as u8])
        }
    }

    /// Echoes the page byte; fails on page 2; confidence 60 + 10 * page
    #[derive(Default)]
    struct ScriptedProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for ScriptedProvider {
        fn kind(&self) -> OcrProvider {
            OcrProvider::Tesseract
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn recognize(&self, image: &[u8], _language: Option<&str>) -> Result<OcrResult, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let page = image[0];
            if page == 2 {
                return Err(OcrError::Recognition("blurry".into()));
            }
            Ok(OcrResult {
                text: format!("page {} text", page),
                confidence: Some(60.0 + 10.0 * page as f64),
                provider: OcrProvider::Tesseract,
                words: None,
            })
        }
    }

    fn fallback(provider: Arc<ScriptedProvider>) -> OcrFallback {
        let service = OcrService::with_providers(
            OcrServiceConfig::default(),
            vec![provider as Arc<dyn OcrEngine>],
        );
        OcrFallback::new(Arc::new(service))
    }

    fn enabled(max_pages: usize) -> ExtractionOptions {
        ExtractionOptions {
            ocr_enabled: true,
            max_pages_for_ocr: max_pages,
            ..ExtractionOptions::default()
        }
    }

    #[tokio::test]
    async fn test_page_failure_degrades_to_empty_unit() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut diagnostics = ExtractionDiagnostics::default();

        let units = fallback(provider.clone())
            .run(&Pages(3), &enabled(10), &mut diagnostics, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(units.len(), 3);
        assert_eq!(units[0].plain_text, "page 0 text");
        assert!(!units[2].has_text());
        assert!(diagnostics.has_warning(WarningCode::OcrFailed));
        assert_eq!(diagnostics.text_source, TextSource::Ocr);
        // Mean of 60 and 70 only
        assert!((diagnostics.confidence.unwrap() - 0.65).abs() < 1e-9);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_page_ceiling_never_invokes_ocr() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut diagnostics = ExtractionDiagnostics::default();

        let units = fallback(provider.clone())
            .run(&Pages(5), &enabled(4), &mut diagnostics, &CancelToken::new())
            .await
            .unwrap();

        assert!(units.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(diagnostics.has_warning(WarningCode::OcrPageLimitExceeded));
        assert!(diagnostics.has_warning(WarningCode::NoTextLayer));
        assert_eq!(diagnostics.text_source, TextSource::None);
    }

    #[tokio::test]
    async fn test_disabled_reports_no_text_layer() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut diagnostics = ExtractionDiagnostics::default();

        let units = fallback(provider.clone())
            .run(&Pages(1), &ExtractionOptions::default(), &mut diagnostics, &CancelToken::new())
            .await
            .unwrap();

        assert!(units.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(diagnostics.has_warning(WarningCode::NoTextLayer));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut diagnostics = ExtractionDiagnostics::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = fallback(provider)
            .run(&Pages(2), &enabled(10), &mut diagnostics, &cancel)
            .await;
        assert!(matches!(result, Err(ExtractionError::Cancelled)));
    }
}
