//! Extractor registry
//!
//! Static table from `SourceFormat` to its extractor. The format is chosen
//! from the file extension alone; anything else is rejected before parsing.

use std::collections::HashMap;
use std::sync::Arc;

use super::cancel::CancelToken;
use super::error::{ExtractionError, Result};
use super::traits::Extractor;
use super::types::{ExtractionRequest, ExtractionResult, SourceFormat};
use crate::formats::djvu::{DjvuExtractor, DjvuToolkit};
use crate::formats::epub::EpubExtractor;
use crate::formats::fb2::Fb2Extractor;
use crate::formats::pdf::PdfExtractor;
use crate::ocr::OcrService;

/// Maps each supported format to exactly one extractor
pub struct ExtractorRegistry {
    extractors: HashMap<SourceFormat, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Build the default table
    pub fn new(ocr: Arc<OcrService>, djvu: Arc<dyn DjvuToolkit>) -> Self {
        let extractors = SourceFormat::ALL
            .iter()
            .map(|format| {
                let extractor: Arc<dyn Extractor> = match format {
                    SourceFormat::Epub => Arc::new(EpubExtractor::new()),
                    SourceFormat::Fb2 => Arc::new(Fb2Extractor::new()),
                    SourceFormat::Pdf => Arc::new(PdfExtractor::new(ocr.clone())),
                    SourceFormat::Djvu => Arc::new(DjvuExtractor::new(djvu.clone(), ocr.clone())),
                };
                (*format, extractor)
            })
            .collect();

        Self { extractors }
    }

    /// Replace the extractor for its format
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractors.insert(extractor.format(), extractor);
        self
    }

    /// Resolve the extractor for a file name
    pub fn resolve(&self, file_name: &str) -> Result<Arc<dyn Extractor>> {
        let format = SourceFormat::from_file_name(file_name)
            .ok_or_else(|| ExtractionError::Unsupported(file_name.to_string()))?;

        self.extractors
            .get(&format)
            .cloned()
            .ok_or_else(|| ExtractionError::Unsupported(format.to_string()))
    }

    /// Resolve and run the extractor for a request
    pub async fn extract(&self, request: ExtractionRequest, cancel: &CancelToken) -> Result<ExtractionResult> {
        let extractor = self.resolve(&request.file_name)?;
        tracing::debug!(
            file = %request.file_name,
            format = %extractor.format(),
            bytes = request.data.len(),
            "Extracting"
        );
        extractor.extract(request, cancel).await
    }
}
