//! OCR Types
//!
//! Types shared by OCR providers, the service and the page fallback.

use serde::{Deserialize, Serialize};

/// OCR provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrProvider {
    /// Tesseract OCR (local CLI)
    Tesseract,
    /// Ollama vision model (local LLM)
    Ollama,
}

impl Default for OcrProvider {
    fn default() -> Self {
        Self::Tesseract
    }
}

impl OcrProvider {
    /// Parse a provider name as used in configuration
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Some(Self::Tesseract),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }
}

/// OCR result for one image
#[derive(Debug, Clone, Serialize)]
pub struct OcrResult {
    /// Recognized text
    pub text: String,
    /// Confidence score (0-100), when the provider reports one
    pub confidence: Option<f64>,
    /// Provider used
    pub provider: OcrProvider,
    /// Individual word results (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<OcrWord>>,
}

/// Single word OCR result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrWord {
    pub text: String,
    /// Confidence for this word (0-100)
    pub confidence: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("no OCR engine available: {0}")]
    Unavailable(String),

    /// The page could not be rasterized
    #[error("failed to render page: {0}")]
    Render(String),

    #[error("recognition failed: {0}")]
    Recognition(String),

    /// Remote engine returned an error or an unreadable response
    #[error("OCR API error: {0}")]
    Api(String),
}
