//! Engine selection
//!
//! `OcrService` owns the configured engines and asks them in order. An
//! engine that errors or returns blank text hands the page to the next one.

use std::sync::Arc;

use super::{
    engine::{OcrEngine, OllamaEngine, TesseractEngine},
    types::{OcrError, OcrProvider, OcrResult},
};

#[derive(Debug, Clone)]
pub struct OcrServiceConfig {
    /// Engines to try, in order
    pub providers: Vec<OcrProvider>,
    pub ollama_url: String,
    pub ollama_model: String,
    /// Tesseract language code used when the caller gives none
    pub default_language: String,
}

impl Default for OcrServiceConfig {
    fn default() -> Self {
        Self {
            providers: vec![OcrProvider::Tesseract],
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llava".to_string(),
            default_language: "eng".to_string(),
        }
    }
}

pub struct OcrService {
    config: OcrServiceConfig,
    engines: Vec<Arc<dyn OcrEngine>>,
}

impl OcrService {
    pub fn new(config: OcrServiceConfig) -> Self {
        let engines = config
            .providers
            .iter()
            .map(|kind| -> Arc<dyn OcrEngine> {
                match kind {
                    OcrProvider::Tesseract => Arc::new(TesseractEngine::new(&config.default_language)),
                    OcrProvider::Ollama => Arc::new(OllamaEngine::new(&config.ollama_url, &config.ollama_model)),
                }
            })
            .collect();

        Self { config, engines }
    }

    /// Service over explicit engine instances
    pub fn with_providers(config: OcrServiceConfig, engines: Vec<Arc<dyn OcrEngine>>) -> Self {
        Self { config, engines }
    }

    pub async fn is_available(&self) -> bool {
        for engine in &self.engines {
            if engine.is_available().await {
                return true;
            }
        }
        false
    }

    /// Recognize one page with the first engine that produces text
    ///
    /// A blank result is returned only when every available engine came
    /// back blank or failed after one of them came back blank.
    pub async fn recognize(&self, image_data: &[u8], language: Option<&str>) -> Result<OcrResult, OcrError> {
        let language = language.unwrap_or(&self.config.default_language);
        let mut blank: Option<OcrResult> = None;
        let mut last_error: Option<OcrError> = None;

        for engine in &self.engines {
            if !engine.is_available().await {
                continue;
            }
            match engine.recognize(image_data, Some(language)).await {
                Ok(result) if !result.text.trim().is_empty() => return Ok(result),
                Ok(result) => {
                    tracing::debug!(engine = ?engine.kind(), "OCR engine returned no text");
                    blank.get_or_insert(result);
                }
                Err(e) => {
                    tracing::warn!(engine = ?engine.kind(), "OCR engine failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        match (blank, last_error) {
            (Some(result), _) => Ok(result),
            (None, Some(e)) => Err(e),
            (None, None) => Err(OcrError::Unavailable(format!(
                "none of {} configured engines is available",
                self.engines.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::engine::StaticEngine;

    fn engine(kind: OcrProvider, text: &str, available: bool) -> Arc<dyn OcrEngine> {
        Arc::new(StaticEngine {
            response: OcrResult {
                text: text.to_string(),
                confidence: Some(90.0),
                provider: kind,
                words: None,
            },
            available,
        })
    }

    #[test]
    fn test_engines_follow_config_order() {
        let config = OcrServiceConfig {
            providers: vec![OcrProvider::Ollama, OcrProvider::Tesseract],
            ..OcrServiceConfig::default()
        };
        let service = OcrService::new(config);
        let kinds: Vec<OcrProvider> = service.engines.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![OcrProvider::Ollama, OcrProvider::Tesseract]);
    }

    #[tokio::test]
    async fn test_skips_unavailable_engines() {
        let service = OcrService::with_providers(
            OcrServiceConfig::default(),
            vec![
                engine(OcrProvider::Tesseract, "tess", false),
                engine(OcrProvider::Ollama, "llm", true),
            ],
        );

        let result = service.recognize(b"img", None).await.unwrap();
        assert_eq!(result.text, "llm");
    }

    #[tokio::test]
    async fn test_blank_result_falls_through() {
        let service = OcrService::with_providers(
            OcrServiceConfig::default(),
            vec![
                engine(OcrProvider::Tesseract, "  \n", true),
                engine(OcrProvider::Ollama, "read by llm", true),
            ],
        );

        assert_eq!(service.recognize(b"img", None).await.unwrap().text, "read by llm");
    }

    #[tokio::test]
    async fn test_all_blank_returns_blank() {
        let service = OcrService::with_providers(
            OcrServiceConfig::default(),
            vec![engine(OcrProvider::Tesseract, "", true)],
        );

        let result = service.recognize(b"img", None).await.unwrap();
        assert!(result.text.is_empty());
    }

    #[tokio::test]
    async fn test_no_engines() {
        let service = OcrService::with_providers(OcrServiceConfig::default(), Vec::new());
        assert!(!service.is_available().await);
        assert!(matches!(
            service.recognize(b"img", None).await,
            Err(OcrError::Unavailable(_))
        ));
    }
}
