//! OCR engines
//!
//! Each engine turns one rendered page image into text. Engines are tried
//! in configured order by `OcrService`.

use std::io::Write;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::types::{OcrError, OcrProvider, OcrResult, OcrWord};

#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn kind(&self) -> OcrProvider;

    /// Cheap availability check; engines that fail it are skipped
    async fn is_available(&self) -> bool;

    /// Recognize one PNG page; `language` is a Tesseract code such as "eng"
    async fn recognize(&self, image_data: &[u8], language: Option<&str>) -> Result<OcrResult, OcrError>;
}

/// `tesseract` CLI engine
///
/// Runs the `tesseract` binary with TSV output so per-word confidences are
/// available.
pub struct TesseractEngine {
    /// Default language
    default_language: String,
    binary: String,
}

impl TesseractEngine {
    pub fn new(default_language: &str) -> Self {
        Self {
            default_language: default_language.to_string(),
            binary: "tesseract".to_string(),
        }
    }

    /// Use a specific tesseract binary
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn kind(&self) -> OcrProvider {
        OcrProvider::Tesseract
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn recognize(&self, image_data: &[u8], language: Option<&str>) -> Result<OcrResult, OcrError> {
        let lang = language.unwrap_or(&self.default_language);

        // Removed when dropped, on every exit path
        let mut input = tempfile::Builder::new()
            .prefix("ocr_input_")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Recognition(format!("Failed to create temp file: {}", e)))?;
        input
            .write_all(image_data)
            .map_err(|e| OcrError::Recognition(format!("Failed to write temp file: {}", e)))?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(lang)
            .arg("--psm")
            .arg("3")
            .arg("tsv")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OcrError::Recognition(format!("Failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Recognition(format!("Tesseract failed: {}", stderr.trim())));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let (text, words) = parse_tsv(&tsv);
        let confidence = mean_confidence(&words);

        Ok(OcrResult {
            text,
            confidence,
            provider: OcrProvider::Tesseract,
            words: Some(words),
        })
    }
}

/// Parse tesseract TSV output into text and word confidences
///
/// Lines are joined with newlines, paragraphs and blocks with a blank line.
pub fn parse_tsv(tsv: &str) -> (String, Vec<OcrWord>) {
    let mut text = String::new();
    let mut words = Vec::new();
    let mut last: Option<(u32, u32, u32)> = None;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        let confidence: f64 = cols[10].trim().parse().unwrap_or(-1.0);
        if word.is_empty() || confidence < 0.0 {
            continue;
        }
        let num = |i: usize| cols[i].trim().parse::<u32>().unwrap_or(0);
        let key = (num(2), num(3), num(4));

        match last {
            Some((block, par, _)) if block != key.0 || par != key.1 => text.push_str("\n\n"),
            Some((_, _, line)) if line != key.2 => text.push('\n'),
            Some(_) => text.push(' '),
            None => {}
        }
        last = Some(key);
        text.push_str(word);
        words.push(OcrWord {
            text: word.to_string(),
            confidence,
        });
    }

    (text, words)
}

fn mean_confidence(words: &[OcrWord]) -> Option<f64> {
    if words.is_empty() {
        return None;
    }
    Some(words.iter().map(|w| w.confidence).sum::<f64>() / words.len() as f64)
}

/// Ollama vision model engine
///
/// Vision models report no confidence, so pages read this way leave the
/// job confidence empty unless another engine contributed one.
pub struct OllamaEngine {
    /// Ollama API URL
    base_url: String,
    /// Model name (e.g., "llava", "bakllava")
    model: String,
    client: reqwest::Client,
}

impl OllamaEngine {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl OcrEngine for OllamaEngine {
    fn kind(&self) -> OcrProvider {
        OcrProvider::Ollama
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn recognize(&self, image_data: &[u8], language: Option<&str>) -> Result<OcrResult, OcrError> {
        use base64::Engine;

        let url = format!("{}/api/generate", self.base_url);
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(image_data);

        let lang_hint = language
            .map(|l| format!(" The text is in {}.", l))
            .unwrap_or_default();

        let prompt = format!(
            "Extract all text from this image exactly as written.{} Return only the extracted text, nothing else.",
            lang_hint
        );

        let request = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "images": [image_base64],
            "stream": false
        });

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OcrError::Api(format!("Failed to call Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::Api(format!("Ollama returned {}: {}", status, body)));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OcrError::Api(format!("Failed to parse response: {}", e)))?;

        let text = result["response"].as_str().unwrap_or("").trim().to_string();

        Ok(OcrResult {
            text,
            confidence: None,
            provider: OcrProvider::Ollama,
            words: None,
        })
    }
}

/// Engine returning a fixed result
#[cfg(test)]
pub struct StaticEngine {
    pub response: OcrResult,
    pub available: bool,
}

#[cfg(test)]
#[async_trait]
impl OcrEngine for StaticEngine {
    fn kind(&self) -> OcrProvider {
        self.response.provider
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn recognize(&self, _image_data: &[u8], _language: Option<&str>) -> Result<OcrResult, OcrError> {
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tHello\n\
5\t1\t1\t1\t1\t2\t0\t0\t10\t10\t80\tworld\n\
5\t1\t1\t1\t2\t1\t0\t0\t10\t10\t70\tnext\n\
5\t1\t2\t1\t1\t1\t0\t0\t10\t10\t60\tBlock\n\
5\t1\t2\t1\t1\t2\t0\t0\t10\t10\t-1\t \n";

    #[test]
    fn test_parse_tsv_layout() {
        let (text, words) = parse_tsv(TSV);
        assert_eq!(text, "Hello world\nnext\n\nBlock");
        assert_eq!(words.len(), 4);
    }

    #[test]
    fn test_mean_confidence() {
        let (_, words) = parse_tsv(TSV);
        assert_eq!(mean_confidence(&words), Some(75.0));
        assert_eq!(mean_confidence(&[]), None);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let engine = TesseractEngine::new("eng").with_binary("definitely-not-a-tesseract-binary");
        assert!(!engine.is_available().await);
    }
}
