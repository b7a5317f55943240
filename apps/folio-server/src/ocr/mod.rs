//! OCR for scanned documents
//!
//! Engines:
//! - Tesseract (local CLI, reports word confidence)
//! - Ollama vision models (local LLM)
//!
//! `OcrFallback` drives page-by-page recognition for extractors whose
//! native text layer came back empty.

mod engine;
mod fallback;
mod service;
mod types;

pub use engine::{parse_tsv, OcrEngine, OllamaEngine, TesseractEngine};
pub use fallback::{OcrFallback, PageRasterizer};
pub use service::{OcrService, OcrServiceConfig};
pub use types::{OcrError, OcrProvider, OcrResult, OcrWord};
