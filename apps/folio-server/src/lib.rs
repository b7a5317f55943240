//! Folio Server Library
//!
//! Book ingestion core: turns uploaded EPUB, FB2, PDF and DJVU files into
//! normalized, chapter-paginated HTML ready for storage, display and
//! full-text indexing. The server binary is in main.rs.
//!
//! # Modules
//!
//! - `extraction`: Format-agnostic data model, registry and splitter
//! - `formats`: EPUB, FB2, PDF and DJVU extractors
//! - `ocr`: OCR providers and the no-text-layer fallback
//! - `pipeline`: Ordered text normalization passes
//! - `worker`: Ingestion job loop
//! - `db`, `storage`, `search`: Persistence and indexing collaborators
//! - `routes`: Ingestion HTTP surface

pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod formats;
pub mod html;
pub mod ocr;
pub mod pipeline;
pub mod routes;
pub mod search;
pub mod state;
pub mod storage;
pub mod worker;

mod mupdf;
