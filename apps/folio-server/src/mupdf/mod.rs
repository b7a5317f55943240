//! Low-level MuPDF Wrapper
//!
//! MuPDF's `fz_context` is **NOT thread-safe**, and its documents are not
//! `Send`. `SafeDocument` keeps only the source bytes and opens a fresh
//! document inside every operation, serialized by a mutex. Callers run
//! operations on the blocking pool.
//!
//! # Usage
//!
//! ```rust,ignore
//! use folio_server::mupdf::SafeDocument;
//!
//! let doc = SafeDocument::from_bytes(pdf_bytes)?;
//! let text = doc.with_page(0, |page| page_text(page))?;
//! ```

mod render;
mod safe;

pub use render::{page_text, render_png};
pub use safe::{MupdfError, SafeDocument};
