//! Format extractors
//!
//! Each module turns one container format into an `ExtractionResult`:
//! - `epub`: zipped XHTML spine with OPF metadata
//! - `fb2`: FictionBook XML with base64 binaries
//! - `pdf`: MuPDF text layer, OCR fallback
//! - `djvu`: DjVuLibre tools, OCR fallback
//!
//! `xml` is the small element tree shared by the XML-based formats.

pub mod djvu;
pub mod epub;
pub mod fb2;
pub mod pdf;
pub mod xml;
