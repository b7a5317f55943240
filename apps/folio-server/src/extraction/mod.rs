//! Extraction contract
//!
//! Common input and output shape for all book formats, the registry that
//! resolves an extractor for a file, cooperative cancellation, and the
//! chapter splitter every extractor runs before returning.

mod cancel;
mod error;
mod registry;
mod splitter;
mod traits;
mod types;

pub use cancel::CancelToken;
pub use error::{ExtractionError, Result};
pub use registry::ExtractorRegistry;
pub use splitter::ChapterSplitter;
pub use traits::{finish, Extractor};
pub use types::{
    ContentUnit, ExtractionDiagnostics, ExtractionMetadata, ExtractionOptions, ExtractionRequest,
    ExtractionResult, InlineImage, SourceFormat, TextSource, TocEntry, UnitType, Warning,
    WarningCode,
};
