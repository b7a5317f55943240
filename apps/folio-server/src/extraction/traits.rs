//! Extractor trait
//!
//! Format-agnostic interface implemented once per `SourceFormat`.

use async_trait::async_trait;

use super::cancel::CancelToken;
use super::error::Result;
use super::splitter::ChapterSplitter;
use super::types::{ExtractionOptions, ExtractionRequest, ExtractionResult, SourceFormat, TocEntry};

/// Turns one container format into an `ExtractionResult`
///
/// Implementations never fail on malformed input: they report problems as
/// warnings and `TextSource::None`, so the caller always gets a result it
/// can record. `Err` is returned only for cancellation.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Format handled by this extractor
    fn format(&self) -> SourceFormat;

    /// Extract units, metadata and diagnostics from the request
    async fn extract(&self, request: ExtractionRequest, cancel: &CancelToken) -> Result<ExtractionResult>;
}

/// Common exit path for every extractor: split oversized units, then
/// enforce the result invariants
pub fn finish(mut result: ExtractionResult, options: &ExtractionOptions) -> ExtractionResult {
    let units = std::mem::take(&mut result.units);
    let (units, first_part) = ChapterSplitter::new(options.max_words_per_part).split_mapped(units);
    result.units = units;
    remap_toc(&mut result.toc, &first_part);
    result.seal()
}

/// Point TOC entries at the first part of the unit they referenced
fn remap_toc(entries: &mut [TocEntry], first_part: &[usize]) {
    for entry in entries {
        entry.unit_index = entry.unit_index.and_then(|i| first_part.get(i).copied());
        remap_toc(&mut entry.children, first_part);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::types::{ContentUnit, TextSource, UnitType};

    #[test]
    fn test_finish_splits_and_remaps_toc() {
        let mut result = ExtractionResult::new(SourceFormat::Epub);
        result.diagnostics.text_source = TextSource::NativeText;
        result.units = vec![
            ContentUnit::from_html(UnitType::Chapter, None, "<p>a b c.</p><p>d e f.</p>".into(), 0),
            ContentUnit::from_html(UnitType::Chapter, None, "<p>g h.</p>".into(), 1),
        ];
        result.toc = vec![TocEntry {
            label: "Second".into(),
            unit_index: Some(1),
            children: Vec::new(),
        }];
        let options = ExtractionOptions {
            max_words_per_part: 3,
            ..ExtractionOptions::default()
        };

        let result = finish(result, &options);
        assert_eq!(result.units.len(), 3);
        assert_eq!(result.toc[0].unit_index, Some(2));
    }
}
