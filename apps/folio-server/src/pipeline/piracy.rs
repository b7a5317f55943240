//! Redistribution-site watermark removal
//!
//! Pirate libraries inject short boilerplate pages ("Downloaded from ...").
//! A short unit carrying two or more of the known phrases, or a known site
//! domain anywhere in its markup, is emptied so the worker drops it.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use super::{visible_text, Budget, BudgetExhausted, ProcessingContext, TextProcessor};
use crate::html::count_words;

/// Units longer than this are real content, whatever they mention
const SHORT_UNIT_WORDS: usize = 250;

/// Known redistribution-site domains
const WATERMARK_DOMAINS: &[&str] = &[
    "flibusta.net",
    "flibusta.is",
    "royallib.com",
    "royallib.ru",
    "lib.rus.ec",
    "librusec.pro",
    "litmir.me",
    "litmir.net",
    "fb2.top",
    "libgen.rs",
    "libgen.is",
    "z-lib.org",
    "b-ok.org",
    "bookfi.net",
    "oceanofpdf.com",
    "epubfree.com",
    "allitebooks.com",
    "ebook3000.com",
];

const WATERMARK_PHRASES: &[&str] = &[
    "downloaded from",
    "this book was downloaded",
    "free ebooks at",
    "free books at",
    "read more books at",
    "visit our website",
    "for more free ebooks",
    "thank you for downloading",
    "scanned by",
    "converted by",
    "книга скачана",
    "скачано с",
    "скачать бесплатно",
    "спасибо, что скачали",
    "приятного чтения",
    "электронная библиотека",
    "все книги автора",
];

static PHRASE_RE: Lazy<Regex> = Lazy::new(|| alternation(WATERMARK_PHRASES));
static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| alternation(WATERMARK_DOMAINS));

fn alternation(items: &[&str]) -> Regex {
    let pattern = items
        .iter()
        .map(|item| regex::escape(item))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .unwrap()
}

#[derive(Debug, Clone)]
pub struct PiracyProcessor {
    max_words: usize,
}

impl Default for PiracyProcessor {
    fn default() -> Self {
        Self {
            max_words: SHORT_UNIT_WORDS,
        }
    }
}

impl PiracyProcessor {
    /// Whether `html` is a watermark unit
    pub fn is_watermark(&self, html: &str) -> bool {
        let text = visible_text(html);
        if count_words(&text) > self.max_words {
            return false;
        }
        if DOMAIN_RE.is_match(html) {
            return true;
        }
        let mut distinct: Vec<String> = PHRASE_RE
            .find_iter(&text)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        distinct.sort();
        distinct.dedup();
        distinct.len() >= 2
    }
}

impl TextProcessor for PiracyProcessor {
    fn name(&self) -> &'static str {
        "piracy"
    }

    fn order(&self) -> i32 {
        0
    }

    fn process(&self, html: &str, _ctx: &ProcessingContext, budget: &Budget) -> Result<String, BudgetExhausted> {
        budget.check()?;
        if self.is_watermark(html) {
            tracing::debug!(len = html.len(), "Dropping watermark unit");
            return Ok(String::new());
        }
        Ok(html.to_string())
    }
}

/// Watermark domains present in `html`
pub fn watermark_domains(html: &str) -> Vec<String> {
    DOMAIN_RE
        .find_iter(html)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{assert_idempotent, run};

    #[test]
    fn test_two_phrases_empty_the_unit() {
        let html = "<p>This book was downloaded from a site.</p><p>Visit our website for more!</p>";
        assert_eq!(run(&PiracyProcessor::default(), html, None), "");
    }

    #[test]
    fn test_single_phrase_is_kept() {
        let html = "<p>The letter was downloaded from the archive yesterday.</p>";
        assert_eq!(run(&PiracyProcessor::default(), html, None), html);
    }

    #[test]
    fn test_domain_in_markup() {
        let html = r#"<p><a href="http://flibusta.net/b/1">link</a></p>"#;
        assert_eq!(run(&PiracyProcessor::default(), html, None), "");
    }

    #[test]
    fn test_long_content_is_kept() {
        let mut html = String::from("<p>Downloaded from somewhere. Free ebooks at another place.</p>");
        for _ in 0..60 {
            html.push_str("<p>An ordinary paragraph of story text.</p>");
        }
        assert_eq!(run(&PiracyProcessor::default(), &html, None), html);
    }

    #[test]
    fn test_russian_watermark() {
        let html = "<p>Книга скачана с сайта. Приятного чтения!</p>";
        assert_eq!(run(&PiracyProcessor::default(), html, Some("ru")), "");
    }

    #[test]
    fn test_idempotent() {
        assert_idempotent(&PiracyProcessor::default(), "<p>Plain text.</p>", None);
    }

    #[test]
    fn test_watermark_domains() {
        assert_eq!(watermark_domains("see LitMir.me and royallib.com"), vec!["litmir.me", "royallib.com"]);
    }
}
