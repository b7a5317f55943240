//! Text processing pipeline
//!
//! Ordered string-to-string passes applied to unit HTML before it is
//! stored. Every pass:
//! - only rewrites text runs (tags and attribute values pass through)
//! - is idempotent
//! - runs under a time `Budget`; a pass that runs out returns its input
//!
//! The pass list is sorted once when the pipeline is built.

mod archaic;
mod empty_tags;
mod entities;
mod hyphens;
mod piracy;
mod semantic;
mod soft_hyphen;
mod typography;
mod whitespace;

use std::time::{Duration, Instant};

use crate::html::{map_text, Scanner, Token};

pub use archaic::ArchaicSpellingProcessor;
pub use empty_tags::EmptyTagProcessor;
pub use entities::EntityProcessor;
pub use hyphens::ArchaicHyphenProcessor;
pub use piracy::{watermark_domains, PiracyProcessor};
pub use semantic::SemanticMarkupProcessor;
pub use soft_hyphen::SoftHyphenProcessor;
pub use typography::TypographyProcessor;
pub use whitespace::WhitespaceProcessor;

/// Default per-pass time budget
pub const DEFAULT_PASS_BUDGET: Duration = Duration::from_secs(2);

/// A pass ran past its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("text pass exceeded its time budget")]
pub struct BudgetExhausted;

/// Deadline for one pass over one unit
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    deadline: Instant,
}

impl Budget {
    pub fn new(limit: Duration) -> Self {
        Self {
            deadline: Instant::now() + limit,
        }
    }

    pub fn check(&self) -> Result<(), BudgetExhausted> {
        if Instant::now() >= self.deadline {
            Err(BudgetExhausted)
        } else {
            Ok(())
        }
    }
}

/// Per-unit input shared by all passes
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    /// BCP 47 language tag of the edition, if known
    pub language: Option<String>,
    pub pass_budget: Duration,
}

impl Default for ProcessingContext {
    fn default() -> Self {
        Self {
            language: None,
            pass_budget: DEFAULT_PASS_BUDGET,
        }
    }
}

impl ProcessingContext {
    pub fn new(language: Option<&str>) -> Self {
        Self {
            language: language.map(String::from),
            ..Self::default()
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.pass_budget = budget;
        self
    }

    /// Lowercased primary subtag: `en-GB` -> `en`
    pub fn primary_language(&self) -> Option<String> {
        let tag = self.language.as_deref()?.trim();
        let primary = tag.split(['-', '_']).next()?.to_ascii_lowercase();
        (!primary.is_empty()).then_some(primary)
    }

    /// Whether the primary language is one of `languages`
    pub fn language_in(&self, languages: &[&str]) -> bool {
        self.primary_language()
            .is_some_and(|lang| languages.contains(&lang.as_str()))
    }
}

/// One normalization pass
pub trait TextProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Position in the pipeline, ascending
    fn order(&self) -> i32;

    /// Language gate; ungated passes always apply
    fn applies_to(&self, _ctx: &ProcessingContext) -> bool {
        true
    }

    fn process(&self, html: &str, ctx: &ProcessingContext, budget: &Budget) -> Result<String, BudgetExhausted>;
}

/// Sorted list of passes
pub struct TextPipeline {
    processors: Vec<Box<dyn TextProcessor>>,
}

impl TextPipeline {
    pub fn new(mut processors: Vec<Box<dyn TextProcessor>>) -> Self {
        processors.sort_by_key(|p| p.order());
        Self { processors }
    }

    /// Every built-in pass
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(PiracyProcessor::default()),
            Box::new(WhitespaceProcessor),
            Box::new(EntityProcessor),
            Box::new(EmptyTagProcessor),
            Box::new(ArchaicSpellingProcessor),
            Box::new(ArchaicHyphenProcessor),
            Box::new(TypographyProcessor),
            Box::new(SemanticMarkupProcessor),
            Box::new(SoftHyphenProcessor::default()),
        ])
    }

    /// Pass names in execution order
    pub fn names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Run every applicable pass; an empty result means the unit must be
    /// dropped
    pub fn process(&self, html: &str, ctx: &ProcessingContext) -> String {
        let mut current = html.to_string();
        for processor in &self.processors {
            if !processor.applies_to(ctx) {
                continue;
            }
            let budget = Budget::new(ctx.pass_budget);
            match processor.process(&current, ctx, &budget) {
                Ok(next) => current = next,
                Err(BudgetExhausted) => {
                    tracing::warn!(pass = processor.name(), "Text pass ran out of time, input kept");
                }
            }
            if current.trim().is_empty() {
                break;
            }
        }
        current
    }
}

impl Default for TextPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

/// Elements whose text is never rewritten
pub(crate) fn is_verbatim(name: &str) -> bool {
    ["code", "pre", "script", "style", "kbd", "samp", "var", "math", "svg"]
        .iter()
        .any(|v| v.eq_ignore_ascii_case(name))
}

/// `map_text` that checks `budget` before every text run
pub(crate) fn map_text_within<S, F>(html: &str, skip: S, budget: &Budget, mut f: F) -> Result<String, BudgetExhausted>
where
    S: Fn(&str, &str) -> bool,
    F: FnMut(&str) -> String,
{
    let mut exhausted = false;
    let out = map_text(html, skip, |text| {
        if exhausted || budget.check().is_err() {
            exhausted = true;
            return text.to_string();
        }
        f(text)
    });
    if exhausted {
        Err(BudgetExhausted)
    } else {
        Ok(out)
    }
}

/// Plain text of the non-verbatim runs, for detection passes
pub(crate) fn visible_text(html: &str) -> String {
    let mut text = String::new();
    let mut skipped = 0usize;
    for token in Scanner::new(html) {
        match token {
            Token::StartTag { name, self_closing, .. } if is_verbatim(name) && !self_closing => skipped += 1,
            Token::EndTag { name, .. } if is_verbatim(name) => skipped = skipped.saturating_sub(1),
            Token::Text(run) if skipped == 0 => {
                text.push_str(&html_escape::decode_html_entities(run));
                text.push(' ');
            }
            _ => {}
        }
    }
    text
}

/// Copy the case pattern of `source` onto `replacement`
pub(crate) fn match_case(source: &str, replacement: &str) -> String {
    let letters: Vec<char> = source.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }
    if letters.first().is_some_and(|c| c.is_uppercase()) {
        let mut chars = replacement.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
    }
    replacement.to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Run a pass with a generous budget
    pub fn run(processor: &dyn TextProcessor, html: &str, lang: Option<&str>) -> String {
        let ctx = ProcessingContext::new(lang);
        processor
            .process(html, &ctx, &Budget::new(Duration::from_secs(30)))
            .unwrap()
    }

    /// Assert `process(process(x)) == process(x)`
    pub fn assert_idempotent(processor: &dyn TextProcessor, html: &str, lang: Option<&str>) {
        let once = run(processor, html, lang);
        let twice = run(processor, &once, lang);
        assert_eq!(once, twice, "{} is not idempotent for {:?}", processor.name(), html);
    }
}
