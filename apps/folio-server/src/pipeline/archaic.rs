//! Archaic spelling modernization (English, Russian)
//!
//! English uses a word list of obsolete forms. Russian pre-reform
//! orthography is mapped letter by letter, and the word-final hard sign
//! after a consonant is dropped.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexBuilder};

use super::{is_verbatim, map_text_within, match_case, Budget, BudgetExhausted, ProcessingContext, TextProcessor};

const ENGLISH: &[(&str, &str)] = &[
    ("to-day", "today"),
    ("to-morrow", "tomorrow"),
    ("to-night", "tonight"),
    ("shew", "show"),
    ("shews", "shows"),
    ("shewn", "shown"),
    ("shewed", "showed"),
    ("shewing", "showing"),
    ("connexion", "connection"),
    ("connexions", "connections"),
    ("compleat", "complete"),
    ("antient", "ancient"),
    ("chuse", "choose"),
    ("chusing", "choosing"),
    ("musick", "music"),
    ("publick", "public"),
    ("logick", "logic"),
    ("critick", "critic"),
    ("waggon", "wagon"),
    ("waggons", "wagons"),
    ("recal", "recall"),
    ("intrust", "entrust"),
    ("inclose", "enclose"),
    ("phantasy", "fantasy"),
    ("segar", "cigar"),
    ("surprize", "surprise"),
    ("surprized", "surprised"),
    ("burthen", "burden"),
    ("murther", "murder"),
    ("untill", "until"),
    ("despatch", "dispatch"),
];

static ENGLISH_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| ENGLISH.iter().copied().collect());

static ENGLISH_RE: Lazy<Regex> = Lazy::new(|| {
    let words = ENGLISH
        .iter()
        .map(|(old, _)| regex::escape(old))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&format!(r"\b(?:{})\b", words))
        .case_insensitive(true)
        .build()
        .unwrap()
});

/// Word-final hard sign after a consonant
static HARD_SIGN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([бвгджзклмнпрстфхцчшщБВГДЖЗКЛМНПРСТФХЦЧШЩ])[ъЪ]\b").unwrap());

pub struct ArchaicSpellingProcessor;

impl TextProcessor for ArchaicSpellingProcessor {
    fn name(&self) -> &'static str {
        "archaic_spelling"
    }

    fn order(&self) -> i32 {
        40
    }

    fn applies_to(&self, ctx: &ProcessingContext) -> bool {
        ctx.language_in(&["en", "ru"])
    }

    fn process(&self, html: &str, ctx: &ProcessingContext, budget: &Budget) -> Result<String, BudgetExhausted> {
        let russian = ctx.language_in(&["ru"]);
        map_text_within(html, |name, _| is_verbatim(name), budget, |text| {
            if russian {
                modernize_russian(text)
            } else {
                modernize_english(text)
            }
        })
    }
}

fn modernize_english(text: &str) -> String {
    ENGLISH_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let old = &caps[0];
            match ENGLISH_MAP.get(old.to_lowercase().as_str()) {
                Some(modern) => match_case(old, modern),
                None => old.to_string(),
            }
        })
        .into_owned()
}

fn modernize_russian(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| match c {
            'ѣ' => 'е',
            'Ѣ' => 'Е',
            'і' => 'и',
            'І' => 'И',
            'ѳ' => 'ф',
            'Ѳ' => 'Ф',
            'ѵ' => 'и',
            'Ѵ' => 'И',
            c => c,
        })
        .collect();
    HARD_SIGN_RE.replace_all(&mapped, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{assert_idempotent, run};

    #[test]
    fn test_english_words() {
        let html = "<p>To-day he shewed the Connexion.</p>";
        assert_eq!(
            run(&ArchaicSpellingProcessor, html, Some("en")),
            "<p>Today he showed the Connection.</p>"
        );
    }

    #[test]
    fn test_english_whole_words_only() {
        let html = "<p>The shewolf ran.</p>";
        assert_eq!(run(&ArchaicSpellingProcessor, html, Some("en")), html);
    }

    #[test]
    fn test_russian_orthography() {
        let html = "<p>Миръ вѣры и Ѳеодоръ</p>";
        assert_eq!(run(&ArchaicSpellingProcessor, html, Some("ru")), "<p>Мир веры и Феодор</p>");
    }

    #[test]
    fn test_russian_inner_hard_sign_kept() {
        let html = "<p>подъезд объявление</p>";
        assert_eq!(run(&ArchaicSpellingProcessor, html, Some("ru")), html);
    }

    #[test]
    fn test_gated_by_language() {
        let ctx = ProcessingContext::new(Some("de"));
        assert!(!ArchaicSpellingProcessor.applies_to(&ctx));
        assert!(!ArchaicSpellingProcessor.applies_to(&ProcessingContext::new(None)));
        assert!(ArchaicSpellingProcessor.applies_to(&ProcessingContext::new(Some("en-US"))));
    }

    #[test]
    fn test_code_untouched() {
        let html = "<p><code>shew()</code></p>";
        assert_eq!(run(&ArchaicSpellingProcessor, html, Some("en")), html);
    }

    #[test]
    fn test_idempotent() {
        assert_idempotent(&ArchaicSpellingProcessor, "<p>To-day he shewed it</p>", Some("en"));
        assert_idempotent(&ArchaicSpellingProcessor, "<p>Миръ вѣры</p>", Some("ru"));
    }
}
