//! Semantic markup
//!
//! Wraps abbreviations, era markers and units of measure in `<abbr>` and
//! roman numerals in `<span class="roman">`. Text already inside those
//! elements is skipped, so nothing is wrapped twice.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::typography::UNITS;
use super::{is_verbatim, map_text_within, Budget, BudgetExhausted, ProcessingContext, TextProcessor};
use crate::html::attribute;

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("e.g.", "for example"),
    ("i.e.", "that is"),
    ("etc.", "et cetera"),
    ("cf.", "compare"),
    ("viz.", "namely"),
    ("vs.", "versus"),
    ("approx.", "approximately"),
    ("т.е.", "то есть"),
    ("т.д.", "так далее"),
    ("т.п.", "тому подобное"),
];

/// Words after which a single roman numeral is safe to tag
const NUMERAL_CONTEXT: &[&str] = &[
    "Chapter", "Book", "Part", "Volume", "Vol.", "Act", "Scene", "Canto", "Section", "Appendix",
    "Louis", "Henry", "George", "Charles", "Edward", "William", "Richard", "James", "Pope", "Pius",
    "Peter", "Ivan", "Nicholas", "Alexander", "Catherine", "Elizabeth", "Глава", "Часть", "Том",
    "Книга",
];

/// Valid standalone numerals that are more often words or initials
const NUMERAL_EXCLUDED: &[&str] = &["LI", "CC", "CV", "CL", "CI", "XI'S"];

static ERA_AFTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,4})[ \u{00A0}]?(BCE\b|BC\b|CE\b|AD\b|B\.C\.|A\.D\.)").unwrap());

static ERA_BEFORE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(AD|A\.D\.)[ \u{00A0}](\d{1,4})\b").unwrap());

static UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    let mut units: Vec<&str> = UNITS.iter().map(|(u, _)| *u).collect();
    units.sort_by_key(|u| std::cmp::Reverse(u.len()));
    let units = units.iter().map(|u| regex::escape(u)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"(\d)\u{{00A0}}({})\b", units)).unwrap()
});

static ABBREVIATION_RE: Lazy<Regex> = Lazy::new(|| {
    let words = ABBREVIATIONS
        .iter()
        .map(|(a, _)| regex::escape(a))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{})", words)).unwrap()
});

static CONTEXT_NUMERAL_RE: Lazy<Regex> = Lazy::new(|| {
    let words = NUMERAL_CONTEXT
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b({})([ \u{{00A0}}])([IVXLCDM]+)\b", words)).unwrap()
});

static STANDALONE_NUMERAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[IVXLC]{2,}\b").unwrap());

static ROMAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^M{0,3}(CM|CD|D?C{0,3})(XC|XL|L?X{0,3})(IX|IV|V?I{0,3})$").unwrap());

pub struct SemanticMarkupProcessor;

impl TextProcessor for SemanticMarkupProcessor {
    fn name(&self) -> &'static str {
        "semantic_markup"
    }

    fn order(&self) -> i32 {
        70
    }

    fn process(&self, html: &str, _ctx: &ProcessingContext, budget: &Budget) -> Result<String, BudgetExhausted> {
        let rules: [fn(&str) -> String; 5] = [
            tag_eras,
            tag_units,
            tag_abbreviations,
            tag_context_numerals,
            tag_standalone_numerals,
        ];
        let mut current = html.to_string();
        for rule in rules {
            current = map_text_within(&current, is_skipped, budget, rule)?;
        }
        Ok(current)
    }
}

/// Verbatim elements and markup this pass produced
fn is_skipped(name: &str, raw: &str) -> bool {
    if is_verbatim(name) || name.eq_ignore_ascii_case("abbr") {
        return true;
    }
    name.eq_ignore_ascii_case("span")
        && attribute(raw, "class").is_some_and(|class| class.split_whitespace().any(|c| c == "roman"))
}

fn is_roman(candidate: &str) -> bool {
    !candidate.is_empty() && ROMAN_RE.is_match(candidate)
}

fn roman_span(numeral: &str) -> String {
    format!(r#"<span class="roman">{}</span>"#, numeral)
}

fn tag_eras(text: &str) -> String {
    let after = ERA_AFTER_RE.replace_all(text, "$1\u{00A0}<abbr class=\"era\">$2</abbr>");
    ERA_BEFORE_RE
        .replace_all(&after, "<abbr class=\"era\">$1</abbr>\u{00A0}$2")
        .into_owned()
}

fn tag_units(text: &str) -> String {
    UNIT_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let unit = &caps[2];
            let title = UNITS.iter().find(|(u, _)| *u == unit).map(|(_, t)| *t).unwrap_or(unit);
            format!(
                "{}\u{00A0}<abbr class=\"unit\" title=\"{}\">{}</abbr>",
                &caps[1], title, unit
            )
        })
        .into_owned()
}

fn tag_abbreviations(text: &str) -> String {
    ABBREVIATION_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let abbr = &caps[0];
            match ABBREVIATIONS.iter().find(|(a, _)| *a == abbr) {
                Some((_, title)) => format!(r#"<abbr title="{}">{}</abbr>"#, title, abbr),
                None => abbr.to_string(),
            }
        })
        .into_owned()
}

fn tag_context_numerals(text: &str) -> String {
    CONTEXT_NUMERAL_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let numeral = &caps[3];
            if is_roman(numeral) {
                format!("{}{}{}", &caps[1], &caps[2], roman_span(numeral))
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

fn tag_standalone_numerals(text: &str) -> String {
    STANDALONE_NUMERAL_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let numeral = &caps[0];
            if is_roman(numeral) && !NUMERAL_EXCLUDED.contains(&numeral) {
                roman_span(numeral)
            } else {
                numeral.to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{assert_idempotent, run};

    #[test]
    fn test_roman_numerals() {
        let html = "<h2>Chapter IV</h2><p>Louis XIV met Henry V in MCMXC, not LI or CIVIL.</p>";
        assert_eq!(
            run(&SemanticMarkupProcessor, html, None),
            concat!(
                r#"<h2>Chapter <span class="roman">IV</span></h2>"#,
                r#"<p>Louis <span class="roman">XIV</span> met Henry <span class="roman">V</span> "#,
                r#"in MCMXC, not LI or CIVIL.</p>"#
            )
        );
    }

    #[test]
    fn test_pronoun_i_untouched() {
        let html = "<p>I think I can.</p>";
        assert_eq!(run(&SemanticMarkupProcessor, html, None), html);
    }

    #[test]
    fn test_eras() {
        let html = "<p>From 44 BC to AD 14.</p>";
        assert_eq!(
            run(&SemanticMarkupProcessor, html, None),
            "<p>From 44\u{00A0}<abbr class=\"era\">BC</abbr> to <abbr class=\"era\">AD</abbr>\u{00A0}14.</p>"
        );
    }

    #[test]
    fn test_units_and_abbreviations() {
        let html = "<p>Carry 10\u{00A0}kg, e.g. flour.</p>";
        assert_eq!(
            run(&SemanticMarkupProcessor, html, None),
            "<p>Carry 10\u{00A0}<abbr class=\"unit\" title=\"kilograms\">kg</abbr>, \
             <abbr title=\"for example\">e.g.</abbr> flour.</p>"
        );
    }

    #[test]
    fn test_existing_markup_not_rewrapped() {
        let html = r#"<p><abbr title="x">e.g.</abbr> and <span class="roman">XII</span></p>"#;
        assert_eq!(run(&SemanticMarkupProcessor, html, None), html);
    }

    #[test]
    fn test_idempotent() {
        for html in [
            "<h2>Chapter IV</h2><p>Louis XIV, 44 BC, AD 14, 5\u{00A0}km, i.e. XX</p>",
            "<p>Глава III, т.е. конец</p>",
        ] {
            assert_idempotent(&SemanticMarkupProcessor, html, None);
        }
    }
}
