//! Soft hyphenation (English, Russian)
//!
//! Inserts U+00AD into long words so narrow columns can break them.
//! Break points come from a small dictionary, falling back to vowel and
//! consonant patterns for unknown words. Words that already carry a soft
//! hyphen are left alone.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{is_verbatim, map_text_within, Budget, BudgetExhausted, ProcessingContext, TextProcessor};

const SOFT_HYPHEN: char = '\u{00AD}';

/// Shortest word that gets break points
const MIN_WORD_CHARS: usize = 8;

/// Shortest fragment on either side of a break
const MIN_FRAGMENT: usize = 3;

const DICTIONARY: &[&str] = &[
    "in-for-ma-tion",
    "lit-er-a-ture",
    "ex-tra-or-di-nary",
    "knowl-edge",
    "gov-ern-ment",
    "un-der-stand-ing",
    "every-thing",
    "beau-ti-ful",
    "dif-fer-ent",
    "some-thing",
    "re-mem-ber",
    "to-geth-er",
    "ques-tion",
    "ли-те-ра-ту-ра",
    "го-су-дар-ство",
    "че-ло-ве-че-ский",
    "раз-го-вор",
];

static WORDS: Lazy<HashMap<String, Vec<usize>>> = Lazy::new(|| {
    DICTIONARY
        .iter()
        .map(|entry| {
            let mut breaks = Vec::new();
            let mut word = String::new();
            for ch in entry.chars() {
                if ch == '-' {
                    breaks.push(word.chars().count());
                } else {
                    word.push(ch);
                }
            }
            (word, breaks)
        })
        .collect()
});

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\u{00AD}]{8,}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    English,
    Russian,
}

#[derive(Debug, Clone)]
pub struct SoftHyphenProcessor {
    min_word_chars: usize,
}

impl Default for SoftHyphenProcessor {
    fn default() -> Self {
        Self {
            min_word_chars: MIN_WORD_CHARS,
        }
    }
}

impl TextProcessor for SoftHyphenProcessor {
    fn name(&self) -> &'static str {
        "soft_hyphens"
    }

    fn order(&self) -> i32 {
        80
    }

    fn applies_to(&self, ctx: &ProcessingContext) -> bool {
        ctx.language_in(&["en", "ru"])
    }

    fn process(&self, html: &str, ctx: &ProcessingContext, budget: &Budget) -> Result<String, BudgetExhausted> {
        let script = if ctx.language_in(&["ru"]) {
            Script::Russian
        } else {
            Script::English
        };
        map_text_within(html, is_skipped, budget, |text| {
            WORD_RE
                .replace_all(text, |caps: &Captures<'_>| self.hyphenate(&caps[0], script))
                .into_owned()
        })
    }
}

impl SoftHyphenProcessor {
    fn hyphenate(&self, word: &str, script: Script) -> String {
        let chars: Vec<char> = word.chars().collect();
        if chars.contains(&SOFT_HYPHEN) || chars.len() < self.min_word_chars {
            return word.to_string();
        }
        if chars.iter().all(|c| c.is_uppercase()) {
            return word.to_string();
        }

        let lower: String = word.to_lowercase();
        let breaks = match WORDS.get(&lower) {
            Some(breaks) if lower.chars().count() == chars.len() => breaks.clone(),
            _ => pattern_breaks(&lower.chars().collect::<Vec<_>>(), script),
        };
        if breaks.is_empty() || lower.chars().count() != chars.len() {
            return word.to_string();
        }

        let mut out = String::with_capacity(word.len() + breaks.len() * 2);
        for (i, ch) in chars.iter().enumerate() {
            if breaks.contains(&i) {
                out.push(SOFT_HYPHEN);
            }
            out.push(*ch);
        }
        out
    }
}

fn is_skipped(name: &str, _raw: &str) -> bool {
    is_verbatim(name)
        || name.eq_ignore_ascii_case("abbr")
        || (name.len() == 2 && name.as_bytes()[0].eq_ignore_ascii_case(&b'h') && name.as_bytes()[1].is_ascii_digit())
}

fn is_vowel(c: char, script: Script) -> bool {
    match script {
        Script::English => "aeiouy".contains(c),
        Script::Russian => "аеёиоуыэюя".contains(c),
    }
}

/// Letters that never start a syllable
fn is_trailing_sign(c: char, script: Script) -> bool {
    script == Script::Russian && "ьъй".contains(c)
}

fn is_digraph(a: char, b: char, script: Script) -> bool {
    script == Script::English
        && matches!(
            (a, b),
            ('t', 'h') | ('c', 'h') | ('s', 'h') | ('p', 'h') | ('w', 'h') | ('c', 'k') | ('n', 'g') | ('q', 'u')
        )
}

/// Break positions (index of the first char after the break) from
/// syllable patterns: V-CV and VC-CV
fn pattern_breaks(chars: &[char], script: Script) -> Vec<usize> {
    let mut breaks: Vec<usize> = Vec::new();
    if chars.len() < MIN_FRAGMENT * 2 {
        return breaks;
    }

    for k in MIN_FRAGMENT..=chars.len() - MIN_FRAGMENT {
        if breaks.last().is_some_and(|&last| k - last < 2) {
            continue;
        }
        let (prev, cur) = (chars[k - 1], chars[k]);
        let Some(&next) = chars.get(k + 1) else { continue };
        if is_trailing_sign(cur, script) {
            continue;
        }

        let v_cv = is_vowel(prev, script) && !is_vowel(cur, script) && is_vowel(next, script);
        let vc_cv = is_vowel(chars[k - 2], script)
            && !is_vowel(prev, script)
            && !is_vowel(cur, script)
            && is_vowel(next, script)
            && !is_digraph(prev, cur, script);

        if v_cv || vc_cv {
            breaks.push(k);
        }
    }
    breaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{assert_idempotent, run};

    fn visible(s: &str) -> String {
        s.replace(SOFT_HYPHEN, "-")
    }

    #[test]
    fn test_dictionary_words() {
        let out = run(&SoftHyphenProcessor::default(), "<p>Information and Literature</p>", Some("en"));
        assert_eq!(visible(&out), "<p>In-for-ma-tion and Lit-er-a-ture</p>");
    }

    #[test]
    fn test_pattern_fallback() {
        let out = run(&SoftHyphenProcessor::default(), "<p>remarkable</p>", Some("en"));
        assert_eq!(visible(&out), "<p>remar-kable</p>");
    }

    #[test]
    fn test_russian_signs_stay_attached() {
        let out = run(&SoftHyphenProcessor::default(), "<p>литература</p>", Some("ru"));
        assert_eq!(visible(&out), "<p>ли-те-ра-ту-ра</p>");

        let word: Vec<char> = "большинство".chars().collect();
        for k in pattern_breaks(&word, Script::Russian) {
            assert!(!"ьъй".contains(word[k]));
        }
    }

    #[test]
    fn test_short_and_skipped() {
        let html = "<h2>Extraordinary</h2><p>short <code>information</code> NATIONALITY</p>";
        assert_eq!(run(&SoftHyphenProcessor::default(), html, Some("en")), html);
    }

    #[test]
    fn test_gated() {
        assert!(!SoftHyphenProcessor::default().applies_to(&ProcessingContext::new(Some("fr"))));
    }

    #[test]
    fn test_idempotent() {
        assert_idempotent(
            &SoftHyphenProcessor::default(),
            "<p>Understanding extraordinary remarkable constitutional</p>",
            Some("en"),
        );
    }
}
