//! Typography
//!
//! Smart quotes, dashes, ellipses, vulgar fractions and a no-break space
//! between numbers and units of measure. Quote direction is decided from
//! the previous output character, carried across inline tags.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{is_verbatim, Budget, BudgetExhausted, ProcessingContext, TextProcessor};
use crate::html::{is_block, is_void, Scanner, Token};

/// Units that get a no-break space after their number
pub(crate) const UNITS: &[(&str, &str)] = &[
    ("km", "kilometres"),
    ("cm", "centimetres"),
    ("mm", "millimetres"),
    ("kg", "kilograms"),
    ("mg", "milligrams"),
    ("ml", "millilitres"),
    ("lb", "pounds"),
    ("lbs", "pounds"),
    ("oz", "ounces"),
    ("ft", "feet"),
    ("mi", "miles"),
    ("mph", "miles per hour"),
    ("km/h", "kilometres per hour"),
    ("кг", "килограммов"),
    ("км", "километров"),
    ("см", "сантиметров"),
    ("мм", "миллиметров"),
];

static ELLIPSIS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[ \u{00A0}]?\.[ \u{00A0}]?\.").unwrap());

static UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    let mut units: Vec<&str> = UNITS.iter().map(|(u, _)| *u).collect();
    // Longest first so `lbs` wins over `lb`
    units.sort_by_key(|u| std::cmp::Reverse(u.len()));
    let units = units.iter().map(|u| regex::escape(u)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"(\d) ?({})\b", units)).unwrap()
});

const FRACTIONS: &[(char, char, char)] = &[
    ('1', '2', '½'),
    ('1', '3', '⅓'),
    ('2', '3', '⅔'),
    ('1', '4', '¼'),
    ('3', '4', '¾'),
    ('1', '8', '⅛'),
];

struct QuoteStyle {
    open: char,
    close: char,
    dash: char,
}

const ENGLISH: QuoteStyle = QuoteStyle {
    open: '\u{201C}',
    close: '\u{201D}',
    dash: '\u{2013}',
};

const RUSSIAN: QuoteStyle = QuoteStyle {
    open: '\u{00AB}',
    close: '\u{00BB}',
    dash: '\u{2014}',
};

pub struct TypographyProcessor;

impl TextProcessor for TypographyProcessor {
    fn name(&self) -> &'static str {
        "typography"
    }

    fn order(&self) -> i32 {
        60
    }

    fn process(&self, html: &str, ctx: &ProcessingContext, budget: &Budget) -> Result<String, BudgetExhausted> {
        let style = if ctx.language_in(&["ru", "uk", "be"]) {
            &RUSSIAN
        } else {
            &ENGLISH
        };
        let mut out = String::with_capacity(html.len() + html.len() / 16);
        let mut verbatim = 0usize;
        let mut last: Option<char> = None;

        for token in Scanner::new(html) {
            match token {
                Token::Text(text) if verbatim == 0 => {
                    budget.check()?;
                    out.push_str(&typeset(text, style, &mut last));
                }
                Token::StartTag { name, raw, self_closing } => {
                    if is_verbatim(name) && !self_closing && !is_void(name) {
                        verbatim += 1;
                    }
                    // Quotes never pair across blocks
                    if is_block(name) || name.eq_ignore_ascii_case("br") {
                        last = None;
                    }
                    out.push_str(raw);
                }
                Token::EndTag { name, raw } => {
                    if is_verbatim(name) {
                        verbatim = verbatim.saturating_sub(1);
                    }
                    if is_block(name) {
                        last = None;
                    }
                    out.push_str(raw);
                }
                other => out.push_str(other.raw()),
            }
        }
        Ok(out)
    }
}

fn typeset(text: &str, style: &QuoteStyle, last: &mut Option<char>) -> String {
    let text = ELLIPSIS_RE.replace_all(text, "\u{2026}");
    let text = text.replace("---", "\u{2014}").replace("--", "\u{2014}");
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let emitted = match c {
            '"' => {
                if opens_quote(*last) {
                    style.open
                } else {
                    style.close
                }
            }
            '\'' => {
                let word_before = last.is_some_and(char::is_alphanumeric);
                if !word_before && opens_quote(*last) && next.is_some_and(char::is_alphanumeric) {
                    '\u{2018}'
                } else {
                    '\u{2019}'
                }
            }
            '-' if last.map_or(true, char::is_whitespace) && next.map_or(false, char::is_whitespace) => {
                style.dash
            }
            '-' if is_numeric_range(&chars, i) => '\u{2013}',
            d if d.is_ascii_digit() => match fraction_at(&chars, i) {
                Some(fraction) => {
                    i += 2;
                    fraction
                }
                None => d,
            },
            c => c,
        };
        out.push(emitted);
        *last = Some(emitted);
        i += 1;
    }

    UNIT_RE.replace_all(&out, "$1\u{00A0}$2").into_owned()
}

fn opens_quote(last: Option<char>) -> bool {
    match last {
        None => true,
        Some(c) => c.is_whitespace() || "([{\u{2014}\u{2013}\u{2018}\u{201C}\u{00AB}/-".contains(c),
    }
}

/// `1990-1995`: digit runs of 1-4 on both sides, not part of a longer
/// hyphenated or alphanumeric token
fn is_numeric_range(chars: &[char], dash: usize) -> bool {
    let is_joiner = |c: char| c.is_alphanumeric() || c == '-' || c == '\u{2013}' || c == '/' || c == '.';

    let mut start = dash;
    while start > 0 && chars[start - 1].is_ascii_digit() {
        start -= 1;
    }
    let left = dash - start;
    let mut end = dash + 1;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    let right = end - dash - 1;

    (1..=4).contains(&left)
        && (1..=4).contains(&right)
        && (start == 0 || !is_joiner(chars[start - 1]))
        && (end == chars.len() || !is_joiner(chars[end]))
}

fn fraction_at(chars: &[char], i: usize) -> Option<char> {
    let (num, slash, den) = (chars[i], *chars.get(i + 1)?, *chars.get(i + 2)?);
    if slash != '/' {
        return None;
    }
    let standalone = |c: Option<&char>| c.map_or(true, |c| !c.is_ascii_digit() && *c != '/');
    if !standalone(i.checked_sub(1).and_then(|p| chars.get(p))) || !standalone(chars.get(i + 3)) {
        return None;
    }
    FRACTIONS
        .iter()
        .find(|(n, d, _)| *n == num && *d == den)
        .map(|(_, _, f)| *f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{assert_idempotent, run};

    #[test]
    fn test_double_quotes() {
        let html = r#"<p>He said "hello" and left.</p>"#;
        assert_eq!(
            run(&TypographyProcessor, html, Some("en")),
            "<p>He said \u{201C}hello\u{201D} and left.</p>"
        );
    }

    #[test]
    fn test_quotes_across_inline_tags() {
        let html = r#"<p>"<em>Stop</em>," she said.</p>"#;
        assert_eq!(
            run(&TypographyProcessor, html, Some("en")),
            "<p>\u{201C}<em>Stop</em>,\u{201D} she said.</p>"
        );
    }

    #[test]
    fn test_quotes_reset_at_blocks() {
        let html = r#"<p>End.</p><p>"Start"</p>"#;
        assert_eq!(
            run(&TypographyProcessor, html, Some("en")),
            "<p>End.</p><p>\u{201C}Start\u{201D}</p>"
        );
    }

    #[test]
    fn test_russian_quotes_and_dash() {
        let html = r#"<p>Он сказал "да" - и ушёл.</p>"#;
        assert_eq!(
            run(&TypographyProcessor, html, Some("ru")),
            "<p>Он сказал \u{00AB}да\u{00BB} \u{2014} и ушёл.</p>"
        );
    }

    #[test]
    fn test_apostrophes_and_single_quotes() {
        let html = "<p>It's 'fine' now</p>";
        assert_eq!(
            run(&TypographyProcessor, html, Some("en")),
            "<p>It\u{2019}s \u{2018}fine\u{2019} now</p>"
        );
    }

    #[test]
    fn test_dashes_and_ellipsis() {
        let html = "<p>Wait -- what... pages 10-20, ISBN 978-3-16</p>";
        assert_eq!(
            run(&TypographyProcessor, html, Some("en")),
            "<p>Wait \u{2014} what\u{2026} pages 10\u{2013}20, ISBN 978-3-16</p>"
        );
    }

    #[test]
    fn test_fractions_and_units() {
        let html = "<p>Add 1/2 cup, 3/4 of 12/45, carry 10kg for 5 km.</p>";
        assert_eq!(
            run(&TypographyProcessor, html, Some("en")),
            "<p>Add \u{00BD} cup, \u{00BE} of 12/45, carry 10\u{00A0}kg for 5\u{00A0}km.</p>"
        );
    }

    #[test]
    fn test_code_and_attributes_untouched() {
        let html = r#"<p title='a "b"'><code>x -- "y"</code></p>"#;
        assert_eq!(run(&TypographyProcessor, html, Some("en")), html);
    }

    #[test]
    fn test_idempotent() {
        for html in [
            r#"<p>"Hi," he said -- 'twas 1-2 3-4... 1/2 10 kg</p>"#,
            "<p>It's 'fine' now - really</p>",
        ] {
            assert_idempotent(&TypographyProcessor, html, Some("en"));
        }
    }
}
