//! HTML entity normalization
//!
//! Decodes named and numeric character references in text to the
//! characters they stand for, keeping only the markup-significant ones
//! (`&amp;`, `&lt;`, `&gt;`) encoded. Bare ampersands are escaped, unknown
//! references left alone and control characters dropped.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{is_verbatim, map_text_within, Budget, BudgetExhausted, ProcessingContext, TextProcessor};

static REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{1,31});?").unwrap());

pub struct EntityProcessor;

impl TextProcessor for EntityProcessor {
    fn name(&self) -> &'static str {
        "entities"
    }

    fn order(&self) -> i32 {
        20
    }

    fn process(&self, html: &str, _ctx: &ProcessingContext, budget: &Budget) -> Result<String, BudgetExhausted> {
        map_text_within(html, |name, _| is_verbatim(name), budget, normalize_run)
    }
}

fn normalize_run(text: &str) -> String {
    if !text.contains('&') && !text.chars().any(is_dropped_control) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in REFERENCE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        push_literal(&mut out, &text[last..whole.start()]);
        out.push_str(&decode_reference(&caps));
        last = whole.end();
    }
    push_literal(&mut out, &text[last..]);
    out
}

/// Copy text, escaping bare ampersands and dropping control characters
fn push_literal(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            c if is_dropped_control(c) => {}
            c => out.push(c),
        }
    }
}

fn decode_reference(caps: &Captures<'_>) -> String {
    let whole = &caps[0];
    let body = &caps[1];

    // Named references need their semicolon to be unambiguous
    if !body.starts_with('#') && !whole.ends_with(';') {
        return format!("&amp;{}", body);
    }

    let reference = if whole.ends_with(';') {
        whole.to_string()
    } else {
        format!("{};", whole)
    };
    let decoded = html_escape::decode_html_entities(&reference);
    if decoded == reference {
        return format!("&amp;{}", &reference[1..]);
    }

    let mut out = String::with_capacity(decoded.len());
    for ch in decoded.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c if is_dropped_control(c) || c == '\u{FFFD}' => {}
            c => out.push(c),
        }
    }
    out
}

fn is_dropped_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\n' | '\t' | '\r')
}
