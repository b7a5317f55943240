//! Plain text helpers
//!
//! Conversions between unit HTML and plain text, and word counting.

use unicode_segmentation::UnicodeSegmentation;

use super::scanner::{is_block, Scanner, Token};

/// Render HTML to plain text
///
/// Block elements become paragraph breaks, `<br>` a line break. Entities are
/// decoded, runs of whitespace collapsed. Script and style bodies are dropped.
pub fn html_to_text(html: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_raw = false;

    for token in Scanner::new(html) {
        match token {
            Token::Text(text) => {
                if in_raw {
                    continue;
                }
                let decoded = html_escape::decode_html_entities(text);
                push_collapsed(&mut current, &decoded);
            }
            Token::StartTag { name, .. } => {
                if name.eq_ignore_ascii_case("script") || name.eq_ignore_ascii_case("style") {
                    in_raw = true;
                } else if name.eq_ignore_ascii_case("br") {
                    let trimmed_len = current.trim_end_matches(' ').len();
                    current.truncate(trimmed_len);
                    current.push('\n');
                } else if is_block(name) {
                    flush(&mut current, &mut paragraphs);
                }
            }
            Token::EndTag { name, .. } => {
                if name.eq_ignore_ascii_case("script") || name.eq_ignore_ascii_case("style") {
                    in_raw = false;
                } else if is_block(name) {
                    flush(&mut current, &mut paragraphs);
                }
            }
            Token::Other(_) => {}
        }
    }
    flush(&mut current, &mut paragraphs);

    paragraphs.join("\n\n")
}

fn flush(current: &mut String, paragraphs: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        paragraphs.push(trimmed.to_string());
    }
    current.clear();
}

fn push_collapsed(out: &mut String, text: &str) {
    for ch in text.chars() {
        // Soft hyphens are invisible and must not split words in plain text
        if ch == '\u{00AD}' || ch == '\u{200B}' || ch == '\u{FEFF}' {
            continue;
        }
        if ch.is_whitespace() && ch != '\u{00A0}' {
            if !(out.is_empty() || out.ends_with(' ') || out.ends_with('\n')) {
                out.push(' ');
            }
        } else {
            out.push(ch);
        }
    }
}

/// Count words using Unicode word boundaries
pub fn count_words(text: &str) -> usize {
    text.unicode_words().count()
}

/// Wrap plain text into paragraphs
///
/// Blank lines separate paragraphs; single newlines inside a paragraph are
/// kept and later folded by the whitespace pass.
pub fn text_to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(normalized.len() + 64);
    let mut paragraph: Vec<&str> = Vec::new();

    for line in normalized.split('\n') {
        // Form feeds separate pages in some tool output
        let line = line.trim_matches('\u{000C}');
        if line.trim().is_empty() {
            emit_paragraph(&mut paragraph, &mut out);
        } else {
            paragraph.push(line);
        }
    }
    emit_paragraph(&mut paragraph, &mut out);
    out
}

fn emit_paragraph(paragraph: &mut Vec<&str>, out: &mut String) {
    if paragraph.is_empty() {
        return;
    }
    let body = paragraph.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str("<p>");
    out.push_str(&html_escape::encode_text(body.trim()));
    out.push_str("</p>");
    paragraph.clear();
}

/// Escape text for inclusion in HTML
pub fn escape(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}
