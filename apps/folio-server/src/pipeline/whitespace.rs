//! Whitespace normalization
//!
//! Collapses whitespace runs to one space, drops zero-width characters,
//! trims text at block boundaries and turns whitespace-only runs between
//! blocks into a single newline. Verbatim elements are copied as-is.

use super::{is_verbatim, Budget, BudgetExhausted, ProcessingContext, TextProcessor};
use crate::html::{is_block, tokenize, Token};

/// Checked every this many tokens
const BUDGET_STRIDE: usize = 256;

pub struct WhitespaceProcessor;

impl TextProcessor for WhitespaceProcessor {
    fn name(&self) -> &'static str {
        "whitespace"
    }

    fn order(&self) -> i32 {
        10
    }

    fn process(&self, html: &str, _ctx: &ProcessingContext, budget: &Budget) -> Result<String, BudgetExhausted> {
        let tokens = tokenize(html);
        let mut out = String::with_capacity(html.len());
        let mut verbatim = 0usize;

        for (i, token) in tokens.iter().enumerate() {
            if i % BUDGET_STRIDE == 0 {
                budget.check()?;
            }
            match *token {
                Token::StartTag { name, raw, self_closing } => {
                    if is_verbatim(name) && !self_closing {
                        verbatim += 1;
                    }
                    out.push_str(raw);
                }
                Token::EndTag { name, raw } => {
                    if is_verbatim(name) {
                        verbatim = verbatim.saturating_sub(1);
                    }
                    out.push_str(raw);
                }
                Token::Other(raw) => out.push_str(raw),
                Token::Text(text) if verbatim > 0 => out.push_str(text),
                Token::Text(text) => {
                    let after_block = i == 0 || tokens.get(i - 1).is_some_and(is_block_boundary);
                    let before_block = tokens.get(i + 1).map_or(true, is_block_boundary);
                    let collapsed = collapse(text);

                    if collapsed.trim().is_empty() {
                        if after_block && before_block {
                            if i > 0 && i + 1 < tokens.len() {
                                out.push('\n');
                            }
                        } else if !collapsed.is_empty() {
                            out.push(' ');
                        }
                        continue;
                    }

                    let mut run = collapsed.as_str();
                    if after_block {
                        run = run.trim_start_matches(' ');
                    }
                    if before_block {
                        run = run.trim_end_matches(' ');
                    }
                    out.push_str(run);
                }
            }
        }
        Ok(out)
    }
}

fn is_block_boundary(token: &Token<'_>) -> bool {
    match token {
        Token::StartTag { name, .. } | Token::EndTag { name, .. } => {
            is_block(name) || name.eq_ignore_ascii_case("br")
        }
        _ => false,
    }
}

fn collapse(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        match ch {
            '\u{200B}' | '\u{200C}' | '\u{FEFF}' => {}
            c if c.is_whitespace() && c != '\u{00A0}' => pending_space = true,
            c => {
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                out.push(c);
            }
        }
    }
    if pending_space {
        out.push(' ');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{assert_idempotent, run};

    #[test]
    fn test_collapses_runs() {
        let html = "<p>  Hello \t\n  world  </p>";
        assert_eq!(run(&WhitespaceProcessor, html, None), "<p>Hello world</p>");
    }

    #[test]
    fn test_inline_spacing_kept() {
        let html = "<p>a <em>b</em>  c</p>";
        assert_eq!(run(&WhitespaceProcessor, html, None), "<p>a <em>b</em> c</p>");
    }

    #[test]
    fn test_between_blocks() {
        let html = "<p>a</p>\n\n   <p>b</p>";
        assert_eq!(run(&WhitespaceProcessor, html, None), "<p>a</p>\n<p>b</p>");
    }

    #[test]
    fn test_pre_untouched() {
        let html = "<pre>  keep\n   this </pre>";
        assert_eq!(run(&WhitespaceProcessor, html, None), html);
    }

    #[test]
    fn test_zero_width_removed() {
        assert_eq!(run(&WhitespaceProcessor, "<p>a\u{200B}b\u{FEFF}</p>", None), "<p>ab</p>");
    }

    #[test]
    fn test_idempotent() {
        for html in [
            "<p>  Hello \t\n  world  </p>",
            "<div> <p> a  <b> b </b> </p>\n\n<p>c</p> </div>",
            "text  only  ",
            "<p>x<br/>  y</p>",
        ] {
            assert_idempotent(&WhitespaceProcessor, html, None);
        }
    }
}
