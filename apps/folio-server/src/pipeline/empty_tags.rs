//! Empty element removal
//!
//! Drops formatting and block elements that contain nothing but
//! whitespace, nested empties included, in a single stack-based walk.
//! Elements carrying `id` or `name` are kept as link targets.

use super::{Budget, BudgetExhausted, ProcessingContext, TextProcessor};
use crate::html::{attribute, is_void, Scanner, Token};

const BUDGET_STRIDE: usize = 256;

const REMOVABLE: &[&str] = &[
    "p", "div", "span", "em", "strong", "b", "i", "u", "s", "small", "big", "sup", "sub", "font",
    "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "section", "li", "ul", "ol",
];

const INLINE: &[&str] = &["span", "em", "strong", "b", "i", "u", "s", "small", "big", "sup", "sub", "font"];

struct Open<'a> {
    name: &'a str,
    /// Output length before the start tag
    start: usize,
    has_content: bool,
    keep: bool,
}

pub struct EmptyTagProcessor;

impl TextProcessor for EmptyTagProcessor {
    fn name(&self) -> &'static str {
        "empty_tags"
    }

    fn order(&self) -> i32 {
        30
    }

    fn process(&self, html: &str, _ctx: &ProcessingContext, budget: &Budget) -> Result<String, BudgetExhausted> {
        let mut out = String::with_capacity(html.len());
        let mut stack: Vec<Open<'_>> = Vec::new();

        for (i, token) in Scanner::new(html).enumerate() {
            if i % BUDGET_STRIDE == 0 {
                budget.check()?;
            }
            match token {
                Token::StartTag { name, raw, self_closing } => {
                    if self_closing || is_void(name) {
                        // `<br>` alone does not make an element non-empty
                        if !name.eq_ignore_ascii_case("br") {
                            mark_content(&mut stack);
                        }
                    } else {
                        stack.push(Open {
                            name,
                            start: out.len(),
                            has_content: false,
                            keep: !is_removable(name) || has_anchor(raw),
                        });
                    }
                    out.push_str(raw);
                }
                Token::EndTag { name, raw } => {
                    let matches_top = stack.last().is_some_and(|open| open.name.eq_ignore_ascii_case(name));
                    if !matches_top {
                        // Mismatched nesting: keep everything currently open
                        for open in stack.iter_mut() {
                            open.has_content = true;
                        }
                        out.push_str(raw);
                        continue;
                    }
                    let Some(open) = stack.pop() else { continue };
                    if open.has_content || open.keep {
                        out.push_str(raw);
                        mark_content(&mut stack);
                    } else {
                        let removed_space = out[open.start..].chars().any(char::is_whitespace);
                        out.truncate(open.start);
                        if removed_space && is_inline(open.name) && !out.ends_with(' ') {
                            out.push(' ');
                        }
                    }
                }
                Token::Text(text) => {
                    if !text.trim().is_empty() {
                        mark_content(&mut stack);
                    }
                    out.push_str(text);
                }
                Token::Other(raw) => {
                    mark_content(&mut stack);
                    out.push_str(raw);
                }
            }
        }
        Ok(out)
    }
}

fn mark_content(stack: &mut [Open<'_>]) {
    if let Some(top) = stack.last_mut() {
        top.has_content = true;
    }
}

fn is_removable(name: &str) -> bool {
    REMOVABLE.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn is_inline(name: &str) -> bool {
    INLINE.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn has_anchor(raw: &str) -> bool {
    attribute(raw, "id").is_some() || attribute(raw, "name").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{assert_idempotent, run};

    #[test]
    fn test_removes_empty_paragraphs() {
        let html = "<p>a</p><p> </p><p></p><p>b</p>";
        assert_eq!(run(&EmptyTagProcessor, html, None), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_nested_empties_in_one_pass() {
        let html = "<div><p><span> </span></p></div><p>x</p>";
        assert_eq!(run(&EmptyTagProcessor, html, None), "<p>x</p>");
    }

    #[test]
    fn test_inline_empty_keeps_space() {
        assert_eq!(run(&EmptyTagProcessor, "<p>a<em> </em>b</p>", None), "<p>a b</p>");
    }

    #[test]
    fn test_images_and_anchors_kept() {
        let html = r#"<p><img src="a.png"/></p><span id="n1"></span><p><br/></p>"#;
        assert_eq!(
            run(&EmptyTagProcessor, html, None),
            r#"<p><img src="a.png"/></p><span id="n1"></span>"#
        );
    }

    #[test]
    fn test_table_cells_kept() {
        let html = "<table><tr><td></td><td>x</td></tr></table>";
        assert_eq!(run(&EmptyTagProcessor, html, None), html);
    }

    #[test]
    fn test_idempotent() {
        for html in [
            "<div><p><span> </span></p></div><p>x</p>",
            "<p>a<em> </em>b</p>",
            "<p><b>unclosed</p><i></i>",
        ] {
            assert_idempotent(&EmptyTagProcessor, html, None);
        }
    }
}
