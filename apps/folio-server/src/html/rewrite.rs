//! Streaming HTML rewriting with lol_html
//!
//! Sanitizes chapter markup pulled out of book containers and rewrites
//! image references to their persisted asset URLs.

use lol_html::{element, rewrite_str, RewriteStrSettings};

use super::scanner::{attribute, Scanner, Token};

/// Errors during HTML rewriting
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("HTML rewrite failed: {0}")]
    Rewrite(String),
}

const EVENT_ATTRIBUTES: &[&str] = &[
    "onclick", "onload", "onerror", "onmouseover", "onmouseout", "onfocus", "onblur", "onchange",
    "onsubmit", "onkeydown", "onkeyup",
];

/// Remove scripts, styles, external resources and event handlers
pub fn sanitize_html(html: &str) -> Result<String, RewriteError> {
    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("script, style, link, meta, iframe, object, embed, form", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("*", |el| {
                    for attr in EVENT_ATTRIBUTES {
                        el.remove_attribute(attr);
                    }
                    el.remove_attribute("style");
                    for attr in ["href", "src"] {
                        if let Some(value) = el.get_attribute(attr) {
                            if value.trim().to_ascii_lowercase().starts_with("javascript:") {
                                el.remove_attribute(attr);
                            }
                        }
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| RewriteError::Rewrite(e.to_string()))
}

/// Rewrite `<img src>` values through `resolve`
///
/// `resolve` returns the replacement URL, or `None` to leave the reference
/// untouched. Returns the rewritten HTML and the number of replaced sources.
pub fn rewrite_image_sources<F>(html: &str, mut resolve: F) -> Result<(String, usize), RewriteError>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut rewritten = 0usize;
    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src]", |el| {
                if let Some(src) = el.get_attribute("src") {
                    if let Some(url) = resolve(&src) {
                        el.set_attribute("src", &url)?;
                        rewritten += 1;
                    }
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| RewriteError::Rewrite(e.to_string()))?;

    Ok((output, rewritten))
}

/// Inner markup of `<body>`, or the whole input when there is no body
pub fn body_inner(html: &str) -> &str {
    let mut start: Option<usize> = None;
    let mut end: Option<usize> = None;
    let mut offset = 0usize;

    for token in Scanner::new(html) {
        let len = token.raw().len();
        match token {
            Token::StartTag { name, .. } if start.is_none() && name.eq_ignore_ascii_case("body") => {
                start = Some(offset + len);
            }
            Token::EndTag { name, .. } if name.eq_ignore_ascii_case("body") => {
                end = Some(offset);
            }
            _ => {}
        }
        offset += len;
    }

    match (start, end) {
        (Some(s), Some(e)) if e >= s => &html[s..e],
        (Some(s), None) => &html[s..],
        _ => html,
    }
}

/// Text of the `<title>` element, if any
pub fn document_title(html: &str) -> Option<String> {
    let mut inside = false;
    let mut title = String::new();
    for token in Scanner::new(html) {
        match token {
            Token::StartTag { name, .. } if name.eq_ignore_ascii_case("title") => inside = true,
            Token::EndTag { name, .. } if name.eq_ignore_ascii_case("title") => break,
            Token::Text(text) if inside => title.push_str(text),
            _ => {}
        }
    }
    let title = html_escape::decode_html_entities(title.trim()).trim().to_string();
    (!title.is_empty()).then_some(title)
}

/// Text of the first `h1`-`h3` heading, if any
pub fn first_heading(html: &str) -> Option<String> {
    let mut depth: Option<&str> = None;
    let mut heading = String::new();
    for token in Scanner::new(html) {
        match token {
            Token::StartTag { name, .. } if depth.is_none() && is_heading(name) => depth = Some(name),
            Token::EndTag { name, .. } if depth.is_some_and(|open| open.eq_ignore_ascii_case(name)) => {
                let text = super::text::html_to_text(&heading);
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !text.is_empty() {
                    return Some(text);
                }
                depth = None;
                heading.clear();
            }
            other if depth.is_some() => heading.push_str(other.raw()),
            _ => {}
        }
    }
    None
}

/// `src` values of every `<img>` in document order, `data:` URIs excluded
pub fn image_sources(html: &str) -> Vec<String> {
    Scanner::new(html)
        .filter_map(|token| match token {
            Token::StartTag { name, raw, .. } if name.eq_ignore_ascii_case("img") => {
                attribute(raw, "src").map(|src| html_escape::decode_html_entities(src).into_owned())
            }
            _ => None,
        })
        .filter(|src| !src.is_empty() && !src.starts_with("data:"))
        .collect()
}

fn is_heading(name: &str) -> bool {
    ["h1", "h2", "h3"].iter().any(|h| h.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_script_removal() {
        let html = "<p>Hello</p><script>alert('xss')</script><p>World</p>";
        let result = sanitize_html(html).unwrap();

        assert!(!result.contains("script"));
        assert!(result.contains("Hello"));
        assert!(result.contains("World"));
    }

    #[test]
    fn test_sanitize_event_handlers() {
        let html = r#"<p onclick="alert('xss')">Hello</p><a href="javascript:void(0)">x</a>"#;
        let result = sanitize_html(html).unwrap();

        assert!(!result.contains("onclick"));
        assert!(!result.contains("javascript"));
        assert!(result.contains("Hello"));
    }

    #[test]
    fn test_rewrite_image_sources() {
        let html = r#"<p><img src="../images/a.png"/><img src="b.png"/></p>"#;
        let (out, count) = rewrite_image_sources(html, |src| {
            (src == "../images/a.png").then(|| "/books/e/assets/1".to_string())
        })
        .unwrap();

        assert_eq!(count, 1);
        assert!(out.contains(r#"src="/books/e/assets/1""#));
        assert!(out.contains(r#"src="b.png""#));
    }

    #[test]
    fn test_image_sources() {
        let html = r#"<p><img src="a.png"/><img alt="x"><IMG SRC="b&amp;c.png"><img src="data:image/png;base64,AA"/></p>"#;
        assert_eq!(image_sources(html), vec!["a.png", "b&c.png"]);
    }

    #[test]
    fn test_body_inner() {
        let html = "<html><head><title>T</title></head><body class=\"x\"><p>a</p></body></html>";
        assert_eq!(body_inner(html), "<p>a</p>");
        assert_eq!(body_inner("<p>no body</p>"), "<p>no body</p>");
    }

    #[test]
    fn test_titles() {
        let html = "<html><head><title> The &amp; Title </title></head><body><h2>Chapter <em>One</em></h2></body></html>";
        assert_eq!(document_title(html).as_deref(), Some("The & Title"));
        assert_eq!(first_heading(html).as_deref(), Some("Chapter One"));
    }
}
