//! FB2 to HTML renderer
//!
//! Maps the FictionBook body vocabulary onto a small set of HTML elements.
//! Unknown elements are transparent: their children are rendered in place.

use crate::formats::xml::{Element, Node};
use crate::html::escape;

/// Nesting beyond this renders as plain text
const MAX_DEPTH: usize = 64;

/// Render the content of `element` to HTML
///
/// With `include_sections` false, nested `<section>` children are left out;
/// the caller turns them into their own units.
pub fn render_children(element: &Element, heading_level: usize, include_sections: bool) -> String {
    let mut out = String::new();
    let renderer = Renderer {
        heading_level: heading_level.clamp(1, 6),
        include_sections,
    };
    for node in &element.children {
        renderer.node(node, 0, &mut out);
    }
    out
}

struct Renderer {
    heading_level: usize,
    include_sections: bool,
}

impl Renderer {
    fn node(&self, node: &Node, depth: usize, out: &mut String) {
        match node {
            Node::Text(text) => out.push_str(&escape(text)),
            Node::Element(element) => self.element(element, depth, out),
        }
    }

    fn children(&self, element: &Element, depth: usize, out: &mut String) {
        if depth >= MAX_DEPTH {
            out.push_str(&escape(&element.text()));
            return;
        }
        for node in &element.children {
            self.node(node, depth + 1, out);
        }
    }

    fn wrap(&self, open: &str, close: &str, element: &Element, depth: usize, out: &mut String) {
        out.push_str(open);
        self.children(element, depth, out);
        out.push_str(close);
    }

    fn element(&self, element: &Element, depth: usize, out: &mut String) {
        match element.name.as_str() {
            "p" => self.wrap("<p>", "</p>", element, depth, out),
            "title" => self.title(element, depth, out),
            "subtitle" => self.wrap("<p class=\"subtitle\"><strong>", "</strong></p>", element, depth, out),
            "epigraph" => self.wrap("<blockquote class=\"epigraph\">", "</blockquote>", element, depth, out),
            "cite" => self.wrap("<blockquote>", "</blockquote>", element, depth, out),
            "text-author" => self.wrap("<p class=\"text-author\">", "</p>", element, depth, out),
            "poem" => self.wrap("<div class=\"poem\">", "</div>", element, depth, out),
            "stanza" => self.wrap("<div class=\"stanza\">", "</div>", element, depth, out),
            "v" => self.wrap("<p class=\"verse\">", "</p>", element, depth, out),
            "emphasis" => self.wrap("<em>", "</em>", element, depth, out),
            "strong" => self.wrap("<strong>", "</strong>", element, depth, out),
            "strikethrough" => self.wrap("<s>", "</s>", element, depth, out),
            "sub" => self.wrap("<sub>", "</sub>", element, depth, out),
            "sup" => self.wrap("<sup>", "</sup>", element, depth, out),
            "code" => self.wrap("<code>", "</code>", element, depth, out),
            "table" => self.wrap("<table>", "</table>", element, depth, out),
            "tr" => self.wrap("<tr>", "</tr>", element, depth, out),
            "td" => self.wrap("<td>", "</td>", element, depth, out),
            "th" => self.wrap("<th>", "</th>", element, depth, out),
            "empty-line" => out.push_str("<br/>"),
            "a" => {
                let href = element.attribute("href").unwrap_or_default();
                out.push_str(&format!("<a href=\"{}\">", html_escape::encode_double_quoted_attribute(href)));
                self.children(element, depth, out);
                out.push_str("</a>");
            }
            "image" => {
                if let Some(id) = element.attribute("href").map(|h| h.trim_start_matches('#')) {
                    if !id.is_empty() {
                        out.push_str(&format!(
                            "<img src=\"{}\" alt=\"\"/>",
                            html_escape::encode_double_quoted_attribute(id)
                        ));
                    }
                }
            }
            "section" => {
                if self.include_sections {
                    let nested = Renderer {
                        heading_level: (self.heading_level + 1).min(6),
                        include_sections: true,
                    };
                    out.push_str("<section>");
                    nested.children(element, depth, out);
                    out.push_str("</section>");
                }
            }
            // Metadata blocks never belong to the text
            "description" | "binary" | "stylesheet" => {}
            _ => self.children(element, depth, out),
        }
    }

    /// `<title>` holds paragraphs; render them as one heading
    fn title(&self, element: &Element, depth: usize, out: &mut String) {
        let level = self.heading_level;
        out.push_str(&format!("<h{}>", level));
        let mut first = true;
        for child in &element.children {
            match child {
                Node::Element(p) if p.is("p") => {
                    if !first {
                        out.push_str("<br/>");
                    }
                    first = false;
                    self.children(p, depth + 1, out);
                }
                Node::Element(e) if e.is("empty-line") => {}
                other => self.node(other, depth + 1, out),
            }
        }
        out.push_str(&format!("</h{}>", level));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::xml;

    #[test]
    fn test_render_vocabulary() {
        let section = xml::parse(
            r##"<section xmlns:l="http://www.w3.org/1999/xlink"><title><p>One</p><p>Start</p></title>
<epigraph><p>Quote</p><text-author>Someone</text-author></epigraph>
<p>Hello <emphasis>there</emphasis> &amp; <strong>bold</strong> <a l:href="#n1">[1]</a></p>
<empty-line/><poem><stanza><v>Line</v></stanza></poem><image l:href="#pic.png"/>
<section><p>nested</p></section></section>"##,
        )
        .unwrap();

        let html = render_children(&section, 2, false);
        assert!(html.contains("<h2>One<br/>Start</h2>"));
        assert!(html.contains("<blockquote class=\"epigraph\"><p>Quote</p><p class=\"text-author\">Someone</p></blockquote>"));
        assert!(html.contains("<p>Hello <em>there</em> &amp; <strong>bold</strong> <a href=\"#n1\">[1]</a></p>"));
        assert!(html.contains("<br/>"));
        assert!(html.contains("<div class=\"poem\"><div class=\"stanza\"><p class=\"verse\">Line</p></div></div>"));
        assert!(html.contains("<img src=\"pic.png\" alt=\"\"/>"));
        assert!(!html.contains("nested"));

        let whole = render_children(&section, 2, true);
        assert!(whole.contains("<section><p>nested</p></section>"));
    }
}
