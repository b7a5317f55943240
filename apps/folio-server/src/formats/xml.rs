//! Minimal XML element tree
//!
//! Built from quick-xml events with an explicit stack, so deeply nested
//! input cannot overflow the call stack while parsing. Nesting is capped
//! at [`MAX_DEPTH`] and trees are dropped iteratively. Names and attribute
//! keys are stored without namespace prefixes.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Deepest element nesting accepted by [`parse`]
pub const MAX_DEPTH: usize = 256;

/// XML parsing errors
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("XML document has no root element")]
    NoRoot,

    #[error("XML elements nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Child of an element
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// One element with its attributes and children
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Local name (prefix stripped)
    pub name: String,
    /// (local key, unescaped value)
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Drop for Element {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(node) = pending.pop() {
            if let Node::Element(mut element) = node {
                pending.append(&mut element.children);
            }
        }
    }
}

impl Element {
    /// Attribute value by local key
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Direct child elements
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First direct child element with this name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(name))
    }

    /// Direct child elements with this name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.is(name))
    }

    /// All descendant elements in document order (self excluded)
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut stack: Vec<&Element> = self.elements().collect::<Vec<_>>();
        stack.reverse();
        while let Some(element) = stack.pop() {
            out.push(element);
            let mut children: Vec<&Element> = element.elements().collect();
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// First descendant element with this name
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.descendants().into_iter().find(|e| e.is(name))
    }

    /// Concatenated text of all descendants
    pub fn text(&self) -> String {
        let mut text = String::new();
        let mut stack: Vec<&Node> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            match node {
                Node::Text(t) => text.push_str(t),
                Node::Element(e) => stack.extend(e.children.iter().rev()),
            }
        }
        text
    }

    /// Text with whitespace runs collapsed and trimmed
    pub fn normalized_text(&self) -> String {
        self.text().split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn local(name: &[u8]) -> String {
    let local = match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    };
    String::from_utf8_lossy(local).into_owned()
}

fn element_from(start: &BytesStart<'_>) -> Element {
    let attributes = start
        .attributes()
        .flatten()
        .map(|attr| {
            let key = local(attr.key.as_ref());
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => decode_lossy(&attr.value),
            };
            (key, value)
        })
        .collect();

    Element {
        name: local(start.name().as_ref()),
        attributes,
        children: Vec::new(),
    }
}

/// Decode raw bytes, resolving HTML entities quick-xml does not know
fn decode_lossy(raw: &[u8]) -> String {
    let text: Cow<'_, str> = String::from_utf8_lossy(raw);
    html_escape::decode_html_entities(&text).into_owned()
}

/// Parse a document into its root element
pub fn parse(content: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(content);
    // Whitespace between inline elements is significant
    reader.trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    let attach = |stack: &mut Vec<Element>, root: &mut Option<Element>, element: Element| {
        match stack.last_mut() {
            Some(parent) => parent.children.push(Node::Element(element)),
            None => {
                if root.is_none() {
                    *root = Some(element);
                }
            }
        }
    };

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::TooDeep(MAX_DEPTH));
                }
                stack.push(element_from(&start));
            }
            Event::Empty(start) => {
                let element = element_from(&start);
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    let value = match text.unescape() {
                        Ok(v) => v.into_owned(),
                        Err(_) => decode_lossy(&text),
                    };
                    parent.children.push(Node::Text(value));
                }
            }
            Event::CData(data) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .children
                        .push(Node::Text(String::from_utf8_lossy(&data.into_inner()).into_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    // Unclosed elements at EOF are folded into their parents
    while let Some(element) = stack.pop() {
        attach(&mut stack, &mut root, element);
    }

    root.ok_or(XmlError::NoRoot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree() {
        let doc = parse(
            r##"<?xml version="1.0"?><root xmlns:l="http://www.w3.org/1999/xlink"><a l:href="#x">one <b>two</b></a><c/></root>"##,
        )
        .unwrap();
        assert_eq!(doc.name, "root");
        let a = doc.child("a").unwrap();
        assert_eq!(a.attribute("href"), Some("#x"));
        assert_eq!(a.text(), "one two");
        assert!(doc.child("c").is_some());
        assert_eq!(doc.descendants().len(), 3);
    }

    #[test]
    fn test_unknown_entity_is_decoded() {
        let doc = parse("<p>a&nbsp;b &amp; c</p>").unwrap();
        assert_eq!(doc.text(), "a\u{a0}b & c");
    }

    #[test]
    fn test_mismatched_tags_error() {
        assert!(parse("<a><b></a>").is_err());
    }

    #[test]
    fn test_empty_document() {
        assert!(matches!(parse(""), Err(XmlError::NoRoot)));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        // Runs on a small stack so recursion anywhere in parse or drop would abort
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(|| {
                let doc = format!("<FictionBook><body><section>{}", "<p>".repeat(200_000));
                matches!(parse(&doc), Err(XmlError::TooDeep(MAX_DEPTH)))
            })
            .unwrap();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_nesting_within_limit_parses() {
        let depth = MAX_DEPTH - 1;
        let doc = format!("{}{}", "<p>".repeat(depth), "</p>".repeat(depth));
        let root = parse(&doc).unwrap();
        assert_eq!(root.descendants().len(), depth - 1);
    }

    #[test]
    fn test_deep_tree_drops_iteratively() {
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(|| {
                let mut root = Element::default();
                let mut current = &mut root;
                for _ in 0..100_000 {
                    current.children.push(Node::Element(Element::default()));
                    current = match current.children.last_mut() {
                        Some(Node::Element(e)) => e,
                        _ => unreachable!(),
                    };
                }
                drop(root);
            })
            .unwrap();
        handle.join().unwrap();
    }
}
