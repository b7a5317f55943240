//! EPUB navigation
//!
//! Reads the EPUB3 navigation document (`<nav epub:type="toc">`) or the
//! EPUB2 NCX `navMap` into a label tree keyed by archive path.

use crate::formats::xml::{self, Element, XmlError};

use super::package::resolve_href;

/// TOC entry before it is resolved to a unit index
#[derive(Debug, Clone, PartialEq)]
pub struct NavPoint {
    pub label: String,
    /// Archive path of the target document (fragment removed)
    pub path: String,
    pub children: Vec<NavPoint>,
}

/// Parse an EPUB3 navigation document
pub fn parse_nav(content: &str, base_dir: &str) -> Result<Vec<NavPoint>, XmlError> {
    let root = xml::parse(content)?;
    let navs: Vec<&Element> = root.descendants().into_iter().filter(|e| e.is("nav")).collect();

    let toc_nav = navs
        .iter()
        .find(|nav| nav.attribute("type").is_some_and(|t| t.split_whitespace().any(|v| v == "toc")))
        .or_else(|| navs.first());

    Ok(toc_nav
        .and_then(|nav| nav.find("ol"))
        .map(|ol| parse_nav_ol(ol, base_dir))
        .unwrap_or_default())
}

fn parse_nav_ol(ol: &Element, base_dir: &str) -> Vec<NavPoint> {
    ol.children_named("li")
        .filter_map(|li| parse_nav_li(li, base_dir))
        .collect()
}

fn parse_nav_li(li: &Element, base_dir: &str) -> Option<NavPoint> {
    let mut label = String::new();
    let mut path = String::new();
    let mut children = Vec::new();

    for child in li.elements() {
        match child.name.as_str() {
            "a" => {
                label = child.normalized_text();
                path = child
                    .attribute("href")
                    .map(|href| resolve_href(base_dir, href))
                    .unwrap_or_default();
            }
            "span" if label.is_empty() => label = child.normalized_text(),
            "ol" => children = parse_nav_ol(child, base_dir),
            _ => {}
        }
    }

    (!label.is_empty() || !path.is_empty()).then_some(NavPoint { label, path, children })
}

/// Parse an EPUB2 NCX document
pub fn parse_ncx(content: &str, base_dir: &str) -> Result<Vec<NavPoint>, XmlError> {
    let root = xml::parse(content)?;
    Ok(root
        .find("navMap")
        .map(|map| parse_nav_points(map, base_dir))
        .unwrap_or_default())
}

fn parse_nav_points(parent: &Element, base_dir: &str) -> Vec<NavPoint> {
    parent
        .children_named("navPoint")
        .filter_map(|point| {
            let label = point
                .child("navLabel")
                .map(|l| l.normalized_text())
                .unwrap_or_default();
            let path = point
                .child("content")
                .and_then(|c| c.attribute("src"))
                .map(|src| resolve_href(base_dir, src))
                .unwrap_or_default();
            let children = parse_nav_points(point, base_dir);
            (!label.is_empty() || !path.is_empty()).then_some(NavPoint { label, path, children })
        })
        .collect()
}

/// First label pointing at each path, in TOC order
pub fn labels_by_path(points: &[NavPoint], out: &mut Vec<(String, String)>) {
    for point in points {
        if !point.label.is_empty() && !out.iter().any(|(path, _)| path == &point.path) {
            out.push((point.path.clone(), point.label.clone()));
        }
        labels_by_path(&point.children, out);
    }
}
