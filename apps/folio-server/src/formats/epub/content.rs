//! EPUB content documents
//!
//! Reduces a spine XHTML document to sanitized body markup and collects
//! what the extractor needs from it: a content-derived title and the image
//! references to carry along as inline assets.

use crate::html::{body_inner, document_title, first_heading, image_sources, sanitize_html, RewriteError};

/// One cleaned spine document
#[derive(Debug, Clone)]
pub struct Chapter {
    pub html: String,
    /// First h1-h3 heading, else `<title>`
    pub derived_title: Option<String>,
    /// `<img src>` values as written in the markup
    pub image_sources: Vec<String>,
}

/// Clean one XHTML document
pub fn clean_chapter(raw: &str) -> Result<Chapter, RewriteError> {
    let head_title = document_title(raw);
    let html = sanitize_html(body_inner(raw))?;
    let html = html.trim().to_string();

    let derived_title = first_heading(&html).or(head_title);
    let image_sources = image_sources(&html);

    Ok(Chapter {
        html,
        derived_title,
        image_sources,
    })
}
