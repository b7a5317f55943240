//! HTML processing module
//!
//! Provides HTML handling shared by the extractors, the text pipeline and
//! the worker:
//! - A linear-time tokenizer for text-only transformations
//! - HTML to plain text conversion and word counting
//! - Sanitization and image URL rewriting
//!
//! Rewriting uses lol_html for efficient streaming HTML processing.

mod rewrite;
mod scanner;
mod text;

pub use rewrite::{
    body_inner, document_title, first_heading, image_sources, rewrite_image_sources, sanitize_html,
    RewriteError,
};
pub use scanner::{attribute, is_block, is_void, map_text, tokenize, Scanner, Token};
pub use text::{count_words, escape, html_to_text, text_to_html};
