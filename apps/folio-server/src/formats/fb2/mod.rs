//! FB2 (FictionBook) extractor
//!
//! The document is one XML tree: `<description>` carries metadata,
//! `<body>` elements carry text as nested `<section>`s, and `<binary>`
//! elements carry base64 images referenced by id.

mod render;

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use encoding_rs::{Encoding, UTF_8};

use crate::extraction::{
    finish, CancelToken, ContentUnit, Extractor, ExtractionMetadata, ExtractionRequest,
    ExtractionResult, InlineImage, Result, SourceFormat, TextSource, TocEntry, UnitType, WarningCode,
};
use crate::formats::xml::{self, Element};
use crate::html::{count_words, image_sources};

pub use render::render_children;

/// Section nesting beyond this is flattened into the enclosing unit
const MAX_SECTION_DEPTH: usize = 16;

/// Extractor for `.fb2`
#[derive(Debug, Default, Clone, Copy)]
pub struct Fb2Extractor;

impl Fb2Extractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for Fb2Extractor {
    fn format(&self) -> SourceFormat {
        SourceFormat::Fb2
    }

    async fn extract(&self, request: ExtractionRequest, cancel: &CancelToken) -> Result<ExtractionResult> {
        cancel.check()?;
        let options = request.options.clone();

        let result = tokio::task::spawn_blocking(move || extract_fb2(&request.data))
            .await
            .unwrap_or_else(|e| {
                ExtractionResult::failed(
                    SourceFormat::Fb2,
                    WarningCode::ParseError,
                    format!("FB2 extraction aborted: {}", e),
                )
            });

        cancel.check()?;
        Ok(finish(result, &options))
    }
}

/// Extract an FB2 document held in memory; never fails
pub fn extract_fb2(data: &[u8]) -> ExtractionResult {
    let text = decode_document(data);
    let root = match xml::parse(&text) {
        Ok(root) => root,
        Err(e) => return ExtractionResult::failed(SourceFormat::Fb2, WarningCode::ParseError, e.to_string()),
    };
    if !root.is("FictionBook") {
        return ExtractionResult::failed(
            SourceFormat::Fb2,
            WarningCode::ParseError,
            format!("Root element is <{}>, expected <FictionBook>", root.name),
        );
    }

    let mut result = ExtractionResult::new(SourceFormat::Fb2);
    let title_info = root.child("description").and_then(|d| d.child("title-info"));
    if let Some(info) = title_info {
        result.metadata = read_metadata(info);
    }

    let binaries: HashMap<&str, &Element> = root
        .children_named("binary")
        .filter_map(|b| b.attribute("id").map(|id| (id, b)))
        .collect();

    for body in root.children_named("body") {
        let is_notes = body
            .attribute("name")
            .is_some_and(|n| n.eq_ignore_ascii_case("notes") || n.eq_ignore_ascii_case("comments"));

        if is_notes || body.child("section").is_none() {
            let title = body
                .child("title")
                .map(Element::normalized_text)
                .filter(|t| !t.is_empty())
                .or_else(|| is_notes.then(|| "Notes".to_string()))
                .or_else(|| result.metadata.title.clone());
            let html = render_children(body, 1, true);
            let unit = ContentUnit::from_html(UnitType::Chapter, title.clone(), html, result.units.len());
            if unit.has_text() {
                if let Some(label) = title {
                    result.toc.push(TocEntry {
                        label,
                        unit_index: Some(unit.order_index),
                        children: Vec::new(),
                    });
                }
                result.units.push(unit);
            }
            continue;
        }

        for section in body.children_named("section") {
            walk_section(section, 2, 0, &mut result.units, &mut result.toc);
        }
    }

    let referenced: Vec<String> = result
        .units
        .iter()
        .flat_map(|unit| image_sources(unit.html.as_deref().unwrap_or_default()))
        .collect();
    collect_images(&referenced, &binaries, &mut result);
    read_cover(title_info, &binaries, &mut result);

    if result.units.iter().any(ContentUnit::has_text) {
        result.diagnostics.text_source = TextSource::NativeText;
    } else {
        result
            .diagnostics
            .warn(WarningCode::EmptyContent, "FB2 document contains no text");
    }

    result
}

/// Turn one section into units; sections with subsections emit their own
/// leading content (if any) and recurse
fn walk_section(
    section: &Element,
    level: usize,
    depth: usize,
    units: &mut Vec<ContentUnit>,
    toc: &mut Vec<TocEntry>,
) {
    let title = section
        .child("title")
        .map(Element::normalized_text)
        .filter(|t| !t.is_empty());
    let has_subsections = section.child("section").is_some();

    if !has_subsections || depth >= MAX_SECTION_DEPTH {
        let html = render_children(section, level, true);
        let unit = ContentUnit::from_html(UnitType::Chapter, title.clone(), html, units.len());
        if !unit.has_text() && image_sources(unit.html.as_deref().unwrap_or_default()).is_empty() {
            return;
        }
        if let Some(label) = title {
            toc.push(TocEntry {
                label,
                unit_index: Some(unit.order_index),
                children: Vec::new(),
            });
        }
        units.push(unit);
        return;
    }

    // Content ahead of the first subsection (epigraphs, intro paragraphs)
    let own = ContentUnit::from_html(
        UnitType::Chapter,
        title.clone(),
        render_children(section, level, false),
        units.len(),
    );
    let title_words = title.as_deref().map(count_words).unwrap_or(0);
    let own_index = if own.word_count > title_words {
        let index = own.order_index;
        units.push(own);
        Some(index)
    } else {
        None
    };

    let mut children = Vec::new();
    let first_child_unit = units.len();
    for subsection in section.children_named("section") {
        walk_section(subsection, (level + 1).min(6), depth + 1, units, &mut children);
    }

    match title {
        Some(label) => toc.push(TocEntry {
            label,
            unit_index: own_index.or_else(|| (units.len() > first_child_unit).then_some(first_child_unit)),
            children,
        }),
        None => toc.extend(children),
    }
}

fn read_metadata(info: &Element) -> ExtractionMetadata {
    let text_of = |name: &str| {
        info.child(name)
            .map(Element::normalized_text)
            .filter(|t| !t.is_empty())
    };

    ExtractionMetadata {
        title: text_of("book-title"),
        authors: info.children_named("author").filter_map(author_name).collect(),
        language: text_of("lang"),
        description: text_of("annotation"),
        cover_image: None,
        cover_mime_type: None,
    }
}

/// "First Middle Last", falling back to the nickname alone
fn author_name(author: &Element) -> Option<String> {
    let part = |name: &str| {
        author
            .child(name)
            .map(Element::normalized_text)
            .filter(|t| !t.is_empty())
    };

    let full: Vec<String> = ["first-name", "middle-name", "last-name"]
        .iter()
        .filter_map(|name| part(name))
        .collect();

    if full.is_empty() {
        part("nickname")
    } else {
        Some(full.join(" "))
    }
}

fn decode_binary(binary: &Element) -> std::result::Result<(Vec<u8>, String), String> {
    let payload: String = binary.text().chars().filter(|c| !c.is_whitespace()).collect();
    let data = base64::engine::general_purpose::STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| format!("invalid base64: {}", e))?;
    if data.is_empty() {
        return Err("empty binary".to_string());
    }
    let mime_type = binary
        .attribute("content-type")
        .map(str::to_string)
        .or_else(|| {
            image::guess_format(&data)
                .ok()
                .map(|f| f.to_mime_type().to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok((data, mime_type))
}

fn collect_images(referenced: &[String], binaries: &HashMap<&str, &Element>, result: &mut ExtractionResult) {
    let mut seen: Vec<&str> = Vec::new();
    for id in referenced {
        if seen.contains(&id.as_str()) {
            continue;
        }
        seen.push(id);

        let Some(binary) = binaries.get(id.as_str()) else {
            result
                .diagnostics
                .warn(WarningCode::PartialExtraction, format!("Image {} has no binary", id));
            continue;
        };
        match decode_binary(binary) {
            Ok((data, mime_type)) => result.images.push(InlineImage {
                path: id.clone(),
                mime_type,
                data,
            }),
            Err(e) => result
                .diagnostics
                .warn(WarningCode::PartialExtraction, format!("Image {}: {}", id, e)),
        }
    }
}

fn read_cover(title_info: Option<&Element>, binaries: &HashMap<&str, &Element>, result: &mut ExtractionResult) {
    let Some(image) = title_info
        .and_then(|info| info.child("coverpage"))
        .and_then(|cover| cover.child("image"))
    else {
        return;
    };

    let id = image.attribute("href").unwrap_or_default().trim_start_matches('#');
    let decoded = binaries
        .get(id)
        .ok_or_else(|| format!("cover binary '{}' not found", id))
        .and_then(|binary| decode_binary(binary));

    match decoded {
        Ok((data, mime_type)) => {
            result.metadata.cover_image = Some(data);
            result.metadata.cover_mime_type = Some(mime_type);
        }
        Err(e) => result.diagnostics.warn(WarningCode::CoverExtractionFailed, e),
    }
}

/// Decode the raw document honouring a BOM or the XML declaration's encoding
pub fn decode_document(data: &[u8]) -> String {
    if let Some((encoding, bom_length)) = Encoding::for_bom(data) {
        let (text, _) = encoding.decode_without_bom_handling(&data[bom_length..]);
        return text.into_owned();
    }

    let encoding = declared_encoding(data)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, had_errors) = encoding.decode(data);
    if had_errors {
        tracing::debug!(encoding = encoding.name(), "FB2 contains malformed byte sequences");
    }
    text.into_owned()
}

fn declared_encoding(data: &[u8]) -> Option<String> {
    let head = String::from_utf8_lossy(&data[..data.len().min(256)]);
    let head = head.trim_start();
    if !head.starts_with("<?xml") {
        return None;
    }
    let declaration = &head[..head.find("?>")?];
    let after = &declaration[declaration.find("encoding")? + "encoding".len()..];
    let value = after.trim_start().strip_prefix('=')?.trim_start();
    let quote = value.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &value[1..];
    Some(value[..value.find(quote)?].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<FictionBook xmlns="http://www.gribuser.ru/xml/fictionbook/2.0" xmlns:l="http://www.w3.org/1999/xlink">
<description><title-info>
  <author><first-name>Lev</first-name><middle-name>N.</middle-name><last-name>Tolstoy</last-name></author>
  <author><nickname>anon</nickname></author>
  <book-title>War</book-title>
  <annotation><p>A long   book.</p></annotation>
  <lang>ru</lang>
  <coverpage><image l:href="#cover.jpg"/></coverpage>
</title-info></description>
<body>
  <title><p>War</p></title>
  <section><title><p>Part One</p></title>
    <section><title><p>Chapter I</p></title><p>First chapter text.</p><image l:href="#pic.png"/></section>
    <section><title><p>Chapter II</p></title><p>Second chapter text.</p></section>
  </section>
  <section><title><p>Epilogue</p></title><p>The end.</p></section>
</body>
<body name="notes"><section id="n1"><p>A note.</p></section></body>
<binary id="cover.jpg" content-type="image/jpeg">/9j/4AAQ</binary>
<binary id="pic.png" content-type="image/png">iVBO
Rw==</binary>
</FictionBook>"##;

    #[test]
    fn test_extract_sections() {
        let result = extract_fb2(BOOK.as_bytes());

        assert_eq!(result.diagnostics.text_source, TextSource::NativeText);
        let titles: Vec<_> = result.units.iter().map(|u| u.title.clone().unwrap_or_default()).collect();
        assert_eq!(titles, vec!["Chapter I", "Chapter II", "Epilogue", "Notes"]);
        assert!(result.units[0].html.as_deref().unwrap().contains("<h3>Chapter I</h3>"));

        assert_eq!(result.toc.len(), 3);
        assert_eq!(result.toc[0].label, "Part One");
        assert_eq!(result.toc[0].unit_index, Some(0));
        assert_eq!(result.toc[0].children.len(), 2);
        assert_eq!(result.toc[1].unit_index, Some(2));
    }

    #[test]
    fn test_metadata_and_cover() {
        let result = extract_fb2(BOOK.as_bytes());
        let meta = &result.metadata;
        assert_eq!(meta.title.as_deref(), Some("War"));
        assert_eq!(meta.authors, vec!["Lev N. Tolstoy", "anon"]);
        assert_eq!(meta.language.as_deref(), Some("ru"));
        assert_eq!(meta.description.as_deref(), Some("A long book."));
        assert_eq!(meta.cover_image.as_deref(), Some(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10][..]));
        assert_eq!(meta.cover_mime_type.as_deref(), Some("image/jpeg"));

        assert_eq!(result.images.len(), 1);
        assert_eq!(result.images[0].path, "pic.png");
        assert_eq!(result.images[0].data, vec![0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn test_body_without_sections_is_one_unit() {
        let doc = r#"<FictionBook><description><title-info><book-title>Short</book-title></title-info></description>
<body><p>Just one paragraph.</p></body></FictionBook>"#;
        let result = extract_fb2(doc.as_bytes());
        assert_eq!(result.units.len(), 1);
        assert_eq!(result.units[0].title.as_deref(), Some("Short"));
        assert_eq!(result.units[0].plain_text, "Just one paragraph.");
    }

    #[test]
    fn test_windows_1251() {
        let doc = "<?xml version=\"1.0\" encoding=\"windows-1251\"?><FictionBook><body><section><p>Привет, мир</p></section></body></FictionBook>";
        let (bytes, _, _) = encoding_rs::WINDOWS_1251.encode(doc);
        let result = extract_fb2(&bytes);
        assert_eq!(result.units[0].plain_text, "Привет, мир");
    }

    #[test]
    fn test_missing_cover_is_warning() {
        let doc = r##"<FictionBook xmlns:l="http://www.w3.org/1999/xlink"><description><title-info>
<coverpage><image l:href="#nope"/></coverpage></title-info></description>
<body><section><p>Text.</p></section></body></FictionBook>"##;
        let result = extract_fb2(doc.as_bytes());
        assert!(result.diagnostics.has_warning(WarningCode::CoverExtractionFailed));
        assert_eq!(result.diagnostics.text_source, TextSource::NativeText);
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let result = extract_fb2(b"<FictionBook><body></section></FictionBook>");
        assert!(result.units.is_empty());
        assert_eq!(result.diagnostics.text_source, TextSource::None);
        assert!(result.diagnostics.has_warning(WarningCode::ParseError));
    }

    #[test]
    fn test_wrong_root_is_parse_error() {
        let result = extract_fb2(b"<html><body><p>x</p></body></html>");
        assert!(result.diagnostics.has_warning(WarningCode::ParseError));
    }

    #[test]
    fn test_declared_encoding() {
        assert_eq!(
            declared_encoding(b"<?xml version='1.0' encoding='koi8-r'?><a/>").as_deref(),
            Some("koi8-r")
        );
        assert_eq!(declared_encoding(b"<a/>"), None);
    }

    #[test]
    fn test_deeply_nested_body_is_parse_error() {
        let doc = format!("<FictionBook><body><section>{}", "<p>".repeat(200_000));
        let result = extract_fb2(doc.as_bytes());
        assert!(result.units.is_empty());
        assert!(result.diagnostics.has_warning(WarningCode::ParseError));
    }
}
