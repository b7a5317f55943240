//! EPUB package documents
//!
//! `META-INF/container.xml` locates the OPF package; the OPF carries the
//! metadata, the manifest of resources and the spine (reading order).

use std::collections::HashMap;

use crate::extraction::ExtractionMetadata;
use crate::formats::xml::{self, Element, XmlError};

/// Manifest item with its href resolved to an archive path
#[derive(Debug, Clone)]
pub struct ManifestItem {
    pub id: String,
    pub path: String,
    pub media_type: String,
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn is_document(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            "application/xhtml+xml" | "text/html" | "application/xml"
        )
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|p| p.split_whitespace().any(|v| v == property))
    }
}

/// Parsed OPF package
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub metadata: ExtractionMetadata,
    pub manifest: Vec<ManifestItem>,
    pub spine: Vec<String>,
    /// Manifest id of the EPUB2 NCX (`<spine toc="...">`)
    pub ncx_id: Option<String>,
    /// Manifest id of the EPUB2 cover (`<meta name="cover">`)
    epub2_cover_id: Option<String>,
    by_id: HashMap<String, usize>,
}

impl Package {
    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.by_id.get(id).map(|&i| &self.manifest[i])
    }

    pub fn item_by_path(&self, path: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.path == path)
    }

    /// EPUB3 navigation document
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.has_property("nav"))
    }

    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.ncx_id
            .as_deref()
            .and_then(|id| self.item(id))
            .or_else(|| {
                self.manifest
                    .iter()
                    .find(|item| item.media_type == "application/x-dtbncx+xml")
            })
    }

    /// Declared cover image
    ///
    /// EPUB3 `cover-image` property first, then the EPUB2 cover meta, then
    /// any manifest image whose id or path mentions "cover".
    pub fn cover_item(&self) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|item| item.has_property("cover-image"))
            .or_else(|| {
                self.epub2_cover_id
                    .as_deref()
                    .and_then(|id| self.item(id))
                    // Some books point the meta at the cover page, not the image
                    .filter(|item| item.is_image())
            })
            .or_else(|| {
                self.manifest.iter().find(|item| {
                    item.is_image()
                        && (item.id.to_ascii_lowercase().contains("cover")
                            || item.path.to_ascii_lowercase().contains("cover"))
                })
            })
    }
}

/// Path of the OPF package from `container.xml`
pub fn rootfile_path(container: &str) -> Result<Option<String>, XmlError> {
    let root = xml::parse(container)?;
    Ok(root
        .descendants()
        .into_iter()
        .find(|e| e.is("rootfile"))
        .and_then(|e| e.attribute("full-path"))
        .map(|p| p.trim_start_matches('/').to_string()))
}

/// Parse the OPF package document
pub fn parse_opf(content: &str, opf_dir: &str) -> Result<Package, XmlError> {
    let root = xml::parse(content)?;
    let mut package = Package::default();

    if let Some(metadata) = root.child("metadata") {
        read_metadata(metadata, &mut package);
    }

    if let Some(manifest) = root.child("manifest") {
        for item in manifest.children_named("item") {
            let (Some(id), Some(href)) = (item.attribute("id"), item.attribute("href")) else {
                continue;
            };
            package.by_id.insert(id.to_string(), package.manifest.len());
            package.manifest.push(ManifestItem {
                id: id.to_string(),
                path: resolve_href(opf_dir, href),
                media_type: item.attribute("media-type").unwrap_or_default().to_string(),
                properties: item.attribute("properties").map(str::to_string),
            });
        }
    }

    if let Some(spine) = root.child("spine") {
        package.ncx_id = spine.attribute("toc").map(str::to_string);
        package.spine = spine
            .children_named("itemref")
            .filter_map(|itemref| itemref.attribute("idref"))
            .map(str::to_string)
            .collect();
    }

    Ok(package)
}

fn read_metadata(metadata: &Element, package: &mut Package) {
    let meta = &mut package.metadata;
    for element in metadata.elements() {
        let text = element.normalized_text();
        match element.name.as_str() {
            "title" if meta.title.is_none() && !text.is_empty() => meta.title = Some(text),
            "creator" if !text.is_empty() => {
                // EPUB2 marks non-authors with opf:role; keep authors and unmarked creators
                let role = element.attribute("role").unwrap_or("aut");
                if role == "aut" {
                    meta.authors.push(text);
                }
            }
            "language" if meta.language.is_none() && !text.is_empty() => meta.language = Some(text),
            "description" if meta.description.is_none() && !text.is_empty() => {
                // Descriptions frequently carry escaped markup
                let plain = crate::html::html_to_text(&text);
                meta.description = Some(plain.split_whitespace().collect::<Vec<_>>().join(" "));
            }
            "meta" if element.attribute("name") == Some("cover") => {
                package.epub2_cover_id = element.attribute("content").map(str::to_string);
            }
            _ => {}
        }
    }
}

/// Directory part of an archive path ("" for the root)
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve an href against a base directory into a normalized archive path
///
/// Fragments are dropped and percent-escapes decoded.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or_default();
    let decoded = urlencoding::decode(href)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| href.to_string());

    let joined = if let Some(absolute) = decoded.strip_prefix('/') {
        absolute.to_string()
    } else if base_dir.is_empty() {
        decoded
    } else {
        format!("{}/{}", base_dir, decoded)
    };
    normalize_path(&joined)
}

/// Collapse `.` and `..` segments
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
