//! Inline image persistence and `<img src>` rewriting
//!
//! Extractors report images under the path used inside the container
//! (`OEBPS/images/a.png`) while chapter markup references them relative to
//! the chapter (`../images/a.png`). References are matched after stripping
//! leading `./`, `../` and `/`: exact match first, then a path-suffix match.

use uuid::Uuid;

use super::error::IngestError;
use crate::db::NewAsset;
use crate::extraction::InlineImage;
use crate::html::rewrite_image_sources;
use crate::storage::{content_key, BlobStore};

/// Public URL of a persisted asset
pub fn asset_url(edition_id: &str, asset_id: &str) -> String {
    format!("/books/{}/assets/{}", edition_id, asset_id)
}

/// Normalize an image reference for matching
pub fn normalize_reference(reference: &str) -> String {
    let reference = reference.split(['#', '?']).next().unwrap_or_default();
    let decoded = urlencoding::decode(reference)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| reference.to_string());

    let mut rest = decoded.trim();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("../") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            break;
        }
    }
    rest.to_string()
}

fn is_path_suffix(path: &str, suffix: &str) -> bool {
    path.len() > suffix.len() && path.ends_with(suffix) && path[..path.len() - suffix.len()].ends_with('/')
}

/// Assets of one edition, looked up by image reference
pub struct AssetIndex {
    edition_id: String,
    /// (normalized original path, asset id)
    entries: Vec<(String, String)>,
}

impl AssetIndex {
    pub fn new(edition_id: &str, assets: &[NewAsset]) -> Self {
        Self {
            edition_id: edition_id.to_string(),
            entries: assets
                .iter()
                .map(|a| (normalize_reference(&a.original_path), a.id.clone()))
                .collect(),
        }
    }

    /// Asset id an image reference resolves to
    pub fn resolve(&self, reference: &str) -> Option<&str> {
        let wanted = normalize_reference(reference);
        if wanted.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .find(|(path, _)| *path == wanted)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(path, _)| is_path_suffix(path, &wanted) || is_path_suffix(&wanted, path))
            })
            .map(|(_, id)| id.as_str())
    }

    /// Point every resolvable `<img src>` at its asset URL
    ///
    /// Unresolvable references are left as they are for the lint pass to
    /// report.
    pub fn rewrite(&self, html: &str) -> Result<(String, usize), IngestError> {
        if self.entries.is_empty() {
            return Ok((html.to_string(), 0));
        }
        rewrite_image_sources(html, |src| {
            if src.starts_with("data:") {
                return None;
            }
            self.resolve(src).map(|id| asset_url(&self.edition_id, id))
        })
        .map_err(|e| IngestError::Parse(e.to_string()))
    }
}

/// File extension for a stored image
pub fn extension_for(mime_type: &str, path: &str) -> String {
    path.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .or_else(|| {
            let common = match mime_type {
                "image/jpeg" => Some("jpg"),
                "image/png" => Some("png"),
                "image/gif" => Some("gif"),
                "image/svg+xml" => Some("svg"),
                "image/webp" => Some("webp"),
                _ => None,
            };
            common.map(str::to_string)
        })
        .or_else(|| {
            mime_guess::get_mime_extensions_str(mime_type)
                .and_then(|exts| exts.first())
                .map(|ext| ext.to_string())
        })
        .unwrap_or_default()
}

/// Write every image blob and describe the rows to insert
///
/// Blob keys are content-addressed, so a re-run writes the same keys.
pub async fn store_images(
    store: &dyn BlobStore,
    edition_id: &str,
    images: &[InlineImage],
) -> Result<Vec<NewAsset>, IngestError> {
    let mut assets: Vec<NewAsset> = Vec::with_capacity(images.len());
    for image in images {
        if image.data.is_empty() || assets.iter().any(|a| a.original_path == image.path) {
            continue;
        }
        let key = content_key(
            &format!("assets/{}", edition_id),
            &image.data,
            &extension_for(&image.mime_type, &image.path),
        );
        store.put(&key, &image.data, &image.mime_type).await?;
        assets.push(NewAsset {
            id: Uuid::new_v4().to_string(),
            original_path: image.path.clone(),
            storage_key: key,
            mime_type: image.mime_type.clone(),
            size: image.data.len() as i64,
        });
    }
    Ok(assets)
}
