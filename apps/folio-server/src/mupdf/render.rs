//! Page text and raster helpers

use std::io::Cursor;

use image::{DynamicImage, RgbaImage};
use mupdf::{Colorspace, Matrix, Page, TextPageOptions};

use super::safe::MupdfError;

/// Plain text of a page: lines joined by newlines, blocks by blank lines
pub fn page_text(page: &Page) -> Result<String, MupdfError> {
    let text_page = page.to_text_page(TextPageOptions::empty())?;
    let mut text = String::new();

    for block in text_page.blocks() {
        for line in block.lines() {
            for ch in line.chars() {
                if let Some(c) = ch.char() {
                    text.push(c);
                }
            }
            text.push('\n');
        }
        text.push('\n');
    }

    Ok(text)
}

/// Render a page to PNG, scaled so its longer side is at most `max_side`
/// pixels (and never above `max_scale`)
pub fn render_png(page: &Page, max_side: f32, max_scale: f32) -> Result<Vec<u8>, MupdfError> {
    let bounds = page.bounds()?;
    let longest = (bounds.x1 - bounds.x0).max(bounds.y1 - bounds.y0).max(1.0);
    let scale = (max_side / longest).min(max_scale);

    let matrix = Matrix::new_scale(scale, scale);
    let colorspace = Colorspace::device_rgb();
    let pixmap = page.to_pixmap(&matrix, &colorspace, true, false)?;

    encode_png(&pixmap)
}

fn encode_png(pixmap: &mupdf::Pixmap) -> Result<Vec<u8>, MupdfError> {
    let (width, height) = (pixmap.width(), pixmap.height());
    let n = (pixmap.n() as usize).max(1);

    // Samples are packed rows of `n` channels; grey or RGB without alpha is widened
    let rgba: Vec<u8> = pixmap
        .samples()
        .chunks_exact(n)
        .take(width as usize * height as usize)
        .flat_map(|px| {
            let channel = |i: usize| px.get(i).or(px.first()).copied().unwrap_or(0);
            let alpha = if n >= 4 { px[3] } else { 255 };
            [channel(0), channel(1), channel(2), alpha]
        })
        .collect();

    let img = RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| MupdfError::Image(format!("pixmap {}x{}x{} is truncated", width, height, n)))?;

    let mut output = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut output), image::ImageFormat::Png)
        .map_err(|e| MupdfError::Image(e.to_string()))?;
    Ok(output)
}
