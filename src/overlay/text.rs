// SPDX-License-Identifier: GPL-3.0-only

//! Text overlay, rasterized once when the object is created

use crate::errors::{CompositorError, CompositorResult};
use image::{Rgba, RgbaImage};
use std::path::Path;

/// Turns a string into an RGBA bitmap
pub trait TextRasterizer: Send + Sync {
    fn rasterize(&self, text: &str, px: f32, color: Rgba<u8>) -> RgbaImage;
}

/// fontdue-backed rasterizer for TrueType/OpenType fonts
pub struct FontRasterizer {
    font: fontdue::Font,
}

impl FontRasterizer {
    pub fn from_bytes(bytes: &[u8]) -> CompositorResult<Self> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| CompositorError::Decode(format!("font: {}", e)))?;
        Ok(Self { font })
    }

    pub fn from_path(path: impl AsRef<Path>) -> CompositorResult<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

impl TextRasterizer for FontRasterizer {
    fn rasterize(&self, text: &str, px: f32, color: Rgba<u8>) -> RgbaImage {
        let line = self.font.horizontal_line_metrics(px);
        let (ascent, descent) = line
            .map(|m| (m.ascent, m.descent))
            .unwrap_or((px, 0.0));
        let height = (ascent - descent).ceil().max(1.0) as u32;

        let glyphs: Vec<_> = text.chars().map(|c| self.font.rasterize(c, px)).collect();
        let width = glyphs
            .iter()
            .map(|(metrics, _)| metrics.advance_width)
            .sum::<f32>()
            .ceil()
            .max(1.0) as u32;

        let mut out = RgbaImage::new(width, height);
        let mut pen_x = 0.0f32;
        for (metrics, coverage) in &glyphs {
            let left = (pen_x + metrics.xmin as f32).round() as i64;
            // Glyph bitmap top relative to the baseline
            let top = (ascent - metrics.height as f32 - metrics.ymin as f32).round() as i64;
            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let alpha = coverage[gy * metrics.width + gx];
                    if alpha == 0 {
                        continue;
                    }
                    let x = left + gx as i64;
                    let y = top + gy as i64;
                    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                        continue;
                    }
                    let a = (alpha as u16 * color[3] as u16 / 255) as u8;
                    let p = out.get_pixel_mut(x as u32, y as u32);
                    if a > p[3] {
                        *p = Rgba([color[0], color[1], color[2], a]);
                    }
                }
            }
            pen_x += metrics.advance_width;
        }
        out
    }
}

#[derive(Debug)]
pub struct TextObject {
    text: String,
    bitmap: RgbaImage,
}

impl TextObject {
    pub fn new(text: impl Into<String>, px: f32, color: Rgba<u8>, rasterizer: &dyn TextRasterizer) -> Self {
        let text = text.into();
        let bitmap = rasterizer.rasterize(&text, px.max(1.0), color);
        Self { text, bitmap }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn bitmap(&self) -> &RgbaImage {
        &self.bitmap
    }

    pub(super) fn release(&mut self) {
        self.bitmap = RgbaImage::new(0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One opaque block per character
    struct BlockRasterizer;

    impl TextRasterizer for BlockRasterizer {
        fn rasterize(&self, text: &str, px: f32, color: Rgba<u8>) -> RgbaImage {
            let side = px as u32;
            RgbaImage::from_pixel(side * text.chars().count().max(1) as u32, side, color)
        }
    }

    #[test]
    fn test_text_object_rasterizes_once() {
        let object = TextObject::new("hi", 8.0, Rgba([255, 255, 255, 255]), &BlockRasterizer);
        assert_eq!(object.text(), "hi");
        assert_eq!(object.bitmap().dimensions(), (16, 8));
    }

    #[test]
    fn test_invalid_font_is_decode_error() {
        let result = FontRasterizer::from_bytes(b"not a font");
        assert!(matches!(result, Err(CompositorError::Decode(_))));
    }
}
