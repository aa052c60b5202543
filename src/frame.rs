// SPDX-License-Identifier: GPL-3.0-only

//! Frame types passed between the render loop and output surfaces

use image::{Rgba, RgbaImage, imageops};
use std::sync::Arc;
use std::time::Instant;

/// Pixel value written into every pixel of a muted frame
pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// A composited RGBA frame handed to output surfaces
///
/// The pixel data is shared via `Arc` so every encoder surface, the preview
/// surface and pending photo requests can hold the same frame without copying.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGBA8 pixels, tightly packed
    pub image: Arc<RgbaImage>,
    /// Monotonic frame counter for the session
    pub sequence: u64,
    /// When the frame was composited
    pub rendered_at: Instant,
    /// True when this frame is the black substitute of a muted stream
    pub muted: bool,
    /// True when the frame re-renders the previous source frame
    pub reemitted: bool,
}

impl VideoFrame {
    /// Wrap a composited image
    pub fn new(image: RgbaImage, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            sequence,
            rendered_at: Instant::now(),
            muted: false,
            reemitted: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw RGBA bytes
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Check whether every pixel equals `value`
    pub fn is_uniform(&self, value: Rgba<u8>) -> bool {
        self.image.pixels().all(|p| *p == value)
    }
}

/// Solid black image with the given dimensions
pub fn black_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, BLACK)
}

/// Resample `image` to exactly `width` x `height`
///
/// Returns the input untouched when dimensions already match, like a texture
/// drawn into a viewport of its own size.
pub fn fit_to(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.width() == width && image.height() == height {
        return image;
    }
    imageops::resize(&image, width, height, imageops::FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_image_is_uniform() {
        let frame = VideoFrame::new(black_image(16, 9), 0);
        assert_eq!(frame.width(), 16);
        assert_eq!(frame.height(), 9);
        assert!(frame.is_uniform(BLACK));
        assert_eq!(frame.pixels().len(), 16 * 9 * 4);
    }

    #[test]
    fn test_fit_to_keeps_matching_dimensions() {
        let mut img = RgbaImage::new(4, 4);
        img.put_pixel(1, 1, Rgba([10, 20, 30, 255]));
        let out = fit_to(img.clone(), 4, 4);
        assert_eq!(out, img);

        let scaled = fit_to(img, 8, 2);
        assert_eq!(scaled.dimensions(), (8, 2));
    }
}
