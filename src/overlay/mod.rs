// SPDX-License-Identifier: GPL-3.0-only

//! Single active overlay ("stream object") composited over every frame
//!
//! ```text
//!  filtered frame ──► scale bitmap to geometry × frame size ──► alpha-over ──► frame
//!                         ▲
//!          StreamObject::{Gif, Image, Text} (at most one active)
//! ```
//!
//! Geometry is kept in percentages of the output frame and only turned into
//! pixels at composite time, so the placement follows the encoder size.

mod gif;
mod text;

pub use gif::GifObject;
pub use text::{FontRasterizer, TextObject, TextRasterizer};

use crate::constants::overlay as defaults;
use crate::errors::CompositorResult;
use image::{RgbaImage, imageops};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Still image overlay
#[derive(Debug, Clone)]
pub struct ImageObject {
    bitmap: RgbaImage,
}

impl ImageObject {
    pub fn new(bitmap: RgbaImage) -> Self {
        Self { bitmap }
    }

    /// Decode any format supported by the `image` crate
    pub fn from_path(path: impl AsRef<Path>) -> CompositorResult<Self> {
        Ok(Self::new(image::open(path)?.into_rgba8()))
    }

    pub fn bitmap(&self) -> &RgbaImage {
        &self.bitmap
    }
}

/// The overlay kinds, sharing one lifecycle
#[derive(Debug)]
pub enum StreamObject {
    Gif(GifObject),
    Image(ImageObject),
    Text(TextObject),
}

impl StreamObject {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamObject::Gif(_) => "gif",
            StreamObject::Image(_) => "image",
            StreamObject::Text(_) => "text",
        }
    }

    /// Bitmap to draw for this instant, with an id that changes whenever the bitmap does
    fn current_bitmap(&mut self, now: Instant) -> Option<(usize, &RgbaImage)> {
        match self {
            StreamObject::Gif(gif) => gif.frame_at(now),
            StreamObject::Image(image) => Some((0, &image.bitmap)),
            StreamObject::Text(text) => Some((0, text.bitmap())),
        }
    }

    /// Drop the decoded bitmaps
    fn release(&mut self) {
        match self {
            StreamObject::Gif(gif) => gif.release(),
            StreamObject::Image(image) => image.bitmap = RgbaImage::new(0, 0),
            StreamObject::Text(text) => text.release(),
        }
    }
}

impl From<GifObject> for StreamObject {
    fn from(value: GifObject) -> Self {
        StreamObject::Gif(value)
    }
}

impl From<ImageObject> for StreamObject {
    fn from(value: ImageObject) -> Self {
        StreamObject::Image(value)
    }
}

impl From<TextObject> for StreamObject {
    fn from(value: TextObject) -> Self {
        StreamObject::Text(value)
    }
}

/// Named anchor positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslateTo {
    Center,
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Position, size and opacity of the active overlay, in percent of the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayGeometry {
    /// Top-left corner (x, y), 0-100
    pub position: (f32, f32),
    /// Width and height (sx, sy), 0-100
    pub scale: (f32, f32),
    /// Opacity, 0-1
    pub alpha: f32,
}

impl Default for OverlayGeometry {
    fn default() -> Self {
        Self {
            position: (defaults::DEFAULT_POSITION, defaults::DEFAULT_POSITION),
            scale: (defaults::DEFAULT_SCALE, defaults::DEFAULT_SCALE),
            alpha: defaults::DEFAULT_ALPHA,
        }
    }
}

fn percent(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 100.0) }
}

impl OverlayGeometry {
    pub fn set_position(&mut self, x: f32, y: f32) {
        self.position = (percent(x), percent(y));
    }

    pub fn set_scale(&mut self, sx: f32, sy: f32) {
        self.scale = (percent(sx), percent(sy));
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = if alpha.is_nan() { 0.0 } else { alpha.clamp(0.0, 1.0) };
    }

    /// Resolve an anchor with the current size so the object stays inside the frame
    pub fn anchor(&self, to: TranslateTo) -> (f32, f32) {
        let (sx, sy) = self.scale;
        let center_x = 50.0 - sx / 2.0;
        let center_y = 50.0 - sy / 2.0;
        let right = 100.0 - sx;
        let bottom = 100.0 - sy;
        match to {
            TranslateTo::Center => (center_x, center_y),
            TranslateTo::Top => (center_x, 0.0),
            TranslateTo::Bottom => (center_x, bottom),
            TranslateTo::Left => (0.0, center_y),
            TranslateTo::Right => (right, center_y),
            TranslateTo::TopLeft => (0.0, 0.0),
            TranslateTo::TopRight => (right, 0.0),
            TranslateTo::BottomLeft => (0.0, bottom),
            TranslateTo::BottomRight => (right, bottom),
        }
    }

    pub fn translate_to(&mut self, to: TranslateTo) {
        let (x, y) = self.anchor(to);
        self.set_position(x, y);
    }

    /// Pixel rectangle (x, y, width, height) for a frame of the given size
    pub fn pixel_rect(&self, frame_width: u32, frame_height: u32) -> (i64, i64, u32, u32) {
        let fw = frame_width as f32;
        let fh = frame_height as f32;
        let x = (self.position.0 / 100.0 * fw).round() as i64;
        let y = (self.position.1 / 100.0 * fh).round() as i64;
        let w = (self.scale.0 / 100.0 * fw).round() as u32;
        let h = (self.scale.1 / 100.0 * fh).round() as u32;
        (x, y, w, h)
    }
}

/// Straight alpha-over of `src` onto `dst` at (x, y), with extra opacity `alpha`
pub fn alpha_over(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64, alpha: f32) {
    let (dw, dh) = (dst.width() as i64, dst.height() as i64);
    for (sx, sy, sp) in src.enumerate_pixels() {
        let dx = x + sx as i64;
        let dy = y + sy as i64;
        if dx < 0 || dy < 0 || dx >= dw || dy >= dh {
            continue;
        }
        let a = sp[3] as f32 / 255.0 * alpha;
        if a <= 0.0 {
            continue;
        }
        let dp = dst.get_pixel_mut(dx as u32, dy as u32);
        for c in 0..3 {
            let v = sp[c] as f32 * a + dp[c] as f32 * (1.0 - a);
            dp[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        let da = dp[3] as f32 / 255.0;
        dp[3] = ((a + da * (1.0 - a)) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

/// Scaled bitmap of the last composite, reused while nothing changes
struct ScaledCache {
    bitmap_id: usize,
    width: u32,
    height: u32,
    image: RgbaImage,
}

/// Owner of the active stream object (render-thread side)
#[derive(Default)]
pub struct OverlayCompositor {
    active: Option<StreamObject>,
    geometry: OverlayGeometry,
    cache: Option<ScaledCache>,
}

impl OverlayCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate `object`, releasing the previous one first
    ///
    /// Geometry resets to the defaults for the new object.
    pub fn set_stream_object(&mut self, object: StreamObject) {
        self.clear();
        debug!(kind = object.kind(), "Activating stream object");
        self.active = Some(object);
        self.geometry = OverlayGeometry::default();
    }

    /// Release and remove the active object
    pub fn clear(&mut self) {
        if let Some(mut previous) = self.active.take() {
            debug!(kind = previous.kind(), "Releasing stream object");
            previous.release();
        }
        self.cache = None;
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_kind(&self) -> Option<&'static str> {
        self.active.as_ref().map(StreamObject::kind)
    }

    pub fn geometry(&self) -> OverlayGeometry {
        self.geometry
    }

    /// Replace the geometry of the active object; no-op without one
    pub fn set_geometry(&mut self, geometry: OverlayGeometry) -> bool {
        if self.active.is_none() {
            return false;
        }
        self.geometry = geometry;
        true
    }

    pub fn set_alpha(&mut self, alpha: f32) -> bool {
        let mut g = self.geometry;
        g.set_alpha(alpha);
        self.set_geometry(g)
    }

    pub fn set_scale(&mut self, sx: f32, sy: f32) -> bool {
        let mut g = self.geometry;
        g.set_scale(sx, sy);
        self.set_geometry(g)
    }

    pub fn set_position(&mut self, x: f32, y: f32) -> bool {
        let mut g = self.geometry;
        g.set_position(x, y);
        self.set_geometry(g)
    }

    pub fn translate_to(&mut self, to: TranslateTo) -> bool {
        let mut g = self.geometry;
        g.translate_to(to);
        self.set_geometry(g)
    }

    pub fn scale(&self) -> (f32, f32) {
        self.geometry.scale
    }

    pub fn position(&self) -> (f32, f32) {
        self.geometry.position
    }

    /// Blend the active object onto `frame`
    pub fn blend(&mut self, frame: &mut RgbaImage, now: Instant) {
        let Some(object) = self.active.as_mut() else {
            return;
        };
        let (x, y, w, h) = self.geometry.pixel_rect(frame.width(), frame.height());
        if w == 0 || h == 0 || self.geometry.alpha <= 0.0 {
            return;
        }
        let Some((bitmap_id, bitmap)) = object.current_bitmap(now) else {
            return;
        };
        if bitmap.width() == 0 || bitmap.height() == 0 {
            return;
        }

        let stale = match &self.cache {
            Some(c) => c.bitmap_id != bitmap_id || c.width != w || c.height != h,
            None => true,
        };
        if stale {
            self.cache = Some(ScaledCache {
                bitmap_id,
                width: w,
                height: h,
                image: imageops::resize(bitmap, w, h, imageops::FilterType::Triangle),
            });
        }

        if let Some(cache) = &self.cache {
            alpha_over(frame, &cache.image, x, y, self.geometry.alpha);
        }
    }
}

impl std::fmt::Debug for OverlayCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayCompositor")
            .field("active", &self.active_kind())
            .field("geometry", &self.geometry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn red_image() -> StreamObject {
        ImageObject::new(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]))).into()
    }

    fn blue_image() -> StreamObject {
        ImageObject::new(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]))).into()
    }

    #[test]
    fn test_center_anchor_accounts_for_size() {
        let mut overlay = OverlayCompositor::new();
        overlay.set_stream_object(red_image());
        overlay.set_scale(20.0, 30.0);
        assert!(overlay.translate_to(TranslateTo::Center));
        assert_eq!(overlay.position(), (40.0, 35.0));

        overlay.translate_to(TranslateTo::BottomRight);
        assert_eq!(overlay.position(), (80.0, 70.0));
    }

    #[test]
    fn test_mutations_without_object_are_noops() {
        let mut overlay = OverlayCompositor::new();
        assert!(!overlay.set_alpha(0.5));
        assert!(!overlay.set_scale(50.0, 50.0));
        assert!(!overlay.translate_to(TranslateTo::Center));
        assert_eq!(overlay.geometry(), OverlayGeometry::default());
    }

    #[test]
    fn test_replacing_object_never_blends_both() {
        let mut overlay = OverlayCompositor::new();
        overlay.set_stream_object(red_image());
        overlay.set_scale(100.0, 100.0);
        overlay.set_stream_object(blue_image());
        overlay.set_scale(100.0, 100.0);

        let mut frame = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        overlay.blend(&mut frame, Instant::now());
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 255, 255]));
        assert_eq!(overlay.active_kind(), Some("image"));
    }

    #[test]
    fn test_placement_follows_frame_size() {
        let mut overlay = OverlayCompositor::new();
        overlay.set_stream_object(red_image());
        overlay.set_scale(50.0, 50.0);
        overlay.set_position(50.0, 50.0);

        let mut small = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        overlay.blend(&mut small, Instant::now());
        assert_eq!(small.get_pixel(4, 4).0, [0, 0, 0, 255]);
        assert_eq!(small.get_pixel(5, 5).0, [255, 0, 0, 255]);

        let mut large = RgbaImage::from_pixel(40, 20, Rgba([0, 0, 0, 255]));
        overlay.blend(&mut large, Instant::now());
        assert_eq!(large.get_pixel(19, 9).0, [0, 0, 0, 255]);
        assert_eq!(large.get_pixel(20, 10).0, [255, 0, 0, 255]);
        assert_eq!(large.get_pixel(39, 19).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_alpha_over_is_straight_alpha() {
        let mut dst = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let src = RgbaImage::from_pixel(1, 1, Rgba([200, 100, 0, 255]));
        alpha_over(&mut dst, &src, 0, 0, 0.5);
        assert_eq!(dst.get_pixel(0, 0).0, [100, 50, 0, 255]);
    }

    #[test]
    fn test_clear_removes_object() {
        let mut overlay = OverlayCompositor::new();
        overlay.set_stream_object(red_image());
        overlay.clear();
        assert!(!overlay.is_active());

        let mut frame = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        overlay.blend(&mut frame, Instant::now());
        assert!(frame.pixels().all(|p| p.0 == [1, 2, 3, 255]));
    }
}
