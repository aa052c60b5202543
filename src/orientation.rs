// SPDX-License-Identifier: GPL-3.0-only

//! Independent orientation transforms for the stream and preview paths
//!
//! Each path carries a rotation and two flip flags. Flips are applied in the
//! upright source frame and the rotation afterwards, so "horizontal flip"
//! always mirrors the picture the camera sees regardless of rotation.

use crate::frame::fit_to;
use image::{RgbaImage, imageops};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Clockwise rotation in 90 degree steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// No rotation
    #[default]
    Deg0,
    /// 90 degrees clockwise
    Deg90,
    /// 180 degrees (upside down)
    Deg180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Deg270,
}

impl Rotation {
    /// Create rotation from a degree value, normalised to 0-360 and snapped to
    /// the nearest quarter turn.
    pub fn from_degrees(degrees: i32) -> Self {
        let normalized = degrees.rem_euclid(360);
        if normalized % 90 != 0 {
            warn!(degrees, "Rotation is not a multiple of 90, snapping to nearest");
        }
        match ((normalized + 45) / 90) % 4 {
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            3 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    fn quarter_turns(&self) -> u32 {
        self.degrees() / 90
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// 2x2 integer matrix acting on centred image coordinates (x right, y down)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transform2(pub [[i32; 2]; 2]);

impl Transform2 {
    pub const IDENTITY: Transform2 = Transform2([[1, 0], [0, 1]]);
    pub const FLIP_H: Transform2 = Transform2([[-1, 0], [0, 1]]);
    pub const FLIP_V: Transform2 = Transform2([[1, 0], [0, -1]]);
    /// One clockwise quarter turn: (x, y) -> (-y, x)
    pub const ROT_90: Transform2 = Transform2([[0, -1], [1, 0]]);

    /// `self ∘ other`: apply `other` first, then `self`
    pub fn compose(&self, other: &Transform2) -> Transform2 {
        let a = self.0;
        let b = other.0;
        let mut out = [[0; 2]; 2];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j];
            }
        }
        Transform2(out)
    }

    pub fn apply(&self, (x, y): (i32, i32)) -> (i32, i32) {
        let m = self.0;
        (m[0][0] * x + m[0][1] * y, m[1][0] * x + m[1][1] * y)
    }
}

/// Orientation of one output path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathTransform {
    pub rotation: Rotation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl PathTransform {
    pub fn is_identity(&self) -> bool {
        self.rotation == Rotation::Deg0 && !self.flip_horizontal && !self.flip_vertical
    }

    /// Final transform matrix: rotation ∘ flip
    pub fn matrix(&self) -> Transform2 {
        let mut flip = Transform2::IDENTITY;
        if self.flip_horizontal {
            flip = Transform2::FLIP_H.compose(&flip);
        }
        if self.flip_vertical {
            flip = Transform2::FLIP_V.compose(&flip);
        }
        let mut rotate = Transform2::IDENTITY;
        for _ in 0..self.rotation.quarter_turns() {
            rotate = Transform2::ROT_90.compose(&rotate);
        }
        rotate.compose(&flip)
    }

    /// Transform `image` and resample the result to `width` x `height`
    ///
    /// A quarter turn yields a `h x w` image, so asking for the unrotated
    /// `w x h` stretches the content unevenly. The preview path swaps the
    /// target size itself; for a portrait stream the caller sets the encoder
    /// size with width and height swapped.
    pub fn apply(&self, image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
        if self.is_identity() {
            return fit_to(image.clone(), width, height);
        }

        let mut out = image.clone();
        if self.flip_horizontal {
            imageops::flip_horizontal_in_place(&mut out);
        }
        if self.flip_vertical {
            imageops::flip_vertical_in_place(&mut out);
        }
        let out = match self.rotation {
            Rotation::Deg0 => out,
            Rotation::Deg90 => imageops::rotate90(&out),
            Rotation::Deg180 => imageops::rotate180(&out),
            Rotation::Deg270 => imageops::rotate270(&out),
        };
        fit_to(out, width, height)
    }
}

/// Stream and preview orientation plus the front-camera correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrientationState {
    stream: PathTransform,
    preview: PathTransform,
    front_camera: bool,
}

impl OrientationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both stream and preview rotation
    pub fn set_rotation(&mut self, degrees: i32) {
        let rotation = Rotation::from_degrees(degrees);
        self.stream.rotation = rotation;
        self.preview.rotation = rotation;
        debug!(%rotation, "Rotation changed for both paths");
    }

    /// Change the stream rotation only; the preview keeps its own
    pub fn set_stream_rotation(&mut self, degrees: i32) {
        self.stream.rotation = Rotation::from_degrees(degrees);
        debug!(rotation = %self.stream.rotation, "Stream rotation changed");
    }

    /// Change the preview rotation only
    pub fn set_preview_rotation(&mut self, degrees: i32) {
        self.preview.rotation = Rotation::from_degrees(degrees);
        debug!(rotation = %self.preview.rotation, "Preview rotation changed");
    }

    pub fn set_stream_horizontal_flip(&mut self, flip: bool) {
        self.stream.flip_horizontal = flip;
    }

    pub fn set_stream_vertical_flip(&mut self, flip: bool) {
        self.stream.flip_vertical = flip;
    }

    pub fn set_preview_horizontal_flip(&mut self, flip: bool) {
        self.preview.flip_horizontal = flip;
    }

    pub fn set_preview_vertical_flip(&mut self, flip: bool) {
        self.preview.flip_vertical = flip;
    }

    /// Front cameras mirror the preview horizontally (selfie view)
    ///
    /// The correction is folded in when the transform is computed, the stored
    /// flip flags are left alone so toggling back restores the exact state.
    pub fn set_camera_face(&mut self, front_camera: bool) {
        self.front_camera = front_camera;
        debug!(front_camera, "Camera face changed");
    }

    pub fn is_front_camera(&self) -> bool {
        self.front_camera
    }

    /// Effective transform of the stream path (encoder surfaces)
    pub fn stream(&self) -> PathTransform {
        self.stream
    }

    /// Effective transform of the preview path (display surface)
    pub fn preview(&self) -> PathTransform {
        let mut preview = self.preview;
        preview.flip_horizontal ^= self.front_camera;
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// 3x2 image where every pixel is unique
    fn asymmetric() -> RgbaImage {
        RgbaImage::from_fn(3, 2, |x, y| Rgba([(x * 10 + y) as u8, 0, 0, 255]))
    }

    /// Reference transform computed from the matrix on centred, doubled coordinates
    fn via_matrix(t: &PathTransform, image: &RgbaImage) -> RgbaImage {
        let (w, h) = image.dimensions();
        let (ow, oh) = if t.rotation.swaps_dimensions() { (h, w) } else { (w, h) };
        let m = t.matrix();
        let mut out = RgbaImage::new(ow, oh);
        for y in 0..h {
            for x in 0..w {
                let u = 2 * x as i32 + 1 - w as i32;
                let v = 2 * y as i32 + 1 - h as i32;
                let (u2, v2) = m.apply((u, v));
                let ox = ((u2 + ow as i32 - 1) / 2) as u32;
                let oy = ((v2 + oh as i32 - 1) / 2) as u32;
                out.put_pixel(ox, oy, *image.get_pixel(x, y));
            }
        }
        out
    }

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(0), Rotation::Deg0);
        assert_eq!(Rotation::from_degrees(90), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(-90), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(540), Rotation::Deg180);
        assert_eq!(Rotation::from_degrees(100), Rotation::Deg90);
    }

    #[test]
    fn test_image_ops_match_matrix() {
        let image = asymmetric();
        for degrees in [0, 90, 180, 270] {
            for (flip_horizontal, flip_vertical) in [(false, false), (true, false), (false, true), (true, true)] {
                let t = PathTransform {
                    rotation: Rotation::from_degrees(degrees),
                    flip_horizontal,
                    flip_vertical,
                };
                let expected = via_matrix(&t, &image);
                let actual = t.apply(&image, expected.width(), expected.height());
                assert_eq!(actual, expected, "mismatch for {:?}", t);
            }
        }
    }

    #[test]
    fn test_quarter_turn_into_unswapped_size_stretches() {
        let red = Rgba([255, 0, 0, 255]);
        let blue = Rgba([0, 0, 255, 255]);
        let image = RgbaImage::from_fn(4, 2, |x, _| if x < 2 { red } else { blue });
        let t = PathTransform {
            rotation: Rotation::Deg90,
            ..Default::default()
        };

        assert_eq!(t.apply(&image, 2, 4), imageops::rotate90(&image));

        // Left half lands on the top rows, squeezed across the full width
        let stretched = t.apply(&image, 4, 2);
        assert_eq!(stretched.dimensions(), (4, 2));
        let corner = stretched.get_pixel(3, 0);
        assert!(corner[0] > corner[2], "top right should come from the red half, got {:?}", corner);
    }

    #[test]
    fn test_flip_is_relative_to_upright_frame() {
        // Horizontal flip then 90° differs from 90° then horizontal flip
        let t = PathTransform {
            rotation: Rotation::Deg90,
            flip_horizontal: true,
            flip_vertical: false,
        };
        let flip_after_rotate = Transform2::FLIP_H.compose(&Transform2::ROT_90);
        assert_ne!(t.matrix(), flip_after_rotate);
        assert_eq!(t.matrix(), Transform2::ROT_90.compose(&Transform2::FLIP_H));
    }

    #[test]
    fn test_stream_rotation_leaves_preview_alone() {
        let mut state = OrientationState::new();
        state.set_rotation(90);
        state.set_stream_rotation(180);
        assert_eq!(state.stream().rotation, Rotation::Deg180);
        assert_eq!(state.preview().rotation, Rotation::Deg90);

        state.set_stream_horizontal_flip(true);
        assert!(!state.preview().flip_horizontal);
    }

    #[test]
    fn test_camera_face_toggle_is_idempotent() {
        let mut state = OrientationState::new();
        state.set_preview_horizontal_flip(true);
        let before = state;

        state.set_camera_face(true);
        assert!(!state.preview().flip_horizontal, "front camera mirrors the preview");
        assert_eq!(state.stream(), before.stream());

        state.set_camera_face(false);
        assert_eq!(state, before);
    }
}
