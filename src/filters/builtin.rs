// SPDX-License-Identifier: GPL-3.0-only

//! Built-in color filters
//!
//! Runs the color compute shader when the session has a GPU context and
//! falls back to an equivalent CPU loop otherwise (or after a GPU failure).

use super::{Filter, FilterContext};
use crate::errors::FilterError;
use crate::shaders::ShaderKind;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Available color filters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColorFilterKind {
    /// Luma-weighted grayscale
    Grayscale,
    /// Classic sepia tone
    Sepia,
    /// Inverted colors
    Negative,
    /// Add a constant to every channel (-1.0 ..= 1.0)
    Brightness(f32),
}

impl ColorFilterKind {
    /// Shader mode selector, matches the `switch` in color_filter.wgsl
    pub fn shader_mode(&self) -> u32 {
        match self {
            ColorFilterKind::Grayscale => 1,
            ColorFilterKind::Sepia => 2,
            ColorFilterKind::Negative => 3,
            ColorFilterKind::Brightness(_) => 4,
        }
    }

    fn amount(&self) -> f32 {
        match self {
            ColorFilterKind::Brightness(amount) => amount.clamp(-1.0, 1.0),
            _ => 0.0,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ColorFilterKind::Grayscale => "grayscale",
            ColorFilterKind::Sepia => "sepia",
            ColorFilterKind::Negative => "negative",
            ColorFilterKind::Brightness(_) => "brightness",
        }
    }

    /// Parse a filter name as used by the CLI and the config file
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "grayscale" | "greyscale" => Some(ColorFilterKind::Grayscale),
            "sepia" => Some(ColorFilterKind::Sepia),
            "negative" | "invert" => Some(ColorFilterKind::Negative),
            _ => None,
        }
    }
}

/// Quantize like the shader's pack4x8unorm
#[inline]
pub(crate) fn to_unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[inline]
pub(crate) fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Apply a color filter on the CPU
pub fn apply_color_cpu(frame: &mut RgbaImage, kind: ColorFilterKind) {
    let amount = kind.amount();
    for pixel in frame.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let (r, g, b) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);

        let (nr, ng, nb) = match kind {
            ColorFilterKind::Grayscale => {
                let y = luma(r, g, b);
                (y, y, y)
            }
            ColorFilterKind::Sepia => (
                0.393 * r + 0.769 * g + 0.189 * b,
                0.349 * r + 0.686 * g + 0.168 * b,
                0.272 * r + 0.534 * g + 0.131 * b,
            ),
            ColorFilterKind::Negative => (1.0 - r, 1.0 - g, 1.0 - b),
            ColorFilterKind::Brightness(_) => (r + amount, g + amount, b + amount),
        };

        pixel.0 = [to_unorm8(nr), to_unorm8(ng), to_unorm8(nb), a];
    }
}

/// A built-in color filter usable in any chain slot
#[derive(Debug)]
pub struct ColorFilter {
    kind: ColorFilterKind,
    gpu_failed: bool,
}

impl ColorFilter {
    pub fn new(kind: ColorFilterKind) -> Self {
        Self {
            kind,
            gpu_failed: false,
        }
    }

    pub fn boxed(kind: ColorFilterKind) -> Box<dyn Filter> {
        Box::new(Self::new(kind))
    }

    pub fn kind(&self) -> ColorFilterKind {
        self.kind
    }
}

impl Filter for ColorFilter {
    fn name(&self) -> &str {
        self.kind.display_name()
    }

    fn apply(&mut self, frame: &mut RgbaImage, ctx: &mut FilterContext<'_>) -> Result<(), FilterError> {
        if !self.gpu_failed {
            if let Some(gpu) = ctx.gpu() {
                match gpu
                    .pipeline(ShaderKind::Color)
                    .apply(frame, self.kind.shader_mode(), self.kind.amount())
                {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!(filter = self.name(), error = %e, "GPU filter failed, using CPU fallback");
                        self.gpu_failed = true;
                    }
                }
            }
        }

        apply_color_cpu(frame, self.kind);
        Ok(())
    }
}
