// SPDX-License-Identifier: GPL-3.0-only

//! Edge-smoothing pass run after the user chain and overlay
//!
//! Pixels whose local luma contrast exceeds the edge threshold are blended
//! towards the average of their four neighbours. Flat regions and frame
//! dimensions are never touched.

use super::builtin::{luma, to_unorm8};
use super::{Filter, FilterContext};
use crate::constants::aa;
use crate::errors::FilterError;
use crate::shaders::ShaderKind;
use image::RgbaImage;
use tracing::warn;

/// Fixed anti-aliasing pass
#[derive(Debug, Default)]
pub struct AntiAliasPass {
    gpu_failed: bool,
}

impl AntiAliasPass {
    pub fn new() -> Self {
        Self::default()
    }
}

fn smoothstep(x: f32) -> f32 {
    let t = x.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// CPU implementation, mirrors anti_alias.wgsl
pub fn anti_alias_cpu(frame: &mut RgbaImage) {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let source = frame.clone();
    let fetch = |x: i64, y: i64| -> [f32; 4] {
        let cx = x.clamp(0, width as i64 - 1) as u32;
        let cy = y.clamp(0, height as i64 - 1) as u32;
        let p = source.get_pixel(cx, cy).0;
        [
            p[0] as f32 / 255.0,
            p[1] as f32 / 255.0,
            p[2] as f32 / 255.0,
            p[3] as f32 / 255.0,
        ]
    };
    let l = |c: &[f32; 4]| luma(c[0], c[1], c[2]);

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let c = fetch(x, y);
            let n = fetch(x, y - 1);
            let s = fetch(x, y + 1);
            let e = fetch(x + 1, y);
            let w = fetch(x - 1, y);

            let (lc, ln, ls, le, lw) = (l(&c), l(&n), l(&s), l(&e), l(&w));
            let lmin = lc.min(ln).min(ls).min(le).min(lw);
            let lmax = lc.max(ln).max(ls).max(le).max(lw);
            let contrast = lmax - lmin;

            if contrast < aa::EDGE_THRESHOLD_MIN.max(lmax * aa::EDGE_THRESHOLD) {
                continue;
            }

            let luma_avg = (ln + ls + le + lw) * 0.25;
            let sub = smoothstep((luma_avg - lc).abs() / contrast);
            let blend = sub * sub * aa::SUBPIXEL_BLEND;

            let mut out = [0u8; 4];
            for i in 0..3 {
                let avg = (n[i] + s[i] + e[i] + w[i]) * 0.25;
                out[i] = to_unorm8(c[i] + (avg - c[i]) * blend);
            }
            out[3] = source.get_pixel(x as u32, y as u32).0[3];
            frame.put_pixel(x as u32, y as u32, image::Rgba(out));
        }
    }
}

impl Filter for AntiAliasPass {
    fn name(&self) -> &str {
        "anti_alias"
    }

    fn apply(&mut self, frame: &mut RgbaImage, ctx: &mut FilterContext<'_>) -> Result<(), FilterError> {
        if !self.gpu_failed {
            if let Some(gpu) = ctx.gpu() {
                match gpu
                    .pipeline(ShaderKind::AntiAlias)
                    .apply(frame, 0, aa::SUBPIXEL_BLEND)
                {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!(error = %e, "GPU anti-aliasing failed, using CPU fallback");
                        self.gpu_failed = true;
                    }
                }
            }
        }

        anti_alias_cpu(frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_flat_frame_is_unchanged() {
        let original = RgbaImage::from_pixel(8, 8, Rgba([90, 90, 90, 255]));
        let mut frame = original.clone();
        anti_alias_cpu(&mut frame);
        assert_eq!(frame, original);
    }

    #[test]
    fn test_isolated_pixel_is_softened_and_dimensions_kept() {
        let mut frame = RgbaImage::from_pixel(5, 5, Rgba([0, 0, 0, 255]));
        frame.put_pixel(2, 2, Rgba([255, 255, 255, 255]));

        AntiAliasPass::new()
            .apply(&mut frame, &mut FilterContext::software(0))
            .unwrap();

        assert_eq!(frame.dimensions(), (5, 5));
        let center = frame.get_pixel(2, 2);
        assert!(center[0] < 255, "edge pixel should be blended");
        assert_eq!(center[3], 255);
        // Far corner has no contrast in its neighbourhood
        assert_eq!(frame.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }
}
