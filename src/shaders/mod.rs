// SPDX-License-Identifier: GPL-3.0-only
//! WGSL compute shaders used by the render loop
//!
//! All passes operate directly on RGBA frames: upload, dispatch, read back.
//! Every GPU pass has a CPU twin in [`crate::filters`] that produces the same
//! result, used by the software backend and whenever GPU dispatch fails.

mod gpu_filter;
mod gpu_processor;

pub use gpu_filter::GpuFilterPipeline;
pub use gpu_processor::{FrameResources, compute_dispatch_size};

use crate::constants::aa;

/// Color filter shader source
pub const COLOR_FILTER_SHADER: &str = include_str!("color_filter.wgsl");

/// Anti-aliasing shader body (threshold constants are prepended by `ShaderKind::source`)
pub const ANTI_ALIAS_SHADER: &str = include_str!("anti_alias.wgsl");

/// Which compute shader a pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderKind {
    /// Per-pixel color filters (grayscale, sepia, negative, brightness)
    Color,
    /// Edge-smoothing pass appended after the filter chain
    AntiAlias,
}

impl ShaderKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShaderKind::Color => "color_filter_shader",
            ShaderKind::AntiAlias => "anti_alias_shader",
        }
    }

    /// Full WGSL source for this shader
    pub fn source(&self) -> String {
        match self {
            ShaderKind::Color => COLOR_FILTER_SHADER.to_string(),
            ShaderKind::AntiAlias => format!(
                "const EDGE_THRESHOLD: f32 = {:?};\nconst EDGE_THRESHOLD_MIN: f32 = {:?};\n{}",
                aa::EDGE_THRESHOLD,
                aa::EDGE_THRESHOLD_MIN,
                ANTI_ALIAS_SHADER
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validate that a WGSL shader compiles successfully using naga
    fn validate_shader(name: &str, source: &str) {
        let result = naga::front::wgsl::parse_str(source);
        match result {
            Ok(module) => {
                let info = naga::valid::Validator::new(
                    naga::valid::ValidationFlags::all(),
                    naga::valid::Capabilities::all(),
                )
                .validate(&module);

                if let Err(e) = info {
                    panic!("Shader '{}' validation failed: {:?}", name, e);
                }
            }
            Err(e) => {
                panic!("Shader '{}' parse failed: {:?}", name, e);
            }
        }
    }

    #[test]
    fn test_color_filter_shader_validates() {
        validate_shader("color_filter", &ShaderKind::Color.source());
    }

    #[test]
    fn test_anti_alias_shader_validates() {
        validate_shader("anti_alias", &ShaderKind::AntiAlias.source());
    }

    #[test]
    fn test_anti_alias_constants_are_prepended() {
        let source = ShaderKind::AntiAlias.source();
        assert!(source.starts_with("const EDGE_THRESHOLD: f32 = 0.125;"));
    }
}
