// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{encoder, timing};
use crate::errors::{CompositorError, CompositorResult};
use crate::orientation::{OrientationState, Rotation};
use crate::photo::{EncodingFormat, EncodingQuality};
use crate::scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Where frames are composited
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum RenderBackend {
    /// CPU compositing, no GPU device is opened
    #[default]
    Software,
    /// wgpu device for the filter and anti-aliasing passes
    Gpu,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    pub backend: RenderBackend,
    /// Encoder output width
    pub encoder_width: u32,
    /// Encoder output height
    pub encoder_height: u32,
    /// Target frame rate
    pub fps: u32,
    /// Maximum wait for a source frame before re-rendering the last one (0 = wait forever)
    pub wait_time_ms: u64,
    /// Produce frames at the target rate even without input
    pub force_render: bool,
    /// Anti-aliasing pass
    pub aa_enabled: bool,
    pub stream_rotation: Rotation,
    pub preview_rotation: Rotation,
    pub stream_flip_horizontal: bool,
    pub stream_flip_vertical: bool,
    pub preview_flip_horizontal: bool,
    pub preview_flip_vertical: bool,
    /// Mirror the preview for a front-facing camera
    pub front_camera: bool,
    pub photo_format: EncodingFormat,
    pub photo_quality: EncodingQuality,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            backend: RenderBackend::default(),
            encoder_width: encoder::DEFAULT_WIDTH,
            encoder_height: encoder::DEFAULT_HEIGHT,
            fps: timing::DEFAULT_FPS,
            wait_time_ms: timing::DEFAULT_WAIT_TIME_MS,
            force_render: false,
            aa_enabled: false,
            stream_rotation: Rotation::Deg0,
            preview_rotation: Rotation::Deg0,
            stream_flip_horizontal: false,
            stream_flip_vertical: false,
            preview_flip_horizontal: false,
            preview_flip_vertical: false,
            front_camera: false,
            photo_format: EncodingFormat::default(),
            photo_quality: EncodingQuality::default(),
        }
    }
}

impl CompositorConfig {
    /// Load a JSON config file; missing keys take their defaults
    pub fn load(path: impl AsRef<Path>) -> CompositorResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded compositor config");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> CompositorResult<()> {
        let path = path.as_ref();
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Saved compositor config");
        Ok(())
    }

    pub fn validate(&self) -> CompositorResult<()> {
        if self.encoder_width == 0 || self.encoder_height == 0 {
            return Err(CompositorError::Config(format!(
                "encoder size must be positive, got {}x{}",
                self.encoder_width, self.encoder_height
            )));
        }
        if self.fps == 0 {
            return Err(CompositorError::Config("fps must be positive".into()));
        }
        Ok(())
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            fps: self.fps,
            wait_time_ms: self.wait_time_ms,
            force_render: self.force_render,
            muted: false,
            aa_enabled: self.aa_enabled,
        }
    }

    pub fn orientation(&self) -> OrientationState {
        let mut state = OrientationState::new();
        state.set_stream_rotation(self.stream_rotation.degrees() as i32);
        state.set_preview_rotation(self.preview_rotation.degrees() as i32);
        state.set_stream_horizontal_flip(self.stream_flip_horizontal);
        state.set_stream_vertical_flip(self.stream_flip_vertical);
        state.set_preview_horizontal_flip(self.preview_flip_horizontal);
        state.set_preview_vertical_flip(self.preview_flip_vertical);
        state.set_camera_face(self.front_camera);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CompositorConfig = serde_json::from_str(r#"{ "fps": 60, "backend": "Gpu" }"#).unwrap();
        assert_eq!(config.fps, 60);
        assert_eq!(config.backend, RenderBackend::Gpu);
        assert_eq!(config.encoder_width, encoder::DEFAULT_WIDTH);
    }

    #[test]
    fn test_orientation_from_config() {
        let config = CompositorConfig {
            stream_rotation: Rotation::Deg90,
            front_camera: true,
            ..Default::default()
        };
        let state = config.orientation();
        assert_eq!(state.stream().rotation, Rotation::Deg90);
        assert_eq!(state.preview().rotation, Rotation::Deg0);
        assert!(state.preview().flip_horizontal);
    }

    #[test]
    fn test_validate_rejects_zero_fps() {
        let config = CompositorConfig {
            fps: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CompositorError::Config(_))));
    }
}
