// SPDX-License-Identifier: GPL-3.0-only

//! Engine-wide constants

use std::time::Duration;

/// Default encoder output dimensions
pub mod encoder {
    /// Default encoder width in pixels
    pub const DEFAULT_WIDTH: u32 = 640;

    /// Default encoder height in pixels
    pub const DEFAULT_HEIGHT: u32 = 480;
}

/// Render loop cadence
pub mod timing {
    use super::Duration;

    /// Default target frame rate
    pub const DEFAULT_FPS: u32 = 30;

    /// Default maximum wait for a new source frame (0 = wait for the source)
    pub const DEFAULT_WAIT_TIME_MS: u64 = 0;

    /// How often an idle render loop wakes up to check its stop signal
    pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Log render statistics every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 300;

    /// Frame period for a target frame rate (a zero rate is treated as 1 fps)
    pub fn frame_interval(fps: u32) -> Duration {
        Duration::from_secs_f64(1.0 / fps.max(1) as f64)
    }
}

/// Overlay defaults (percentages of the output frame)
pub mod overlay {
    /// Default overlay width/height as a percentage of the frame
    pub const DEFAULT_SCALE: f32 = 10.0;

    /// Default overlay position as a percentage of the frame
    pub const DEFAULT_POSITION: f32 = 0.0;

    /// Default overlay opacity
    pub const DEFAULT_ALPHA: f32 = 1.0;

    /// Lower bound for a gif frame delay
    pub const MIN_GIF_FRAME_DELAY_MS: u64 = 20;
}

/// Anti-aliasing pass tuning (FXAA-style)
pub mod aa {
    /// Minimum local contrast for a pixel to be treated as an edge
    pub const EDGE_THRESHOLD: f32 = 0.125;

    /// Contrast floor for very dark regions
    pub const EDGE_THRESHOLD_MIN: f32 = 0.0312;

    /// Sub-pixel blend amount for detected edges
    pub const SUBPIXEL_BLEND: f32 = 0.75;
}

/// Shader workgroup size used by all compute pipelines
pub const WORKGROUP_SIZE: u32 = 16;
