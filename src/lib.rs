// SPDX-License-Identifier: GPL-3.0-only

//! Stream Compositor - real-time video compositing between a source and encoders
//!
//! Frames pushed into the input surface are scaled to the encoder size, run
//! through an ordered filter chain, blended with at most one overlay object,
//! optionally anti-aliased, then rotated/flipped independently for the stream
//! path (encoder surfaces) and the preview path (display surface).
//!
//! # Architecture
//!
//! - [`compositor`]: Lifecycle facade and every runtime knob
//! - [`scheduler`]: Render thread, frame pacing and the per-frame pipeline
//! - [`surface`]: Input surface, encoder surfaces and the preview surface
//! - [`filters`]: Filter chain, built-in color filters and anti-aliasing
//! - [`overlay`]: Gif, image and text overlays
//! - [`orientation`]: Stream/preview rotation and flips
//! - [`photo`]: One-shot frame capture and photo encoding
//! - [`gpu`] / [`shaders`]: wgpu device and compute pipelines
//! - [`config`]: JSON configuration
//!
//! # Example
//!
//! ```ignore
//! let compositor = Compositor::new();
//! compositor.set_encoder_size(1280, 720)?;
//! compositor.init()?;
//! compositor.add_media_codec_surface(encoder_surface)?;
//! compositor.start()?;
//! compositor.surface()?.push_frame(camera_frame)?;
//! ```

pub mod compositor;
pub mod config;
pub mod constants;
pub mod errors;
pub mod filters;
pub mod frame;
pub mod gpu;
pub mod orientation;
pub mod overlay;
pub mod photo;
pub mod scheduler;
pub mod shaders;
pub mod surface;

// Re-export commonly used types
pub use compositor::Compositor;
pub use config::{CompositorConfig, RenderBackend};
pub use errors::{CompositorError, CompositorResult, FilterError, PhotoError, SurfaceError};
pub use filters::{Filter, FilterContext};
pub use frame::VideoFrame;
pub use surface::{DrawableSurface, SourceSurface, SurfaceHandle};
