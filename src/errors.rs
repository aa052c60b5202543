// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the compositing engine

use crate::surface::SurfaceHandle;
use std::fmt;

/// Result type alias using CompositorError
pub type CompositorResult<T> = Result<T, CompositorError>;

/// Main compositor error type
#[derive(Debug, Clone, PartialEq)]
pub enum CompositorError {
    /// Operation not allowed in the current lifecycle state
    /// (e.g. `start` while running, surface accessors before `start`)
    InvalidState(String),
    /// GPU context or texture allocation failed
    ResourceExhaustion(String),
    /// A single output surface failed to present a frame
    SurfacePresentation {
        handle: SurfaceHandle,
        reason: String,
    },
    /// Overlay image, gif or font could not be decoded
    Decode(String),
    /// Configuration errors
    Config(String),
    /// Filesystem errors
    Io(String),
}

/// Errors reported by a [`DrawableSurface`](crate::surface::DrawableSurface)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The surface could not be bound as a render target
    BindFailed(String),
    /// Presenting the frame failed (consumer gone, buffer queue abandoned, ...)
    PresentFailed(String),
    /// The surface was already destroyed
    Destroyed,
}

/// Error returned by a filter for a single frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Frame dimensions the filter cannot handle
    UnsupportedDimensions { width: u32, height: u32 },
    /// GPU dispatch or readback failed
    Gpu(String),
    /// Other errors
    Other(String),
}

/// Photo capture errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoError {
    /// The compositor is not running, or stopped before the frame was produced
    CaptureUnavailable,
    /// Encoding failed
    EncodingFailed(String),
    /// Save failed
    SaveFailed(String),
}

impl fmt::Display for CompositorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositorError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            CompositorError::ResourceExhaustion(msg) => {
                write!(f, "GPU resource allocation failed: {}", msg)
            }
            CompositorError::SurfacePresentation { handle, reason } => {
                write!(f, "Surface {} failed to present: {}", handle, reason)
            }
            CompositorError::Decode(msg) => write!(f, "Decode error: {}", msg),
            CompositorError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CompositorError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::BindFailed(msg) => write!(f, "Bind failed: {}", msg),
            SurfaceError::PresentFailed(msg) => write!(f, "Present failed: {}", msg),
            SurfaceError::Destroyed => write!(f, "Surface already destroyed"),
        }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::UnsupportedDimensions { width, height } => {
                write!(f, "Unsupported frame dimensions {}x{}", width, height)
            }
            FilterError::Gpu(msg) => write!(f, "GPU filter error: {}", msg),
            FilterError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for PhotoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotoError::CaptureUnavailable => write!(f, "Capture unavailable: compositor not running"),
            PhotoError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
            PhotoError::SaveFailed(msg) => write!(f, "Save failed: {}", msg),
        }
    }
}

impl std::error::Error for CompositorError {}
impl std::error::Error for SurfaceError {}
impl std::error::Error for FilterError {}
impl std::error::Error for PhotoError {}

impl From<std::io::Error> for CompositorError {
    fn from(err: std::io::Error) -> Self {
        CompositorError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CompositorError {
    fn from(err: serde_json::Error) -> Self {
        CompositorError::Config(err.to_string())
    }
}

impl From<image::ImageError> for CompositorError {
    fn from(err: image::ImageError) -> Self {
        CompositorError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for PhotoError {
    fn from(err: std::io::Error) -> Self {
        PhotoError::SaveFailed(err.to_string())
    }
}

impl From<image::ImageError> for PhotoError {
    fn from(err: image::ImageError) -> Self {
        PhotoError::EncodingFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = CompositorError::InvalidState("already running".into());
        assert_eq!(err.to_string(), "Invalid state: already running");

        let err = PhotoError::CaptureUnavailable;
        assert!(err.to_string().contains("not running"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CompositorError = io.into();
        assert!(matches!(err, CompositorError::Io(_)));
    }
}
