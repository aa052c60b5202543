// SPDX-License-Identifier: GPL-3.0-only

//! Render targets and the input surface
//!
//! ```text
//!  producer ──push_frame──► SourceSurface ──notify──► render loop
//!                                                        │
//!                         ┌──────────────────────────────┤
//!                         ▼                              ▼
//!               EncoderSurfaceSet (stream)      preview surface
//! ```
//!
//! Output surfaces are identified by the [`SurfaceHandle`] they report. The
//! encoder set holds each handle at most once; a surface that fails to present
//! is dropped from the set and destroyed, the others keep receiving frames.

use crate::errors::{CompositorError, CompositorResult, SurfaceError};
use crate::frame::VideoFrame;
use crate::gpu::GpuContext;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use image::RgbaImage;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Identity of an output surface supplied by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle(pub u64);

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// Identifier of the input texture the producer writes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// A destination the compositor can draw into
pub trait DrawableSurface: Send {
    fn handle(&self) -> SurfaceHandle;

    /// Prepare the surface for frames of the given size
    fn bind(&mut self, width: u32, height: u32) -> Result<(), SurfaceError>;

    /// Present one composited frame
    fn present(&mut self, frame: &VideoFrame) -> Result<(), SurfaceError>;

    /// Release the surface; no frames are presented afterwards
    fn destroy(&mut self) {}
}

/// Output surface paired with the size it was bound at
pub struct RenderSurface {
    surface: Box<dyn DrawableSurface>,
    bound: Option<(u32, u32)>,
}

impl RenderSurface {
    pub fn new(surface: Box<dyn DrawableSurface>) -> Self {
        Self { surface, bound: None }
    }

    pub fn handle(&self) -> SurfaceHandle {
        self.surface.handle()
    }

    /// Bind on first use and whenever the frame size changes, then present
    pub fn present(&mut self, frame: &VideoFrame) -> Result<(), SurfaceError> {
        let size = (frame.width(), frame.height());
        if self.bound != Some(size) {
            self.surface.bind(size.0, size.1)?;
            self.bound = Some(size);
        }
        self.surface.present(frame)
    }

    pub fn destroy(mut self) {
        debug!(handle = %self.handle(), "Destroying render surface");
        self.surface.destroy();
    }
}

impl fmt::Debug for RenderSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSurface")
            .field("handle", &self.handle())
            .field("bound", &self.bound)
            .finish()
    }
}

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

struct SourceInner {
    texture_id: TextureId,
    latest: Mutex<Option<RgbaImage>>,
    notify_tx: Sender<()>,
    notify_rx: Receiver<()>,
    closed: AtomicBool,
    frames_received: AtomicU64,
}

/// The input surface a producer (camera, decoder) writes frames into
///
/// Only the latest frame is kept. Cloning yields another handle to the same
/// surface.
#[derive(Clone)]
pub struct SourceSurface {
    inner: Arc<SourceInner>,
}

impl SourceSurface {
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = bounded(1);
        Self {
            inner: Arc::new(SourceInner {
                texture_id: TextureId(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed)),
                latest: Mutex::new(None),
                notify_tx,
                notify_rx,
                closed: AtomicBool::new(false),
                frames_received: AtomicU64::new(0),
            }),
        }
    }

    pub fn texture_id(&self) -> TextureId {
        self.inner.texture_id
    }

    /// Submit a new frame, replacing any frame not yet composited
    pub fn push_frame(&self, image: RgbaImage) -> CompositorResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(CompositorError::InvalidState("input surface is released".into()));
        }
        match self.inner.latest.lock() {
            Ok(mut slot) => *slot = Some(image),
            Err(_) => return Err(CompositorError::InvalidState("input surface is poisoned".into())),
        }
        self.inner.frames_received.fetch_add(1, Ordering::Relaxed);
        // A pending notification already covers this frame
        match self.inner.notify_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => {
                Err(CompositorError::InvalidState("input surface is released".into()))
            }
        }
    }

    pub fn frames_received(&self) -> u64 {
        self.inner.frames_received.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Take the latest frame, if a new one arrived since the last call
    pub(crate) fn take_frame(&self) -> Option<RgbaImage> {
        self.inner.latest.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Channel that carries one token per burst of new frames
    pub(crate) fn frame_available(&self) -> &Receiver<()> {
        &self.inner.notify_rx
    }

    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        if let Ok(mut slot) = self.inner.latest.lock() {
            slot.take();
        }
        while self.inner.notify_rx.try_recv().is_ok() {}
    }
}

impl Default for SourceSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SourceSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSurface")
            .field("texture_id", &self.inner.texture_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Set of encoder surfaces, each handle at most once
#[derive(Debug, Default)]
pub struct EncoderSurfaceSet {
    surfaces: Vec<RenderSurface>,
}

impl EncoderSurfaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a surface; returns false (and destroys nothing) if the handle is already present
    pub fn add(&mut self, surface: Box<dyn DrawableSurface>) -> bool {
        let handle = surface.handle();
        if self.contains(handle) {
            debug!(%handle, "Encoder surface already registered");
            return false;
        }
        info!(%handle, "Adding encoder surface");
        self.surfaces.push(RenderSurface::new(surface));
        true
    }

    pub fn contains(&self, handle: SurfaceHandle) -> bool {
        self.surfaces.iter().any(|s| s.handle() == handle)
    }

    /// Remove and destroy every surface
    pub fn clear(&mut self) -> usize {
        let count = self.surfaces.len();
        for surface in self.surfaces.drain(..) {
            surface.destroy();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn handles(&self) -> Vec<SurfaceHandle> {
        self.surfaces.iter().map(RenderSurface::handle).collect()
    }

    /// Present `frame` to every surface
    ///
    /// Surfaces that fail are removed, destroyed and reported; the rest of the
    /// set still gets the frame.
    pub fn present_all(&mut self, frame: &VideoFrame) -> Vec<CompositorError> {
        let mut failures = Vec::new();
        let mut index = 0;
        while index < self.surfaces.len() {
            match self.surfaces[index].present(frame) {
                Ok(()) => index += 1,
                Err(e) => {
                    let failed = self.surfaces.remove(index);
                    let handle = failed.handle();
                    warn!(%handle, error = %e, "Encoder surface failed, dropping it");
                    failed.destroy();
                    failures.push(CompositorError::SurfacePresentation {
                        handle,
                        reason: e.to_string(),
                    });
                }
            }
        }
        failures
    }
}

/// All render targets of one session
///
/// Owns the optional GPU context, the input surface, the encoder surfaces and
/// the preview surface.
#[derive(Debug)]
pub struct RenderSurfaceManager {
    gpu: Option<GpuContext>,
    source: SourceSurface,
    encoders: EncoderSurfaceSet,
    preview: Option<RenderSurface>,
    encoder_size: (u32, u32),
}

impl RenderSurfaceManager {
    pub fn new(gpu: Option<GpuContext>, encoder_size: (u32, u32)) -> Self {
        Self {
            gpu,
            source: SourceSurface::new(),
            encoders: EncoderSurfaceSet::new(),
            preview: None,
            encoder_size,
        }
    }

    pub fn gpu_mut(&mut self) -> Option<&mut GpuContext> {
        self.gpu.as_mut()
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }

    /// Install a GPU context acquired after a release
    pub fn set_gpu(&mut self, gpu: GpuContext) {
        self.gpu = Some(gpu);
    }

    pub fn source(&self) -> &SourceSurface {
        &self.source
    }

    /// Replace a released input surface with a fresh one
    pub fn reset_source(&mut self) -> SourceSurface {
        if self.source.is_closed() {
            self.source = SourceSurface::new();
            debug!(texture = ?self.source.texture_id(), "Input surface recreated");
        }
        self.source.clone()
    }

    pub fn encoder_size(&self) -> (u32, u32) {
        self.encoder_size
    }

    pub fn set_encoder_size(&mut self, width: u32, height: u32) {
        self.encoder_size = (width, height);
    }

    pub fn encoders(&self) -> &EncoderSurfaceSet {
        &self.encoders
    }

    pub fn encoders_mut(&mut self) -> &mut EncoderSurfaceSet {
        &mut self.encoders
    }

    /// Replace the preview surface; the previous one is destroyed
    pub fn set_preview(&mut self, surface: Option<Box<dyn DrawableSurface>>) {
        if let Some(previous) = self.preview.take() {
            previous.destroy();
        }
        if let Some(surface) = surface {
            info!(handle = %surface.handle(), "Preview surface attached");
            self.preview = Some(RenderSurface::new(surface));
        }
    }

    pub fn preview_handle(&self) -> Option<SurfaceHandle> {
        self.preview.as_ref().map(RenderSurface::handle)
    }

    /// Present to the preview surface, detaching it on failure
    pub fn present_preview(&mut self, frame: &VideoFrame) -> Option<CompositorError> {
        let surface = self.preview.as_mut()?;
        match surface.present(frame) {
            Ok(()) => None,
            Err(e) => {
                let handle = surface.handle();
                warn!(%handle, error = %e, "Preview surface failed, detaching it");
                self.set_preview(None);
                Some(CompositorError::SurfacePresentation {
                    handle,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Destroy every surface, close the input and drop the GPU context
    pub fn release(&mut self) {
        self.source.close();
        self.encoders.clear();
        self.set_preview(None);
        if self.gpu.take().is_some() {
            debug!("GPU context released");
        }
    }
}

impl Drop for RenderSurfaceManager {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::frame::black_image;

    /// Surface that records what it was asked to do
    pub(crate) struct StubSurface {
        pub handle: SurfaceHandle,
        pub fail: bool,
        pub presented: Arc<Mutex<Vec<u64>>>,
        pub destroyed: Arc<AtomicBool>,
    }

    impl StubSurface {
        pub(crate) fn boxed(id: u64, fail: bool) -> (Box<dyn DrawableSurface>, Arc<Mutex<Vec<u64>>>, Arc<AtomicBool>) {
            let presented = Arc::new(Mutex::new(Vec::new()));
            let destroyed = Arc::new(AtomicBool::new(false));
            let surface = Box::new(Self {
                handle: SurfaceHandle(id),
                fail,
                presented: Arc::clone(&presented),
                destroyed: Arc::clone(&destroyed),
            });
            (surface, presented, destroyed)
        }
    }

    impl DrawableSurface for StubSurface {
        fn handle(&self) -> SurfaceHandle {
            self.handle
        }

        fn bind(&mut self, _width: u32, _height: u32) -> Result<(), SurfaceError> {
            Ok(())
        }

        fn present(&mut self, frame: &VideoFrame) -> Result<(), SurfaceError> {
            if self.fail {
                return Err(SurfaceError::PresentFailed("consumer gone".into()));
            }
            self.presented.lock().unwrap().push(frame.sequence);
            Ok(())
        }

        fn destroy(&mut self) {
            self.destroyed.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_duplicate_handle_is_rejected() {
        let mut set = EncoderSurfaceSet::new();
        let (a, _, _) = StubSurface::boxed(1, false);
        let (b, _, _) = StubSurface::boxed(1, false);
        assert!(set.add(a));
        assert!(!set.add(b));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_failing_surface_is_dropped_others_continue() {
        let mut set = EncoderSurfaceSet::new();
        let (good, presented, _) = StubSurface::boxed(1, false);
        let (bad, _, destroyed) = StubSurface::boxed(2, true);
        set.add(bad);
        set.add(good);

        let failures = set.present_all(&VideoFrame::new(black_image(4, 4), 7));
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0],
            CompositorError::SurfacePresentation { handle: SurfaceHandle(2), .. }
        ));
        assert!(destroyed.load(Ordering::SeqCst));
        assert_eq!(set.handles(), vec![SurfaceHandle(1)]);
        assert_eq!(*presented.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_source_keeps_only_latest_frame() {
        let source = SourceSurface::new();
        source.push_frame(black_image(1, 1)).unwrap();
        source.push_frame(black_image(2, 2)).unwrap();

        assert_eq!(source.frames_received(), 2);
        assert!(source.frame_available().try_recv().is_ok());
        assert!(source.frame_available().try_recv().is_err(), "one token per burst");
        assert_eq!(source.take_frame().map(|f| f.dimensions()), Some((2, 2)));
        assert!(source.take_frame().is_none());
    }

    #[test]
    fn test_closed_source_rejects_frames() {
        let source = SourceSurface::new();
        source.close();
        assert!(matches!(
            source.push_frame(black_image(1, 1)),
            Err(CompositorError::InvalidState(_))
        ));
    }

    #[test]
    fn test_release_destroys_everything() {
        let mut manager = RenderSurfaceManager::new(None, (4, 4));
        let (enc, _, enc_destroyed) = StubSurface::boxed(1, false);
        let (preview, _, preview_destroyed) = StubSurface::boxed(2, false);
        manager.encoders_mut().add(enc);
        manager.set_preview(Some(preview));

        manager.release();
        assert!(enc_destroyed.load(Ordering::SeqCst));
        assert!(preview_destroyed.load(Ordering::SeqCst));
        assert!(manager.source().is_closed());
    }

    #[test]
    fn test_release_drops_gpu_context() {
        // Needs a GPU adapter, passes trivially without one
        let Ok(gpu) = GpuContext::new_blocking("surface_test_device") else {
            return;
        };
        let mut manager = RenderSurfaceManager::new(Some(gpu), (4, 4));
        assert!(manager.has_gpu());

        manager.release();
        assert!(!manager.has_gpu());
    }
}
