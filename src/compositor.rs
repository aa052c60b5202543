// SPDX-License-Identifier: GPL-3.0-only

//! Public facade of the compositing engine
//!
//! ```text
//!                 init            start
//!  Uninitialized ─────► Stopped ◄───────► Running
//!        ▲                 │       stop
//!        └──── release ────┘
//! ```
//!
//! While stopped the render state is parked here and mutations apply to it
//! directly. While running the render thread owns it and every mutation is
//! queued as a [`RenderCommand`]. Queries are answered from values mirrored
//! on this side, so they never wait for the render thread.

use crate::config::{CompositorConfig, RenderBackend};
use crate::constants::{encoder, timing::IDLE_POLL_INTERVAL};
use crate::errors::{CompositorError, CompositorResult, PhotoError};
use crate::filters::Filter;
use crate::gpu::GpuContext;
use crate::orientation::OrientationState;
use crate::overlay::{GifObject, ImageObject, OverlayGeometry, StreamObject, TextObject, TranslateTo};
use crate::photo::{self, PhotoCapture, TakePhotoCallback};
use crate::scheduler::{
    FrameScheduler, RenderCommand, RenderLoopController, RenderStats, RenderStatsSnapshot, SchedulerConfig,
};
use crate::surface::{DrawableSurface, RenderSurfaceManager, SourceSurface, TextureId};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use image::RgbaImage;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

const RENDER_THREAD_NAME: &str = "stream-compositor-render";

struct Session {
    controller: RenderLoopController<FrameScheduler>,
    commands: Sender<RenderCommand>,
    /// Kept to drain commands the render thread never saw
    leftovers: Receiver<RenderCommand>,
    source: SourceSurface,
}

enum Lifecycle {
    Uninitialized,
    Stopped(Box<FrameScheduler>),
    Running(Session),
}

impl Lifecycle {
    fn name(&self) -> &'static str {
        match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Stopped(_) => "stopped",
            Lifecycle::Running(_) => "running",
        }
    }
}

struct Inner {
    lifecycle: Lifecycle,
    backend: RenderBackend,
    encoder_size: Option<(u32, u32)>,
    config: SchedulerConfig,
    orientation: OrientationState,
    geometry: OverlayGeometry,
    overlay_active: bool,
    filter_count: usize,
}

/// GPU context for the configured backend; software rendering needs none
fn acquire_gpu(backend: RenderBackend) -> CompositorResult<Option<GpuContext>> {
    match backend {
        RenderBackend::Software => Ok(None),
        RenderBackend::Gpu => GpuContext::new_blocking("stream-compositor")
            .map(Some)
            .map_err(CompositorError::ResourceExhaustion),
    }
}

fn not_initialized() -> CompositorError {
    CompositorError::InvalidState("compositor is not initialized".into())
}

impl Inner {
    /// Route a command to the parked state or the render thread
    fn dispatch(&mut self, command: RenderCommand) -> CompositorResult<()> {
        match &mut self.lifecycle {
            Lifecycle::Uninitialized => Err(not_initialized()),
            Lifecycle::Stopped(scheduler) => {
                scheduler.apply(command);
                Ok(())
            }
            Lifecycle::Running(session) => session
                .commands
                .send(command)
                .map_err(|_| CompositorError::InvalidState("render loop is gone".into())),
        }
    }

    /// Like `dispatch`, for settings that are only mirrored before `init`
    fn sync(&mut self, command: RenderCommand) -> CompositorResult<()> {
        match self.lifecycle {
            Lifecycle::Uninitialized => Ok(()),
            _ => self.dispatch(command),
        }
    }

    fn sync_config(&mut self) -> CompositorResult<()> {
        let config = self.config;
        self.sync(RenderCommand::SetConfig(config))
    }

    fn sync_orientation(&mut self) -> CompositorResult<()> {
        let orientation = self.orientation;
        self.sync(RenderCommand::SetOrientation(orientation))
    }

    /// Apply a geometry change to the active overlay; no-op without one
    fn update_geometry(&mut self, change: impl FnOnce(&mut OverlayGeometry)) -> CompositorResult<()> {
        if !self.overlay_active {
            debug!("No active stream object, ignoring geometry change");
            return Ok(());
        }
        let mut geometry = self.geometry;
        change(&mut geometry);
        self.dispatch(RenderCommand::SetOverlayGeometry(geometry))?;
        self.geometry = geometry;
        Ok(())
    }
}

/// Real-time video compositor
///
/// All methods take `&self`; the compositor can be shared between the thread
/// that drives the lifecycle and the threads that tweak it.
pub struct Compositor {
    inner: Mutex<Inner>,
    stats: Arc<RenderStats>,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor {
    /// Software compositor with default settings and no encoder size
    pub fn new() -> Self {
        Self::with_backend(RenderBackend::Software)
    }

    pub fn with_backend(backend: RenderBackend) -> Self {
        Self {
            inner: Mutex::new(Inner {
                lifecycle: Lifecycle::Uninitialized,
                backend,
                encoder_size: None,
                config: SchedulerConfig::default(),
                orientation: OrientationState::new(),
                geometry: OverlayGeometry::default(),
                overlay_active: false,
                filter_count: 0,
            }),
            stats: Arc::new(RenderStats::default()),
        }
    }

    /// Compositor configured from a [`CompositorConfig`]
    pub fn with_config(config: &CompositorConfig) -> CompositorResult<Self> {
        config.validate()?;
        let compositor = Self::with_backend(config.backend);
        {
            let mut inner = compositor.lock();
            inner.encoder_size = Some((config.encoder_width, config.encoder_height));
            inner.config = config.scheduler();
            inner.orientation = config.orientation();
        }
        Ok(compositor)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ----- lifecycle -----

    /// Allocate the GPU context (GPU backend) and the render state
    ///
    /// After `stop` the render state is torn down and `init` re-acquires it,
    /// keeping filters, overlay and orientation. Calling it twice without a
    /// teardown in between is an error.
    pub fn init(&self) -> CompositorResult<()> {
        let mut inner = self.lock();
        match std::mem::replace(&mut inner.lifecycle, Lifecycle::Uninitialized) {
            Lifecycle::Uninitialized => {}
            Lifecycle::Stopped(mut scheduler) if scheduler.surfaces().source().is_closed() => {
                let backend = inner.backend;
                if !scheduler.surfaces().has_gpu() {
                    match acquire_gpu(backend) {
                        Ok(Some(gpu)) => scheduler.surfaces_mut().set_gpu(gpu),
                        Ok(None) => {}
                        Err(e) => {
                            inner.overlay_active = false;
                            inner.filter_count = 0;
                            return Err(e);
                        }
                    }
                }
                info!(?backend, "Compositor re-initialized after stop");
                inner.lifecycle = Lifecycle::Stopped(scheduler);
                return Ok(());
            }
            other => {
                let state = other.name();
                inner.lifecycle = other;
                return Err(CompositorError::InvalidState(format!("init called while {}", state)));
            }
        }

        let gpu = acquire_gpu(inner.backend)?;
        let size = inner
            .encoder_size
            .unwrap_or((encoder::DEFAULT_WIDTH, encoder::DEFAULT_HEIGHT));
        let mut scheduler = FrameScheduler::new(
            RenderSurfaceManager::new(gpu, size),
            inner.config,
            Arc::clone(&self.stats),
        );
        scheduler.apply(RenderCommand::SetOrientation(inner.orientation));

        info!(backend = ?inner.backend, "Compositor initialized");
        inner.lifecycle = Lifecycle::Stopped(Box::new(scheduler));
        Ok(())
    }

    /// Stop if needed and free every resource; `init` may be called again
    pub fn release(&self) {
        if let Err(e) = self.stop() {
            debug!(error = %e, "Nothing to stop during release");
        }
        let mut inner = self.lock();
        if let Lifecycle::Stopped(mut scheduler) = std::mem::replace(&mut inner.lifecycle, Lifecycle::Uninitialized) {
            scheduler.shutdown();
            info!("Compositor released");
        }
        inner.overlay_active = false;
        inner.filter_count = 0;
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self.lock().lifecycle, Lifecycle::Uninitialized)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lock().lifecycle, Lifecycle::Running(_))
    }

    /// Spawn the render thread
    pub fn start(&self) -> CompositorResult<()> {
        let mut inner = self.lock();
        let Some((width, height)) = inner.encoder_size else {
            return Err(CompositorError::InvalidState("encoder size not set".into()));
        };

        let mut scheduler = match std::mem::replace(&mut inner.lifecycle, Lifecycle::Uninitialized) {
            Lifecycle::Stopped(scheduler) => scheduler,
            other => {
                let state = other.name();
                inner.lifecycle = other;
                return Err(CompositorError::InvalidState(format!("start called while {}", state)));
            }
        };

        if !scheduler.surfaces().has_gpu() {
            match acquire_gpu(inner.backend) {
                Ok(Some(gpu)) => scheduler.surfaces_mut().set_gpu(gpu),
                Ok(None) => {}
                Err(e) => {
                    inner.lifecycle = Lifecycle::Stopped(scheduler);
                    return Err(e);
                }
            }
        }
        scheduler.surfaces_mut().set_encoder_size(width, height);
        let source = scheduler.prepare_start();
        let (commands, receiver) = unbounded();
        let leftovers = receiver.clone();

        match RenderLoopController::start(RENDER_THREAD_NAME, *scheduler, move |state: &mut FrameScheduler| {
            state.tick(&receiver)
        }) {
            Ok(controller) => {
                info!(width, height, "Compositor started");
                inner.lifecycle = Lifecycle::Running(Session {
                    controller,
                    commands,
                    leftovers,
                    source,
                });
                Ok(())
            }
            Err((e, scheduler)) => {
                inner.lifecycle = Lifecycle::Stopped(Box::new(scheduler));
                Err(CompositorError::ResourceExhaustion(format!("render thread: {}", e)))
            }
        }
    }

    /// Stop the render thread, destroy all surfaces and drop the GPU context
    ///
    /// Blocks until the thread has exited. Filters, overlay and orientation
    /// are kept for the next `init`/`start`; pending photos fail.
    pub fn stop(&self) -> CompositorResult<()> {
        let mut inner = self.lock();
        let mut session = match std::mem::replace(&mut inner.lifecycle, Lifecycle::Uninitialized) {
            Lifecycle::Running(session) => session,
            Lifecycle::Stopped(scheduler) => {
                inner.lifecycle = Lifecycle::Stopped(scheduler);
                return Ok(());
            }
            Lifecycle::Uninitialized => return Err(not_initialized()),
        };

        let returned = session.controller.stop();
        let Some(mut scheduler) = returned else {
            warn!("Render thread did not return its state, compositor needs init");
            let mut orphaned = PhotoCapture::new();
            for command in session.leftovers.try_iter() {
                if let RenderCommand::TakePhoto(callback) = command {
                    orphaned.request(callback);
                }
            }
            inner.overlay_active = false;
            inner.filter_count = 0;
            return Err(CompositorError::InvalidState("render thread panicked".into()));
        };

        for command in session.leftovers.try_iter() {
            scheduler.apply(command);
        }
        scheduler.shutdown();
        inner.lifecycle = Lifecycle::Stopped(Box::new(scheduler));
        info!(stats = ?self.stats.snapshot(), "Compositor stopped");
        Ok(())
    }

    // ----- surfaces -----

    /// Set the encoder output size; not allowed while running
    pub fn set_encoder_size(&self, width: u32, height: u32) -> CompositorResult<()> {
        if width == 0 || height == 0 {
            return Err(CompositorError::InvalidState(format!(
                "encoder size must be positive, got {}x{}",
                width, height
            )));
        }
        let mut inner = self.lock();
        if matches!(inner.lifecycle, Lifecycle::Running(_)) {
            return Err(CompositorError::InvalidState("encoder size cannot change while running".into()));
        }
        inner.encoder_size = Some((width, height));
        debug!(width, height, "Encoder size set");
        Ok(())
    }

    pub fn encoder_size(&self) -> Option<(u32, u32)> {
        self.lock().encoder_size
    }

    /// Input surface producers push frames into
    pub fn surface(&self) -> CompositorResult<SourceSurface> {
        match &self.lock().lifecycle {
            Lifecycle::Running(session) => Ok(session.source.clone()),
            other => Err(CompositorError::InvalidState(format!(
                "input surface unavailable while {}",
                other.name()
            ))),
        }
    }

    /// Texture id of the input surface
    pub fn surface_texture(&self) -> CompositorResult<TextureId> {
        self.surface().map(|source| source.texture_id())
    }

    /// Attach an encoder surface; a handle that is already attached is rejected
    pub fn add_media_codec_surface(&self, surface: Box<dyn DrawableSurface>) -> CompositorResult<()> {
        let handle = surface.handle();
        let mut inner = self.lock();
        let added = match &mut inner.lifecycle {
            Lifecycle::Uninitialized => return Err(not_initialized()),
            Lifecycle::Stopped(scheduler) => scheduler.surfaces_mut().encoders_mut().add(surface),
            Lifecycle::Running(session) => {
                let (reply_tx, reply_rx) = bounded(1);
                session
                    .commands
                    .send(RenderCommand::AddEncoderSurface {
                        surface,
                        reply: Some(reply_tx),
                    })
                    .map_err(|_| CompositorError::InvalidState("render loop is gone".into()))?;
                loop {
                    match reply_rx.recv_timeout(IDLE_POLL_INTERVAL) {
                        Ok(added) => break added,
                        Err(RecvTimeoutError::Timeout) if session.controller.is_running() => continue,
                        Err(_) => return Err(CompositorError::InvalidState("render loop is gone".into())),
                    }
                }
            }
        };
        if added {
            Ok(())
        } else {
            Err(CompositorError::InvalidState(format!("{} is already attached", handle)))
        }
    }

    /// Detach and destroy every encoder surface
    pub fn remove_media_codec_surface(&self) -> CompositorResult<()> {
        self.lock().dispatch(RenderCommand::RemoveEncoderSurfaces)
    }

    /// Attach (or with `None`, detach) the display surface fed by the preview path
    pub fn set_preview_surface(&self, surface: Option<Box<dyn DrawableSurface>>) -> CompositorResult<()> {
        self.lock().dispatch(RenderCommand::SetPreviewSurface(surface))
    }

    // ----- filters -----

    /// Place `filter` at `position`, returning the position it ends up at
    pub fn set_filter_at(&self, position: usize, filter: Box<dyn Filter>) -> CompositorResult<usize> {
        let mut inner = self.lock();
        inner.dispatch(RenderCommand::SetFilterAt { position, filter })?;
        if position < inner.filter_count {
            Ok(position)
        } else {
            inner.filter_count += 1;
            Ok(inner.filter_count - 1)
        }
    }

    pub fn set_filter(&self, filter: Box<dyn Filter>) -> CompositorResult<usize> {
        self.set_filter_at(0, filter)
    }

    /// Remove the filter at `position`; later filters shift down
    pub fn remove_filter(&self, position: usize) -> CompositorResult<bool> {
        let mut inner = self.lock();
        if position >= inner.filter_count {
            return Ok(false);
        }
        inner.dispatch(RenderCommand::RemoveFilter(position))?;
        inner.filter_count -= 1;
        Ok(true)
    }

    pub fn clear_filters(&self) -> CompositorResult<()> {
        let mut inner = self.lock();
        inner.dispatch(RenderCommand::ClearFilters)?;
        inner.filter_count = 0;
        Ok(())
    }

    pub fn filter_count(&self) -> usize {
        self.lock().filter_count
    }

    pub fn enable_aa(&self, enabled: bool) -> CompositorResult<()> {
        let mut inner = self.lock();
        inner.config.aa_enabled = enabled;
        inner.sync_config()
    }

    pub fn is_aa_enabled(&self) -> bool {
        self.lock().config.aa_enabled
    }

    // ----- overlay -----

    /// Make `object` the single active overlay, releasing the previous one
    pub fn set_stream_object(&self, object: StreamObject) -> CompositorResult<()> {
        let mut inner = self.lock();
        inner.dispatch(RenderCommand::SetStreamObject(object))?;
        inner.overlay_active = true;
        inner.geometry = OverlayGeometry::default();
        Ok(())
    }

    pub fn set_gif(&self, gif: GifObject) -> CompositorResult<()> {
        self.set_stream_object(gif.into())
    }

    pub fn set_image(&self, image: ImageObject) -> CompositorResult<()> {
        self.set_stream_object(image.into())
    }

    pub fn set_text(&self, text: TextObject) -> CompositorResult<()> {
        self.set_stream_object(text.into())
    }

    pub fn clear_stream_object(&self) -> CompositorResult<()> {
        let mut inner = self.lock();
        inner.dispatch(RenderCommand::ClearStreamObject)?;
        inner.overlay_active = false;
        Ok(())
    }

    pub fn has_stream_object(&self) -> bool {
        self.lock().overlay_active
    }

    pub fn set_stream_object_alpha(&self, alpha: f32) -> CompositorResult<()> {
        self.lock().update_geometry(|g| g.set_alpha(alpha))
    }

    pub fn set_stream_object_size(&self, sx: f32, sy: f32) -> CompositorResult<()> {
        self.lock().update_geometry(|g| g.set_scale(sx, sy))
    }

    pub fn set_stream_object_position(&self, x: f32, y: f32) -> CompositorResult<()> {
        self.lock().update_geometry(|g| g.set_position(x, y))
    }

    pub fn set_stream_object_position_to(&self, to: TranslateTo) -> CompositorResult<()> {
        self.lock().update_geometry(|g| g.translate_to(to))
    }

    /// Last-set overlay size in percent of the frame
    pub fn scale(&self) -> (f32, f32) {
        self.lock().geometry.scale
    }

    /// Last-set overlay position in percent of the frame
    pub fn position(&self) -> (f32, f32) {
        self.lock().geometry.position
    }

    // ----- orientation -----

    fn update_orientation(&self, change: impl FnOnce(&mut OrientationState)) -> CompositorResult<()> {
        let mut inner = self.lock();
        change(&mut inner.orientation);
        inner.sync_orientation()
    }

    /// Rotate both the stream and the preview path
    pub fn set_rotation(&self, degrees: i32) -> CompositorResult<()> {
        self.update_orientation(|o| o.set_rotation(degrees))
    }

    pub fn set_stream_rotation(&self, degrees: i32) -> CompositorResult<()> {
        self.update_orientation(|o| o.set_stream_rotation(degrees))
    }

    pub fn set_preview_rotation(&self, degrees: i32) -> CompositorResult<()> {
        self.update_orientation(|o| o.set_preview_rotation(degrees))
    }

    pub fn set_stream_horizontal_flip(&self, flip: bool) -> CompositorResult<()> {
        self.update_orientation(|o| o.set_stream_horizontal_flip(flip))
    }

    pub fn set_stream_vertical_flip(&self, flip: bool) -> CompositorResult<()> {
        self.update_orientation(|o| o.set_stream_vertical_flip(flip))
    }

    pub fn set_preview_horizontal_flip(&self, flip: bool) -> CompositorResult<()> {
        self.update_orientation(|o| o.set_preview_horizontal_flip(flip))
    }

    pub fn set_preview_vertical_flip(&self, flip: bool) -> CompositorResult<()> {
        self.update_orientation(|o| o.set_preview_vertical_flip(flip))
    }

    pub fn set_camera_face(&self, front_camera: bool) -> CompositorResult<()> {
        self.update_orientation(|o| o.set_camera_face(front_camera))
    }

    pub fn is_front_camera(&self) -> bool {
        self.lock().orientation.is_front_camera()
    }

    pub fn orientation(&self) -> OrientationState {
        self.lock().orientation
    }

    // ----- pacing and mute -----

    pub fn set_fps(&self, fps: u32) -> CompositorResult<()> {
        if fps == 0 {
            return Err(CompositorError::InvalidState("fps must be positive".into()));
        }
        let mut inner = self.lock();
        inner.config.fps = fps;
        inner.sync_config()
    }

    /// Maximum wait for a source frame before the last one is re-rendered (0 = wait forever)
    pub fn set_wait_time(&self, wait_time_ms: u64) -> CompositorResult<()> {
        let mut inner = self.lock();
        inner.config.wait_time_ms = wait_time_ms;
        inner.sync_config()
    }

    pub fn set_force_render(&self, force_render: bool) -> CompositorResult<()> {
        let mut inner = self.lock();
        inner.config.force_render = force_render;
        inner.sync_config()
    }

    pub fn mute_video(&self) -> CompositorResult<()> {
        let mut inner = self.lock();
        inner.config.muted = true;
        inner.sync_config()
    }

    pub fn un_mute_video(&self) -> CompositorResult<()> {
        let mut inner = self.lock();
        inner.config.muted = false;
        inner.sync_config()
    }

    pub fn is_video_muted(&self) -> bool {
        self.lock().config.muted
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        self.lock().config
    }

    // ----- photos -----

    /// Deliver the next composited stream frame to `callback`
    ///
    /// Fails immediately with `CaptureUnavailable` unless running.
    pub fn take_photo(&self, callback: TakePhotoCallback) {
        let rejected = {
            let inner = self.lock();
            match &inner.lifecycle {
                Lifecycle::Running(session) => match session.commands.send(RenderCommand::TakePhoto(callback)) {
                    Ok(()) => None,
                    Err(e) => match e.into_inner() {
                        RenderCommand::TakePhoto(callback) => Some(callback),
                        _ => None,
                    },
                },
                _ => Some(callback),
            }
        };
        if let Some(callback) = rejected {
            debug!("Photo requested while not running");
            photo::reject(callback);
        }
    }

    /// Future resolving to the next composited stream frame
    pub fn take_photo_async(&self) -> impl Future<Output = Result<RgbaImage, PhotoError>> + Send + 'static {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.take_photo(Box::new(move |result| {
            let _ = tx.send(result);
        }));
        async move { rx.await.unwrap_or(Err(PhotoError::CaptureUnavailable)) }
    }

    pub fn stats(&self) -> RenderStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Compositor")
            .field("state", &inner.lifecycle.name())
            .field("backend", &inner.backend)
            .field("encoder_size", &inner.encoder_size)
            .field("config", &inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::tests::TagFilter;
    use crate::surface::tests::StubSurface;

    fn started() -> Compositor {
        let compositor = Compositor::new();
        compositor.init().unwrap();
        compositor.set_encoder_size(16, 8).unwrap();
        compositor.start().unwrap();
        compositor
    }

    #[test]
    fn test_init_twice_is_invalid() {
        let compositor = Compositor::new();
        compositor.init().unwrap();
        assert!(matches!(compositor.init(), Err(CompositorError::InvalidState(_))));
        compositor.release();
        compositor.init().unwrap();
    }

    #[test]
    fn test_init_after_stop_reinitializes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let released = Arc::new(Mutex::new(Vec::new()));
        let compositor = started();
        compositor.set_filter(TagFilter::boxed(1, &log, &released)).unwrap();
        compositor.stop().unwrap();

        compositor.init().unwrap();
        assert!(matches!(compositor.init(), Err(CompositorError::InvalidState(_))));
        assert_eq!(compositor.filter_count(), 1);
        compositor.start().unwrap();
        assert!(compositor.surface().is_ok());
        compositor.stop().unwrap();
    }

    fn parked_has_gpu(compositor: &Compositor) -> Option<bool> {
        match &compositor.lock().lifecycle {
            Lifecycle::Stopped(scheduler) => Some(scheduler.surfaces().has_gpu()),
            _ => None,
        }
    }

    #[test]
    fn test_stop_drops_gpu_context_and_start_reacquires_it() {
        // Needs a GPU adapter, passes trivially without one
        let compositor = Compositor::with_backend(RenderBackend::Gpu);
        if compositor.init().is_err() {
            return;
        }
        assert_eq!(parked_has_gpu(&compositor), Some(true));
        compositor.set_encoder_size(16, 8).unwrap();
        compositor.start().unwrap();
        compositor.stop().unwrap();
        assert_eq!(parked_has_gpu(&compositor), Some(false));

        compositor.start().unwrap();
        compositor.stop().unwrap();
        compositor.init().unwrap();
        assert_eq!(parked_has_gpu(&compositor), Some(true));
    }

    #[test]
    fn test_start_requires_init_and_encoder_size() {
        let compositor = Compositor::new();
        compositor.set_encoder_size(4, 4).unwrap();
        assert!(matches!(compositor.start(), Err(CompositorError::InvalidState(_))));

        let compositor = Compositor::new();
        compositor.init().unwrap();
        assert!(matches!(compositor.start(), Err(CompositorError::InvalidState(_))));
    }

    #[test]
    fn test_surface_before_start_is_invalid() {
        let compositor = Compositor::new();
        compositor.init().unwrap();
        assert!(matches!(compositor.surface(), Err(CompositorError::InvalidState(_))));
        assert!(matches!(compositor.surface_texture(), Err(CompositorError::InvalidState(_))));
    }

    #[test]
    fn test_start_twice_and_encoder_size_while_running() {
        let compositor = started();
        assert!(matches!(compositor.start(), Err(CompositorError::InvalidState(_))));
        assert!(matches!(
            compositor.set_encoder_size(32, 32),
            Err(CompositorError::InvalidState(_))
        ));
        assert!(compositor.surface().is_ok());
        compositor.stop().unwrap();
        assert!(!compositor.is_running());
    }

    #[test]
    fn test_zero_sizes_and_fps_rejected() {
        let compositor = Compositor::new();
        assert!(compositor.set_encoder_size(0, 10).is_err());
        assert!(compositor.set_fps(0).is_err());
        assert_eq!(compositor.scheduler_config().fps, crate::constants::timing::DEFAULT_FPS);
    }

    #[test]
    fn test_duplicate_encoder_surface_rejected_while_running() {
        let compositor = started();
        let (a, _, _) = StubSurface::boxed(3, false);
        let (b, _, _) = StubSurface::boxed(3, false);
        compositor.add_media_codec_surface(a).unwrap();
        assert!(matches!(
            compositor.add_media_codec_surface(b),
            Err(CompositorError::InvalidState(_))
        ));
    }

    #[test]
    fn test_filter_count_mirrors_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let released = Arc::new(Mutex::new(Vec::new()));
        let compositor = Compositor::new();
        assert!(compositor.set_filter(TagFilter::boxed(1, &log, &released)).is_err());

        compositor.init().unwrap();
        assert_eq!(compositor.set_filter_at(7, TagFilter::boxed(1, &log, &released)).unwrap(), 0);
        assert_eq!(compositor.set_filter_at(7, TagFilter::boxed(2, &log, &released)).unwrap(), 1);
        assert_eq!(compositor.set_filter_at(0, TagFilter::boxed(3, &log, &released)).unwrap(), 0);
        assert_eq!(compositor.filter_count(), 2);
        assert!(compositor.remove_filter(0).unwrap());
        assert!(!compositor.remove_filter(4).unwrap());
        assert_eq!(compositor.filter_count(), 1);
    }

    #[test]
    fn test_overlay_mutations_without_object_are_noops() {
        let compositor = Compositor::new();
        compositor.init().unwrap();
        compositor.set_stream_object_size(50.0, 50.0).unwrap();
        assert_eq!(compositor.scale(), OverlayGeometry::default().scale);

        compositor
            .set_image(ImageObject::new(RgbaImage::new(2, 2)))
            .unwrap();
        compositor.set_stream_object_size(20.0, 40.0).unwrap();
        compositor.set_stream_object_position_to(TranslateTo::Center).unwrap();
        assert_eq!(compositor.scale(), (20.0, 40.0));
        assert_eq!(compositor.position(), (40.0, 30.0));
    }

    #[test]
    fn test_photo_when_stopped_is_unavailable() {
        let compositor = Compositor::new();
        compositor.init().unwrap();
        let result = pollster::block_on(compositor.take_photo_async());
        assert_eq!(result, Err(PhotoError::CaptureUnavailable));
    }

    #[test]
    fn test_settings_before_init_are_kept() {
        let compositor = Compositor::new();
        compositor.set_rotation(90).unwrap();
        compositor.mute_video().unwrap();
        compositor.enable_aa(true).unwrap();
        compositor.init().unwrap();
        assert!(compositor.is_video_muted());
        assert!(compositor.is_aa_enabled());
        assert_eq!(compositor.orientation().stream().rotation.degrees(), 90);
    }
}
