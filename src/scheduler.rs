// SPDX-License-Identifier: GPL-3.0-only

//! Render loop: frame pacing, command draining and the per-frame pipeline
//!
//! ```text
//!            ┌──────────────── tick ─────────────────┐
//! commands ─►│ drain ─► due? ─► composite ─► present │─► encoders / preview / photos
//! source ───►│        └─ wait(frame | command | timeout)
//!            └───────────────────────────────────────┘
//! ```
//!
//! Every mutation reaches the render state as a [`RenderCommand`] drained
//! between frames, so a frame never observes a half-applied change.

use crate::constants::timing::{self, FRAME_LOG_INTERVAL, IDLE_POLL_INTERVAL};
use crate::filters::{AntiAliasPass, Filter, FilterChain, FilterContext};
use crate::frame::{VideoFrame, black_image, fit_to};
use crate::orientation::OrientationState;
use crate::overlay::{OverlayCompositor, OverlayGeometry, StreamObject};
use crate::photo::{PhotoCapture, TakePhotoCallback};
use crate::surface::{DrawableSurface, RenderSurfaceManager, SourceSurface};
use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, select};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runtime-mutable pacing and output switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Target frame rate, always positive
    pub fps: u32,
    /// Re-render the last source frame after this long without input (0 = never)
    pub wait_time_ms: u64,
    /// Produce a frame every 1/fps even without input
    pub force_render: bool,
    /// Replace output with black frames
    pub muted: bool,
    /// Run the anti-aliasing pass
    pub aa_enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fps: timing::DEFAULT_FPS,
            wait_time_ms: timing::DEFAULT_WAIT_TIME_MS,
            force_render: false,
            muted: false,
            aa_enabled: false,
        }
    }
}

impl SchedulerConfig {
    pub fn wait_time(&self) -> Option<Duration> {
        (self.wait_time_ms > 0).then(|| Duration::from_millis(self.wait_time_ms))
    }
}

/// Caps production at the target frame rate
#[derive(Debug, Clone)]
pub struct FpsLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl FpsLimiter {
    pub fn new(fps: u32) -> Self {
        Self {
            interval: timing::frame_interval(fps),
            last: None,
        }
    }

    pub fn set_fps(&mut self, fps: u32) {
        self.interval = timing::frame_interval(fps);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a full frame period has passed since the last frame
    pub fn ready(&self, now: Instant) -> bool {
        self.remaining(now).is_zero()
    }

    /// Time left until the next frame may be produced
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self.interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Counters shared between the render thread and the facade
#[derive(Debug, Default)]
pub struct RenderStats {
    frames_rendered: AtomicU64,
    frames_reemitted: AtomicU64,
    muted_frames: AtomicU64,
    surfaces_dropped: AtomicU64,
    photos_delivered: AtomicU64,
}

/// Point-in-time copy of [`RenderStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStatsSnapshot {
    pub frames_rendered: u64,
    pub frames_reemitted: u64,
    pub muted_frames: u64,
    pub surfaces_dropped: u64,
    pub photos_delivered: u64,
}

impl RenderStats {
    pub fn snapshot(&self) -> RenderStatsSnapshot {
        RenderStatsSnapshot {
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            frames_reemitted: self.frames_reemitted.load(Ordering::Relaxed),
            muted_frames: self.muted_frames.load(Ordering::Relaxed),
            surfaces_dropped: self.surfaces_dropped.load(Ordering::Relaxed),
            photos_delivered: self.photos_delivered.load(Ordering::Relaxed),
        }
    }
}

/// A mutation of the render state
pub enum RenderCommand {
    SetFilterAt { position: usize, filter: Box<dyn Filter> },
    RemoveFilter(usize),
    ClearFilters,
    SetStreamObject(StreamObject),
    ClearStreamObject,
    SetOverlayGeometry(OverlayGeometry),
    SetOrientation(OrientationState),
    SetConfig(SchedulerConfig),
    /// Reply is `false` when the handle is already attached
    AddEncoderSurface {
        surface: Box<dyn DrawableSurface>,
        reply: Option<Sender<bool>>,
    },
    RemoveEncoderSurfaces,
    SetPreviewSurface(Option<Box<dyn DrawableSurface>>),
    TakePhoto(TakePhotoCallback),
}

impl RenderCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RenderCommand::SetFilterAt { .. } => "set_filter_at",
            RenderCommand::RemoveFilter(_) => "remove_filter",
            RenderCommand::ClearFilters => "clear_filters",
            RenderCommand::SetStreamObject(_) => "set_stream_object",
            RenderCommand::ClearStreamObject => "clear_stream_object",
            RenderCommand::SetOverlayGeometry(_) => "set_overlay_geometry",
            RenderCommand::SetOrientation(_) => "set_orientation",
            RenderCommand::SetConfig(_) => "set_config",
            RenderCommand::AddEncoderSurface { .. } => "add_encoder_surface",
            RenderCommand::RemoveEncoderSurfaces => "remove_encoder_surfaces",
            RenderCommand::SetPreviewSurface(_) => "set_preview_surface",
            RenderCommand::TakePhoto(_) => "take_photo",
        }
    }
}

impl std::fmt::Debug for RenderCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Action returned by the loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// The render state owned by the render thread while running
///
/// Parked inside the compositor while stopped, so filters, overlay and
/// orientation survive a stop/start cycle.
#[derive(Debug)]
pub struct FrameScheduler {
    config: SchedulerConfig,
    surfaces: RenderSurfaceManager,
    filters: FilterChain,
    anti_alias: AntiAliasPass,
    overlay: OverlayCompositor,
    orientation: OrientationState,
    photos: PhotoCapture,
    limiter: FpsLimiter,
    last_source: Option<RgbaImage>,
    pending_source: bool,
    last_render: Option<Instant>,
    sequence: u64,
    stats: Arc<RenderStats>,
}

impl FrameScheduler {
    pub fn new(surfaces: RenderSurfaceManager, config: SchedulerConfig, stats: Arc<RenderStats>) -> Self {
        Self {
            limiter: FpsLimiter::new(config.fps),
            config,
            surfaces,
            filters: FilterChain::new(),
            anti_alias: AntiAliasPass::new(),
            overlay: OverlayCompositor::new(),
            orientation: OrientationState::new(),
            photos: PhotoCapture::new(),
            last_source: None,
            pending_source: false,
            last_render: None,
            sequence: 0,
            stats,
        }
    }

    pub fn surfaces(&self) -> &RenderSurfaceManager {
        &self.surfaces
    }

    pub fn surfaces_mut(&mut self) -> &mut RenderSurfaceManager {
        &mut self.surfaces
    }

    /// Apply one mutation
    pub fn apply(&mut self, command: RenderCommand) {
        debug!(command = command.name(), "Applying render command");
        match command {
            RenderCommand::SetFilterAt { position, filter } => {
                self.filters.set_filter_at(position, filter);
            }
            RenderCommand::RemoveFilter(position) => {
                self.filters.remove_filter(position);
            }
            RenderCommand::ClearFilters => self.filters.clear(),
            RenderCommand::SetStreamObject(object) => self.overlay.set_stream_object(object),
            RenderCommand::ClearStreamObject => self.overlay.clear(),
            RenderCommand::SetOverlayGeometry(geometry) => {
                self.overlay.set_geometry(geometry);
            }
            RenderCommand::SetOrientation(orientation) => self.orientation = orientation,
            RenderCommand::SetConfig(config) => {
                if config.fps != self.config.fps {
                    self.limiter.set_fps(config.fps);
                }
                if config.muted != self.config.muted {
                    info!(muted = config.muted, "Video mute changed");
                }
                self.config = config;
            }
            RenderCommand::AddEncoderSurface { surface, reply } => {
                let added = self.surfaces.encoders_mut().add(surface);
                if let Some(reply) = reply {
                    let _ = reply.send(added);
                }
            }
            RenderCommand::RemoveEncoderSurfaces => {
                self.surfaces.encoders_mut().clear();
            }
            RenderCommand::SetPreviewSurface(surface) => self.surfaces.set_preview(surface),
            RenderCommand::TakePhoto(callback) => self.photos.request(callback),
        }
    }

    /// Reset pacing and hand out a live input surface for a new session
    pub fn prepare_start(&mut self) -> SourceSurface {
        self.limiter.reset();
        self.last_source = None;
        self.pending_source = false;
        self.last_render = None;
        self.surfaces.reset_source()
    }

    /// Fail pending photos and destroy every surface
    pub fn shutdown(&mut self) {
        self.photos.fail_all();
        self.surfaces.release();
        self.last_source = None;
        self.pending_source = false;
    }

    /// Pick up the latest source frame, if any
    pub fn poll_source(&mut self) -> bool {
        match self.surfaces.source().take_frame() {
            Some(image) => {
                self.last_source = Some(image);
                self.pending_source = true;
                true
            }
            None => false,
        }
    }

    /// Whether a frame should be produced now; `Some(true)` marks a re-emission
    pub fn due(&self, now: Instant) -> Option<bool> {
        if !self.limiter.ready(now) {
            return None;
        }
        if self.pending_source {
            return Some(false);
        }
        if self.config.force_render {
            return Some(true);
        }
        let wait = self.config.wait_time()?;
        self.last_source.as_ref()?;
        match self.last_render {
            Some(last) if now.saturating_duration_since(last) < wait => None,
            _ => Some(true),
        }
    }

    /// How long the loop may block before re-checking `due`
    pub fn next_timeout(&self, now: Instant) -> Duration {
        let until = if self.pending_source || self.config.force_render {
            Some(self.limiter.remaining(now))
        } else {
            match (self.config.wait_time(), self.last_render, &self.last_source) {
                (Some(wait), Some(last), Some(_)) => Some(
                    wait.saturating_sub(now.saturating_duration_since(last))
                        .max(self.limiter.remaining(now)),
                ),
                _ => None,
            }
        };
        until.map_or(IDLE_POLL_INTERVAL, |d| d.min(IDLE_POLL_INTERVAL))
    }

    /// Composite one frame and present it everywhere
    ///
    /// Returns the stream-path frame.
    pub fn render(&mut self, reemitted: bool, now: Instant) -> VideoFrame {
        let (width, height) = self.surfaces.encoder_size();
        let muted = self.config.muted;
        let sequence = self.sequence;
        self.sequence += 1;

        let composed = if muted {
            black_image(width, height)
        } else {
            let mut frame = match &self.last_source {
                Some(source) => fit_to(source.clone(), width, height),
                None => black_image(width, height),
            };
            let mut ctx = FilterContext::new(self.surfaces.gpu_mut(), sequence);
            self.filters.apply(&mut frame, &mut ctx);
            self.overlay.blend(&mut frame, now);
            if self.config.aa_enabled {
                if let Err(e) = self.anti_alias.apply(&mut frame, &mut ctx) {
                    warn!(error = %e, "Anti-aliasing failed, frame left unsmoothed");
                }
            }
            frame
        };

        let mut stream = VideoFrame::new(self.orientation.stream().apply(&composed, width, height), sequence);
        stream.muted = muted;
        stream.reemitted = reemitted;

        let mut dropped = self.surfaces.encoders_mut().present_all(&stream).len() as u64;

        if self.surfaces.preview_handle().is_some() {
            let transform = self.orientation.preview();
            let (pw, ph) = if transform.rotation.swaps_dimensions() {
                (height, width)
            } else {
                (width, height)
            };
            let mut preview = VideoFrame::new(transform.apply(&composed, pw, ph), sequence);
            preview.muted = muted;
            preview.reemitted = reemitted;
            if self.surfaces.present_preview(&preview).is_some() {
                dropped += 1;
            }
        }

        let delivered = self.photos.fulfil(&stream.image) as u64;

        self.limiter.mark(now);
        self.last_render = Some(now);
        self.pending_source = false;

        let stats = &self.stats;
        let rendered = stats.frames_rendered.fetch_add(1, Ordering::Relaxed) + 1;
        if reemitted {
            stats.frames_reemitted.fetch_add(1, Ordering::Relaxed);
        }
        if muted {
            stats.muted_frames.fetch_add(1, Ordering::Relaxed);
        }
        stats.surfaces_dropped.fetch_add(dropped, Ordering::Relaxed);
        stats.photos_delivered.fetch_add(delivered, Ordering::Relaxed);

        if rendered % FRAME_LOG_INTERVAL == 0 {
            debug!(
                rendered,
                encoders = self.surfaces.encoders().len(),
                filters = self.filters.len(),
                muted,
                "Render loop progress"
            );
        }

        stream
    }

    /// One iteration of the render loop
    pub fn tick(&mut self, commands: &Receiver<RenderCommand>) -> LoopAction {
        loop {
            match commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Command channel closed, stopping render loop");
                    return LoopAction::Stop;
                }
            }
        }

        let now = Instant::now();
        if let Some(reemitted) = self.due(now) {
            self.render(reemitted, now);
            return LoopAction::Continue;
        }

        let timeout = self.next_timeout(now);
        let frames = self.surfaces.source().frame_available().clone();
        select! {
            recv(frames) -> _ => {
                self.poll_source();
            }
            recv(commands) -> command => match command {
                Ok(command) => self.apply(command),
                Err(_) => return LoopAction::Stop,
            },
            default(timeout) => {}
        }
        LoopAction::Continue
    }
}

/// Controller for the render thread
///
/// The thread owns the loop state and hands it back when it exits, so the
/// caller can park it and resume later.
pub struct RenderLoopController<S: Send + 'static> {
    thread_handle: Option<JoinHandle<Option<S>>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl<S: Send + 'static> RenderLoopController<S> {
    /// Start `loop_fn` on a new thread, called repeatedly with `state`
    ///
    /// The loop ends when `loop_fn` returns [`LoopAction::Stop`] or the stop
    /// signal is raised. If the thread cannot be spawned the state is handed
    /// back with the error.
    pub fn start<F>(name: &str, state: S, mut loop_fn: F) -> Result<Self, (std::io::Error, S)>
    where
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();
        let (state_tx, state_rx) = bounded::<S>(1);

        info!(name = %name, "Starting render loop");

        let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
            let Ok(mut state) = state_rx.recv() else {
                return None;
            };
            debug!(name = %name_clone, "Render loop thread started");

            loop {
                if stop_signal_clone.load(Ordering::SeqCst) {
                    debug!(name = %name_clone, "Stop signal received");
                    break;
                }

                match loop_fn(&mut state) {
                    LoopAction::Continue => {}
                    LoopAction::Stop => {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }
                }
            }

            info!(name = %name_clone, "Render loop thread exiting");
            Some(state)
        });

        let thread_handle = match spawned {
            Ok(handle) => handle,
            Err(e) => return Err((e, state)),
        };
        if let Err(e) = state_tx.send(state) {
            // Receiver only disappears if the thread died before its first line
            let _ = thread_handle.join();
            return Err((std::io::Error::other("render thread exited early"), e.into_inner()));
        }

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting render loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread, returning its state
    pub fn stop(&mut self) -> Option<S> {
        self.request_stop();
        self.join()
    }

    /// Wait for the thread to finish without sending the stop signal
    ///
    /// Returns `None` if the thread panicked or was already joined.
    pub fn join(&mut self) -> Option<S> {
        let handle = self.thread_handle.take()?;
        debug!(name = %self.name, "Waiting for render loop thread to finish");
        match handle.join() {
            Ok(state) => state,
            Err(e) => {
                warn!(name = %self.name, "Render loop thread panicked: {:?}", e);
                None
            }
        }
    }
}

impl<S: Send + 'static> Drop for RenderLoopController<S> {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "RenderLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::tests::TagFilter;
    use crate::frame::BLACK;
    use crate::surface::tests::StubSurface;
    use image::Rgba;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn scheduler(config: SchedulerConfig) -> FrameScheduler {
        FrameScheduler::new(
            RenderSurfaceManager::new(None, (8, 6)),
            config,
            Arc::new(RenderStats::default()),
        )
    }

    #[test]
    fn test_fps_limiter() {
        let mut limiter = FpsLimiter::new(10);
        let interval = limiter.interval();
        let t0 = Instant::now();
        assert!(limiter.ready(t0));
        limiter.mark(t0);
        assert!(!limiter.ready(t0 + Duration::from_millis(50)));
        assert_eq!(limiter.remaining(t0 + Duration::from_millis(40)), interval - Duration::from_millis(40));
        assert!(limiter.ready(t0 + interval));
    }

    #[test]
    fn test_idle_source_produces_nothing_without_wait_or_force() {
        let s = scheduler(SchedulerConfig::default());
        assert_eq!(s.due(Instant::now()), None);
        assert_eq!(s.next_timeout(Instant::now()), IDLE_POLL_INTERVAL);
    }

    #[test]
    fn test_new_source_frame_is_due() {
        let mut s = scheduler(SchedulerConfig::default());
        s.surfaces().source().push_frame(RgbaImage::new(4, 4)).unwrap();
        assert!(s.poll_source());
        assert_eq!(s.due(Instant::now()), Some(false));
    }

    #[test]
    fn test_wait_time_reemits_last_source() {
        let mut s = scheduler(SchedulerConfig {
            wait_time_ms: 200,
            ..Default::default()
        });
        s.surfaces().source().push_frame(RgbaImage::new(4, 4)).unwrap();
        s.poll_source();
        let t0 = Instant::now();
        let frame = s.render(false, t0);
        assert!(!frame.reemitted);

        assert_eq!(s.due(t0 + Duration::from_millis(100)), None);
        assert_eq!(s.due(t0 + Duration::from_millis(200)), Some(true));
    }

    #[test]
    fn test_force_render_is_due_every_interval() {
        let mut s = scheduler(SchedulerConfig {
            fps: 20,
            force_render: true,
            ..Default::default()
        });
        let t0 = Instant::now();
        assert_eq!(s.due(t0), Some(true));
        s.render(true, t0);
        assert_eq!(s.due(t0 + Duration::from_millis(10)), None);
        assert_eq!(s.due(t0 + Duration::from_millis(60)), Some(true));
    }

    #[test]
    fn test_muted_frame_is_black_and_skips_filters() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let released = Arc::new(Mutex::new(Vec::new()));
        let mut s = scheduler(SchedulerConfig {
            muted: true,
            ..Default::default()
        });
        s.apply(RenderCommand::SetFilterAt {
            position: 0,
            filter: TagFilter::boxed(1, &log, &released),
        });
        s.surfaces()
            .source()
            .push_frame(RgbaImage::from_pixel(4, 4, Rgba([200, 10, 10, 255])))
            .unwrap();
        s.poll_source();

        let frame = s.render(false, Instant::now());
        assert!(frame.muted);
        assert_eq!((frame.width(), frame.height()), (8, 6));
        assert!(frame.is_uniform(BLACK));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_render_presents_to_encoders_and_preview() {
        let mut s = scheduler(SchedulerConfig::default());
        let (encoder, encoded, _) = StubSurface::boxed(1, false);
        let (preview, previewed, _) = StubSurface::boxed(2, false);
        let (reply_tx, reply_rx) = bounded(1);
        s.apply(RenderCommand::AddEncoderSurface {
            surface: encoder,
            reply: Some(reply_tx),
        });
        assert!(reply_rx.recv().unwrap());
        s.apply(RenderCommand::SetPreviewSurface(Some(preview)));

        s.render(false, Instant::now());
        s.render(true, Instant::now());
        assert_eq!(*encoded.lock().unwrap(), vec![0, 1]);
        assert_eq!(*previewed.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_tick_drains_commands_before_rendering() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let released = Arc::new(Mutex::new(Vec::new()));
        let mut s = scheduler(SchedulerConfig::default());
        let (tx, rx) = crossbeam_channel::unbounded();

        s.surfaces().source().push_frame(RgbaImage::new(4, 4)).unwrap();
        s.poll_source();
        tx.send(RenderCommand::SetFilterAt {
            position: 0,
            filter: TagFilter::boxed(5, &log, &released),
        })
        .unwrap();

        assert_eq!(s.tick(&rx), LoopAction::Continue);
        assert_eq!(*log.lock().unwrap(), vec![5]);

        drop(tx);
        assert_eq!(s.tick(&rx), LoopAction::Stop);
    }

    #[test]
    fn test_loop_controller_returns_state() {
        let mut controller = RenderLoopController::start("test-loop", 0usize, |count| {
            *count += 1;
            if *count >= 5 { LoopAction::Stop } else { LoopAction::Continue }
        })
        .map_err(|(e, _)| e)
        .unwrap();

        assert_eq!(controller.join(), Some(5));
        assert!(!controller.is_running());
    }

    #[test]
    fn test_loop_controller_stop_signal() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&iterations);
        let mut controller = RenderLoopController::start("test-stop", (), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
            LoopAction::Continue
        })
        .map_err(|(e, _)| e)
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(controller.is_running());
        assert_eq!(controller.stop(), Some(()));
        assert!(iterations.load(Ordering::SeqCst) > 0);
    }
}
