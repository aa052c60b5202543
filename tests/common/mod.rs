// SPDX-License-Identifier: GPL-3.0-only

//! Test surfaces and filters shared by the integration tests

#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use stream_compositor::errors::{FilterError, SurfaceError};
use stream_compositor::filters::{Filter, FilterContext};
use stream_compositor::frame::VideoFrame;
use stream_compositor::overlay::TextRasterizer;
use stream_compositor::surface::{DrawableSurface, SurfaceHandle};

/// Everything a surface saw
#[derive(Default)]
pub struct SurfaceLog {
    pub frames: Mutex<Vec<VideoFrame>>,
    pub binds: Mutex<Vec<(u32, u32)>>,
    pub destroyed: AtomicBool,
}

impl SurfaceLog {
    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn last_frame(&self) -> Option<VideoFrame> {
        self.frames.lock().unwrap().last().cloned()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

/// Surface that records frames, or fails every present when `fail` is set
pub struct RecordingSurface {
    handle: SurfaceHandle,
    fail: bool,
    log: Arc<SurfaceLog>,
}

impl RecordingSurface {
    pub fn new(id: u64) -> (Box<dyn DrawableSurface>, Arc<SurfaceLog>) {
        Self::build(id, false)
    }

    pub fn failing(id: u64) -> (Box<dyn DrawableSurface>, Arc<SurfaceLog>) {
        Self::build(id, true)
    }

    fn build(id: u64, fail: bool) -> (Box<dyn DrawableSurface>, Arc<SurfaceLog>) {
        let log = Arc::new(SurfaceLog::default());
        let surface = Box::new(Self {
            handle: SurfaceHandle(id),
            fail,
            log: Arc::clone(&log),
        });
        (surface, log)
    }
}

impl DrawableSurface for RecordingSurface {
    fn handle(&self) -> SurfaceHandle {
        self.handle
    }

    fn bind(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        self.log.binds.lock().unwrap().push((width, height));
        Ok(())
    }

    fn present(&mut self, frame: &VideoFrame) -> Result<(), SurfaceError> {
        if self.fail {
            return Err(SurfaceError::PresentFailed("buffer queue abandoned".into()));
        }
        self.log.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }

    fn destroy(&mut self) {
        self.log.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Filter that logs its id on every invocation and paints pixel (0,0)
pub struct LoggingFilter {
    pub id: u8,
    pub log: Arc<Mutex<Vec<u8>>>,
}

impl LoggingFilter {
    pub fn boxed(id: u8, log: &Arc<Mutex<Vec<u8>>>) -> Box<dyn Filter> {
        Box::new(Self {
            id,
            log: Arc::clone(log),
        })
    }
}

impl Filter for LoggingFilter {
    fn name(&self) -> &str {
        "logging"
    }

    fn apply(&mut self, frame: &mut RgbaImage, _ctx: &mut FilterContext<'_>) -> Result<(), FilterError> {
        self.log.lock().unwrap().push(self.id);
        frame.put_pixel(0, 0, Rgba([self.id, self.id, self.id, 255]));
        Ok(())
    }
}

/// One solid block per character
pub struct BlockRasterizer;

impl TextRasterizer for BlockRasterizer {
    fn rasterize(&self, text: &str, px: f32, color: Rgba<u8>) -> RgbaImage {
        let side = px.max(1.0) as u32;
        RgbaImage::from_pixel(side * text.chars().count().max(1) as u32, side, color)
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
