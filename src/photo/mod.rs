// SPDX-License-Identifier: GPL-3.0-only

//! One-shot photo capture from the stream path
//!
//! ```text
//! take_photo(cb) ──► pending queue ──(next stream frame)──► delivery thread ──► cb(Ok(image))
//!                          │
//!                        stop ──► cb(Err(CaptureUnavailable))
//! ```
//!
//! Every request is answered exactly once. Frames are handed to callbacks on
//! a separate delivery thread so a slow callback never stalls the render loop.

pub mod encoding;

pub use encoding::{EncodedImage, EncodingFormat, EncodingQuality, PhotoEncoder};

use crate::errors::PhotoError;
use image::RgbaImage;
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, warn};

/// Callback receiving the captured stream frame
pub type TakePhotoCallback = Box<dyn FnOnce(Result<RgbaImage, PhotoError>) + Send + 'static>;

/// Answer a request that can never be fulfilled
pub fn reject(callback: TakePhotoCallback) {
    callback(Err(PhotoError::CaptureUnavailable));
}

type Outcome = Result<Arc<RgbaImage>, PhotoError>;
type Batch = Mutex<Option<(Vec<TakePhotoCallback>, Outcome)>>;

fn deliver(batch: &Batch) {
    let taken = batch.lock().ok().and_then(|mut slot| slot.take());
    if let Some((callbacks, outcome)) = taken {
        for callback in callbacks {
            callback(outcome.clone().map(|frame| frame.as_ref().clone()));
        }
    }
}

/// Answer `callbacks` with `outcome` on a delivery thread
fn dispatch(callbacks: Vec<TakePhotoCallback>, outcome: Outcome) {
    let batch = Arc::new(Mutex::new(Some((callbacks, outcome))));
    let job = Arc::clone(&batch);
    let spawned = thread::Builder::new()
        .name("photo-delivery".into())
        .spawn(move || deliver(&job));
    if let Err(e) = spawned {
        warn!(error = %e, "Failed to spawn photo delivery thread, delivering inline");
        deliver(&batch);
    }
}

/// Photo requests waiting for the next composited frame
#[derive(Default)]
pub struct PhotoCapture {
    pending: Vec<TakePhotoCallback>,
}

impl PhotoCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, callback: TakePhotoCallback) {
        self.pending.push(callback);
        debug!(pending = self.pending.len(), "Photo requested");
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Hand `frame` to every pending request; returns how many were served
    pub fn fulfil(&mut self, frame: &Arc<RgbaImage>) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let callbacks = std::mem::take(&mut self.pending);
        let count = callbacks.len();
        dispatch(callbacks, Ok(Arc::clone(frame)));
        debug!(count, "Photo frame delivered");
        count
    }

    /// Fail every pending request with `CaptureUnavailable`
    pub fn fail_all(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let callbacks = std::mem::take(&mut self.pending);
        let count = callbacks.len();
        dispatch(callbacks, Err(PhotoError::CaptureUnavailable));
        debug!(count, "Failed pending photo requests");
        count
    }
}

impl Drop for PhotoCapture {
    fn drop(&mut self) {
        self.fail_all();
    }
}

impl std::fmt::Debug for PhotoCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoCapture")
            .field("pending", &self.pending.len())
            .finish()
    }
}
