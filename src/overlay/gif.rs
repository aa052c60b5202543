// SPDX-License-Identifier: GPL-3.0-only

//! Animated gif overlay
//!
//! All frames are decoded up front. The playback clock starts with the first
//! composite, and the current frame is picked from elapsed time modulo the
//! total loop duration, so playback is independent of the render rate.

use crate::constants::overlay::MIN_GIF_FRAME_DELAY_MS;
use crate::errors::{CompositorError, CompositorResult};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbaImage};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Seek};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
pub struct GifObject {
    frames: Vec<RgbaImage>,
    delays: Vec<Duration>,
    total: Duration,
    started: Option<Instant>,
}

fn clamp_delay(delay: Duration) -> Duration {
    delay.max(Duration::from_millis(MIN_GIF_FRAME_DELAY_MS))
}

impl GifObject {
    /// Build from already decoded frames and their display durations
    pub fn from_frames(frames: Vec<(RgbaImage, Duration)>) -> CompositorResult<Self> {
        if frames.is_empty() {
            return Err(CompositorError::Decode("gif has no frames".into()));
        }
        let (frames, delays): (Vec<_>, Vec<_>) = frames
            .into_iter()
            .map(|(image, delay)| (image, clamp_delay(delay)))
            .unzip();
        let total = delays.iter().sum();
        Ok(Self {
            frames,
            delays,
            total,
            started: None,
        })
    }

    /// Decode a gif stream
    pub fn decode<R: BufRead + Seek>(reader: R) -> CompositorResult<Self> {
        let decoder = GifDecoder::new(reader)?;
        let mut frames = Vec::new();
        for frame in decoder.into_frames() {
            let frame = frame?;
            let (numer, denom) = frame.delay().numer_denom_ms();
            let ms = if denom == 0 { 0 } else { numer as u64 / denom as u64 };
            frames.push((frame.into_buffer(), Duration::from_millis(ms)));
        }
        let gif = Self::from_frames(frames)?;
        debug!(frames = gif.frame_count(), total_ms = gif.total.as_millis() as u64, "Decoded gif");
        Ok(gif)
    }

    pub fn from_bytes(bytes: &[u8]) -> CompositorResult<Self> {
        Self::decode(Cursor::new(bytes))
    }

    pub fn from_path(path: impl AsRef<Path>) -> CompositorResult<Self> {
        Self::decode(BufReader::new(File::open(path)?))
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn loop_duration(&self) -> Duration {
        self.total
    }

    /// Index of the frame shown `elapsed` after playback started
    pub fn frame_index_at(&self, elapsed: Duration) -> usize {
        if self.frames.len() <= 1 || self.total.is_zero() {
            return 0;
        }
        let mut offset = Duration::from_nanos((elapsed.as_nanos() % self.total.as_nanos()) as u64);
        for (index, delay) in self.delays.iter().enumerate() {
            if offset < *delay {
                return index;
            }
            offset -= *delay;
        }
        self.frames.len() - 1
    }

    pub(super) fn frame_at(&mut self, now: Instant) -> Option<(usize, &RgbaImage)> {
        let started = *self.started.get_or_insert(now);
        let index = self.frame_index_at(now.saturating_duration_since(started));
        self.frames.get(index).map(|frame| (index, frame))
    }

    pub(super) fn release(&mut self) {
        self.frames.clear();
        self.delays.clear();
        self.total = Duration::ZERO;
    }
}
