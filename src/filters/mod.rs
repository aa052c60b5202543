// SPDX-License-Identifier: GPL-3.0-only

//! Ordered filter chain applied to every composited frame
//!
//! Filters are opaque, stateful units. The chain stores them densely: setting a
//! position past the end appends, so there are never empty slots, and
//! removing a slot shifts every later filter down by one.

mod anti_alias;
mod builtin;

pub use anti_alias::AntiAliasPass;
pub use builtin::{ColorFilter, ColorFilterKind};

use crate::errors::FilterError;
use crate::gpu::GpuContext;
use image::RgbaImage;
use tracing::{debug, warn};

/// Per-frame context handed to filters
pub struct FilterContext<'a> {
    gpu: Option<&'a mut GpuContext>,
    /// Sequence number of the frame being produced
    pub frame_index: u64,
}

impl<'a> FilterContext<'a> {
    pub fn new(gpu: Option<&'a mut GpuContext>, frame_index: u64) -> Self {
        Self { gpu, frame_index }
    }

    /// Context without a GPU (software backend)
    pub fn software(frame_index: u64) -> Self {
        Self::new(None, frame_index)
    }

    /// GPU context of the session, if the compositor runs on a GPU backend
    pub fn gpu(&mut self) -> Option<&mut GpuContext> {
        self.gpu.as_deref_mut()
    }
}

/// A pluggable per-frame transform
///
/// `apply` must either succeed or leave `frame` untouched: a failing filter is
/// skipped for that frame and the chain continues with the next slot.
pub trait Filter: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Transform `frame` in place
    fn apply(&mut self, frame: &mut RgbaImage, ctx: &mut FilterContext<'_>) -> Result<(), FilterError>;

    /// Release backing resources; called once when the filter leaves the chain
    fn release(&mut self) {}
}

/// Ordered, indexable list of filters
#[derive(Default)]
pub struct FilterChain {
    slots: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the filter at `position`
    ///
    /// Positions past the end are normalized to an append. Returns the
    /// position the filter actually occupies.
    pub fn set_filter_at(&mut self, position: usize, filter: Box<dyn Filter>) -> usize {
        if let Some(slot) = self.slots.get_mut(position) {
            let mut old = std::mem::replace(slot, filter);
            debug!(position, old = old.name(), new = slot.name(), "Replacing filter");
            old.release();
            position
        } else {
            let position = self.slots.len();
            debug!(position, name = filter.name(), "Appending filter");
            self.slots.push(filter);
            position
        }
    }

    /// Shorthand for slot 0
    pub fn set_filter(&mut self, filter: Box<dyn Filter>) -> usize {
        self.set_filter_at(0, filter)
    }

    /// Remove the filter at `position`, shifting later filters down
    ///
    /// Returns false when the position is empty.
    pub fn remove_filter(&mut self, position: usize) -> bool {
        if position >= self.slots.len() {
            return false;
        }
        let mut removed = self.slots.remove(position);
        debug!(position, name = removed.name(), "Removing filter");
        removed.release();
        true
    }

    /// Remove every filter
    pub fn clear(&mut self) {
        for mut filter in self.slots.drain(..) {
            filter.release();
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Filter names in application order
    pub fn names(&self) -> Vec<String> {
        self.slots.iter().map(|f| f.name().to_string()).collect()
    }

    /// Apply every filter in ascending position, once each
    ///
    /// Returns how many filters succeeded.
    pub fn apply(&mut self, frame: &mut RgbaImage, ctx: &mut FilterContext<'_>) -> usize {
        let mut applied = 0;
        for (position, filter) in self.slots.iter_mut().enumerate() {
            match filter.apply(frame, ctx) {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!(position, name = filter.name(), error = %e, "Filter failed, skipping for this frame");
                }
            }
        }
        applied
    }
}

impl Drop for FilterChain {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain").field("slots", &self.names()).finish()
    }
}
