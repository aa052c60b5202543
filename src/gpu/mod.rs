// SPDX-License-Identifier: GPL-3.0-only

//! GPU context for the render loop.
//!
//! The compositor owns exactly one [`GpuContext`] per initialized session. It is
//! created by `init`, moved onto the render thread on `start` and dropped on
//! `release`. All compute pipelines (built-in filters, anti-aliasing) borrow it
//! through the render loop, so GPU work never leaves that thread.

use crate::shaders::{GpuFilterPipeline, ShaderKind};
use std::sync::Arc;
use tracing::{debug, info};

pub use wgpu;

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, DX12, etc.)
    pub backend: wgpu::Backend,
}

/// GPU device, queue and lazily built compute pipelines
pub struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: GpuDeviceInfo,
    color_pipeline: Option<GpuFilterPipeline>,
    aa_pipeline: Option<GpuFilterPipeline>,
}

impl GpuContext {
    /// Open a headless device on the best available adapter
    pub async fn create(label: &str) -> Result<Self, String> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| format!("No usable GPU adapter: {}", e))?;

        let adapter_info = adapter.get_info();
        info!(
            label,
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "GPU adapter selected for compositing"
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| format!("Failed to create GPU device: {}", e))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            info: GpuDeviceInfo {
                adapter_name: adapter_info.name,
                backend: adapter_info.backend,
            },
            color_pipeline: None,
            aa_pipeline: None,
        })
    }

    /// [`GpuContext::create`] on the calling thread
    pub fn new_blocking(label: &str) -> Result<Self, String> {
        pollster::block_on(Self::create(label))
    }

    pub fn info(&self) -> &GpuDeviceInfo {
        &self.info
    }

    /// Get (building on first use) the compute pipeline for a shader
    pub fn pipeline(&mut self, kind: ShaderKind) -> &mut GpuFilterPipeline {
        let slot = match kind {
            ShaderKind::Color => &mut self.color_pipeline,
            ShaderKind::AntiAlias => &mut self.aa_pipeline,
        };
        slot.get_or_insert_with(|| {
            debug!(?kind, "Building compute pipeline");
            GpuFilterPipeline::new(Arc::clone(&self.device), Arc::clone(&self.queue), kind)
        })
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("info", &self.info)
            .field("color_pipeline", &self.color_pipeline.is_some())
            .field("aa_pipeline", &self.aa_pipeline.is_some())
            .finish()
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        debug!(adapter = %self.info.adapter_name, "Releasing GPU context");
    }
}
