// SPDX-License-Identifier: GPL-3.0-only
//! GPU compute pipeline for per-frame RGBA passes
//!
//! One pipeline type serves both the built-in color filters and the
//! anti-aliasing pass. The frame is uploaded as a texture, the compute shader
//! writes packed RGBA into a storage buffer and the result is read back into
//! the same image.

use super::ShaderKind;
use super::gpu_processor::{FrameResources, compute_dispatch_size};
use crate::constants::WORKGROUP_SIZE;
use crate::errors::FilterError;
use crate::gpu::wgpu;
use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, info};

/// Uniform shared by every compositor shader
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct FilterParams {
    width: u32,
    height: u32,
    mode: u32,
    amount: f32,
}

fn compute_entry(binding: u32, ty: wgpu::BindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty,
        count: None,
    }
}

fn buffer_binding(ty: wgpu::BufferBindingType) -> wgpu::BindingType {
    wgpu::BindingType::Buffer {
        ty,
        has_dynamic_offset: false,
        min_binding_size: None,
    }
}

/// Compiled compute shader plus the resources sized for the last frame
pub struct GpuFilterPipeline {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    kind: ShaderKind,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    frame: Option<FrameResources>,
}

impl GpuFilterPipeline {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, kind: ShaderKind) -> Self {
        info!(?kind, "Initializing GPU compute pipeline");

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kind.label()),
            source: wgpu::ShaderSource::Wgsl(kind.source().into()),
        });

        // 0: source frame, 1: packed RGBA output, 2: FilterParams
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("compositor_filter_layout"),
            entries: &[
                compute_entry(
                    0,
                    wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                ),
                compute_entry(1, buffer_binding(wgpu::BufferBindingType::Storage { read_only: false })),
                compute_entry(2, buffer_binding(wgpu::BufferBindingType::Uniform)),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("compositor_filter_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(kind.label()),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("compositor_filter_params"),
            size: std::mem::size_of::<FilterParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device,
            queue,
            kind,
            pipeline,
            layout,
            params,
            frame: None,
        }
    }

    fn ensure_frame(&mut self, width: u32, height: u32) {
        if self.frame.as_ref().is_some_and(|f| f.fits(width, height)) {
            return;
        }
        debug!(width, height, kind = ?self.kind, "Allocating compute pipeline resources");
        self.frame = Some(FrameResources::allocate(&self.device, width, height));
    }

    /// Run the shader over `image` in place
    ///
    /// `mode` and `amount` are forwarded to the shader uniform unchanged.
    pub fn apply(&mut self, image: &mut RgbaImage, mode: u32, amount: f32) -> Result<(), FilterError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(FilterError::UnsupportedDimensions { width, height });
        }

        self.ensure_frame(width, height);
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| FilterError::Gpu("Frame resources not allocated".into()))?;

        self.queue.write_texture(
            frame.input.as_image_copy(),
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            frame.extent(),
        );
        let params = FilterParams {
            width,
            height,
            mode,
            amount,
        };
        self.queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));

        let view = frame.input.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("compositor_filter_bind_group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: frame.output.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.params.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(self.kind.label()),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(self.kind.label()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, Some(&bind_group), &[]);
            pass.dispatch_workgroups(
                compute_dispatch_size(width, WORKGROUP_SIZE),
                compute_dispatch_size(height, WORKGROUP_SIZE),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(&frame.output, 0, &frame.staging, 0, frame.byte_size());
        self.queue.submit(std::iter::once(encoder.finish()));

        let pixels = frame.read_back(&self.device)?;
        image.copy_from_slice(&pixels);
        Ok(())
    }
}
