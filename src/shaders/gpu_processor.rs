// SPDX-License-Identifier: GPL-3.0-only

//! Per-size GPU resources and readback for the compute pipelines

use crate::errors::FilterError;
use crate::gpu::wgpu;

/// Input texture, output storage buffer and staging buffer for one frame size
///
/// Reallocated only when the frame size changes, which in practice means when
/// the encoder size changes between sessions.
pub struct FrameResources {
    pub width: u32,
    pub height: u32,
    pub input: wgpu::Texture,
    pub output: wgpu::Buffer,
    pub staging: wgpu::Buffer,
}

impl FrameResources {
    pub fn allocate(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let extent = Self::extent_of(width, height);
        let input = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("compositor_frame_input"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let buffer = |label, usage| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: Self::byte_len(width, height),
                usage,
                mapped_at_creation: false,
            })
        };
        let output = buffer(
            "compositor_frame_output",
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );
        let staging = buffer(
            "compositor_frame_staging",
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        );

        Self {
            width,
            height,
            input,
            output,
            staging,
        }
    }

    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        Self::extent_of(self.width, self.height)
    }

    pub fn byte_size(&self) -> u64 {
        Self::byte_len(self.width, self.height)
    }

    fn extent_of(width: u32, height: u32) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }

    fn byte_len(width: u32, height: u32) -> u64 {
        width as u64 * height as u64 * 4
    }

    /// Copy the staging buffer back to the CPU, blocking the render thread
    pub fn read_back(&self, device: &wgpu::Device) -> Result<Vec<u8>, FilterError> {
        let slice = self.staging.slice(..);
        let (tx, rx) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| FilterError::Gpu(format!("Device poll failed: {}", e)))?;

        pollster::block_on(rx)
            .map_err(|_| FilterError::Gpu("Buffer mapping was cancelled".into()))?
            .map_err(|e| FilterError::Gpu(format!("Failed to map buffer: {:?}", e)))?;

        let data = slice.get_mapped_range().to_vec();
        self.staging.unmap();
        Ok(data)
    }
}

/// Number of workgroups needed to cover `dimension`
#[inline]
pub fn compute_dispatch_size(dimension: u32, workgroup_size: u32) -> u32 {
    dimension.div_ceil(workgroup_size)
}
