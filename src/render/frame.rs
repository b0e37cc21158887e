use anyhow::{Context, Result};
use std::sync::mpsc;

use super::gpu::GpuContext;

pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

const RGBA: u32 = 4;

/// A fixed-size RGB pixel array, row-major, 3 bytes per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height * 3) as usize],
        }
    }

    /// Build from RGBA rows that are `row_pitch` bytes apart, dropping the
    /// row padding and the alpha channel.
    pub fn from_padded_rgba(width: u32, height: u32, row_pitch: u32, data: &[u8]) -> Self {
        let row_len = (width * RGBA) as usize;
        let pixels = data
            .chunks(row_pitch as usize)
            .take(height as usize)
            .flat_map(|row| row[..row_len].chunks_exact(RGBA as usize))
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }
}

/// Row pitch for texture-to-buffer copies.
fn row_pitch(width: u32) -> u32 {
    wgpu::util::align_to(width * RGBA, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
}

/// Render target texture plus a mappable staging buffer sized for one frame.
pub struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    staging: wgpu::Buffer,
    pub width: u32,
    pub height: u32,
    row_pitch: u32,
}

impl OffscreenTarget {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("synth_target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&Default::default());

        let row_pitch = row_pitch(width);
        let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("synth_staging"),
            size: u64::from(row_pitch) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            staging,
            width,
            height,
            row_pitch,
        }
    }

    /// Draw one fullscreen triangle with `pipeline` and wait for the pixels.
    pub fn render(
        &self,
        gpu: &GpuContext,
        pipeline: &wgpu::RenderPipeline,
        bind_group: &wgpu::BindGroup,
    ) -> Result<RgbImage> {
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("synth_frame") });
        self.draw(&mut encoder, pipeline, bind_group);
        self.copy_to_staging(&mut encoder);
        gpu.queue.submit([encoder.finish()]);
        self.read_back(gpu)
    }

    fn draw(&self, encoder: &mut wgpu::CommandEncoder, pipeline: &wgpu::RenderPipeline, bind_group: &wgpu::BindGroup) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("synth_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            ..Default::default()
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    fn copy_to_staging(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_buffer(
            self.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &self.staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.row_pitch),
                    rows_per_image: Some(self.height),
                },
            },
            self.texture.size(),
        );
    }

    fn read_back(&self, gpu: &GpuContext) -> Result<RgbImage> {
        let slice = self.staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |mapped| {
            let _ = tx.send(mapped);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .context("Readback callback dropped")?
            .context("Failed to map staging buffer")?;

        let image = {
            let data = slice.get_mapped_range();
            RgbImage::from_padded_rgba(self.width, self.height, self.row_pitch, &data)
        };
        self.staging.unmap();
        Ok(image)
    }
}
