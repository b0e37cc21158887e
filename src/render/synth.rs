use anyhow::{Context, Result};
use std::collections::HashMap;

use super::frame::{OffscreenTarget, RgbImage, TEXTURE_FORMAT};
use super::generator::{GeneratorPipeline, SynthUniforms};
use super::gpu::GpuContext;
use crate::models::loader::{inject_params, LoadedModel};

/// The generative model as seen by the pipeline: one unit-norm latent
/// direction in, one image out. Calls may be slow and block.
pub trait Synthesizer {
    fn latent_dim(&self) -> usize;
    fn synthesize(&mut self, direction: &[f32]) -> Result<RgbImage>;
}

/// Truncation toward the mean latent: `w = mean + (z - mean) * psi`, with a
/// zero mean.
pub fn apply_truncation(direction: &[f32], psi: f32, out: &mut Vec<f32>) {
    out.clear();
    out.extend(direction.iter().map(|&z| z * psi));
}

/// Renders a generator shader offscreen with wgpu and reads the frame back.
pub struct GpuSynthesizer {
    gpu: GpuContext,
    target: OffscreenTarget,
    pipeline: GeneratorPipeline,
    uniform_buffer: wgpu::Buffer,
    latent_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    latent_dim: usize,
    truncation_psi: f32,
    cycle: u32,
    latent: Vec<f32>,
}

impl GpuSynthesizer {
    pub fn new(
        model: &LoadedModel,
        width: u32,
        height: u32,
        truncation_psi: f32,
        overrides: &HashMap<String, String>,
    ) -> Result<Self> {
        let gpu = GpuContext::new()?;
        let target = OffscreenTarget::new(&gpu, width, height);

        let shader_src = inject_params(&model.fragment_shader, &model.manifest, overrides);
        let pipeline = GeneratorPipeline::new(&gpu.device, &shader_src, TEXTURE_FORMAT)
            .with_context(|| format!("Failed to build generator '{}'", model.manifest.name))?;

        let latent_dim = model.manifest.latent_dim;

        let uniform_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform_buffer"),
            size: std::mem::size_of::<SynthUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let latent_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("latent_buffer"),
            size: (latent_dim * std::mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = pipeline.bind(&gpu.device, &uniform_buffer, &latent_buffer);

        log::info!(
            "Generator: {} ({}) on {}, latent_dim={}, {}x{}, psi={:.2}",
            model.manifest.display_name,
            model.origin,
            gpu.adapter.name,
            latent_dim,
            width,
            height,
            truncation_psi
        );

        Ok(Self {
            gpu,
            target,
            pipeline,
            uniform_buffer,
            latent_buffer,
            bind_group,
            latent_dim,
            truncation_psi,
            cycle: 0,
            latent: Vec::with_capacity(latent_dim),
        })
    }
}

impl Synthesizer for GpuSynthesizer {
    fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    fn synthesize(&mut self, direction: &[f32]) -> Result<RgbImage> {
        if direction.len() != self.latent_dim {
            anyhow::bail!(
                "Direction has {} components, generator expects {}",
                direction.len(),
                self.latent_dim
            );
        }

        apply_truncation(direction, self.truncation_psi, &mut self.latent);

        let uniforms = SynthUniforms {
            resolution: [self.target.width as f32, self.target.height as f32],
            latent_dim: self.latent_dim as u32,
            cycle: self.cycle,
        };
        self.gpu
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        self.gpu
            .queue
            .write_buffer(&self.latent_buffer, 0, bytemuck::cast_slice(&self.latent));

        let image = self
            .target
            .render(&self.gpu, &self.pipeline.pipeline, &self.bind_group)?;
        self.cycle = self.cycle.wrapping_add(1);
        Ok(image)
    }
}
