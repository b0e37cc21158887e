use anyhow::{anyhow, Result};

/// Device and queue for offscreen rendering; no surface is ever attached.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::AdapterInfo,
}

impl GpuContext {
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::headless())
    }

    async fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            })
            .await
            .ok_or_else(|| anyhow!("No GPU adapter available for offscreen rendering"))?;
        let info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("seedscope_device"),
                    required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| anyhow!("Failed to open {} ({:?}): {}", info.name, info.backend, e))?;

        log::info!("Using GPU: {} ({:?}, {:?})", info.name, info.backend, info.device_type);

        Ok(Self {
            device,
            queue,
            adapter: info,
        })
    }
}
