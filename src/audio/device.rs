use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, SizedSample, StreamConfig, SupportedStreamConfig};

use super::capture::{CaptureCallback, CaptureSample};

/// A running capture stream. Dropping it stops the callback.
pub struct InputStream {
    _stream: cpal::Stream,
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    for device in host.input_devices().context("Failed to enumerate input devices")? {
        let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
        let detail = match device.default_input_config() {
            Ok(config) => format!(
                "{} ({}Hz, {} channels, {:?})",
                name,
                config.sample_rate().0,
                config.channels(),
                config.sample_format()
            ),
            Err(_) => format!("{} (config query failed)", name),
        };
        names.push(detail);
    }
    Ok(names)
}

/// Find an input device by case-insensitive name substring; `default` picks
/// the host default.
pub fn find_input_device(source: &str) -> Result<Device> {
    let host = cpal::default_host();
    if source.eq_ignore_ascii_case("default") {
        return host
            .default_input_device()
            .context("No default input device available");
    }

    let needle = source.to_lowercase();
    for device in host.input_devices().context("Failed to enumerate input devices")? {
        if let Ok(name) = device.name() {
            if name.to_lowercase().contains(&needle) {
                return Ok(device);
            }
        }
    }
    anyhow::bail!(
        "Input device '{}' not found. Available devices: {:?}",
        source,
        list_input_devices().unwrap_or_default()
    );
}

fn is_supported_format(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::I32 | SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
    )
}

/// Prefer a stereo config at the requested rate, then any config at that
/// rate, then the device default.
fn select_config(device: &Device, sample_rate: u32) -> Result<SupportedStreamConfig> {
    let ranges: Vec<_> = device
        .supported_input_configs()
        .context("Failed to query supported input configs")?
        .filter(|range| is_supported_format(range.sample_format()))
        .filter(|range| {
            range.min_sample_rate().0 <= sample_rate && sample_rate <= range.max_sample_rate().0
        })
        .collect();

    let chosen = ranges
        .iter()
        .find(|range| range.channels() >= 2)
        .or_else(|| ranges.first());

    if let Some(range) = chosen {
        return Ok(range.clone().with_sample_rate(SampleRate(sample_rate)));
    }

    let fallback = device
        .default_input_config()
        .context("Failed to get default input config")?;
    log::warn!(
        "Device does not support {}Hz, using {}Hz",
        sample_rate,
        fallback.sample_rate().0
    );
    Ok(fallback)
}

/// Open `source` and start feeding `callback`. The returned sample rate is
/// what the device actually runs at.
pub fn open_input(source: &str, sample_rate: u32, callback: CaptureCallback) -> Result<InputStream> {
    let device = find_input_device(source)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
    let supported = select_config(&device, sample_rate)?;

    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    log::info!(
        "Audio input: {} @ {}Hz, {} channels, {:?}",
        device_name,
        config.sample_rate.0,
        config.channels,
        supported.sample_format()
    );
    if config.channels == 1 {
        log::warn!("Mono input device, mirroring the single channel to both sides");
    }

    let stream = match supported.sample_format() {
        SampleFormat::I32 => build_stream::<i32>(&device, &config, callback)?,
        SampleFormat::F32 => build_stream::<f32>(&device, &config, callback)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, callback)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, callback)?,
        other => anyhow::bail!("Unsupported sample format: {:?}", other),
    };

    stream.play().context("Failed to start audio stream")?;

    Ok(InputStream {
        _stream: stream,
        device_name,
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    })
}

fn build_stream<T>(device: &Device, config: &StreamConfig, callback: CaptureCallback) -> Result<cpal::Stream>
where
    T: SizedSample + CaptureSample + Send + 'static,
{
    let channels = config.channels as usize;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                callback.process_interleaved(data, channels);
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .context("Failed to build audio input stream")
}
