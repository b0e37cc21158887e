use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::capture::ExtractOrder;
use crate::display::DisplayKind;
use crate::latent::SilencePolicy;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_samples_per_frame")]
    pub samples_per_frame: usize,
    /// Capture buffer size in frames; defaults to one second of audio.
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub order: ExtractOrder,
    #[serde(default)]
    pub silence: SilencePolicy,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub seeds: Vec<u64>,
    #[serde(default = "default_truncation_psi")]
    pub truncation_psi: f32,
    #[serde(default)]
    pub params: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub kind: DisplayKind,
    #[serde(default = "default_size")]
    pub width: u32,
    #[serde(default = "default_size")]
    pub height: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            source: None,
            sample_rate: default_sample_rate(),
            samples_per_frame: default_samples_per_frame(),
            capacity: None,
            order: ExtractOrder::default(),
            silence: SilencePolicy::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: None,
            seeds: Vec::new(),
            truncation_psi: default_truncation_psi(),
            params: Vec::new(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            kind: DisplayKind::default(),
            width: default_size(),
            height: default_size(),
        }
    }
}

pub fn default_sample_rate() -> u32 { 48000 }
pub fn default_samples_per_frame() -> usize { 2048 }
pub fn default_poll_interval_ms() -> u64 { 1 }
pub fn default_truncation_psi() -> f32 { 0.75 }
pub fn default_size() -> u32 { 512 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
}

/// Explicit path, else `seedscope.toml` in the working directory, else the
/// user config directories.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("seedscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("seedscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("seedscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
