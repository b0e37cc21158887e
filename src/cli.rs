use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::capture::ExtractOrder;
use crate::config::{self, Config};
use crate::display::DisplayKind;
use crate::error::{PipelineError, Result};
use crate::latent::SilencePolicy;

#[derive(Parser, Debug)]
#[command(name = "seedscope", about = "Live audio-driven latent space visualiser")]
pub struct Cli {
    /// Audio input device to capture from (name substring, or "default")
    pub source: Option<String>,

    /// Generator model: directory with manifest.json, or model name
    pub model: Option<String>,

    /// Comma-separated generator seeds, low-frequency to high-frequency
    #[arg(short, long)]
    pub seeds: Option<String>,

    /// Truncation psi applied to each latent before synthesis
    #[arg(short = 'p', long, default_value_t = 0.75)]
    pub truncation_psi: f32,

    /// Stereo frames analysed per cycle
    #[arg(long, default_value_t = 2048)]
    pub samples_per_frame: usize,

    /// Capture sample rate in Hz
    #[arg(long, default_value_t = 48000)]
    pub sample_rate: u32,

    /// Capture buffer capacity in frames (default: one second of audio)
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Which buffered frames each cycle analyses
    #[arg(long, value_enum, default_value_t = ExtractOrder::NewestFirst)]
    pub order: ExtractOrder,

    /// What to show when the input is silent
    #[arg(long, value_enum, default_value_t = SilencePolicy::Reuse)]
    pub silence: SilencePolicy,

    /// Longest sleep between buffer checks while waiting for audio
    #[arg(long, default_value_t = 1)]
    pub poll_interval_ms: u64,

    /// Output image width in pixels
    #[arg(long, default_value_t = 512)]
    pub width: u32,

    /// Output image height in pixels
    #[arg(long, default_value_t = 512)]
    pub height: u32,

    /// Where frames go
    #[arg(long, value_enum, default_value_t = DisplayKind::Ffplay)]
    pub display: DisplayKind,

    /// Stop after this many cycles
    #[arg(long)]
    pub max_cycles: Option<u64>,

    /// Generator parameter override (key=value), repeatable
    #[arg(long = "param")]
    pub params: Vec<String>,

    /// Config file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// List audio input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// List available generator models and exit
    #[arg(long)]
    pub list_models: bool,
}

/// Fully resolved, validated settings for one run.
#[derive(Clone, Debug)]
pub struct RunSettings {
    pub source: String,
    pub model: String,
    pub seeds: Vec<u64>,
    pub truncation_psi: f32,
    pub samples_per_frame: usize,
    pub sample_rate: u32,
    pub capacity: usize,
    pub order: ExtractOrder,
    pub silence: SilencePolicy,
    pub poll_interval: Duration,
    pub width: u32,
    pub height: u32,
    pub display: DisplayKind,
    pub max_cycles: Option<u64>,
    pub params: Vec<String>,
}

impl Cli {
    /// Fill in values still at their CLI defaults from the config file.
    pub fn apply_config(&mut self, cfg: Config) {
        if self.source.is_none() { self.source = cfg.audio.source; }
        if self.model.is_none() { self.model = cfg.model.name; }
        if self.seeds.is_none() && !cfg.model.seeds.is_empty() {
            let seeds: Vec<String> = cfg.model.seeds.iter().map(|s| s.to_string()).collect();
            self.seeds = Some(seeds.join(","));
        }
        if self.truncation_psi == config::default_truncation_psi() { self.truncation_psi = cfg.model.truncation_psi; }
        if self.samples_per_frame == config::default_samples_per_frame() { self.samples_per_frame = cfg.audio.samples_per_frame; }
        if self.sample_rate == config::default_sample_rate() { self.sample_rate = cfg.audio.sample_rate; }
        if self.capacity.is_none() { self.capacity = cfg.audio.capacity; }
        if self.order == ExtractOrder::default() { self.order = cfg.audio.order; }
        if self.silence == SilencePolicy::default() { self.silence = cfg.audio.silence; }
        if self.poll_interval_ms == config::default_poll_interval_ms() { self.poll_interval_ms = cfg.audio.poll_interval_ms; }
        if self.width == config::default_size() { self.width = cfg.display.width; }
        if self.height == config::default_size() { self.height = cfg.display.height; }
        if self.display == DisplayKind::default() { self.display = cfg.display.kind; }
        if self.params.is_empty() { self.params = cfg.model.params; }
    }

    pub fn settings(&self) -> Result<RunSettings> {
        let seeds = parse_seeds(self.seeds.as_deref().unwrap_or(""))?;

        if !(self.truncation_psi.is_finite()) {
            return Err(PipelineError::InvalidConfig("truncation psi must be finite".into()));
        }
        if self.samples_per_frame == 0 {
            return Err(PipelineError::InvalidConfig("samples per frame must be greater than zero".into()));
        }
        if self.sample_rate == 0 {
            return Err(PipelineError::InvalidConfig("sample rate must be greater than zero".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::InvalidConfig("image size must be non-zero".into()));
        }

        let capacity = self.capacity.unwrap_or(self.sample_rate as usize);
        if capacity < self.samples_per_frame {
            return Err(PipelineError::InvalidConfig(format!(
                "capacity ({}) must hold at least one analysis frame ({})",
                capacity, self.samples_per_frame
            )));
        }

        Ok(RunSettings {
            source: self.source.clone().unwrap_or_else(|| "default".to_string()),
            model: self.model.clone().unwrap_or_else(|| "latent_field".to_string()),
            seeds,
            truncation_psi: self.truncation_psi,
            samples_per_frame: self.samples_per_frame,
            sample_rate: self.sample_rate,
            capacity,
            order: self.order,
            silence: self.silence,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            width: self.width,
            height: self.height,
            display: self.display,
            max_cycles: self.max_cycles,
            params: self.params.clone(),
        })
    }
}

/// Parse a comma-separated seed list; blanks between commas are skipped.
pub fn parse_seeds(list: &str) -> Result<Vec<u64>> {
    let seeds = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| PipelineError::InvalidConfig(format!("invalid seed '{}'", s)))
        })
        .collect::<Result<Vec<u64>>>()?;
    if seeds.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "at least one seed is required (--seeds 1,2,3)".into(),
        ));
    }
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["seedscope"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_parse_seeds() {
        assert_eq!(parse_seeds("1, 2,3,").unwrap(), vec![1, 2, 3]);
        assert!(parse_seeds("").is_err());
        assert!(parse_seeds(" , ").is_err());
        assert!(parse_seeds("1,x").is_err());
    }

    #[test]
    fn test_defaults() {
        let settings = cli(&["mixer", "-s", "5,6"]).settings().unwrap();
        assert_eq!(settings.source, "mixer");
        assert_eq!(settings.model, "latent_field");
        assert_eq!(settings.seeds, vec![5, 6]);
        assert_eq!(settings.samples_per_frame, 2048);
        assert_eq!(settings.sample_rate, 48000);
        assert_eq!(settings.capacity, 48000);
        assert_eq!(settings.order, ExtractOrder::NewestFirst);
        assert_eq!(settings.truncation_psi, 0.75);
        assert_eq!(settings.poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_value_enums() {
        let parsed = cli(&["-s", "1", "--order", "oldest-first", "--silence", "skip", "--display", "none"]);
        assert_eq!(parsed.order, ExtractOrder::OldestFirst);
        assert_eq!(parsed.silence, SilencePolicy::Skip);
        assert_eq!(parsed.display, DisplayKind::Headless);
    }

    #[test]
    fn test_capacity_must_hold_a_frame() {
        let err = cli(&["-s", "1", "--capacity", "100"]).settings().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_seeds() {
        assert!(cli(&[]).settings().is_err());
    }

    #[test]
    fn test_config_fills_defaults_only() {
        let mut parsed = cli(&["--sample-rate", "44100", "-p", "0.5"]);
        let cfg: Config = toml::from_str(
            r#"
            [audio]
            source = "loopback"
            sample_rate = 96000
            samples_per_frame = 4096
            [model]
            seeds = [9, 8]
            truncation_psi = 1.0
            "#,
        )
        .unwrap();
        parsed.apply_config(cfg);
        let settings = parsed.settings().unwrap();

        assert_eq!(settings.source, "loopback");
        assert_eq!(settings.seeds, vec![9, 8]);
        assert_eq!(settings.samples_per_frame, 4096);
        // explicit CLI values win
        assert_eq!(settings.sample_rate, 44100);
        assert_eq!(settings.truncation_psi, 0.5);
    }
}
