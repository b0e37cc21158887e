use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

use seedscope::audio::capture::{CaptureCallback, RingCapture};
use seedscope::audio::device;
use seedscope::cli::Cli;
use seedscope::config;
use seedscope::display::ffplay::FfplaySink;
use seedscope::display::{DisplayKind, FrameSink, NullSink};
use seedscope::latent::NoiseBasis;
use seedscope::models::loader;
use seedscope::pipeline::{AnalysisSettings, Analyzer, CycleOutcome, Pipeline};
use seedscope::render::synth::GpuSynthesizer;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    if let Some(path) = config::find_config(cli.config.as_deref()) {
        let cfg = config::load_config(&path)?;
        log::info!("Loaded config from {}", path.display());
        cli.apply_config(cfg);
    }

    if cli.list_devices {
        println!("Audio input devices:");
        for name in device::list_input_devices()? {
            println!("  {}", name);
        }
        return Ok(());
    }

    if cli.list_models {
        println!("Available models:");
        for name in loader::list_models()? {
            match loader::load_model(&name) {
                Ok(m) => println!(
                    "  {:<20} {} (latent dim {})",
                    m.manifest.display_name, m.manifest.description, m.manifest.latent_dim
                ),
                Err(_) => println!("  {}", name),
            }
        }
        return Ok(());
    }

    let settings = cli.settings()?;

    log::info!("seedscope - live audio latent visualiser");
    log::info!("Source: {}", settings.source);
    log::info!("Model: {}", settings.model);
    log::info!("Seeds: {:?}", settings.seeds);
    log::info!(
        "Frame: {} samples, order {:?}, silence {:?}",
        settings.samples_per_frame, settings.order, settings.silence
    );

    // 1. Generator
    let model = loader::load_model(&settings.model)?;
    log::info!("Loaded model {} from {}", model.manifest.display_name, model.origin);
    let overrides = loader::parse_param_overrides(&settings.params);

    log::info!("Initializing GPU...");
    let synth = GpuSynthesizer::new(
        &model,
        settings.width,
        settings.height,
        settings.truncation_psi,
        &overrides,
    )?;

    // 2. Noise basis, one vector per seed
    let basis = NoiseBasis::generate(&settings.seeds, model.manifest.latent_dim)?;

    // 3. Capture
    let capture = Arc::new(RingCapture::new(settings.capacity)?);
    let stream = device::open_input(
        &settings.source,
        settings.sample_rate,
        CaptureCallback::new(Arc::clone(&capture)),
    )?;
    if stream.sample_rate != settings.sample_rate {
        log::warn!(
            "Device runs at {}Hz instead of the requested {}Hz",
            stream.sample_rate, settings.sample_rate
        );
    }

    // 4. Analysis, sized to the seed count
    let analyzer = Analyzer::new(&AnalysisSettings {
        samples_per_frame: settings.samples_per_frame,
        sample_rate: stream.sample_rate,
        bin_count: settings.seeds.len(),
        order: settings.order,
        poll_interval: settings.poll_interval,
    })?;

    // 5. Display
    let sink: Box<dyn FrameSink> = match settings.display {
        DisplayKind::Ffplay => {
            log::info!("Starting ffplay...");
            Box::new(FfplaySink::new(
                settings.width,
                settings.height,
                &format!("seedscope - {}", stream.device_name),
            )?)
        }
        DisplayKind::Headless => Box::new(NullSink::default()),
    };

    let mut pipeline = Pipeline::new(
        Arc::clone(&capture),
        analyzer,
        basis,
        settings.silence,
        synth,
        sink,
    )?;

    // 6. Cycle loop
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("[{elapsed_precise}] {spinner} {msg}")
            .context("Invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut silent = 0u64;
    let cycles = pipeline.run(settings.max_cycles, |report| {
        if matches!(report.outcome, CycleOutcome::Reused | CycleOutcome::Skipped) {
            silent += 1;
        }
        pb.set_message(format!(
            "cycle {} | {} buffered | {} dropped | {} silent",
            report.cycle, report.buffered, report.dropped, silent
        ));
    })?;

    pb.finish_with_message(format!("{} cycles", cycles));

    capture.close();
    drop(stream);

    log::info!("Done! {} cycles, {} frames dropped", cycles, capture.dropped());
    Ok(())
}
