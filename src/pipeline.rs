//! Per-cycle analysis and emission loop.

use anyhow::Context as _;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::bins::aggregate;
use crate::audio::capture::{ExtractOrder, RingCapture};
use crate::audio::extract::FrameExtractor;
use crate::audio::spectral::{preflight, WelchEstimator};
use crate::display::FrameSink;
use crate::error::{PipelineError, Result};
use crate::latent::{combine, DirectionTracker, NoiseBasis, Resolved, SilencePolicy};
use crate::render::Synthesizer;

/// Where a cycle currently is. Cycles run
/// `WaitForSamples -> Extract -> Analyze -> Aggregate -> Normalize -> Emit`
/// and then start over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    WaitForSamples,
    Extract,
    Analyze,
    Aggregate,
    Normalize,
    Emit,
}

#[derive(Clone, Debug)]
pub struct AnalysisSettings {
    pub samples_per_frame: usize,
    pub sample_rate: u32,
    pub bin_count: usize,
    pub order: ExtractOrder,
    pub poll_interval: Duration,
}

/// Extract, estimate and aggregate: audio in, one weight vector out.
pub struct Analyzer {
    extractor: FrameExtractor,
    estimator: WelchEstimator,
    bin_count: usize,
}

impl Analyzer {
    /// Fails fast on frame/bin combinations that could never produce a full
    /// weight vector.
    pub fn new(settings: &AnalysisSettings) -> Result<Self> {
        preflight(settings.samples_per_frame, settings.bin_count)?;
        Ok(Self {
            extractor: FrameExtractor::new(
                settings.samples_per_frame,
                settings.order,
                settings.poll_interval,
            )?,
            estimator: WelchEstimator::new(settings.sample_rate),
            bin_count: settings.bin_count,
        })
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn frame_count(&self) -> usize {
        self.extractor.frame_count()
    }

    /// Blocks until a full frame is available.
    pub fn next_weights(&mut self, capture: &RingCapture) -> Result<Vec<f64>> {
        self.wait(capture)?;
        let mono = self.extract(capture)?;
        let psd = self.estimate(&mono)?;
        self.aggregate(&psd)
    }

    pub fn wait(&self, capture: &RingCapture) -> Result<()> {
        self.extractor.wait_for_samples(capture)
    }

    pub fn extract(&mut self, capture: &RingCapture) -> Result<Vec<f64>> {
        let mono = self.extractor.take_mono(capture)?;
        log::debug!("{} samples left in buffer", capture.len());
        Ok(mono)
    }

    pub fn estimate(&mut self, mono: &[f64]) -> Result<Vec<f64>> {
        let psd = self.estimator.estimate(mono, self.bin_count)?;
        log::debug!("Raw periodogram length: {}", psd.len());
        Ok(psd)
    }

    pub fn aggregate(&self, psd: &[f64]) -> Result<Vec<f64>> {
        let weights = aggregate(psd, self.bin_count)?;
        debug_assert_eq!(weights.len(), self.bin_count);
        Ok(weights)
    }

    /// Estimate and aggregate an already extracted frame.
    pub fn analyze(&mut self, mono: &[f64]) -> Result<Vec<f64>> {
        let psd = self.estimate(mono)?;
        self.aggregate(&psd)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new direction was rendered and presented.
    Emitted,
    /// Silence; the previous direction was rendered again.
    Reused,
    /// Silence with nothing to fall back on; no frame this cycle.
    Skipped,
    /// The capture buffer closed; no further cycles will run.
    Closed,
}

#[derive(Clone, Debug)]
pub struct CycleReport {
    pub cycle: u64,
    pub outcome: CycleOutcome,
    pub weights: Vec<f64>,
    pub buffered: usize,
    pub dropped: u64,
}

pub struct Pipeline<S: Synthesizer, K: FrameSink> {
    capture: Arc<RingCapture>,
    analyzer: Analyzer,
    basis: NoiseBasis,
    tracker: DirectionTracker,
    synth: S,
    sink: K,
    stage: Stage,
    cycles: u64,
    last_dropped: u64,
}

impl<S: Synthesizer, K: FrameSink> Pipeline<S, K> {
    pub fn new(
        capture: Arc<RingCapture>,
        analyzer: Analyzer,
        basis: NoiseBasis,
        policy: SilencePolicy,
        synth: S,
        sink: K,
    ) -> Result<Self> {
        // A smaller buffer evicts frames before a full one can accumulate.
        if capture.capacity() < analyzer.frame_count() {
            return Err(PipelineError::InvalidConfig(format!(
                "capture capacity ({}) must hold at least one analysis frame ({})",
                capture.capacity(),
                analyzer.frame_count()
            )));
        }
        if basis.len() != analyzer.bin_count() {
            return Err(PipelineError::LengthMismatch {
                what: "noise basis size",
                expected: analyzer.bin_count(),
                actual: basis.len(),
            });
        }
        if basis.latent_dim() != synth.latent_dim() {
            return Err(PipelineError::LengthMismatch {
                what: "latent dimension",
                expected: synth.latent_dim(),
                actual: basis.latent_dim(),
            });
        }
        Ok(Self {
            capture,
            analyzer,
            basis,
            tracker: DirectionTracker::new(policy),
            synth,
            sink,
            stage: Stage::WaitForSamples,
            cycles: 0,
            last_dropped: 0,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run one full cycle. Blocks while waiting for audio and while the
    /// synthesizer renders.
    pub fn run_cycle(&mut self) -> anyhow::Result<CycleReport> {
        self.stage = Stage::WaitForSamples;
        match self.analyzer.wait(&self.capture) {
            Ok(()) => {}
            Err(PipelineError::Closed) => return Ok(self.report(CycleOutcome::Closed, Vec::new())),
            Err(e) => return Err(e.into()),
        }

        self.stage = Stage::Extract;
        let mono = self.analyzer.extract(&self.capture)?;

        self.stage = Stage::Analyze;
        let psd = self.analyzer.estimate(&mono)?;

        self.stage = Stage::Aggregate;
        let weights = self.analyzer.aggregate(&psd)?;
        log::debug!("Weights: {:?}", weights);

        self.stage = Stage::Normalize;
        let resolved = self.tracker.resolve(combine(&weights, &self.basis))?;

        self.stage = Stage::Emit;
        let (direction, outcome) = match resolved {
            Resolved::Fresh(direction) => (direction, CycleOutcome::Emitted),
            Resolved::Reused(direction) => (direction, CycleOutcome::Reused),
            Resolved::Skipped => {
                self.cycles += 1;
                return Ok(self.report(CycleOutcome::Skipped, weights));
            }
        };

        let image = self
            .synth
            .synthesize(direction)
            .with_context(|| format!("Synthesis failed in cycle {}", self.cycles))?;
        self.sink.present(&image).context("Failed to present frame")?;

        self.cycles += 1;
        Ok(self.report(outcome, weights))
    }

    /// Loop until `limit` cycles have run, the capture closes, or an error
    /// occurs. Returns the number of cycles completed. The sink is finished
    /// on every exit path.
    pub fn run<F>(&mut self, limit: Option<u64>, on_cycle: F) -> anyhow::Result<u64>
    where
        F: FnMut(&CycleReport),
    {
        let looped = self.run_cycles(limit, on_cycle);
        let finished = self.sink.finish();
        let cycles = looped?;
        finished?;
        Ok(cycles)
    }

    fn run_cycles<F>(&mut self, limit: Option<u64>, mut on_cycle: F) -> anyhow::Result<u64>
    where
        F: FnMut(&CycleReport),
    {
        while limit.map_or(true, |limit| self.cycles < limit) {
            let report = self
                .run_cycle()
                .with_context(|| format!("Cycle {} failed at {:?}", self.cycles, self.stage))?;
            on_cycle(&report);
            if report.outcome == CycleOutcome::Closed {
                log::info!("Capture closed after {} cycles", self.cycles);
                break;
            }
        }
        Ok(self.cycles)
    }

    fn report(&mut self, outcome: CycleOutcome, weights: Vec<f64>) -> CycleReport {
        let dropped = self.capture.dropped();
        if dropped > self.last_dropped {
            log::debug!(
                "Capture buffer full, dropped {} frames since last cycle",
                dropped - self.last_dropped
            );
            self.last_dropped = dropped;
        }
        CycleReport {
            cycle: self.cycles,
            outcome,
            weights,
            buffered: self.capture.len(),
            dropped,
        }
    }
}
