use std::sync::Arc;
use std::thread;
use std::time::Duration;

use seedscope::audio::bins::aggregate;
use seedscope::audio::capture::{CaptureCallback, ExtractOrder, RingCapture, SampleFrame};
use seedscope::audio::extract::extract;
use seedscope::audio::spectral::estimate;
use seedscope::display::{FrameSink, NullSink};
use seedscope::latent::{combine, NoiseBasis, SilencePolicy};
use seedscope::pipeline::{AnalysisSettings, Analyzer, CycleOutcome, Pipeline};
use seedscope::render::{RgbImage, Synthesizer};
use seedscope::PipelineError;

struct CountingSynth {
    dim: usize,
    calls: usize,
}

impl Synthesizer for CountingSynth {
    fn latent_dim(&self) -> usize {
        self.dim
    }

    fn synthesize(&mut self, direction: &[f32]) -> anyhow::Result<RgbImage> {
        assert_eq!(direction.len(), self.dim);
        assert!(direction.iter().all(|v| v.is_finite()));
        self.calls += 1;
        Ok(RgbImage::new(4, 4))
    }
}

#[derive(Default)]
struct RecordingSink {
    frames: usize,
    finished: bool,
}

impl FrameSink for RecordingSink {
    fn present(&mut self, image: &RgbImage) -> anyhow::Result<()> {
        assert_eq!(image.pixels.len(), 4 * 4 * 3);
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[test]
fn silent_frame_gives_degenerate_direction() {
    let psd = estimate(&vec![0.0; 2048], 48000, 4).unwrap();
    assert!(psd.iter().all(|&v| v.abs() < 1e-12));

    let weights = aggregate(&psd, 4).unwrap();
    assert_eq!(weights.len(), 4);

    let basis = NoiseBasis::generate(&[1, 2, 3, 4], 512).unwrap();
    assert!(matches!(
        combine(&weights, &basis),
        Err(PipelineError::DegenerateDirection { .. })
    ));
}

#[test]
fn single_weight_selects_normalized_seed() {
    let basis = NoiseBasis::generate(&[10, 20, 30], 512).unwrap();
    let direction = combine(&[1.0, 0.0, 0.0], &basis).unwrap();

    let v0 = &basis.vectors()[0];
    let norm = v0.iter().map(|&v| (v as f64).powi(2)).sum::<f64>().sqrt();
    for (d, &v) in direction.iter().zip(v0) {
        assert!((*d as f64 - v as f64 / norm).abs() < 1e-6);
    }
}

#[test]
fn newest_frames_are_extracted_first() {
    let capture = RingCapture::new(8).unwrap();
    let (a, b, c) = (SampleFrame::new(1, 1), SampleFrame::new(2, 2), SampleFrame::new(3, 3));
    capture.append(a);
    capture.append(b);
    capture.append(c);

    assert_eq!(extract(&capture, 2).unwrap(), vec![c.mono(), b.mono()]);
    assert_eq!(capture.len(), 1);
}

#[test]
fn overflow_drops_oldest() {
    let capture = RingCapture::new(4).unwrap();
    for n in 0..10 {
        capture.append(SampleFrame::new(n, 0));
    }
    assert_eq!(capture.len(), 4);
    assert_eq!(capture.dropped(), 6);
    assert_eq!(capture.pop_oldest().unwrap(), SampleFrame::new(6, 0));
}

#[test]
fn closed_short_buffer_does_not_block() {
    let capture = RingCapture::new(8).unwrap();
    capture.append(SampleFrame::new(1, 1));
    capture.close();
    assert_eq!(extract(&capture, 4), Err(PipelineError::Closed));
}

#[test]
fn end_to_end_from_callback_to_sink() {
    let samples_per_frame = 1024;
    let capture = Arc::new(RingCapture::new(samples_per_frame * 4).unwrap());
    let analyzer = Analyzer::new(&AnalysisSettings {
        samples_per_frame,
        sample_rate: 48000,
        bin_count: 3,
        order: ExtractOrder::NewestFirst,
        poll_interval: Duration::from_millis(1),
    })
    .unwrap();
    let basis = NoiseBasis::generate(&[7, 8, 9], 64).unwrap();
    let synth = CountingSynth { dim: 64, calls: 0 };
    let mut pipeline = Pipeline::new(
        Arc::clone(&capture),
        analyzer,
        basis,
        SilencePolicy::Reuse,
        synth,
        RecordingSink::default(),
    )
    .unwrap();

    // A device-like producer: interleaved f32 stereo in small periods, then
    // the stream ends.
    let producer = {
        let callback = CaptureCallback::new(Arc::clone(&capture));
        let capture = Arc::clone(&capture);
        thread::spawn(move || {
            let mut phase = 0.0f32;
            for _ in 0..64 {
                let period: Vec<f32> = (0..128)
                    .flat_map(|_| {
                        phase += 0.05;
                        [phase.sin() * 0.5, phase.cos() * 0.25]
                    })
                    .collect();
                callback.process_interleaved(&period, 2);
                thread::sleep(Duration::from_micros(200));
            }
            capture.close();
        })
    };

    let mut reports = Vec::new();
    let cycles = pipeline
        .run(None, |report| reports.push(report.clone()))
        .unwrap();
    producer.join().unwrap();

    assert!(cycles >= 1);
    assert_eq!(reports.last().map(|r| r.outcome), Some(CycleOutcome::Closed));
    for report in &reports[..reports.len() - 1] {
        assert_eq!(report.outcome, CycleOutcome::Emitted);
        assert_eq!(report.weights.len(), 3);
        assert!(report.weights.iter().all(|w| w.is_finite() && *w >= 0.0));
    }
    assert_eq!(pipeline.sink().frames as u64, cycles);
    assert!(pipeline.sink().finished);
}

#[test]
fn silence_before_any_sound_is_skipped() {
    let capture = Arc::new(RingCapture::new(4096).unwrap());
    let analyzer = Analyzer::new(&AnalysisSettings {
        samples_per_frame: 2048,
        sample_rate: 48000,
        bin_count: 4,
        order: ExtractOrder::NewestFirst,
        poll_interval: Duration::from_millis(1),
    })
    .unwrap();
    let basis = NoiseBasis::generate(&[1, 2, 3, 4], 16).unwrap();
    let mut pipeline = Pipeline::new(
        Arc::clone(&capture),
        analyzer,
        basis,
        SilencePolicy::Reuse,
        CountingSynth { dim: 16, calls: 0 },
        NullSink::default(),
    )
    .unwrap();

    for _ in 0..2048 {
        capture.append(SampleFrame::default());
    }
    let report = pipeline.run_cycle().unwrap();
    assert_eq!(report.outcome, CycleOutcome::Skipped);
    assert_eq!(pipeline.sink().presented, 0);
}
