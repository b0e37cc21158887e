use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::{PipelineError, Result};

/// Welch power spectral density estimator.
///
/// Matches SciPy's `signal.welch` defaults: periodic Hann window, 50%
/// overlap, constant detrend, density scaling, one-sided output, mean
/// averaging. Segment length is `frame_len / bin_count`.
pub struct WelchEstimator {
    sample_rate: f64,
    planner: FftPlanner<f64>,
}

impl WelchEstimator {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            planner: FftPlanner::new(),
        }
    }

    pub fn estimate(&mut self, frame: &[f64], bin_count: usize) -> Result<Vec<f64>> {
        let segment_size = segment_size(frame.len(), bin_count)?;
        let noverlap = segment_size / 2;
        let step = segment_size - noverlap;
        let segment_count = (frame.len() - noverlap) / step;

        let window = hann_window(segment_size);
        let window_power: f64 = window.iter().map(|w| w * w).sum();
        let scale = 1.0 / (self.sample_rate * window_power);

        let fft = self.planner.plan_fft_forward(segment_size);
        let num_freqs = segment_size / 2 + 1;
        let mut psd = vec![0.0f64; num_freqs];
        let mut buffer = vec![Complex::new(0.0, 0.0); segment_size];

        for seg in 0..segment_count {
            let samples = &frame[seg * step..seg * step + segment_size];
            let mean = samples.iter().sum::<f64>() / segment_size as f64;
            for (slot, (&s, &w)) in buffer.iter_mut().zip(samples.iter().zip(window.iter())) {
                *slot = Complex::new((s - mean) * w, 0.0);
            }
            fft.process(&mut buffer);
            for (acc, c) in psd.iter_mut().zip(buffer.iter()) {
                *acc += c.norm_sqr();
            }
        }

        // Everything but DC (and Nyquist, for even lengths) folds in the
        // negative frequencies.
        let doubled_end = if segment_size % 2 == 0 {
            num_freqs - 1
        } else {
            num_freqs
        };
        for (k, value) in psd.iter_mut().enumerate() {
            *value *= scale / segment_count as f64;
            if k > 0 && k < doubled_end {
                *value *= 2.0;
            }
        }

        Ok(psd)
    }
}

/// One-shot Welch estimate.
pub fn estimate(frame: &[f64], sample_rate: u32, bin_count: usize) -> Result<Vec<f64>> {
    WelchEstimator::new(sample_rate).estimate(frame, bin_count)
}

pub fn segment_size(frame_len: usize, bin_count: usize) -> Result<usize> {
    let size = frame_len.checked_div(bin_count).unwrap_or(0);
    if size < 1 {
        return Err(PipelineError::DegenerateSegment {
            frame_len,
            bin_count,
        });
    }
    Ok(size)
}

/// Number of density values produced for a frame of `frame_len` samples.
pub fn psd_len(frame_len: usize, bin_count: usize) -> Result<usize> {
    Ok(segment_size(frame_len, bin_count)? / 2 + 1)
}

/// Reject frame/bin combinations that cannot produce `bin_count` weights,
/// before any audio flows.
pub fn preflight(frame_len: usize, bin_count: usize) -> Result<usize> {
    let len = psd_len(frame_len, bin_count)?;
    if len < bin_count {
        return Err(PipelineError::InsufficientResolution {
            psd_len: len,
            bin_count,
        });
    }
    Ok(len)
}

/// Periodic Hann window, as used for spectral analysis.
pub fn hann_window(size: usize) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / size as f64).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_hann_window() {
        let w = hann_window(8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-12);
        // periodic: symmetric around the centre, last sample is not zero
        assert!((w[1] - w[7]).abs() < 1e-12);
        assert!(w[7] > 0.0);
        assert_eq!(hann_window(1), vec![1.0]);
    }

    #[test]
    fn test_degenerate_segment() {
        assert_eq!(
            estimate(&[1.0, 2.0, 3.0], 48000, 4),
            Err(PipelineError::DegenerateSegment {
                frame_len: 3,
                bin_count: 4
            })
        );
        assert!(matches!(
            estimate(&[1.0; 16], 48000, 0),
            Err(PipelineError::DegenerateSegment { .. })
        ));
    }

    #[test]
    fn test_output_length() {
        let frame = sine(1000.0, 48000.0, 2048);
        assert_eq!(estimate(&frame, 48000, 4).unwrap().len(), 257);
        assert_eq!(estimate(&frame, 48000, 3).unwrap().len(), 342);
        assert_eq!(estimate(&frame[..2047], 48000, 2047).unwrap().len(), 1);
    }

    #[test]
    fn test_silence_is_zero() {
        let psd = estimate(&vec![0.0; 2048], 48000, 4).unwrap();
        assert!(psd.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_dc_offset_removed() {
        let psd = estimate(&vec![12345.0; 1024], 48000, 2).unwrap();
        assert!(psd.iter().all(|&v| v.abs() < 1e-9));
    }

    #[test]
    fn test_sine_peak_location() {
        let sample_rate = 48000.0;
        // bin spacing is 48000 / 512 = 93.75 Hz; 3000 Hz lands on bin 32
        let frame = sine(3000.0, sample_rate, 2048);
        let psd = estimate(&frame, 48000, 4).unwrap();
        let peak = psd
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 32);
        assert!(psd.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_parseval_density() {
        // Integrated one-sided density of a unit sine is its variance, 0.5.
        let sample_rate = 48000.0;
        let frame = sine(3000.0, sample_rate, 4096);
        let psd = estimate(&frame, 48000, 4).unwrap();
        let df = sample_rate / 1024.0;
        let power: f64 = psd.iter().sum::<f64>() * df;
        assert!((power - 0.5).abs() < 0.01, "power = {}", power);
    }

    #[test]
    fn test_cached_planner_matches_one_shot() {
        let frame = sine(440.0, 48000.0, 2048);
        let mut estimator = WelchEstimator::new(48000);
        let first = estimator.estimate(&frame, 4).unwrap();
        let second = estimator.estimate(&frame, 4).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, estimate(&frame, 48000, 4).unwrap());
    }

    #[test]
    fn test_preflight() {
        assert_eq!(preflight(2048, 4).unwrap(), 257);
        assert!(matches!(
            preflight(2048, 100),
            Err(PipelineError::InsufficientResolution { psd_len: 11, bin_count: 100 })
        ));
        assert!(matches!(
            preflight(2, 4),
            Err(PipelineError::DegenerateSegment { .. })
        ));
    }
}
