//! Seeded latent basis and weight-to-direction normalization.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::{PipelineError, Result};

/// One fixed standard-normal latent vector per seed, in seed order
/// (lowest-frequency bin first).
#[derive(Clone, Debug)]
pub struct NoiseBasis {
    vectors: Vec<Vec<f32>>,
    latent_dim: usize,
}

impl NoiseBasis {
    pub fn generate(seeds: &[u64], latent_dim: usize) -> Result<Self> {
        if seeds.is_empty() {
            return Err(PipelineError::InvalidConfig("at least one seed is required".into()));
        }
        if latent_dim == 0 {
            return Err(PipelineError::InvalidConfig("latent dimension must be non-zero".into()));
        }
        let vectors = seeds
            .par_iter()
            .map(|&seed| gaussian_vector(seed, latent_dim))
            .collect();
        Ok(Self { vectors, latent_dim })
    }

    /// Wrap precomputed vectors; all must share one non-zero length.
    pub fn from_vectors(vectors: Vec<Vec<f32>>) -> Result<Self> {
        let latent_dim = vectors.first().map_or(0, Vec::len);
        if latent_dim == 0 {
            return Err(PipelineError::InvalidConfig("noise basis must not be empty".into()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != latent_dim) {
            return Err(PipelineError::LengthMismatch {
                what: "noise vector length",
                expected: latent_dim,
                actual: bad.len(),
            });
        }
        Ok(Self { vectors, latent_dim })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}

// Box-Muller over a per-seed PRNG, so every seed maps to the same vector on
// every run regardless of thread scheduling.
fn gaussian_vector(seed: u64, len: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = rng.gen();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        out.push((radius * theta.cos()) as f32);
        if out.len() < len {
            out.push((radius * theta.sin()) as f32);
        }
    }
    out
}

/// Blend the basis by `weights` and scale the result to unit L2 norm.
pub fn combine(weights: &[f64], basis: &NoiseBasis) -> Result<Vec<f32>> {
    if weights.len() != basis.len() {
        return Err(PipelineError::LengthMismatch {
            what: "weight count",
            expected: basis.len(),
            actual: weights.len(),
        });
    }

    let mut sum = vec![0.0f64; basis.latent_dim()];
    for (&weight, vector) in weights.iter().zip(basis.vectors()) {
        if weight == 0.0 {
            continue;
        }
        for (acc, &v) in sum.iter_mut().zip(vector) {
            *acc += weight * v as f64;
        }
    }

    let norm = sum.iter().map(|v| v * v).sum::<f64>().sqrt();
    // Also rejects NaN, which compares false
    if !(norm.is_finite() && norm >= f64::MIN_POSITIVE) {
        return Err(PipelineError::DegenerateDirection { norm });
    }

    Ok(sum.iter().map(|v| (v / norm) as f32).collect())
}

/// What to emit when a cycle has no usable direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SilencePolicy {
    /// Repeat the last valid direction (nothing until one exists).
    #[default]
    Reuse,
    /// Emit nothing for the cycle.
    Skip,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resolved<'a> {
    Fresh(&'a [f32]),
    Reused(&'a [f32]),
    Skipped,
}

/// Applies a [`SilencePolicy`] across cycles.
pub struct DirectionTracker {
    policy: SilencePolicy,
    last: Option<Vec<f32>>,
}

impl DirectionTracker {
    pub fn new(policy: SilencePolicy) -> Self {
        Self { policy, last: None }
    }

    /// Fold one `combine` result into the direction to emit. Only
    /// `DegenerateDirection` is absorbed; other errors pass through.
    pub fn resolve(&mut self, combined: Result<Vec<f32>>) -> Result<Resolved<'_>> {
        match combined {
            Ok(direction) => {
                let last = self.last.insert(direction);
                Ok(Resolved::Fresh(last))
            }
            Err(PipelineError::DegenerateDirection { norm }) => {
                log::debug!("Degenerate direction (norm {}), policy {:?}", norm, self.policy);
                match (self.policy, self.last.as_deref()) {
                    (SilencePolicy::Reuse, Some(last)) => Ok(Resolved::Reused(last)),
                    _ => Ok(Resolved::Skipped),
                }
            }
            Err(e) => Err(e),
        }
    }
}
