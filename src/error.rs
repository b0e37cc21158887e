use thiserror::Error;

/// Failures of the audio-to-latent pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// Pop or take on a buffer holding fewer frames than requested.
    #[error("capture buffer is empty")]
    Empty,

    /// Spectral segment size rounds to zero (too many bins for the frame).
    #[error("segment size is zero: {frame_len} samples cannot be split into {bin_count} segments")]
    DegenerateSegment { frame_len: usize, bin_count: usize },

    /// Aggregation would leave empty bins.
    #[error("insufficient spectral resolution: {psd_len} density values for {bin_count} bins")]
    InsufficientResolution { psd_len: usize, bin_count: usize },

    /// Weighted latent sum has zero (or non-finite) norm, e.g. during silence.
    #[error("weighted latent sum has no direction (norm {norm})")]
    DegenerateDirection { norm: f64 },

    #[error("{what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The capture buffer was closed while a consumer was waiting.
    #[error("capture buffer closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
