use crate::error::{PipelineError, Result};

/// Fold a density vector into exactly `bin_count` weights.
///
/// The tail of `psd.len() % bin_count` highest-frequency values is dropped so
/// the remainder splits into equal contiguous groups; group 0 holds the lowest
/// frequencies. Each weight is the sum of its group.
pub fn aggregate(psd: &[f64], bin_count: usize) -> Result<Vec<f64>> {
    let group_len = psd.len().checked_div(bin_count).unwrap_or(0);
    if group_len == 0 {
        return Err(PipelineError::InsufficientResolution {
            psd_len: psd.len(),
            bin_count,
        });
    }

    Ok(psd[..group_len * bin_count]
        .chunks_exact(group_len)
        .map(|group| group.iter().sum())
        .collect())
}
