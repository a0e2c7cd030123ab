//! Discrete Gaussian kernel for the separable Kawase blur.

use std::f32::consts::PI;

/// Number of taps per axis. The blur shader declares its arrays with this length.
pub const SAMPLE_COUNT: usize = 15;

/// Distance between neighbouring taps in texture coordinates.
pub const DEFAULT_SIGMA_STEP: f32 = 0.0006;

/// Offsets and normalised weights for a single blur axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisKernel {
    pub offsets: Vec<[f32; 2]>,
    pub weights: Vec<f32>,
}

impl AxisKernel {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Horizontal and vertical kernels, immutable once generated.
#[derive(Debug, Clone, PartialEq)]
pub struct BlurKernel {
    pub horizontal: AxisKernel,
    pub vertical: AxisKernel,
}

impl BlurKernel {
    pub fn sample_count(&self) -> usize {
        self.horizontal.len()
    }
}

impl Default for BlurKernel {
    fn default() -> Self {
        generate(SAMPLE_COUNT, DEFAULT_SIGMA_STEP)
    }
}

/// Computes centred Gaussian taps `p_i = (i - (n-1)/2) * sigma_step` with
/// weights `exp(-p²/2)/sqrt(2π)` normalised to sum to one.
///
/// A zero sample count is a caller bug; release builds return empty kernels.
pub fn generate(sample_count: usize, sigma_step: f32) -> BlurKernel {
    debug_assert!(sample_count > 0, "blur kernel needs at least one sample");

    let centre = (sample_count as f32 - 1.0) * 0.5;
    let positions: Vec<f32> = (0..sample_count)
        .map(|index| (index as f32 - centre) * sigma_step)
        .collect();
    let weights = normalised_weights(&positions);

    BlurKernel {
        horizontal: AxisKernel {
            offsets: positions.iter().map(|&p| [p, 0.0]).collect(),
            weights: weights.clone(),
        },
        vertical: AxisKernel {
            offsets: positions.iter().map(|&p| [0.0, p]).collect(),
            weights,
        },
    }
}

fn normalised_weights(positions: &[f32]) -> Vec<f32> {
    let norm = (2.0 * PI).sqrt();
    let raw: Vec<f64> = positions
        .iter()
        .map(|&p| f64::from((-p * p / 2.0).exp() / norm))
        .collect();
    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        return vec![0.0; positions.len()];
    }
    raw.iter().map(|&w| (w / total) as f32).collect()
}
