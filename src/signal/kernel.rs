//! Convolution kernels for the feature engine.

use crate::error::{Result, VoxstateError};
use crate::signal::circular::{CircularBuffer, SampleIndex};
use std::f64::consts::PI;

/// Weights of the first difference `x[i] - x[i-1]`, oldest sample first.
pub const DERIVATIVE_WEIGHTS: [f64; 2] = [-1.0, 1.0];

/// An immutable causal convolution kernel.
///
/// The first weight pairs with the most distant past sample of the window,
/// the last weight with the current sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    weights: Box<[f64]>,
}

impl Kernel {
    /// Builds a normalized Gaussian kernel.
    ///
    /// Samples the Gaussian density at `size` evenly spaced points across
    /// `[-3σ, 3σ]` and divides by their sum so the weights add up to 1.
    ///
    /// # Errors
    /// Returns `ConfigInvalidValue` if `sigma` is not a positive finite number
    /// or `size < 2`.
    pub fn gaussian(sigma: f64, size: usize) -> Result<Self> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(VoxstateError::invalid(
                "detector.kernel_sigma",
                format!("must be a positive number, got {}", sigma),
            ));
        }
        if size < 2 {
            return Err(VoxstateError::invalid(
                "detector.smooth_window_secs",
                format!("smoothing kernel needs at least 2 samples, got {}", size),
            ));
        }

        let half_range = 3.0 * sigma;
        let step = 2.0 * half_range / (size - 1) as f64;
        let scale = 1.0 / (sigma * (2.0 * PI).sqrt());

        let mut weights: Vec<f64> = (0..size)
            .map(|k| {
                let pos = -half_range + k as f64 * step;
                scale * (-(pos * pos) / (2.0 * sigma * sigma)).exp()
            })
            .collect();

        let sum: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= sum;
        }

        Ok(Self {
            weights: weights.into_boxed_slice(),
        })
    }

    /// The unnormalized two-tap first-difference kernel `{-1, 1}`.
    pub fn derivative() -> Self {
        Self {
            weights: Box::new(DERIVATIVE_WEIGHTS),
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weighted sum of the `len()` samples of `signal` ending at `last`.
    pub fn apply(&self, signal: &CircularBuffer, last: SampleIndex) -> f64 {
        self.weights
            .iter()
            .zip(signal.trailing(last, self.weights.len()))
            .map(|(w, x)| w * x)
            .sum()
    }
}
