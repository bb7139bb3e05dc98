//! Streaming feature engine.
//!
//! Turns raw PCM samples into four derived signals, one index at a time:
//!
//! ```text
//! raw ──▶ rms ──▶ log10 ──▶ gaussian smooth ──▶ first difference
//! ```
//!
//! Every stage reads the previous stage through a trailing window, so for
//! each index all five values are produced in order before moving on.

use crate::config::DetectorParams;
use crate::defaults;
use crate::error::{Result, VoxstateError};
use crate::signal::circular::{CircularBuffer, SampleIndex, SampleRange};
use crate::signal::kernel::Kernel;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;

/// The five signals kept by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Raw,
    Rms,
    LogRms,
    Smoothed,
    Derivative,
}

impl SignalKind {
    /// All signals in pipeline order.
    pub const ALL: [SignalKind; 5] = [
        SignalKind::Raw,
        SignalKind::Rms,
        SignalKind::LogRms,
        SignalKind::Smoothed,
        SignalKind::Derivative,
    ];

    /// File name of the CSV trace for this signal.
    pub fn file_name(self) -> &'static str {
        match self {
            SignalKind::Raw => "samples.csv",
            SignalKind::Rms => "rms.csv",
            SignalKind::LogRms => "log.csv",
            SignalKind::Smoothed => "smoothed.csv",
            SignalKind::Derivative => "derivative.csv",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Raw => "raw",
            SignalKind::Rms => "rms",
            SignalKind::LogRms => "log_rms",
            SignalKind::Smoothed => "smoothed",
            SignalKind::Derivative => "derivative",
        };
        f.write_str(name)
    }
}

/// Root mean square of the `window` samples ending at `last`.
pub fn rms_step(signal: &CircularBuffer, last: SampleIndex, window: usize) -> f64 {
    let sum: f64 = signal.trailing(last, window).map(|x| x * x).sum();
    (sum / window as f64).sqrt()
}

/// `log10(rms)`, with a non-positive RMS replaced by [`defaults::LOG_FLOOR`].
pub fn log_rms(rms: f64) -> f64 {
    if rms > 0.0 {
        rms.log10()
    } else {
        defaults::LOG_FLOOR.log10()
    }
}

/// Owns the five signal buffers and advances them as samples arrive.
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    raw: CircularBuffer,
    rms: CircularBuffer,
    log_rms: CircularBuffer,
    smoothed: CircularBuffer,
    derivative: CircularBuffer,
    rms_window: usize,
    smoothing: Kernel,
    differentiator: Kernel,
    next_index: SampleIndex,
}

impl FeatureEngine {
    /// Creates an engine whose buffers all hold `capacity` samples.
    ///
    /// # Errors
    /// Returns `ConfigInvalidValue` if `rms_window` is zero or either window
    /// does not fit in `capacity`.
    pub fn new(capacity: usize, rms_window: usize, smoothing: Kernel) -> Result<Self> {
        if rms_window == 0 {
            return Err(VoxstateError::invalid(
                "detector.rms_window_secs",
                "RMS window must cover at least one sample",
            ));
        }
        let needed = rms_window.max(smoothing.len());
        let capacity = NonZeroUsize::new(capacity)
            .filter(|c| c.get() >= needed)
            .ok_or_else(|| {
                VoxstateError::invalid(
                    "audio.device_buffer_samples",
                    format!(
                        "buffer capacity {} is smaller than the {} sample window",
                        capacity, needed
                    ),
                )
            })?;

        Ok(Self {
            raw: CircularBuffer::new(capacity),
            rms: CircularBuffer::new(capacity),
            log_rms: CircularBuffer::new(capacity),
            smoothed: CircularBuffer::new(capacity),
            derivative: CircularBuffer::new(capacity),
            rms_window,
            smoothing,
            differentiator: Kernel::derivative(),
            next_index: 0,
        })
    }

    /// Creates an engine sized for `params`.
    pub fn from_params(params: &DetectorParams) -> Result<Self> {
        let smoothing = Kernel::gaussian(params.kernel_sigma, params.smooth_window_samples)?;
        Self::new(params.buffer_capacity(), params.rms_window_samples, smoothing)
    }

    /// Appends `samples` at the next logical indices and computes every
    /// derived signal for them.
    ///
    /// Returns the range of indices that were written. `samples` may be
    /// empty, in which case the range is empty too.
    pub fn advance(&mut self, samples: &[i16]) -> SampleRange {
        let begin = self.next_index;
        let end = begin + samples.len() as u64;

        for (i, &sample) in (begin..end).zip(samples) {
            self.raw.write(i, f64::from(sample));
        }

        for i in begin..end {
            let rms = rms_step(&self.raw, i, self.rms_window);
            self.rms.write(i, rms);

            self.log_rms.write(i, log_rms(rms));

            let smoothed = self.smoothing.apply(&self.log_rms, i);
            self.smoothed.write(i, smoothed);

            let derivative = self.differentiator.apply(&self.smoothed, i);
            self.derivative.write(i, derivative);
        }

        self.next_index = end;
        begin..end
    }

    /// Total number of samples processed so far.
    pub fn processed(&self) -> u64 {
        self.next_index
    }

    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    pub fn rms_window(&self) -> usize {
        self.rms_window
    }

    pub fn smoothing_kernel(&self) -> &Kernel {
        &self.smoothing
    }

    /// Buffer holding the given signal.
    pub fn signal(&self, kind: SignalKind) -> &CircularBuffer {
        match kind {
            SignalKind::Raw => &self.raw,
            SignalKind::Rms => &self.rms,
            SignalKind::LogRms => &self.log_rms,
            SignalKind::Smoothed => &self.smoothed,
            SignalKind::Derivative => &self.derivative,
        }
    }

    pub fn smoothed(&self) -> &CircularBuffer {
        &self.smoothed
    }

    pub fn derivative(&self) -> &CircularBuffer {
        &self.derivative
    }
}
