//! Default configuration constants for voxstate.
//!
//! Shared by the configuration layer and the detector so both agree on
//! the values the detector was tuned with.

/// Default audio sample rate in Hz.
///
/// 4kHz keeps the per-sample convolution cost low while still resolving
/// the speech energy envelope.
pub const SAMPLE_RATE: u32 = 4000;

/// Default number of samples requested from the device per read.
pub const DEVICE_BUFFER_SAMPLES: usize = 1024;

/// Polling interval (ms) when the device has no samples yet.
pub const POLL_INTERVAL_MS: u64 = 10;

/// Trailing window for the RMS energy estimate, in seconds.
pub const RMS_WINDOW_SECS: f64 = 0.25;

/// Length of the Gaussian smoothing kernel, in seconds.
pub const SMOOTH_WINDOW_SECS: f64 = 1.0;

/// Silence after a pause before the speaker is considered stopped, in seconds.
pub const PAUSE_DURATION_SECS: f64 = 2.0;

/// Span of smoothed signal used to calibrate the silence threshold, in seconds.
pub const STARTUP_WINDOW_SECS: f64 = 0.45;

/// Slope of the smoothed log-energy that counts as speech onset or decay.
pub const DERIVATIVE_THRESHOLD: f64 = 0.00025;

/// Calibrated threshold is this multiple of the warm-up maximum.
pub const THRESHOLD_MULTIPLIER: f64 = 1.5;

/// Spread of the smoothing kernel. Samples span `[-3σ, 3σ]`.
pub const KERNEL_SIGMA: f64 = 1.0;

/// Substituted for a zero RMS before taking the logarithm.
///
/// `log10(0.1) = -1.0` acts as the floor of the log-energy signal.
pub const LOG_FLOOR: f64 = 0.1;

/// Default bounded queue depth for the background sink worker.
pub const SINK_QUEUE_DEPTH: usize = 64;

/// Directory the CSV traces are written to.
pub const OUTPUT_DIR: &str = ".";
