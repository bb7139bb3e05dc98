//! voxstate - Real-time speech activity detection
//!
//! Turns a 16-bit mono PCM stream into a four-state activity signal
//! (startup, stopped, talking, paused) using windowed RMS energy, Gaussian
//! smoothing of its logarithm and the slope of the smoothed curve.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod activity;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
#[cfg(feature = "cli")]
pub mod output;
pub mod pipeline;
pub mod signal;
pub mod sink;

// Composition root - needs everything
#[cfg(feature = "cli")]
pub mod app;

// Core (source → features → activity → actuator/recorder)
pub use activity::{ActivityMachine, ActivityState, Actuator, CollectingActuator, Transition};
pub use audio::source::{AudioFormat, AudioSource, MockAudioSource};
pub use signal::{CircularBuffer, FeatureEngine, Kernel, SampleIndex, SampleRange, SignalKind};
pub use sink::{BackgroundRecorder, CsvRecorder, CsvSink, DeferredRecorder, SignalRecorder};

// Pipeline
pub use pipeline::{Pipeline, RunSummary, StopSignal};

// Error handling
pub use error::{Result, VoxstateError};

// Config
pub use config::{Config, DetectorParams};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
