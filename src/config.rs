use crate::defaults;
use crate::error::{Result, VoxstateError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub detector: DetectorConfig,
    pub output: OutputConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub device_buffer_samples: usize,
    pub poll_interval_ms: u64,
}

/// Detector tuning, in seconds where durations are involved
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    pub rms_window_secs: f64,
    pub smooth_window_secs: f64,
    pub pause_duration_secs: f64,
    pub startup_window_secs: f64,
    pub derivative_threshold: f64,
    pub threshold_multiplier: f64,
    pub kernel_sigma: f64,
}

/// Signal trace output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub background: bool,
    pub queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            device_buffer_samples: defaults::DEVICE_BUFFER_SAMPLES,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            rms_window_secs: defaults::RMS_WINDOW_SECS,
            smooth_window_secs: defaults::SMOOTH_WINDOW_SECS,
            pause_duration_secs: defaults::PAUSE_DURATION_SECS,
            startup_window_secs: defaults::STARTUP_WINDOW_SECS,
            derivative_threshold: defaults::DERIVATIVE_THRESHOLD,
            threshold_multiplier: defaults::THRESHOLD_MULTIPLIER,
            kernel_sigma: defaults::KERNEL_SIGMA,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(defaults::OUTPUT_DIR),
            background: false,
            queue_depth: defaults::SINK_QUEUE_DEPTH,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VoxstateError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                VoxstateError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(VoxstateError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXSTATE_AUDIO_DEVICE → audio.device
    /// - VOXSTATE_OUTPUT_DIR → output.directory
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(device) = std::env::var("VOXSTATE_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(dir) = std::env::var("VOXSTATE_OUTPUT_DIR")
            && !dir.is_empty()
        {
            self.output.directory = PathBuf::from(dir);
        }

        self
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VoxstateError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxstate/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("voxstate").join("config.toml"))
            .ok_or_else(|| VoxstateError::Other("Could not determine config directory".to_string()))
    }
}

/// Detector configuration converted to sample counts.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorParams {
    pub sample_rate: u32,
    pub device_buffer_samples: usize,
    pub rms_window_samples: usize,
    pub smooth_window_samples: usize,
    pub startup_window_samples: usize,
    pub pause_samples: usize,
    pub derivative_threshold: f64,
    pub threshold_multiplier: f64,
    pub kernel_sigma: f64,
}

impl DetectorParams {
    /// Converts every duration with `(sample_rate * secs) as usize` and
    /// rejects combinations the detector cannot run with.
    pub fn from_config(config: &Config) -> Result<Self> {
        let rate = config.audio.sample_rate;
        if rate == 0 {
            return Err(VoxstateError::invalid("audio.sample_rate", "must be positive"));
        }
        let det = &config.detector;
        let samples = |key: &str, secs: f64| -> Result<usize> {
            if !(secs.is_finite() && secs >= 0.0) {
                return Err(VoxstateError::invalid(
                    key,
                    format!("must be a non-negative number of seconds, got {}", secs),
                ));
            }
            Ok((f64::from(rate) * secs) as usize)
        };

        let params = Self {
            sample_rate: rate,
            device_buffer_samples: config.audio.device_buffer_samples,
            rms_window_samples: samples("detector.rms_window_secs", det.rms_window_secs)?,
            smooth_window_samples: samples("detector.smooth_window_secs", det.smooth_window_secs)?,
            startup_window_samples: samples(
                "detector.startup_window_secs",
                det.startup_window_secs,
            )?,
            pause_samples: samples("detector.pause_duration_secs", det.pause_duration_secs)?,
            derivative_threshold: det.derivative_threshold,
            threshold_multiplier: det.threshold_multiplier,
            kernel_sigma: det.kernel_sigma,
        };
        params.validate()?;
        Ok(params)
    }

    /// Checks the constraints that keep every window read inside the buffers.
    pub fn validate(&self) -> Result<()> {
        if self.device_buffer_samples == 0 {
            return Err(VoxstateError::invalid(
                "audio.device_buffer_samples",
                "must be at least 1",
            ));
        }
        if self.rms_window_samples == 0 {
            return Err(VoxstateError::invalid(
                "detector.rms_window_secs",
                "window is shorter than one sample",
            ));
        }
        if self.smooth_window_samples < 2 {
            return Err(VoxstateError::invalid(
                "detector.smooth_window_secs",
                "smoothing needs at least 2 samples",
            ));
        }
        if self.startup_window_samples == 0 {
            return Err(VoxstateError::invalid(
                "detector.startup_window_secs",
                "window is shorter than one sample",
            ));
        }
        if self.rms_window_samples > self.smooth_window_samples {
            return Err(VoxstateError::invalid(
                "detector.rms_window_secs",
                "must not exceed the smoothing window",
            ));
        }
        if self.startup_window_samples > self.smooth_window_samples {
            return Err(VoxstateError::invalid(
                "detector.startup_window_secs",
                "must not exceed the smoothing window",
            ));
        }
        if !(self.derivative_threshold.is_finite() && self.derivative_threshold >= 0.0) {
            return Err(VoxstateError::invalid(
                "detector.derivative_threshold",
                "must be a non-negative number",
            ));
        }
        if !self.threshold_multiplier.is_finite() {
            return Err(VoxstateError::invalid(
                "detector.threshold_multiplier",
                "must be a finite number",
            ));
        }
        if !(self.kernel_sigma.is_finite() && self.kernel_sigma > 0.0) {
            return Err(VoxstateError::invalid(
                "detector.kernel_sigma",
                "must be a positive number",
            ));
        }
        Ok(())
    }

    /// Capacity shared by all signal buffers: one device read plus the
    /// longest trailing window.
    pub fn buffer_capacity(&self) -> usize {
        self.device_buffer_samples + self.smooth_window_samples
    }

    /// Samples needed before the activity machine starts evaluating.
    pub fn warm_up_samples(&self) -> usize {
        self.smooth_window_samples + self.startup_window_samples
    }
}
