//! Error types for voxstate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxstateError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio device errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio device {device} unavailable: {message}")]
    DeviceUnavailable { device: String, message: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Persistence errors
    #[error("Signal sink {sink} failed: {message}")]
    SinkFailure { sink: String, message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoxstateError {
    /// Shorthand for a construction-time parameter rejection.
    pub fn invalid(key: &str, message: impl Into<String>) -> Self {
        VoxstateError::ConfigInvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// True for failures that happen before any sample is processed.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            VoxstateError::DeviceUnavailable { .. } | VoxstateError::AudioDeviceNotFound { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxstateError>;
