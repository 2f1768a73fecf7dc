//! Audio host error types

use thiserror::Error;

/// Errors that can occur while opening or driving a meter input
#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open device: {0}")]
    DeviceOpenFailed(String),

    #[error("No audio input available")]
    InputUnavailable,

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfig(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("WAV file error: {0}")]
    File(#[from] hound::Error),
}
