//! Error types shared across the sandbox.

use std::path::PathBuf;

use thiserror::Error;

use crate::calibration::CalibrationError;
use crate::sensor::SensorError;

/// Errors that can abort a sandbox operation.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to load fossil '{name}' from {path}: {source}")]
    FossilLoad {
        name: String,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Calibration failed: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("Sensor failure: {0}")]
    Sensor(#[from] SensorError),
    #[error("Display failure: {0}")]
    Display(String),
    #[error("Depth frame is {actual:?} but the scene is {expected:?}; calibrate or resize the sensor stream")]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
