use crate::types::{FailureKind, ScanFailure};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Scanner controller is no longer running")]
    ControllerUnavailable,

    #[error("System error: {message}")]
    System { message: String },
}

impl ScannerError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Errors raised by frame sources while acquiring or reading a camera
#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("Permission denied for camera device {device}")]
    PermissionDenied { device: String },

    #[error("Camera device {device} not found")]
    DeviceNotFound { device: String },

    #[error("Camera device {device} is busy")]
    DeviceBusy { device: String },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Capture stream error: {details}")]
    CaptureStream { details: String },
}

impl CameraError {
    /// Failure category reported to the scanner for this error
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            CameraError::PermissionDenied { .. } => FailureKind::PermissionDenied,
            CameraError::DeviceNotFound { .. }
            | CameraError::DeviceBusy { .. }
            | CameraError::Configuration { .. }
            | CameraError::CaptureStream { .. } => FailureKind::DeviceUnavailable,
        }
    }
}

impl From<&CameraError> for ScanFailure {
    fn from(error: &CameraError) -> Self {
        ScanFailure::new(error.failure_kind(), error.to_string())
    }
}

impl From<CameraError> for ScanFailure {
    fn from(error: CameraError) -> Self {
        ScanFailure::from(&error)
    }
}

/// A single frame could not be decoded
#[derive(Error, Debug, Clone)]
#[error("Decode error: {message}")]
pub struct DecodeError {
    pub message: String,
}

impl DecodeError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<DecodeError> for ScanFailure {
    fn from(error: DecodeError) -> Self {
        ScanFailure::new(FailureKind::DecodeError, error.message)
    }
}

pub type Result<T> = std::result::Result<T, ScannerError>;
