use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which physical camera a session targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    /// User-facing camera
    Front,
    /// Environment-facing camera
    #[default]
    Back,
}

impl CameraFacing {
    /// The other camera
    pub fn opposite(self) -> Self {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraFacing::Front => "front",
            CameraFacing::Back => "back",
        }
    }
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraFacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" | "user" => Ok(CameraFacing::Front),
            "back" | "rear" | "environment" => Ok(CameraFacing::Back),
            other => Err(format!("unknown camera facing '{}'", other)),
        }
    }
}

/// Text decoded from a QR symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub text: String,
    pub captured_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            captured_at: Utc::now(),
        }
    }
}

/// Failure categories surfaced to the view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The environment exposes no camera access at all
    CapabilityUnsupported,
    /// Camera access was refused
    PermissionDenied,
    /// No matching camera exists or the hardware is busy
    DeviceUnavailable,
    /// A single frame could not be decoded
    DecodeError,
    /// An internal lifecycle step failed (e.g. close)
    LifecycleError,
}

impl FailureKind {
    /// Terminal failures end the attempt and disable switching until a new start
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FailureKind::CapabilityUnsupported | FailureKind::PermissionDenied
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::CapabilityUnsupported => "capability_unsupported",
            FailureKind::PermissionDenied => "permission_denied",
            FailureKind::DeviceUnavailable => "device_unavailable",
            FailureKind::DecodeError => "decode_error",
            FailureKind::LifecycleError => "lifecycle_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure recorded on the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ScanFailure {
    pub fn new<S: Into<String>>(kind: FailureKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn capability_unsupported() -> Self {
        Self::new(
            FailureKind::CapabilityUnsupported,
            "Camera access is not supported in this environment",
        )
    }

    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::new(FailureKind::PermissionDenied, message)
    }

    pub fn device_unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(FailureKind::DeviceUnavailable, message)
    }

    pub fn decode_error<S: Into<String>>(message: S) -> Self {
        Self::new(FailureKind::DecodeError, message)
    }

    pub fn lifecycle<S: Into<String>>(message: S) -> Self {
        Self::new(FailureKind::LifecycleError, message)
    }
}

impl fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_opposite_and_default() {
        assert_eq!(CameraFacing::default(), CameraFacing::Back);
        assert_eq!(CameraFacing::Back.opposite(), CameraFacing::Front);
        assert_eq!(CameraFacing::Front.opposite().opposite(), CameraFacing::Front);
    }

    #[test]
    fn test_facing_parse() {
        assert_eq!("FRONT".parse::<CameraFacing>(), Ok(CameraFacing::Front));
        assert_eq!("environment".parse::<CameraFacing>(), Ok(CameraFacing::Back));
        assert!("side".parse::<CameraFacing>().is_err());
    }

    #[test]
    fn test_failure_kind_policy() {
        assert!(FailureKind::PermissionDenied.is_terminal());
        assert!(FailureKind::CapabilityUnsupported.is_terminal());
        assert!(!FailureKind::DeviceUnavailable.is_terminal());
        assert!(!FailureKind::DecodeError.is_terminal());
    }

    #[test]
    fn test_failure_serializes_kind_in_snake_case() {
        let failure = ScanFailure::permission_denied("denied by user");
        let json = serde_json::to_string(&failure).unwrap();
        assert!(json.contains("\"permission_denied\""));
        assert_eq!(failure.to_string(), "permission_denied: denied by user");
    }
}
