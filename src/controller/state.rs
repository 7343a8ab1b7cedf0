use crate::session::SessionId;
use crate::types::{CameraFacing, FailureKind, ScanFailure, ScanResult};
use serde::Serialize;

/// Scanner lifecycle states
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    Starting {
        facing: CameraFacing,
    },
    Scanning {
        facing: CameraFacing,
        session: SessionId,
    },
    Switching {
        from: CameraFacing,
        to: CameraFacing,
    },
    /// Waiting for a close to complete
    Stopping,
    Stopped {
        reason: Option<ScanFailure>,
    },
}

impl ControllerState {
    pub fn name(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Starting { .. } => "starting",
            ControllerState::Scanning { .. } => "scanning",
            ControllerState::Switching { .. } => "switching",
            ControllerState::Stopping => "stopping",
            ControllerState::Stopped { .. } => "stopped",
        }
    }

    /// A hardware operation is in flight
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            ControllerState::Starting { .. }
                | ControllerState::Switching { .. }
                | ControllerState::Stopping
        )
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self, ControllerState::Scanning { .. })
    }

    /// Camera currently opened or being opened
    pub fn active_facing(&self) -> Option<CameraFacing> {
        match self {
            ControllerState::Starting { facing } | ControllerState::Scanning { facing, .. } => {
                Some(*facing)
            }
            ControllerState::Switching { to, .. } => Some(*to),
            _ => None,
        }
    }
}

/// Everything the view renders, replaced as a whole on every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannerSnapshot {
    pub state: ControllerState,
    pub preferred_facing: CameraFacing,
    pub result: Option<ScanResult>,
    pub failure: Option<ScanFailure>,
    pub capability_supported: bool,
}

impl ScannerSnapshot {
    pub(crate) fn initial(preferred_facing: CameraFacing, capability_supported: bool) -> Self {
        if capability_supported {
            Self {
                state: ControllerState::Idle,
                preferred_facing,
                result: None,
                failure: None,
                capability_supported,
            }
        } else {
            let failure = ScanFailure::capability_unsupported();
            Self {
                state: ControllerState::Stopped {
                    reason: Some(failure.clone()),
                },
                preferred_facing,
                result: None,
                failure: Some(failure),
                capability_supported,
            }
        }
    }

    /// Failure that currently blocks switching cameras
    pub fn terminal_failure(&self) -> Option<FailureKind> {
        if !self.capability_supported {
            return Some(FailureKind::CapabilityUnsupported);
        }
        match &self.state {
            ControllerState::Stopped {
                reason: Some(failure),
            } if failure.kind.is_terminal() => Some(failure.kind),
            _ => None,
        }
    }

    pub fn can_start(&self) -> bool {
        self.capability_supported
            && matches!(
                self.state,
                ControllerState::Idle | ControllerState::Stopped { .. }
            )
    }

    pub fn can_stop(&self) -> bool {
        matches!(
            self.state,
            ControllerState::Scanning { .. }
                | ControllerState::Starting { .. }
                | ControllerState::Switching { .. }
        )
    }

    pub fn can_switch(&self) -> bool {
        !self.state.is_transitioning() && self.terminal_failure().is_none()
    }
}

/// How the controller treated one intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acted on immediately
    Accepted,
    /// Recorded against the in-flight transition and applied when it resolves
    Deferred,
    /// Not applicable in the current state; nothing changed
    Ignored,
    /// Refused because of a failure the user has to clear first
    Rejected(FailureKind),
}
