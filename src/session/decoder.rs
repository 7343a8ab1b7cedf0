use crate::types::{CameraFacing, ScanFailure};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

/// Opaque session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proof of one open session. Deliberately not `Clone`: whoever holds it is
/// responsible for passing it to [`VideoDecoder::close`].
#[derive(Debug, PartialEq, Eq)]
pub struct SessionHandle {
    id: SessionId,
    facing: CameraFacing,
}

impl SessionHandle {
    pub fn new(id: SessionId, facing: CameraFacing) -> Self {
        Self { id, facing }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEventKind {
    /// A symbol was recognised
    Decoded(String),
    /// A single frame failed; the session keeps decoding
    FrameError(ScanFailure),
    /// The stream died underneath the session
    Ended(ScanFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub kind: SessionEventKind,
}

/// Callback side of a session: how a decoder reports back to the scanner.
///
/// Delivers at most one `Decoded` event per session.
#[derive(Debug, Clone)]
pub struct SessionSink {
    session: SessionId,
    events: mpsc::UnboundedSender<SessionEvent>,
    decoded: Arc<AtomicBool>,
}

impl SessionSink {
    pub fn new(session: SessionId, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            session,
            events,
            decoded: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Whether this session already delivered its decode result
    pub fn has_decoded(&self) -> bool {
        self.decoded.load(Ordering::Acquire)
    }

    /// Report decoded text. Returns false if a result was already delivered.
    pub fn decoded<S: Into<String>>(&self, text: S) -> bool {
        if self
            .decoded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("Session {} already decoded, dropping result", self.session);
            return false;
        }
        self.send(SessionEventKind::Decoded(text.into()));
        true
    }

    pub fn frame_error(&self, failure: ScanFailure) {
        self.send(SessionEventKind::FrameError(failure));
    }

    pub fn ended(&self, failure: ScanFailure) {
        self.send(SessionEventKind::Ended(failure));
    }

    fn send(&self, kind: SessionEventKind) {
        // The scanner may already be gone during teardown
        let _ = self.events.send(SessionEvent {
            session: self.session,
            kind,
        });
    }
}

/// Opens and closes decode sessions against physical cameras
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    /// Acquire the camera for `facing` and start decoding into `sink`.
    ///
    /// Fails with `PermissionDenied` or `DeviceUnavailable`; no handle is
    /// produced in that case and nothing needs closing.
    async fn open(&self, facing: CameraFacing, sink: SessionSink) -> Result<SessionHandle, ScanFailure>;

    /// Stop decoding and release the camera. Resolves only once the hardware
    /// is free. Closing an unknown or already closed handle is a no-op.
    async fn close(&self, handle: &SessionHandle) -> Result<(), ScanFailure>;
}
