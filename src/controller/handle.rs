use super::state::{Disposition, ScannerSnapshot};
use crate::error::{Result, ScannerError};
use crate::types::CameraFacing;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intent {
    /// Start on the given camera, or on the preferred one
    Start(Option<CameraFacing>),
    Stop,
    SwitchCamera,
}

pub(crate) enum Command {
    Intent {
        intent: Intent,
        reply: oneshot::Sender<Disposition>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable front door to a running scanner controller
#[derive(Clone)]
pub struct ScannerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<ScannerSnapshot>,
}

impl ScannerHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        snapshots: watch::Receiver<ScannerSnapshot>,
    ) -> Self {
        Self {
            commands,
            snapshots,
        }
    }

    /// Start scanning with `facing`, which also becomes the preferred camera
    pub async fn start(&self, facing: CameraFacing) -> Result<Disposition> {
        self.send_intent(Intent::Start(Some(facing))).await
    }

    /// Start scanning with the preferred camera
    pub async fn start_preferred(&self) -> Result<Disposition> {
        self.send_intent(Intent::Start(None)).await
    }

    pub async fn stop(&self) -> Result<Disposition> {
        self.send_intent(Intent::Stop).await
    }

    pub async fn switch_camera(&self) -> Result<Disposition> {
        self.send_intent(Intent::SwitchCamera).await
    }

    /// Current snapshot
    pub fn snapshot(&self) -> ScannerSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<ScannerSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a snapshot satisfies `predicate`, checking the current one first
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<ScannerSnapshot>
    where
        F: FnMut(&ScannerSnapshot) -> bool,
    {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| ScannerError::ControllerUnavailable)?
            .clone();
        Ok(snapshot)
    }

    /// Stop the controller, releasing any open camera. Resolves after release.
    pub async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).await.is_err() {
            debug!("Scanner controller already stopped");
            return;
        }
        if done.await.is_err() {
            debug!("Scanner controller exited before acknowledging shutdown");
        }
    }

    async fn send_intent(&self, intent: Intent) -> Result<Disposition> {
        let (reply, disposition) = oneshot::channel();
        self.commands
            .send(Command::Intent { intent, reply })
            .await
            .map_err(|_| ScannerError::ControllerUnavailable)?;
        disposition
            .await
            .map_err(|_| ScannerError::ControllerUnavailable)
    }
}
