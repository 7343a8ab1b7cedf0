use super::handle::{Command, Intent};
use super::state::{ControllerState, Disposition, ScannerSnapshot};
use crate::session::{SessionEvent, SessionEventKind, SessionHandle, SessionId, SessionSink, VideoDecoder};
use crate::types::{CameraFacing, FailureKind, ScanFailure, ScanResult};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of the single in-flight hardware operation
enum OpOutcome {
    Opened {
        facing: CameraFacing,
        result: Result<SessionHandle, ScanFailure>,
    },
    Switched {
        to: CameraFacing,
        closed: Result<(), ScanFailure>,
        /// `None` when a stop arrived before the new camera was requested
        opened: Option<Result<SessionHandle, ScanFailure>>,
    },
    Closed {
        result: Result<(), ScanFailure>,
        reason: Option<ScanFailure>,
    },
}

/// The scanner state machine.
///
/// Runs as a single task; every transition happens on it, so the snapshot,
/// the owned session handle and the in-flight operation never need locking.
/// At most one hardware operation is pending at a time, which is what keeps
/// two sessions from ever being open together.
pub(crate) struct ScannerController {
    decoder: Arc<dyn VideoDecoder>,
    decode_errors_fatal: bool,
    snapshot: ScannerSnapshot,
    publisher: watch::Sender<ScannerSnapshot>,
    active: Option<SessionHandle>,
    pending: Option<BoxFuture<'static, OpOutcome>>,
    op_cancel: CancellationToken,
    stop_requested: bool,
    commands: mpsc::Receiver<Command>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl ScannerController {
    pub(crate) fn new(
        decoder: Arc<dyn VideoDecoder>,
        decode_errors_fatal: bool,
        snapshot: ScannerSnapshot,
        publisher: watch::Sender<ScannerSnapshot>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            decoder,
            decode_errors_fatal,
            snapshot,
            publisher,
            active: None,
            pending: None,
            op_cancel: CancellationToken::new(),
            stop_requested: false,
            commands,
            events_tx,
            events_rx,
        }
    }

    /// Process intents and session events until shutdown or until every
    /// handle is dropped, then release the camera.
    pub(crate) async fn run(mut self) {
        info!(
            "Scanner controller running (preferred camera: {})",
            self.snapshot.preferred_facing
        );

        let shutdown_reply = loop {
            tokio::select! {
                biased;
                outcome = next_outcome(&mut self.pending) => self.on_outcome(outcome),
                Some(event) = self.events_rx.recv() => self.on_session_event(event),
                command = self.commands.recv() => match command {
                    Some(Command::Intent { intent, reply }) => {
                        let disposition = self.on_intent(intent);
                        let _ = reply.send(disposition);
                    }
                    Some(Command::Shutdown { reply }) => break Some(reply),
                    None => break None,
                },
            }
        };

        self.teardown().await;

        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
        info!("Scanner controller stopped");
    }

    fn on_intent(&mut self, intent: Intent) -> Disposition {
        let disposition = match intent {
            Intent::Start(facing) => {
                let facing = facing.unwrap_or(self.snapshot.preferred_facing);
                self.start(facing)
            }
            Intent::Stop => self.stop(),
            Intent::SwitchCamera => self.switch_camera(),
        };
        debug!(
            "Intent {:?} in state {}: {:?}",
            intent,
            self.snapshot.state.name(),
            disposition
        );
        disposition
    }

    fn start(&mut self, facing: CameraFacing) -> Disposition {
        if !self.snapshot.capability_supported {
            return self.reject_unsupported();
        }

        match self.snapshot.state {
            ControllerState::Idle | ControllerState::Stopped { .. } => {}
            ControllerState::Scanning { .. } => return Disposition::Ignored,
            ControllerState::Starting { .. }
            | ControllerState::Switching { .. }
            | ControllerState::Stopping => {
                debug!("Start ignored while {}", self.snapshot.state.name());
                return Disposition::Ignored;
            }
        }

        info!("Starting scanner on {} camera", facing);
        self.snapshot.preferred_facing = facing;
        self.snapshot.state = ControllerState::Starting { facing };
        self.begin_op();
        self.pending = Some(self.open_op(facing));
        self.publish();
        Disposition::Accepted
    }

    fn stop(&mut self) -> Disposition {
        match self.snapshot.state {
            ControllerState::Scanning { .. } => {
                info!("Stopping scanner");
                self.close_active(None);
                self.publish();
                Disposition::Accepted
            }
            ControllerState::Starting { .. } | ControllerState::Switching { .. } => {
                if self.stop_requested {
                    return Disposition::Ignored;
                }
                info!(
                    "Stop requested while {}; applying once the camera settles",
                    self.snapshot.state.name()
                );
                self.stop_requested = true;
                self.op_cancel.cancel();
                Disposition::Deferred
            }
            ControllerState::Idle | ControllerState::Stopping | ControllerState::Stopped { .. } => {
                Disposition::Ignored
            }
        }
    }

    fn switch_camera(&mut self) -> Disposition {
        if let Some(kind) = self.snapshot.terminal_failure() {
            if kind == FailureKind::CapabilityUnsupported {
                return self.reject_unsupported();
            }
            debug!("Switch rejected until scanning is restarted ({})", kind);
            return Disposition::Rejected(kind);
        }

        match self.snapshot.state {
            ControllerState::Scanning { facing, .. } => {
                let to = facing.opposite();
                let Some(handle) = self.active.take() else {
                    return self.lost_handle();
                };

                info!("Switching camera {} -> {}", facing, to);
                self.snapshot.preferred_facing = to;
                self.snapshot.state = ControllerState::Switching { from: facing, to };
                self.begin_op();
                self.pending = Some(self.switch_op(handle, to));
                self.publish();
                Disposition::Accepted
            }
            ControllerState::Idle | ControllerState::Stopped { .. } => {
                self.snapshot.preferred_facing = self.snapshot.preferred_facing.opposite();
                info!(
                    "Preferred camera set to {}",
                    self.snapshot.preferred_facing
                );
                self.publish();
                Disposition::Accepted
            }
            ControllerState::Starting { .. }
            | ControllerState::Switching { .. }
            | ControllerState::Stopping => {
                debug!("Switch ignored while {}", self.snapshot.state.name());
                Disposition::Ignored
            }
        }
    }

    fn on_outcome(&mut self, outcome: OpOutcome) {
        let stop_requested = std::mem::take(&mut self.stop_requested);

        match outcome {
            OpOutcome::Opened { facing, result } => self.on_opened(facing, result, stop_requested),
            OpOutcome::Switched { to, closed, opened } => {
                if let Err(failure) = closed {
                    error!("Closing previous camera failed: {}", failure);
                    self.snapshot.failure = Some(failure);
                }
                match opened {
                    Some(result) => self.on_opened(to, result, stop_requested),
                    None => {
                        info!("Switch cancelled before opening {} camera", to);
                        self.snapshot.state = ControllerState::Stopped { reason: None };
                    }
                }
            }
            OpOutcome::Closed { result, reason } => {
                let reason = match result {
                    Ok(()) => reason,
                    Err(failure) => {
                        error!("Camera close failed, treating it as released: {}", failure);
                        self.snapshot.failure = Some(failure.clone());
                        reason.or(Some(failure))
                    }
                };
                info!("Scanner stopped");
                self.snapshot.state = ControllerState::Stopped { reason };
            }
        }

        self.publish();
    }

    fn on_opened(
        &mut self,
        facing: CameraFacing,
        result: Result<SessionHandle, ScanFailure>,
        stop_requested: bool,
    ) {
        match result {
            Ok(handle) if stop_requested => {
                info!("Closing {} camera opened after stop was requested", facing);
                self.snapshot.state = ControllerState::Stopping;
                self.begin_op();
                self.pending = Some(self.close_op(handle, None));
            }
            Ok(handle) => {
                info!("Scanning on {} camera (session {})", facing, handle.id());
                self.snapshot.result = None;
                self.snapshot.failure = None;
                self.snapshot.state = ControllerState::Scanning {
                    facing,
                    session: handle.id(),
                };
                self.active = Some(handle);
            }
            Err(failure) if stop_requested => {
                debug!("Open of {} camera failed after stop: {}", facing, failure);
                self.snapshot.state = ControllerState::Stopped { reason: None };
            }
            Err(failure) => {
                warn!("Failed to open {} camera: {}", facing, failure);
                self.snapshot.failure = Some(failure.clone());
                self.snapshot.state = ControllerState::Stopped {
                    reason: Some(failure),
                };
            }
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        let current = match self.snapshot.state {
            ControllerState::Scanning { session, .. } => session,
            _ => {
                debug!("Dropping event from session {} while {}", event.session, self.snapshot.state.name());
                return;
            }
        };
        if event.session != current {
            debug!("Dropping stale event from session {}", event.session);
            return;
        }

        match event.kind {
            SessionEventKind::Decoded(text) => {
                info!("QR code decoded ({} bytes)", text.len());
                self.snapshot.result = Some(ScanResult::new(text));
                self.close_active(None);
            }
            SessionEventKind::FrameError(failure) => {
                if self.decode_errors_fatal {
                    warn!("Decode error, stopping scanner: {}", failure);
                    self.snapshot.failure = Some(failure.clone());
                    self.close_active(Some(failure));
                } else {
                    debug!("Decode error: {}", failure);
                    self.snapshot.failure = Some(failure);
                }
            }
            SessionEventKind::Ended(failure) => {
                warn!("Camera stream lost: {}", failure);
                self.snapshot.failure = Some(failure.clone());
                self.close_active(Some(failure));
            }
        }

        self.publish();
    }

    /// Move from Scanning to Stopping and close the active session
    fn close_active(&mut self, reason: Option<ScanFailure>) {
        match self.active.take() {
            Some(handle) => {
                self.snapshot.state = ControllerState::Stopping;
                self.begin_op();
                self.pending = Some(self.close_op(handle, reason));
            }
            None => {
                self.lost_handle();
            }
        }
    }

    fn lost_handle(&mut self) -> Disposition {
        error!("Scanning without a session handle");
        let failure = ScanFailure::lifecycle("Active session handle missing");
        self.snapshot.failure = Some(failure.clone());
        self.snapshot.state = ControllerState::Stopped {
            reason: Some(failure),
        };
        self.publish();
        Disposition::Rejected(FailureKind::LifecycleError)
    }

    fn reject_unsupported(&mut self) -> Disposition {
        let failure = ScanFailure::capability_unsupported();
        self.snapshot.failure = Some(failure.clone());
        self.snapshot.state = ControllerState::Stopped {
            reason: Some(failure),
        };
        self.publish();
        Disposition::Rejected(FailureKind::CapabilityUnsupported)
    }

    fn begin_op(&mut self) {
        self.op_cancel = CancellationToken::new();
    }

    fn open_op(&self, facing: CameraFacing) -> BoxFuture<'static, OpOutcome> {
        let decoder = Arc::clone(&self.decoder);
        let sink = SessionSink::new(SessionId::new(), self.events_tx.clone());
        Box::pin(async move {
            let result = decoder.open(facing, sink).await;
            OpOutcome::Opened { facing, result }
        })
    }

    /// Close `handle`, wait for the release to complete, then open `to`
    fn switch_op(&self, handle: SessionHandle, to: CameraFacing) -> BoxFuture<'static, OpOutcome> {
        let decoder = Arc::clone(&self.decoder);
        let sink = SessionSink::new(SessionId::new(), self.events_tx.clone());
        let cancel = self.op_cancel.clone();
        Box::pin(async move {
            let closed = decoder.close(&handle).await;
            drop(handle);

            let opened = if cancel.is_cancelled() {
                None
            } else {
                Some(decoder.open(to, sink).await)
            };
            OpOutcome::Switched { to, closed, opened }
        })
    }

    fn close_op(&self, handle: SessionHandle, reason: Option<ScanFailure>) -> BoxFuture<'static, OpOutcome> {
        let decoder = Arc::clone(&self.decoder);
        Box::pin(async move {
            let result = decoder.close(&handle).await;
            OpOutcome::Closed { result, reason }
        })
    }

    fn publish(&self) {
        let snapshot = &self.snapshot;
        self.publisher.send_if_modified(|current| {
            if current == snapshot {
                false
            } else {
                *current = snapshot.clone();
                true
            }
        });
    }

    /// Release the camera on the way out, whatever state we are in
    async fn teardown(&mut self) {
        info!("Scanner controller shutting down");
        self.op_cancel.cancel();

        let mut produced = None;
        if let Some(op) = self.pending.take() {
            debug!("Waiting for in-flight camera operation");
            let (closed, opened) = match op.await {
                OpOutcome::Opened { result, .. } => (Ok(()), Some(result)),
                OpOutcome::Switched { closed, opened, .. } => (closed, opened),
                OpOutcome::Closed { result, .. } => (result, None),
            };
            if let Err(failure) = closed {
                error!("Camera close failed during shutdown: {}", failure);
                self.snapshot.failure = Some(failure);
            }
            produced = opened.and_then(Result::ok);
        }

        for handle in produced.into_iter().chain(self.active.take()) {
            if let Err(failure) = release(Arc::clone(&self.decoder), handle).await {
                self.snapshot.failure = Some(failure);
            }
        }

        self.stop_requested = false;
        self.snapshot.state = ControllerState::Stopped { reason: None };
        self.publish();
    }
}

async fn release(decoder: Arc<dyn VideoDecoder>, handle: SessionHandle) -> Result<(), ScanFailure> {
    debug!("Releasing session {}", handle.id());
    decoder.close(&handle).await.map_err(|failure| {
        error!("Failed to release session {}: {}", handle.id(), failure);
        failure
    })
}

async fn next_outcome(pending: &mut Option<BoxFuture<'static, OpOutcome>>) -> OpOutcome {
    match pending.as_mut() {
        Some(op) => {
            let outcome = op.await;
            *pending = None;
            outcome
        }
        None => std::future::pending().await,
    }
}
