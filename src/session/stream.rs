use super::decoder::{SessionHandle, SessionId, SessionSink, VideoDecoder};
use crate::camera::{FrameSource, VideoStream};
use crate::config::DecoderConfig;
use crate::error::CameraError;
use crate::symbol::SymbolDecoder;
use crate::types::{CameraFacing, ScanFailure};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

struct RunningSession {
    facing: CameraFacing,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), CameraError>>,
}

/// [`VideoDecoder`] that runs a symbol decoder over frames from a [`FrameSource`]
pub struct StreamDecoder<S: FrameSource> {
    source: Arc<S>,
    symbols: Arc<dyn SymbolDecoder>,
    decode_interval: Duration,
    sessions: Mutex<HashMap<SessionId, RunningSession>>,
}

impl<S: FrameSource> StreamDecoder<S> {
    pub fn new<D>(source: Arc<S>, symbols: D, config: &DecoderConfig) -> Self
    where
        D: SymbolDecoder + 'static,
    {
        Self {
            source,
            symbols: Arc::new(symbols),
            decode_interval: config.decode_interval(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of sessions opened and not yet closed
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[async_trait]
impl<S: FrameSource> VideoDecoder for StreamDecoder<S> {
    async fn open(&self, facing: CameraFacing, sink: SessionSink) -> Result<SessionHandle, ScanFailure> {
        let id = sink.session();
        info!("Opening {} camera for session {}", facing, id);

        let stream = self.source.acquire(facing).await.map_err(|e| {
            warn!("Failed to acquire {} camera: {}", facing, e);
            ScanFailure::from(&e)
        })?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_decode_loop(
            stream,
            Arc::clone(&self.symbols),
            sink,
            cancel.clone(),
            self.decode_interval,
        ));

        self.sessions.lock().insert(
            id,
            RunningSession {
                facing,
                cancel,
                task,
            },
        );

        Ok(SessionHandle::new(id, facing))
    }

    async fn close(&self, handle: &SessionHandle) -> Result<(), ScanFailure> {
        let removed = self.sessions.lock().remove(&handle.id());
        let Some(running) = removed else {
            debug!("Session {} already closed", handle.id());
            return Ok(());
        };

        info!("Closing {} camera session {}", running.facing, handle.id());
        running.cancel.cancel();

        match running.task.await {
            Ok(Ok(())) => {
                debug!("Session {} released its camera", handle.id());
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Session {} failed to release camera: {}", handle.id(), e);
                Err(ScanFailure::lifecycle(format!("Failed to release camera: {}", e)))
            }
            Err(e) => {
                error!("Decode loop for session {} failed: {}", handle.id(), e);
                Err(ScanFailure::lifecycle(format!("Decode loop failed: {}", e)))
            }
        }
    }
}

impl<S: FrameSource> Drop for StreamDecoder<S> {
    fn drop(&mut self) {
        for (id, running) in self.sessions.lock().drain() {
            warn!("Session {} still open at decoder shutdown, cancelling", id);
            running.cancel.cancel();
        }
    }
}

/// Decode frames until cancelled, then release the stream.
///
/// Symbol decoding is attempted at most once per `decode_interval`; frames
/// arriving in between are dropped. After the first successful decode the
/// stream stays open but frames are no longer decoded.
async fn run_decode_loop(
    mut stream: Box<dyn VideoStream>,
    symbols: Arc<dyn SymbolDecoder>,
    sink: SessionSink,
    cancel: CancellationToken,
    decode_interval: Duration,
) -> Result<(), CameraError> {
    let session = sink.session();
    let mut last_attempt: Option<Instant> = None;
    debug!("Decode loop started for session {}", session);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next_frame() => next,
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!("Frame error in session {}: {}", session, e);
                sink.frame_error(ScanFailure::decode_error(e.to_string()));
                continue;
            }
            None => {
                warn!("Camera stream ended for session {}", session);
                sink.ended(ScanFailure::device_unavailable("Camera stream ended"));
                break;
            }
        };

        if sink.has_decoded() {
            continue;
        }
        if last_attempt.is_some_and(|at| at.elapsed() < decode_interval) {
            continue;
        }
        last_attempt = Some(Instant::now());

        let decoder = Arc::clone(&symbols);
        let frame_id = frame.id;
        match tokio::task::spawn_blocking(move || decoder.decode(&frame)).await {
            Ok(Ok(Some(text))) => {
                info!("Session {} decoded symbol on frame {}", session, frame_id);
                sink.decoded(text);
            }
            Ok(Ok(None)) => trace!("No symbol in frame {}", frame_id),
            Ok(Err(e)) => {
                debug!("Session {} frame {}: {}", session, frame_id, e);
                sink.frame_error(e.into());
            }
            Err(e) => {
                error!("Symbol decoder panicked on frame {}: {}", frame_id, e);
                sink.frame_error(ScanFailure::decode_error("Symbol decoder panicked"));
            }
        }
    }

    debug!("Decode loop stopping for session {}", session);
    stream.release().await
}
