use super::decoder::{SessionHandle, SessionId, SessionSink, VideoDecoder};
use crate::types::{CameraFacing, ScanFailure};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tracing::debug;

/// A call received by [`MockDecoder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Open(CameraFacing),
    Close(SessionId),
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    open_results: VecDeque<Result<(), ScanFailure>>,
    close_results: VecDeque<Result<(), ScanFailure>>,
    open: HashMap<SessionId, (CameraFacing, SessionSink)>,
    opens_in_flight: usize,
    closes_completed: usize,
    max_concurrent: usize,
    overlapping_opens: usize,
}

/// Scripted [`VideoDecoder`] for exercising the scanner without hardware.
///
/// Records every call, tracks which sessions are open, and counts any `open`
/// issued while another session was open or another open was in flight.
/// When gated, each `open` and `close` waits for a [`release`](Self::release)
/// before completing.
pub struct MockDecoder {
    state: Mutex<MockState>,
    gated: AtomicBool,
    gate: Semaphore,
}

impl Default for MockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDecoder {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    /// Queue the outcome of the next `open`; unscripted opens succeed
    pub fn push_open_result(&self, result: Result<(), ScanFailure>) {
        self.state.lock().open_results.push_back(result);
    }

    /// Queue the outcome of the next effective `close`; unscripted closes succeed
    pub fn push_close_result(&self, result: Result<(), ScanFailure>) {
        self.state.lock().close_results.push_back(result);
    }

    pub fn set_gated(&self, gated: bool) {
        self.gated.store(gated, Ordering::SeqCst);
    }

    /// Let `count` gated operations complete
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn open_calls(&self) -> Vec<CameraFacing> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Open(facing) => Some(*facing),
                MockCall::Close(_) => None,
            })
            .collect()
    }

    pub fn close_calls(&self) -> Vec<SessionId> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Close(id) => Some(*id),
                MockCall::Open(_) => None,
            })
            .collect()
    }

    /// Closes that actually released an open session
    pub fn closes_completed(&self) -> usize {
        self.state.lock().closes_completed
    }

    pub fn open_sessions(&self) -> Vec<SessionId> {
        self.state.lock().open.keys().copied().collect()
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.lock().max_concurrent
    }

    /// Opens issued while another session was still open or opening
    pub fn overlapping_opens(&self) -> usize {
        self.state.lock().overlapping_opens
    }

    /// Sink of an open session, if it is still open
    pub fn sink(&self, id: SessionId) -> Option<SessionSink> {
        self.state.lock().open.get(&id).map(|(_, sink)| sink.clone())
    }

    fn only_sink(&self) -> Option<SessionSink> {
        let state = self.state.lock();
        if state.open.len() != 1 {
            return None;
        }
        state.open.values().next().map(|(_, sink)| sink.clone())
    }

    /// Deliver decoded text on the single open session
    pub fn emit_decoded(&self, text: &str) -> bool {
        self.only_sink().is_some_and(|sink| sink.decoded(text))
    }

    /// Deliver a per-frame decode error on the single open session
    pub fn emit_frame_error(&self, message: &str) -> bool {
        match self.only_sink() {
            Some(sink) => {
                sink.frame_error(ScanFailure::decode_error(message));
                true
            }
            None => false,
        }
    }

    /// Report the single open session's stream as lost
    pub fn emit_ended(&self, failure: ScanFailure) -> bool {
        match self.only_sink() {
            Some(sink) => {
                sink.ended(failure);
                true
            }
            None => false,
        }
    }

    async fn pass_gate(&self) {
        if self.gated.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
    }
}

#[async_trait]
impl VideoDecoder for MockDecoder {
    async fn open(&self, facing: CameraFacing, sink: SessionSink) -> Result<SessionHandle, ScanFailure> {
        {
            let mut state = self.state.lock();
            state.calls.push(MockCall::Open(facing));
            if !state.open.is_empty() || state.opens_in_flight > 0 {
                state.overlapping_opens += 1;
            }
            state.opens_in_flight += 1;
        }

        self.pass_gate().await;

        let mut state = self.state.lock();
        state.opens_in_flight -= 1;
        let result = state.open_results.pop_front().unwrap_or(Ok(()));
        result?;

        let id = sink.session();
        state.open.insert(id, (facing, sink));
        state.max_concurrent = state.max_concurrent.max(state.open.len());
        debug!("Mock session {} opened on {} camera", id, facing);
        Ok(SessionHandle::new(id, facing))
    }

    async fn close(&self, handle: &SessionHandle) -> Result<(), ScanFailure> {
        self.state.lock().calls.push(MockCall::Close(handle.id()));

        self.pass_gate().await;

        let mut state = self.state.lock();
        if state.open.remove(&handle.id()).is_none() {
            return Ok(());
        }
        state.closes_completed += 1;
        debug!("Mock session {} closed", handle.id());
        state.close_results.pop_front().unwrap_or(Ok(()))
    }
}
