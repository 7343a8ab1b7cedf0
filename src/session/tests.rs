use super::*;
use crate::camera::SyntheticSource;
use crate::config::{CameraConfig, DecoderConfig};
use crate::error::DecodeError;
use crate::frame::FrameData;
use crate::symbol::SymbolDecoder;
use crate::types::{CameraFacing, FailureKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

struct ScriptedSymbols {
    decode_from: u64,
    text: &'static str,
}

impl SymbolDecoder for ScriptedSymbols {
    fn decode(&self, frame: &FrameData) -> Result<Option<String>, DecodeError> {
        if frame.id >= self.decode_from {
            Ok(Some(self.text.to_string()))
        } else {
            Ok(None)
        }
    }
}

struct FailingSymbols;

impl SymbolDecoder for FailingSymbols {
    fn decode(&self, _frame: &FrameData) -> Result<Option<String>, DecodeError> {
        Err(DecodeError::new("checksum mismatch"))
    }
}

fn test_source() -> SyntheticSource {
    SyntheticSource::new(&CameraConfig {
        back_device: 0,
        front_device: 1,
        resolution: (32, 24),
        fps: 200,
    })
}

fn fast_decoder_config() -> DecoderConfig {
    DecoderConfig {
        decode_interval_ms: 1,
        max_dimension: 640,
    }
}

fn new_sink() -> (SessionSink, mpsc::UnboundedReceiver<SessionEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SessionSink::new(SessionId::new(), tx), rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_stream_decoder_delivers_one_result() {
    let source = Arc::new(test_source());
    let decoder = StreamDecoder::new(
        Arc::clone(&source),
        ScriptedSymbols {
            decode_from: 2,
            text: "HELLO",
        },
        &fast_decoder_config(),
    );

    let (sink, mut rx) = new_sink();
    let id = sink.session();
    let handle = decoder.open(CameraFacing::Back, sink).await.unwrap();
    assert_eq!(handle.id(), id);
    assert_eq!(handle.facing(), CameraFacing::Back);
    assert_eq!(decoder.active_sessions(), 1);

    let event = next_event(&mut rx).await;
    assert_eq!(event.session, id);
    assert_eq!(event.kind, SessionEventKind::Decoded("HELLO".to_string()));

    // Hardware stays held after decoding, and nothing else is reported
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(source.held(), vec![CameraFacing::Back]);

    decoder.close(&handle).await.unwrap();
    assert!(source.held().is_empty());
    assert_eq!(decoder.active_sessions(), 0);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let source = Arc::new(test_source());
    let decoder = StreamDecoder::new(Arc::clone(&source), FailingSymbols, &fast_decoder_config());

    let (sink, _rx) = new_sink();
    let handle = decoder.open(CameraFacing::Front, sink).await.unwrap();

    assert!(decoder.close(&handle).await.is_ok());
    assert!(decoder.close(&handle).await.is_ok());
    assert!(source.held().is_empty());

    let never_opened = SessionHandle::new(SessionId::new(), CameraFacing::Back);
    assert!(decoder.close(&never_opened).await.is_ok());
}

#[tokio::test]
async fn test_open_failures_map_to_failure_kinds() {
    let denied = StreamDecoder::new(
        Arc::new(test_source().deny_permission()),
        FailingSymbols,
        &fast_decoder_config(),
    );
    let (sink, _rx) = new_sink();
    let failure = denied.open(CameraFacing::Back, sink).await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::PermissionDenied);
    assert_eq!(denied.active_sessions(), 0);

    let no_front = StreamDecoder::new(
        Arc::new(test_source().without(CameraFacing::Front)),
        FailingSymbols,
        &fast_decoder_config(),
    );
    let (sink, _rx) = new_sink();
    let failure = no_front.open(CameraFacing::Front, sink).await.unwrap_err();
    assert_eq!(failure.kind, FailureKind::DeviceUnavailable);
}

#[tokio::test]
async fn test_camera_busy_until_close_completes() {
    let source = Arc::new(test_source());
    let decoder = StreamDecoder::new(Arc::clone(&source), FailingSymbols, &fast_decoder_config());

    let (back_sink, _back_rx) = new_sink();
    let back = decoder.open(CameraFacing::Back, back_sink).await.unwrap();

    let (front_sink, _front_rx) = new_sink();
    let busy = decoder.open(CameraFacing::Front, front_sink).await.unwrap_err();
    assert_eq!(busy.kind, FailureKind::DeviceUnavailable);

    decoder.close(&back).await.unwrap();

    let (front_sink, _front_rx) = new_sink();
    let front = decoder.open(CameraFacing::Front, front_sink).await.unwrap();
    decoder.close(&front).await.unwrap();
}

#[tokio::test]
async fn test_decode_errors_do_not_close_session() {
    let source = Arc::new(test_source());
    let decoder = StreamDecoder::new(Arc::clone(&source), FailingSymbols, &fast_decoder_config());

    let (sink, mut rx) = new_sink();
    let handle = decoder.open(CameraFacing::Back, sink).await.unwrap();

    for _ in 0..3 {
        match next_event(&mut rx).await.kind {
            SessionEventKind::FrameError(failure) => {
                assert_eq!(failure.kind, FailureKind::DecodeError);
                assert!(failure.message.contains("checksum"));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    assert_eq!(decoder.active_sessions(), 1);
    assert_eq!(source.held(), vec![CameraFacing::Back]);
    decoder.close(&handle).await.unwrap();
}

#[tokio::test]
async fn test_stream_end_is_reported() {
    let source = Arc::new(test_source().ending_after(1));
    let decoder = StreamDecoder::new(
        Arc::clone(&source),
        ScriptedSymbols {
            decode_from: 100,
            text: "unused",
        },
        &fast_decoder_config(),
    );

    let (sink, mut rx) = new_sink();
    let handle = decoder.open(CameraFacing::Back, sink).await.unwrap();

    match next_event(&mut rx).await.kind {
        SessionEventKind::Ended(failure) => assert_eq!(failure.kind, FailureKind::DeviceUnavailable),
        other => panic!("Unexpected event: {:?}", other),
    }

    decoder.close(&handle).await.unwrap();
    assert!(source.held().is_empty());
}

#[test]
fn test_sink_delivers_at_most_one_result() {
    let (sink, mut rx) = new_sink();
    let clone = sink.clone();

    assert!(sink.decoded("first"));
    assert!(!clone.decoded("second"));
    assert!(clone.has_decoded());

    let event = rx.try_recv().unwrap();
    assert_eq!(event.kind, SessionEventKind::Decoded("first".to_string()));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_mock_decoder_tracks_overlap() {
    let mock = MockDecoder::new();

    let (sink, _rx) = new_sink();
    let first = mock.open(CameraFacing::Back, sink).await.unwrap();
    let (sink, _rx2) = new_sink();
    let second = mock.open(CameraFacing::Front, sink).await.unwrap();

    assert_eq!(mock.overlapping_opens(), 1);
    assert_eq!(mock.max_concurrent(), 2);

    mock.close(&first).await.unwrap();
    mock.close(&first).await.unwrap();
    mock.close(&second).await.unwrap();
    assert_eq!(mock.closes_completed(), 2);
    assert_eq!(mock.close_calls().len(), 3);
    assert!(mock.open_sessions().is_empty());
}
