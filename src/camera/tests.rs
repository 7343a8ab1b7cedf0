use super::*;
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::types::CameraFacing;

fn create_test_camera_config() -> CameraConfig {
    CameraConfig {
        back_device: 0,
        front_device: 1,
        resolution: (64, 48),
        fps: 100,
    }
}

#[tokio::test]
async fn test_synthetic_stream_produces_frames() {
    let source = SyntheticSource::new(&create_test_camera_config());
    assert!(source.is_available());

    let mut stream = source.acquire(CameraFacing::Back).await.unwrap();
    let first = stream.next_frame().await.unwrap().unwrap();
    let second = stream.next_frame().await.unwrap().unwrap();

    assert_eq!(first.id, 0);
    assert_eq!(second.id, 1);
    assert_eq!((first.width, first.height), (64, 48));
    assert!(first.validate_size());

    stream.release().await.unwrap();
    assert!(source.held().is_empty());
}

#[tokio::test]
async fn test_synthetic_camera_is_busy_until_released() {
    let source = SyntheticSource::new(&create_test_camera_config());

    let back = source.acquire(CameraFacing::Back).await.unwrap();
    assert_eq!(source.held(), vec![CameraFacing::Back]);

    match source.acquire(CameraFacing::Front).await {
        Err(CameraError::DeviceBusy { device }) => assert!(device.contains("front")),
        Err(e) => panic!("Unexpected error: {}", e),
        Ok(_) => panic!("Expected busy camera"),
    }

    back.release().await.unwrap();
    let front = source.acquire(CameraFacing::Front).await.unwrap();
    front.release().await.unwrap();
    assert!(source.held().is_empty());
}

#[tokio::test]
async fn test_synthetic_failures() {
    let denied = SyntheticSource::new(&create_test_camera_config()).deny_permission();
    assert!(matches!(
        denied.acquire(CameraFacing::Back).await,
        Err(CameraError::PermissionDenied { .. })
    ));

    let no_front = SyntheticSource::new(&create_test_camera_config()).without(CameraFacing::Front);
    assert!(matches!(
        no_front.acquire(CameraFacing::Front).await,
        Err(CameraError::DeviceNotFound { .. })
    ));
    assert!(no_front.held().is_empty());

    let unsupported = SyntheticSource::new(&create_test_camera_config()).unavailable();
    assert!(!unsupported.is_available());
}

#[tokio::test]
async fn test_synthetic_stream_ends() {
    let source = SyntheticSource::new(&create_test_camera_config()).ending_after(2);
    let mut stream = source.acquire(CameraFacing::Back).await.unwrap();

    assert!(stream.next_frame().await.is_some());
    assert!(stream.next_frame().await.is_some());
    assert!(stream.next_frame().await.is_none());

    drop(stream);
    assert!(source.held().is_empty());
}

#[tokio::test]
async fn test_synthetic_stream_above_1000_fps() {
    let config = CameraConfig {
        fps: 2000,
        ..create_test_camera_config()
    };
    let source = SyntheticSource::new(&config);

    let mut stream = source.acquire(CameraFacing::Front).await.unwrap();
    for expected in 0..3 {
        let frame = stream.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.id, expected);
    }
    stream.release().await.unwrap();
}
