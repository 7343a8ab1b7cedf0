use crate::error::CameraError;
use crate::frame::FrameData;
use crate::types::CameraFacing;
use async_trait::async_trait;

/// Provider of live camera streams, one per physical facing
#[async_trait]
pub trait FrameSource: Send + Sync + 'static {
    /// Whether the runtime exposes camera access at all. Must not touch hardware.
    fn is_available(&self) -> bool;

    /// Acquire the camera for `facing` and start streaming
    async fn acquire(&self, facing: CameraFacing) -> Result<Box<dyn VideoStream>, CameraError>;
}

/// One acquired camera stream
#[async_trait]
pub trait VideoStream: Send {
    /// Next frame. `None` means the stream has ended and will not produce more.
    async fn next_frame(&mut self) -> Option<Result<FrameData, CameraError>>;

    /// Release the underlying hardware. Resolves once the device is free.
    async fn release(self: Box<Self>) -> Result<(), CameraError>;
}
