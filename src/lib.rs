pub mod camera;
pub mod capability;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod keyboard_input;
pub mod session;
pub mod symbol;
pub mod types;

pub use capability::{CameraCapability, SourceCapability, StaticCapability};
pub use camera::{FrameSource, SyntheticSource, VideoStream};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use camera::V4l2Source;
pub use config::{CameraConfig, ControllerConfig, DecoderConfig, ScannerConfig};
pub use controller::{
    ControllerState, Disposition, ScannerControllerBuilder, ScannerHandle, ScannerSnapshot,
};
pub use error::{CameraError, DecodeError, Result, ScannerError};
pub use frame::{FrameData, FrameFormat};
pub use keyboard_input::{KeyAction, KeyboardInputHandler};
pub use session::{
    MockCall, MockDecoder, SessionEvent, SessionEventKind, SessionHandle, SessionId, SessionSink,
    StreamDecoder, VideoDecoder,
};
pub use symbol::{RqrrDecoder, SymbolDecoder};
pub use types::{CameraFacing, FailureKind, ScanFailure, ScanResult};
