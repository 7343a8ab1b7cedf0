//! Video decoder sessions
//!
//! A session is one "camera open + decode loop running" lifetime against a
//! single [`CameraFacing`](crate::types::CameraFacing). The scanner controller
//! talks to sessions only through the [`VideoDecoder`] trait.

mod decoder;
mod mock;
mod stream;
#[cfg(test)]
mod tests;

pub use decoder::{SessionEvent, SessionEventKind, SessionHandle, SessionId, SessionSink, VideoDecoder};
pub use mock::{MockCall, MockDecoder};
pub use stream::StreamDecoder;
