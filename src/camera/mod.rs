mod source;
mod synthetic;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod v4l2;
#[cfg(test)]
mod tests;

pub use source::{FrameSource, VideoStream};
pub use synthetic::SyntheticSource;
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use v4l2::V4l2Source;
