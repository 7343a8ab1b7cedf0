use crate::camera::FrameSource;
use std::sync::Arc;

/// Whether the runtime exposes camera access at all.
///
/// This is a pure query: it never prompts for permission and never opens a
/// device.
pub trait CameraCapability: Send + Sync {
    fn is_supported(&self) -> bool;
}

/// Fixed answer, for environments known up front
#[derive(Debug, Clone, Copy)]
pub struct StaticCapability(pub bool);

impl CameraCapability for StaticCapability {
    fn is_supported(&self) -> bool {
        self.0
    }
}

/// Asks the frame source whether its backend is usable
pub struct SourceCapability<S: FrameSource> {
    source: Arc<S>,
}

impl<S: FrameSource> SourceCapability<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }
}

impl<S: FrameSource> CameraCapability for SourceCapability<S> {
    fn is_supported(&self) -> bool {
        self.source.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SyntheticSource;
    use crate::config::CameraConfig;

    #[test]
    fn test_static_capability() {
        assert!(StaticCapability(true).is_supported());
        assert!(!StaticCapability(false).is_supported());
    }

    #[test]
    fn test_source_capability_follows_source() {
        let config = CameraConfig::default();

        let available = SourceCapability::new(Arc::new(SyntheticSource::new(&config)));
        assert!(available.is_supported());

        let missing = SourceCapability::new(Arc::new(SyntheticSource::new(&config).unavailable()));
        assert!(!missing.is_supported());
    }
}
