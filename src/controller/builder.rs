use super::actor::ScannerController;
use super::handle::ScannerHandle;
use super::state::ScannerSnapshot;
use crate::capability::{CameraCapability, StaticCapability};
use crate::config::ControllerConfig;
use crate::error::{Result, ScannerError};
use crate::session::VideoDecoder;
use config::ConfigError;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Builder for the scanner controller task
pub struct ScannerControllerBuilder {
    config: ControllerConfig,
    decoder: Option<Arc<dyn VideoDecoder>>,
    capability: Box<dyn CameraCapability>,
}

impl ScannerControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: ControllerConfig::default(),
            decoder: None,
            capability: Box::new(StaticCapability(true)),
        }
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn decoder<D: VideoDecoder + 'static>(mut self, decoder: Arc<D>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn capability<C: CameraCapability + 'static>(mut self, capability: C) -> Self {
        self.capability = Box::new(capability);
        self
    }

    /// Spawn the controller on the current tokio runtime.
    ///
    /// Camera capability is queried once here. The controller runs until
    /// [`ScannerHandle::shutdown`] is called or every handle is dropped.
    pub fn spawn(self) -> Result<ScannerHandle> {
        let decoder = self
            .decoder
            .ok_or_else(|| ScannerError::system("Video decoder must be specified"))?;

        if self.config.command_buffer == 0 {
            return Err(ScannerError::Config(ConfigError::Message(
                "Scanner command_buffer must be greater than 0".to_string(),
            )));
        }

        let supported = self.capability.is_supported();
        if !supported {
            warn!("Camera access is not supported in this environment");
        }

        let snapshot = ScannerSnapshot::initial(self.config.default_facing, supported);
        let (publisher, snapshots) = watch::channel(snapshot.clone());
        let (commands_tx, commands_rx) = mpsc::channel(self.config.command_buffer);

        let controller = ScannerController::new(
            decoder,
            self.config.decode_errors_fatal,
            snapshot,
            publisher,
            commands_rx,
        );
        tokio::spawn(controller.run());

        info!(
            "Scanner controller spawned (decode errors fatal: {})",
            self.config.decode_errors_fatal
        );
        Ok(ScannerHandle::new(commands_tx, snapshots))
    }
}

impl Default for ScannerControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
