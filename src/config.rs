use crate::types::CameraFacing;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ScannerConfig {
    #[serde(default)]
    pub scanner: ControllerConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub camera: CameraConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ControllerConfig {
    /// Camera used by the first start
    #[serde(default)]
    pub default_facing: CameraFacing,

    /// Stop scanning on a per-frame decode error instead of recording it
    #[serde(default = "default_decode_errors_fatal")]
    pub decode_errors_fatal: bool,

    /// Capacity of the intent channel feeding the controller
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DecoderConfig {
    /// Minimum time between two decode attempts
    #[serde(default = "default_decode_interval_ms")]
    pub decode_interval_ms: u64,

    /// Frames larger than this are downscaled before decoding
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Device index of the environment-facing camera (/dev/videoN)
    #[serde(default = "default_back_device")]
    pub back_device: u32,

    /// Device index of the user-facing camera
    #[serde(default = "default_front_device")]
    pub front_device: u32,

    /// Capture resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

impl ScannerConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("scanner.default_facing", CameraFacing::default().as_str())?
            .set_default("scanner.decode_errors_fatal", default_decode_errors_fatal())?
            .set_default("scanner.command_buffer", default_command_buffer() as i64)?
            .set_default("decoder.decode_interval_ms", default_decode_interval_ms())?
            .set_default("decoder.max_dimension", default_max_dimension())?
            .set_default("camera.back_device", default_back_device())?
            .set_default("camera.front_device", default_front_device())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .add_source(File::with_name(&path_str).required(false))
            // QRSCAN_SCANNER__DEFAULT_FACING=front
            .add_source(
                Environment::with_prefix("QRSCAN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ScannerConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scanner.command_buffer == 0 {
            return Err(ConfigError::Message(
                "Scanner command_buffer must be greater than 0".to_string(),
            ));
        }

        if self.decoder.decode_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Decoder decode_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.decoder.max_dimension == 0 {
            return Err(ConfigError::Message(
                "Decoder max_dimension must be greater than 0".to_string(),
            ));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.camera.front_device == self.camera.back_device {
            return Err(ConfigError::Message(
                "Camera front_device and back_device must differ".to_string(),
            ));
        }

        Ok(())
    }
}

impl DecoderConfig {
    pub fn decode_interval(&self) -> Duration {
        Duration::from_millis(self.decode_interval_ms)
    }
}

impl CameraConfig {
    /// Device index mapped to a facing
    pub fn device_for(&self, facing: CameraFacing) -> u32 {
        match facing {
            CameraFacing::Front => self.front_device,
            CameraFacing::Back => self.back_device,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_facing: CameraFacing::default(),
            decode_errors_fatal: default_decode_errors_fatal(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            decode_interval_ms: default_decode_interval_ms(),
            max_dimension: default_max_dimension(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            back_device: default_back_device(),
            front_device: default_front_device(),
            resolution: default_camera_resolution(),
            fps: default_camera_fps(),
        }
    }
}

// Default value functions
fn default_decode_errors_fatal() -> bool {
    false
}
fn default_command_buffer() -> usize {
    32
}

fn default_decode_interval_ms() -> u64 {
    300
}
fn default_max_dimension() -> u32 {
    640
}

fn default_back_device() -> u32 {
    0
}
fn default_front_device() -> u32 {
    1
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ScannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scanner.default_facing, CameraFacing::Back);
        assert!(!config.scanner.decode_errors_fatal);
        assert_eq!(config.decoder.decode_interval(), Duration::from_millis(300));
        assert_eq!(config.camera.device_for(CameraFacing::Back), 0);
        assert_eq!(config.camera.device_for(CameraFacing::Front), 1);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ScannerConfig::default();
        config.camera.resolution = (0, 0);
        assert!(config.validate().is_err());

        config.camera.resolution = (640, 480);
        assert!(config.validate().is_ok());

        config.camera.front_device = config.camera.back_device;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[scanner]
default_facing = "front"
decode_errors_fatal = true

[decoder]
decode_interval_ms = 150

[camera]
front_device = 2
"#
        )
        .unwrap();

        let config = ScannerConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.scanner.default_facing, CameraFacing::Front);
        assert!(config.scanner.decode_errors_fatal);
        assert_eq!(config.scanner.command_buffer, 32);
        assert_eq!(config.decoder.decode_interval_ms, 150);
        assert_eq!(config.decoder.max_dimension, 640);
        assert_eq!(config.camera.front_device, 2);
        assert_eq!(config.camera.back_device, 0);
        assert_eq!(config.camera.resolution, (640, 480));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScannerConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.camera.fps, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let rendered = toml::to_string_pretty(&ScannerConfig::default()).unwrap();
        assert!(rendered.contains("default_facing = \"back\""));
        let parsed: ScannerConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.decoder.max_dimension, 640);
    }
}
