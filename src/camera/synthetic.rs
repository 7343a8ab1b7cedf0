use super::source::{FrameSource, VideoStream};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::FrameData;
use crate::types::CameraFacing;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, trace};

const MIN_FRAME_PERIOD: Duration = Duration::from_millis(1);

/// Frame source that generates blank frames without touching hardware.
///
/// It models the hardware rules the scanner has to respect: a camera can
/// be held by one stream at a time, and acquiring any camera while another
/// stream is still held fails with `DeviceBusy`. Missing cameras and denied
/// permission can be simulated for either facing.
#[derive(Clone)]
pub struct SyntheticSource {
    resolution: (u32, u32),
    fps: u32,
    available: bool,
    permission_denied: bool,
    missing: HashSet<CameraFacing>,
    end_after: Option<u64>,
    held: Arc<Mutex<HashSet<CameraFacing>>>,
}

impl SyntheticSource {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            resolution: config.resolution,
            fps: config.fps.max(1),
            available: true,
            permission_denied: false,
            missing: HashSet::new(),
            end_after: None,
            held: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Report no camera support at all
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Refuse every acquisition with `PermissionDenied`
    pub fn deny_permission(mut self) -> Self {
        self.permission_denied = true;
        self
    }

    /// Pretend there is no camera for `facing`
    pub fn without(mut self, facing: CameraFacing) -> Self {
        self.missing.insert(facing);
        self
    }

    /// End every stream after `frames` frames
    pub fn ending_after(mut self, frames: u64) -> Self {
        self.end_after = Some(frames);
        self
    }

    /// Facings whose stream has not been released yet
    pub fn held(&self) -> Vec<CameraFacing> {
        self.held.lock().iter().copied().collect()
    }

    fn device_name(facing: CameraFacing) -> String {
        format!("synthetic:{}", facing)
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn acquire(&self, facing: CameraFacing) -> Result<Box<dyn VideoStream>, CameraError> {
        let device = Self::device_name(facing);

        if self.permission_denied {
            return Err(CameraError::PermissionDenied { device });
        }
        if self.missing.contains(&facing) {
            return Err(CameraError::DeviceNotFound { device });
        }

        {
            let mut held = self.held.lock();
            if !held.is_empty() {
                debug!("Synthetic camera busy, held: {:?}", *held);
                return Err(CameraError::DeviceBusy { device });
            }
            held.insert(facing);
        }

        let period = (Duration::from_secs(1) / self.fps).max(MIN_FRAME_PERIOD);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Synthetic camera {} acquired", device);
        Ok(Box::new(SyntheticStream {
            facing,
            resolution: self.resolution,
            ticker,
            produced: 0,
            end_after: self.end_after,
            held: Arc::clone(&self.held),
        }))
    }
}

struct SyntheticStream {
    facing: CameraFacing,
    resolution: (u32, u32),
    ticker: Interval,
    produced: u64,
    end_after: Option<u64>,
    held: Arc<Mutex<HashSet<CameraFacing>>>,
}

#[async_trait]
impl VideoStream for SyntheticStream {
    async fn next_frame(&mut self) -> Option<Result<FrameData, CameraError>> {
        if self.end_after.is_some_and(|limit| self.produced >= limit) {
            return None;
        }

        self.ticker.tick().await;

        let id = self.produced;
        self.produced += 1;
        trace!("Generated synthetic {} frame {}", self.facing, id);

        let (width, height) = self.resolution;
        Some(Ok(FrameData::blank(id, width, height, 0x80)))
    }

    async fn release(self: Box<Self>) -> Result<(), CameraError> {
        debug!("Releasing synthetic {} camera", self.facing);
        Ok(())
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.held.lock().remove(&self.facing);
    }
}
