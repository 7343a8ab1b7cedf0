use super::source::{FrameSource, VideoStream};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use crate::types::CameraFacing;
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::{MessageView, Pipeline};
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// GStreamer V4L2 source mapping each facing to a /dev/videoN device
pub struct V4l2Source {
    config: CameraConfig,
    gstreamer_ready: bool,
}

impl V4l2Source {
    pub fn new(config: CameraConfig) -> Self {
        let gstreamer_ready = match gstreamer::init() {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to initialize GStreamer: {}", e);
                false
            }
        };

        Self {
            config,
            gstreamer_ready,
        }
    }

    fn device_path(&self, facing: CameraFacing) -> String {
        format!("/dev/video{}", self.config.device_for(facing))
    }

    /// Open the device node once so access problems surface as typed errors
    /// instead of an opaque pipeline state change failure
    fn check_device(device: &str) -> Result<(), CameraError> {
        match OpenOptions::new().read(true).write(true).open(device) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CameraError::DeviceNotFound {
                device: device.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(CameraError::PermissionDenied {
                    device: device.to_string(),
                })
            }
            Err(e) if e.raw_os_error() == Some(libc::EBUSY) => Err(CameraError::DeviceBusy {
                device: device.to_string(),
            }),
            Err(e) => Err(CameraError::Configuration {
                details: format!("Failed to open {}: {}", device, e),
            }),
        }
    }

    /// Build GStreamer pipeline string producing greyscale frames
    fn build_pipeline_string(&self, device: &str) -> String {
        let (width, height) = self.config.resolution;
        format!(
            "v4l2src device={} io-mode=mmap do-timestamp=true ! \
             videoconvert ! video/x-raw,format=GRAY8,width={},height={},framerate={}/1 ! \
             appsink name=sink sync=false max-buffers=2 drop=true enable-last-sample=false emit-signals=false",
            device, width, height, self.config.fps
        )
    }
}

#[async_trait]
impl FrameSource for V4l2Source {
    fn is_available(&self) -> bool {
        self.gstreamer_ready && gstreamer::ElementFactory::find("v4l2src").is_some()
    }

    async fn acquire(&self, facing: CameraFacing) -> Result<Box<dyn VideoStream>, CameraError> {
        let device = self.device_path(facing);
        Self::check_device(&device)?;

        let pipeline_desc = self.build_pipeline_string(&device);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "Pipeline has no appsink".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        let (tx, rx) = mpsc::channel(4);
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    // A full channel means the decode loop is behind; drop the frame
                    let _ = tx.try_send(sample);
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            error!("Failed to start GStreamer pipeline for {}: {}", device, e);
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CameraError::DeviceBusy { device });
        }

        info!("GStreamer pipeline started for {}", device);
        let mut bus_poll = tokio::time::interval(Duration::from_secs(1));
        bus_poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        Ok(Box::new(V4l2Stream {
            device,
            pipeline: Some(pipeline),
            samples: rx,
            bus_poll,
            frame_counter: 0,
        }))
    }
}

struct V4l2Stream {
    device: String,
    pipeline: Option<Pipeline>,
    samples: mpsc::Receiver<gstreamer::Sample>,
    bus_poll: tokio::time::Interval,
    frame_counter: u64,
}

impl V4l2Stream {
    /// True once the pipeline reported an error or end of stream
    fn pipeline_failed(&self) -> bool {
        let Some(pipeline) = &self.pipeline else {
            return true;
        };
        let Some(bus) = pipeline.bus() else {
            return false;
        };

        while let Some(message) = bus.pop() {
            match message.view() {
                MessageView::Error(err) => {
                    error!("GStreamer error on {}: {}", self.device, err.error());
                    return true;
                }
                MessageView::Eos(..) => {
                    warn!("GStreamer end of stream on {}", self.device);
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    fn sample_to_frame(&mut self, sample: gstreamer::Sample) -> Result<FrameData, CameraError> {
        let buffer = sample.buffer().ok_or_else(|| CameraError::CaptureStream {
            details: "No buffer in sample".to_string(),
        })?;

        let caps = sample.caps().ok_or_else(|| CameraError::CaptureStream {
            details: "No caps in sample".to_string(),
        })?;

        let video_info = VideoInfo::from_caps(caps).map_err(|e| CameraError::CaptureStream {
            details: format!("Failed to get video info: {}", e),
        })?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride()[0] as usize;

        let map = buffer
            .map_readable()
            .map_err(|e| CameraError::CaptureStream {
                details: format!("Failed to map buffer: {}", e),
            })?;

        // GRAY8 rows are padded to the stride; repack them tightly
        let row = width as usize;
        let mut data = Vec::with_capacity(row * height as usize);
        for line in map.as_slice().chunks(stride).take(height as usize) {
            let end = row.min(line.len());
            data.extend_from_slice(&line[..end]);
        }

        let frame_id = self.frame_counter;
        self.frame_counter += 1;
        trace!("Captured GRAY8 frame {} ({}x{})", frame_id, width, height);

        Ok(FrameData::new(
            frame_id,
            SystemTime::now(),
            data,
            width,
            height,
            FrameFormat::Gray8,
        ))
    }
}

#[async_trait]
impl VideoStream for V4l2Stream {
    async fn next_frame(&mut self) -> Option<Result<FrameData, CameraError>> {
        loop {
            tokio::select! {
                sample = self.samples.recv() => {
                    return sample.map(|sample| self.sample_to_frame(sample));
                }
                _ = self.bus_poll.tick() => {
                    if self.pipeline_failed() {
                        return None;
                    }
                }
            }
        }
    }

    async fn release(mut self: Box<Self>) -> Result<(), CameraError> {
        let Some(pipeline) = self.pipeline.take() else {
            return Ok(());
        };
        let device = self.device.clone();

        // Null state change blocks until the driver has let go of the device
        tokio::task::spawn_blocking(move || pipeline.set_state(gstreamer::State::Null))
            .await
            .map_err(|e| CameraError::CaptureStream {
                details: format!("Release task failed for {}: {}", device, e),
            })?
            .map_err(|e| CameraError::CaptureStream {
                details: format!("Failed to stop pipeline for {}: {}", device, e),
            })?;

        debug!("GStreamer pipeline for {} released", device);
        Ok(())
    }
}

impl Drop for V4l2Stream {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gstreamer::State::Null);
        }
    }
}
