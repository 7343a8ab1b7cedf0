use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layouts a frame source can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// 8-bit greyscale, one byte per pixel
    Gray8,
    /// YUV 4:2:2 packed (Y0 U Y1 V)
    Yuyv,
    /// RGB24, three bytes per pixel
    Rgb24,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Gray8 => 1,
            FrameFormat::Yuyv => 2,
            FrameFormat::Rgb24 => 3,
        }
    }
}

/// Frame data structure containing raw frame data and metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Frame sequence number within its stream
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw pixel data (shared so the decode loop can hand it off cheaply)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Uniform grey frame, used by synthetic sources
    pub fn blank(id: u64, width: u32, height: u32, level: u8) -> Self {
        Self::new(
            id,
            SystemTime::now(),
            vec![level; width as usize * height as usize],
            width,
            height,
            FrameFormat::Gray8,
        )
    }

    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Luma of the pixel at (x, y); out-of-range reads return 0
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        let pixel = y as usize * self.width as usize + x as usize;
        match self.format {
            FrameFormat::Gray8 => self.data.get(pixel).copied().unwrap_or(0),
            // Every pixel owns its own Y sample in the packed 4:2:2 layout
            FrameFormat::Yuyv => self.data.get(pixel * 2).copied().unwrap_or(0),
            FrameFormat::Rgb24 => {
                let offset = pixel * 3;
                match self.data.get(offset..offset + 3) {
                    Some(rgb) => {
                        // ITU-R BT.601 weights, integer form
                        let luma = 299 * rgb[0] as u32 + 587 * rgb[1] as u32 + 114 * rgb[2] as u32;
                        (luma / 1000) as u8
                    }
                    None => 0,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_format_properties() {
        assert_eq!(FrameFormat::Gray8.bytes_per_pixel(), 1);
        assert_eq!(FrameFormat::Yuyv.bytes_per_pixel(), 2);
        assert_eq!(FrameFormat::Rgb24.bytes_per_pixel(), 3);
    }

    #[test]
    fn test_frame_size_validation() {
        let valid = FrameData::new(1, SystemTime::now(), vec![0u8; 640 * 480 * 2], 640, 480, FrameFormat::Yuyv);
        assert!(valid.validate_size());

        let invalid = FrameData::new(2, SystemTime::now(), vec![0u8; 100], 640, 480, FrameFormat::Yuyv);
        assert!(!invalid.validate_size());
    }

    #[test]
    fn test_luma_sampling() {
        let gray = FrameData::new(1, SystemTime::now(), vec![10, 20, 30, 40], 2, 2, FrameFormat::Gray8);
        assert_eq!(gray.luma(1, 1), 40);
        assert_eq!(gray.luma(5, 0), 0);

        // Y0=100 U Y1=200 V
        let yuyv = FrameData::new(2, SystemTime::now(), vec![100, 0, 200, 0], 2, 1, FrameFormat::Yuyv);
        assert_eq!(yuyv.luma(0, 0), 100);
        assert_eq!(yuyv.luma(1, 0), 200);

        let rgb = FrameData::new(3, SystemTime::now(), vec![255, 255, 255, 0, 0, 0], 2, 1, FrameFormat::Rgb24);
        assert_eq!(rgb.luma(0, 0), 255);
        assert_eq!(rgb.luma(1, 0), 0);
    }

    #[test]
    fn test_blank_frame() {
        let frame = FrameData::blank(7, 4, 3, 128);
        assert_eq!(frame.format, FrameFormat::Gray8);
        assert!(frame.validate_size());
        assert_eq!(frame.luma(3, 2), 128);
    }
}
