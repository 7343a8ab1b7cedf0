//! QR symbol decoding
//!
//! The scanner treats symbol recognition as an opaque capability behind
//! [`SymbolDecoder`]. [`RqrrDecoder`] is the shipped implementation; it samples
//! the frame's luma plane (downscaling large frames) and hands it to `rqrr`.

use crate::error::DecodeError;
use crate::frame::FrameData;
use tracing::{debug, trace};

/// Recognises a QR symbol in a single frame
pub trait SymbolDecoder: Send + Sync {
    /// `Ok(None)` when no symbol is visible, `Err` when a symbol was found but
    /// could not be read
    fn decode(&self, frame: &FrameData) -> Result<Option<String>, DecodeError>;
}

/// `rqrr`-backed decoder
pub struct RqrrDecoder {
    max_dimension: u32,
}

impl Default for RqrrDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RqrrDecoder {
    pub fn new() -> Self {
        Self { max_dimension: 640 }
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    /// Integer sampling step that brings the frame under `max_dimension`
    fn sampling_step(&self, width: u32, height: u32) -> u32 {
        let largest = width.max(height);
        largest.div_ceil(self.max_dimension).max(1)
    }
}

impl SymbolDecoder for RqrrDecoder {
    fn decode(&self, frame: &FrameData) -> Result<Option<String>, DecodeError> {
        if !frame.validate_size() {
            return Err(DecodeError::new(format!(
                "frame {} has {} bytes, expected {}",
                frame.id,
                frame.data.len(),
                frame.expected_size()
            )));
        }

        let step = self.sampling_step(frame.width, frame.height);
        let width = (frame.width / step).max(1) as usize;
        let height = (frame.height / step).max(1) as usize;

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
            frame.luma(x as u32 * step, y as u32 * step)
        });
        let grids = prepared.detect_grids();

        trace!(
            frame_id = frame.id,
            width,
            height,
            step,
            grids = grids.len(),
            "QR detection complete"
        );

        let mut first_error = None;
        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) => return Ok(Some(content)),
                Err(e) => {
                    debug!(frame_id = frame.id, error = %e, "Failed to decode QR grid");
                    first_error.get_or_insert_with(|| DecodeError::new(e.to_string()));
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameFormat;
    use qrcode::{Color, QrCode};
    use std::time::SystemTime;

    /// Greyscale image of `text` as a QR symbol centred on a white background
    fn render_symbol(text: &str, width: u32, height: u32, module_px: u32) -> Vec<u8> {
        let code = QrCode::new(text.as_bytes()).unwrap();
        let modules = code.width() as u32;
        let side = modules * module_px;
        assert!(side + 8 * module_px <= width.min(height), "symbol does not fit");

        let left = (width - side) / 2;
        let top = (height - side) / 2;
        let mut pixels = vec![255u8; (width * height) as usize];
        for y in 0..side {
            for x in 0..side {
                let module = (x / module_px, y / module_px);
                if code[(module.0 as usize, module.1 as usize)] == Color::Dark {
                    pixels[((top + y) * width + left + x) as usize] = 0;
                }
            }
        }
        pixels
    }

    fn decode_text(frame: &FrameData, max_dimension: u32) -> Option<String> {
        RqrrDecoder::with_max_dimension(max_dimension)
            .decode(frame)
            .unwrap()
    }

    #[test]
    fn test_blank_frame_has_no_symbol() {
        let decoder = RqrrDecoder::new();
        let frame = FrameData::blank(1, 320, 240, 200);
        assert!(matches!(decoder.decode(&frame), Ok(None)));
    }

    #[test]
    fn test_truncated_frame_is_decode_error() {
        let decoder = RqrrDecoder::new();
        let frame = FrameData::new(9, SystemTime::now(), vec![0u8; 10], 320, 240, FrameFormat::Gray8);
        let error = decoder.decode(&frame).unwrap_err();
        assert!(error.message.contains("frame 9"));
    }

    #[test]
    fn test_decodes_symbol_at_native_size() {
        let pixels = render_symbol("HELLO", 640, 480, 8);
        let frame = FrameData::new(1, SystemTime::now(), pixels, 640, 480, FrameFormat::Gray8);
        assert_eq!(decode_text(&frame, 640), Some("HELLO".to_string()));
    }

    #[test]
    fn test_decodes_symbol_after_downscaling() {
        let pixels = render_symbol("HELLO", 1920, 1080, 24);
        let frame = FrameData::new(2, SystemTime::now(), pixels, 1920, 1080, FrameFormat::Gray8);
        assert_eq!(RqrrDecoder::with_max_dimension(640).sampling_step(1920, 1080), 3);
        assert_eq!(decode_text(&frame, 640), Some("HELLO".to_string()));
    }

    #[test]
    fn test_decodes_symbol_from_colour_formats() {
        let grey = render_symbol("HELLO", 640, 480, 8);

        let rgb: Vec<u8> = grey.iter().flat_map(|&y| [y, y, y]).collect();
        let frame = FrameData::new(3, SystemTime::now(), rgb, 640, 480, FrameFormat::Rgb24);
        assert_eq!(decode_text(&frame, 640), Some("HELLO".to_string()));

        let yuyv: Vec<u8> = grey.iter().flat_map(|&y| [y, 128]).collect();
        let frame = FrameData::new(4, SystemTime::now(), yuyv, 640, 480, FrameFormat::Yuyv);
        assert_eq!(decode_text(&frame, 640), Some("HELLO".to_string()));
    }

    #[test]
    fn test_sampling_step() {
        let decoder = RqrrDecoder::with_max_dimension(640);
        assert_eq!(decoder.sampling_step(640, 480), 1);
        assert_eq!(decoder.sampling_step(1280, 720), 2);
        assert_eq!(decoder.sampling_step(1920, 1080), 3);
    }
}
