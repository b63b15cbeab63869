//! Frames delivered by a stream.

use std::time::SystemTime;

use bytes::Bytes;
use pfnc::PixelFormat;

/// One acquired image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Contiguous image payload, rows top to bottom without padding.
    pub payload: Bytes,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Device frame counter, increasing in capture order.
    pub frame_id: u64,
    /// Host time at which the frame was completed.
    pub timestamp: SystemTime,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes of row `y`, when the pixel format has a known size.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let stride = self.pixel_format.image_size(self.width, 1)?;
        let start = stride * y as usize;
        self.payload.get(start..start + stride)
    }

    /// Bytes of pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width {
            return None;
        }
        let bpp = self.pixel_format.bytes_per_pixel()?;
        let row = self.row(y)?;
        let start = x as usize * bpp;
        row.get(start..start + bpp)
    }
}
