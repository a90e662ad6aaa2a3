//! Captured frames
//!
//! A frame is the unit every decision is made on. Boxes produced for one
//! frame are never reused against another one.

use image::{ImageBuffer, Rgba, RgbaImage};

use super::{BBox, VisionError};

/// A single captured screen image
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic frame identifier assigned by the capturer
    pub id: u64,
    /// Frame pixels
    pub image: RgbaImage,
}

impl Frame {
    /// Wrap an already decoded image
    pub fn new(id: u64, image: RgbaImage) -> Self {
        Self { id, image }
    }

    /// Build a frame from raw RGBA bytes
    pub fn from_raw(
        id: u64,
        frame_data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Self, VisionError> {
        let expected = (width as usize) * (height as usize) * 4;
        if frame_data.len() != expected {
            return Err(VisionError::InvalidFrameData {
                expected,
                actual: frame_data.len(),
            });
        }

        let image: RgbaImage = ImageBuffer::from_raw(width, height, frame_data.to_vec()).ok_or(
            VisionError::InvalidFrameData {
                expected,
                actual: frame_data.len(),
            },
        )?;

        Ok(Self { id, image })
    }

    /// A uniformly colored frame, handy for tests and placeholders
    pub fn blank(id: u64, width: u32, height: u32) -> Self {
        Self {
            id,
            image: ImageBuffer::from_pixel(width, height, Rgba([0, 0, 0, 255])),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Crop a region, clamped to the frame bounds
    pub fn crop(&self, bbox: &BBox) -> Option<RgbaImage> {
        let (w, h) = self.image.dimensions();
        let (x, y, cw, ch) = bbox.to_crop_rect(w, h)?;
        Some(image::imageops::crop_imm(&self.image, x, y, cw, ch).to_image())
    }
}
