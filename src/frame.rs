//! Raw frame container.
//!
//! `RawFrame` owns the RGB pixels of one captured frame for the duration of a
//! single loop iteration.
//!
//! - Pixels are private. Detection stages read them through `resized()` and `to_luma()`.
//! - There is no `Clone` and no serialization: frames are never persisted.
//! - The pixel buffer is zeroized on drop.

use anyhow::{anyhow, Result};
use image::{imageops, GrayImage, Rgb, RgbImage};
use zeroize::Zeroize;

/// Processing width requested from sources and used by the detection stages.
pub const DEFAULT_WIDTH: u32 = 640;
/// Processing height requested from sources and used by the detection stages.
pub const DEFAULT_HEIGHT: u32 = 480;

// ----------------------------------------------------------------------------
// RawFrame
// ----------------------------------------------------------------------------

/// A single color frame as delivered by a `FrameSource`.
pub struct RawFrame {
    /// Private pixel data (packed RGB8).
    pixels: RgbImage,

    pub width: u32,
    pub height: u32,

    /// Per-source sequence number, starting at 1.
    sequence: u64,
}

// Explicitly NOT implementing Clone or any serde trait.

impl RawFrame {
    /// Wrap packed RGB8 bytes. The buffer length must be `width * height * 3`.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        let pixels = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::from_image(pixels))
    }

    /// Wrap an already decoded RGB image.
    pub fn from_image(pixels: RgbImage) -> Self {
        Self {
            width: pixels.width(),
            height: pixels.height(),
            pixels,
            sequence: 0,
        }
    }

    /// A frame filled with a single color.
    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> Self {
        Self::from_image(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Copy of the frame scaled to `width` x `height`, or a plain copy when the
    /// size already matches.
    pub fn resized(&self, width: u32, height: u32) -> RgbImage {
        if self.width == width && self.height == height {
            return self.pixels.clone();
        }
        imageops::resize(&self.pixels, width, height, imageops::FilterType::Triangle)
    }

    /// Luma conversion of the full frame.
    pub fn to_luma(&self) -> GrayImage {
        imageops::grayscale(&self.pixels)
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        let bytes: &mut [u8] = &mut self.pixels;
        bytes.zeroize();
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
