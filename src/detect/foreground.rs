//! Foreground extraction: blur, background subtraction, threshold, dilation.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;

use super::background::{BackgroundModel, DEFAULT_HISTORY, DEFAULT_VAR_THRESHOLD};

/// Sigma equivalent to a 21x21 Gaussian kernel.
pub const DEFAULT_BLUR_SIGMA: f32 = 3.5;
/// Pixel-intensity cut applied to the raw model output.
pub const MASK_THRESHOLD: u8 = 25;
/// Chebyshev radius 2 is a 5x5 square structuring element.
const DILATE_RADIUS: u8 = 2;
const DILATE_ITERATIONS: usize = 2;

/// Foreground mask and its motion energy for one frame.
#[derive(Clone, Debug)]
pub struct Foreground {
    pub mask: GrayImage,
    /// Number of non-zero mask pixels.
    pub energy: u64,
}

impl Foreground {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            mask: GrayImage::new(width, height),
            energy: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ForegroundExtractor {
    model: BackgroundModel,
    blur_sigma: f32,
}

impl ForegroundExtractor {
    pub fn new(history: u32, var_threshold: f32) -> Self {
        Self {
            model: BackgroundModel::new(history, var_threshold),
            blur_sigma: DEFAULT_BLUR_SIGMA,
        }
    }

    /// Override the blur; values <= 0 disable blurring.
    pub fn with_blur_sigma(mut self, sigma: f32) -> Self {
        self.blur_sigma = sigma;
        self
    }

    pub fn model(&self) -> &BackgroundModel {
        &self.model
    }

    pub fn reset(&mut self) {
        self.model.reset();
    }

    /// Run one grayscale frame through the pipeline.
    pub fn apply(&mut self, gray: &GrayImage) -> Foreground {
        let raw = if self.blur_sigma > 0.0 {
            let blurred = gaussian_blur_f32(gray, self.blur_sigma);
            self.model.apply(&blurred)
        } else {
            self.model.apply(gray)
        };

        let mut mask = threshold(&raw, MASK_THRESHOLD);
        for _ in 0..DILATE_ITERATIONS {
            mask = dilate(&mask, Norm::LInf, DILATE_RADIUS);
        }
        let energy = motion_energy(&mask);
        Foreground { mask, energy }
    }
}

impl Default for ForegroundExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY, DEFAULT_VAR_THRESHOLD)
    }
}

/// Binary threshold: values strictly above `cut` become 255.
pub fn threshold(image: &GrayImage, cut: u8) -> GrayImage {
    let mut out = GrayImage::new(image.width(), image.height());
    for (dst, src) in out.pixels_mut().zip(image.pixels()) {
        if src.0[0] > cut {
            *dst = Luma([255]);
        }
    }
    out
}

/// Count of non-zero mask pixels.
pub fn motion_energy(mask: &GrayImage) -> u64 {
    mask.pixels().filter(|p| p.0[0] > 0).count() as u64
}
