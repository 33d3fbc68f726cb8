//! Adaptive per-pixel Gaussian background model.
//!
//! Each pixel keeps a running mean and variance of its intensity. A pixel is
//! foreground when its squared distance from the mean exceeds
//! `var_threshold * variance`. The learning rate follows `1 / min(2n, history)`
//! so the model settles quickly after seeding and then adapts over roughly
//! `history` frames.

use image::{GrayImage, Luma};

pub const DEFAULT_HISTORY: u32 = 100;
pub const DEFAULT_VAR_THRESHOLD: f32 = 50.0;

const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 75.0;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

#[derive(Clone, Debug)]
pub struct BackgroundModel {
    history: u32,
    var_threshold: f32,
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u32,
}

impl BackgroundModel {
    pub fn new(history: u32, var_threshold: f32) -> Self {
        Self {
            history: history.max(1),
            var_threshold: var_threshold.max(f32::EPSILON),
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
            frames_seen: 0,
        }
    }

    /// True once the model has absorbed at least one frame.
    pub fn is_seeded(&self) -> bool {
        self.frames_seen > 0
    }

    pub fn frames_seen(&self) -> u32 {
        self.frames_seen
    }

    /// Drop all learned statistics. The next frame reseeds the model.
    pub fn reset(&mut self) {
        self.mean.clear();
        self.variance.clear();
        self.frames_seen = 0;
    }

    /// Classify `gray` against the model, then learn from it.
    ///
    /// The first frame (or the first after a size change) seeds the model and
    /// yields an empty mask.
    pub fn apply(&mut self, gray: &GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        if !self.is_seeded() || width != self.width || height != self.height {
            self.seed(gray);
            return GrayImage::new(width, height);
        }

        self.frames_seen = self.frames_seen.saturating_add(1);
        let alpha = 1.0 / (self.frames_seen.saturating_mul(2)).min(self.history) as f32;

        let mut mask = GrayImage::new(width, height);
        for ((out, px), (mean, variance)) in mask
            .pixels_mut()
            .zip(gray.pixels())
            .zip(self.mean.iter_mut().zip(self.variance.iter_mut()))
        {
            let value = px.0[0] as f32;
            let diff = value - *mean;
            let dist2 = diff * diff;
            if dist2 > self.var_threshold * *variance {
                *out = Luma([FOREGROUND]);
            }
            *mean += alpha * diff;
            *variance = (*variance + alpha * (dist2 - *variance)).clamp(VAR_MIN, VAR_MAX);
        }
        mask
    }

    fn seed(&mut self, gray: &GrayImage) {
        self.width = gray.width();
        self.height = gray.height();
        self.mean = gray.pixels().map(|p| p.0[0] as f32).collect();
        self.variance = vec![VAR_INIT; self.mean.len()];
        self.frames_seen = 1;
    }
}

impl Default for BackgroundModel {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY, DEFAULT_VAR_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(level: u8) -> GrayImage {
        GrayImage::from_pixel(64, 48, Luma([level]))
    }

    fn with_block(level: u8, block: u8) -> GrayImage {
        let mut img = flat(level);
        for y in 10..30 {
            for x in 20..40 {
                img.put_pixel(x, y, Luma([block]));
            }
        }
        img
    }

    fn count_foreground(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] == FOREGROUND).count()
    }

    #[test]
    fn first_frame_seeds_and_reports_nothing() {
        let mut model = BackgroundModel::default();
        let mask = model.apply(&with_block(40, 220));
        assert_eq!(count_foreground(&mask), 0);
        assert!(model.is_seeded());
    }

    #[test]
    fn static_scene_stays_background() {
        let mut model = BackgroundModel::default();
        for _ in 0..50 {
            let mask = model.apply(&flat(80));
            assert_eq!(count_foreground(&mask), 0);
        }
    }

    #[test]
    fn new_object_is_foreground() {
        let mut model = BackgroundModel::default();
        for _ in 0..20 {
            model.apply(&flat(40));
        }
        let mask = model.apply(&with_block(40, 220));
        assert_eq!(count_foreground(&mask), 20 * 20);
        assert_eq!(mask.get_pixel(0, 0).0[0], BACKGROUND);
    }

    #[test]
    fn stationary_object_is_absorbed_over_history() {
        let mut model = BackgroundModel::new(20, DEFAULT_VAR_THRESHOLD);
        for _ in 0..10 {
            model.apply(&flat(40));
        }
        let mut last = 0;
        for _ in 0..200 {
            last = count_foreground(&model.apply(&with_block(40, 220)));
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn size_change_reseeds() {
        let mut model = BackgroundModel::default();
        model.apply(&flat(40));
        model.apply(&flat(40));
        let mask = model.apply(&GrayImage::from_pixel(32, 32, Luma([250])));
        assert_eq!(count_foreground(&mask), 0);
        assert_eq!(model.frames_seen(), 1);
    }
}
