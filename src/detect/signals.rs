//! Per-frame signal extraction.
//!
//! Runs the detection stages over one frame in a fixed order (motion, fall,
//! blink) and reports either the frame's signals or the stage that failed.
//! Motion and fall geometry cannot fail once the frame is resized.

use std::fmt;

use image::imageops;
use image::RgbImage;

use super::blink::BlinkEstimator;
use super::fall::assess_fall;
use super::foreground::ForegroundExtractor;
use crate::frame::RawFrame;
use crate::profile::DetectionProfile;

/// Everything the decision core needs to know about one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameSignals {
    pub motion_detected: bool,
    pub fall_detected: bool,
    pub eye_closed: bool,
    pub motion_energy: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Preprocess,
    Blink,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preprocess => "preprocess",
            Stage::Blink => "blink",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: anyhow::Error,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {:#}", self.stage, self.error)
    }
}

impl std::error::Error for StageFailure {}

pub type FrameOutcome = Result<FrameSignals, StageFailure>;

/// Owns the per-monitor detection state (background model, blink estimator).
pub struct SignalExtractor {
    width: u32,
    height: u32,
    foreground: ForegroundExtractor,
    blink: Box<dyn BlinkEstimator>,
}

impl SignalExtractor {
    pub fn new(width: u32, height: u32, blink: Box<dyn BlinkEstimator>) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            foreground: ForegroundExtractor::default(),
            blink,
        }
    }

    pub fn blink_available(&self) -> bool {
        self.blink.available()
    }

    /// Drop the learned background. The next frame reseeds it.
    pub fn reset(&mut self) {
        self.foreground.reset();
    }

    pub fn extract(&mut self, frame: &RawFrame, profile: &DetectionProfile) -> FrameOutcome {
        let rgb = self.preprocess(frame)?;
        let gray = imageops::grayscale(&rgb);

        let foreground = self.foreground.apply(&gray);
        let motion_detected = foreground.energy > profile.motion_threshold as u64;

        let fall = assess_fall(&foreground.mask, foreground.energy, profile);

        let eye_closed = self.blink.eye_closed(&rgb).map_err(|error| StageFailure {
            stage: Stage::Blink,
            error,
        })?;

        Ok(FrameSignals {
            motion_detected,
            fall_detected: fall.fall_detected,
            eye_closed,
            motion_energy: foreground.energy,
        })
    }

    fn preprocess(&self, frame: &RawFrame) -> Result<RgbImage, StageFailure> {
        if frame.width == 0 || frame.height == 0 {
            return Err(StageFailure {
                stage: Stage::Preprocess,
                error: anyhow::anyhow!("empty frame"),
            });
        }
        Ok(frame.resized(self.width, self.height))
    }
}
