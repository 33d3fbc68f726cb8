//! Eye-closure estimation from facial landmarks.
//!
//! Blink detection is an optional capability. The estimator is chosen once at
//! construction: with no landmark backend the `NullBlinkEstimator` reports the
//! eyes as open on every frame, so the blink-rate channel never fires.

use anyhow::Result;
use image::RgbImage;

/// Face-mesh indices of the six points around the left eye, in EAR order.
pub const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
/// Face-mesh indices of the six points around the right eye, in EAR order.
pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
/// Average EAR below which the eyes count as closed.
pub const EAR_CLOSED_THRESHOLD: f32 = 0.2;
/// Points in a full face mesh.
pub const FACE_MESH_POINTS: usize = 468;

/// Landmark points for one face, in frame pixel coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceLandmarks {
    pub points: Vec<(f32, f32)>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<(f32, f32)>) -> Self {
        Self { points }
    }

    fn eye(&self, indices: &[usize; 6]) -> Option<[(f32, f32); 6]> {
        let mut eye = [(0.0, 0.0); 6];
        for (slot, &idx) in eye.iter_mut().zip(indices) {
            *slot = *self.points.get(idx)?;
        }
        Some(eye)
    }

    /// Mean EAR of both eyes, or `None` when either eye is missing or degenerate.
    pub fn average_ear(&self) -> Option<f32> {
        let left = eye_aspect_ratio(&self.eye(&LEFT_EYE)?)?;
        let right = eye_aspect_ratio(&self.eye(&RIGHT_EYE)?)?;
        Some((left + right) / 2.0)
    }
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// `(|p2-p6| + |p3-p5|) / (2 |p1-p4|)`. Zero horizontal span yields `None`.
pub fn eye_aspect_ratio(eye: &[(f32, f32); 6]) -> Option<f32> {
    let horizontal = distance(eye[0], eye[3]);
    if horizontal <= f32::EPSILON || !horizontal.is_finite() {
        return None;
    }
    let vertical = distance(eye[1], eye[5]) + distance(eye[2], eye[4]);
    Some(vertical / (2.0 * horizontal))
}

/// Produces facial landmarks for a frame.
///
/// Implementations must treat the frame as read-only and must not retain it
/// past the call.
pub trait LandmarkBackend: Send {
    fn name(&self) -> &'static str;

    /// Landmarks for the first face found, or `None` when no face is visible.
    fn landmarks(&mut self, frame: &RgbImage) -> Result<Option<FaceLandmarks>>;
}

/// Eye-closure strategy.
pub trait BlinkEstimator: Send {
    fn name(&self) -> &'static str;

    /// False when the estimator can never report a closed eye.
    fn available(&self) -> bool;

    fn eye_closed(&mut self, frame: &RgbImage) -> Result<bool>;
}

/// Estimator used when no landmark backend is present.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullBlinkEstimator;

impl BlinkEstimator for NullBlinkEstimator {
    fn name(&self) -> &'static str {
        "null"
    }

    fn available(&self) -> bool {
        false
    }

    fn eye_closed(&mut self, _frame: &RgbImage) -> Result<bool> {
        Ok(false)
    }
}

pub struct LandmarkBlinkEstimator {
    backend: Box<dyn LandmarkBackend>,
    ear_threshold: f32,
}

impl LandmarkBlinkEstimator {
    pub fn new(backend: Box<dyn LandmarkBackend>) -> Self {
        Self {
            backend,
            ear_threshold: EAR_CLOSED_THRESHOLD,
        }
    }

    pub fn with_ear_threshold(mut self, threshold: f32) -> Self {
        self.ear_threshold = threshold;
        self
    }

    pub fn ear_threshold(&self) -> f32 {
        self.ear_threshold
    }
}

impl BlinkEstimator for LandmarkBlinkEstimator {
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    fn available(&self) -> bool {
        true
    }

    fn eye_closed(&mut self, frame: &RgbImage) -> Result<bool> {
        let Some(face) = self.backend.landmarks(frame)? else {
            return Ok(false);
        };
        Ok(face
            .average_ear()
            .map(|ear| ear < self.ear_threshold)
            .unwrap_or(false))
    }
}

/// Pick the estimator for the lifetime of a monitor.
pub fn select_blink_estimator(
    backend: Option<Box<dyn LandmarkBackend>>,
    ear_threshold: f32,
) -> Box<dyn BlinkEstimator> {
    match backend {
        Some(backend) => {
            log::info!("blink detection enabled (backend: {})", backend.name());
            Box::new(LandmarkBlinkEstimator::new(backend).with_ear_threshold(ear_threshold))
        }
        None => {
            log::warn!("blink detection unavailable: no landmark backend");
            Box::new(NullBlinkEstimator)
        }
    }
}
