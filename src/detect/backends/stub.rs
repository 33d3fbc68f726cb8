use anyhow::Result;
use image::RgbImage;

use crate::detect::blink::{FaceLandmarks, LandmarkBackend, FACE_MESH_POINTS, LEFT_EYE, RIGHT_EYE};

/// Stub landmark backend for testing and demos.
///
/// Emits a synthetic face whose eyes follow a repeating open/closed pattern,
/// one entry per call. The frame content is ignored.
pub struct StubLandmarks {
    pattern: Vec<bool>,
    cursor: usize,
}

impl StubLandmarks {
    /// `true` entries produce a closed-eye face.
    pub fn from_pattern(pattern: Vec<bool>) -> Self {
        Self { pattern, cursor: 0 }
    }

    pub fn always_open() -> Self {
        Self::from_pattern(vec![false])
    }

    /// Face mesh with both eyes open or closed.
    pub fn face(closed: bool) -> FaceLandmarks {
        let mut points = vec![(0.0, 0.0); FACE_MESH_POINTS];
        let half_height = if closed { 0.5 } else { 2.0 };
        place_eye(&mut points, &LEFT_EYE, 120.0, half_height);
        place_eye(&mut points, &RIGHT_EYE, 80.0, half_height);
        FaceLandmarks::new(points)
    }
}

fn place_eye(points: &mut [(f32, f32)], indices: &[usize; 6], x0: f32, half_height: f32) {
    let y0 = 100.0;
    let shape = [
        (0.0, 0.0),
        (3.0, -half_height),
        (7.0, -half_height),
        (10.0, 0.0),
        (7.0, half_height),
        (3.0, half_height),
    ];
    for (&idx, (dx, dy)) in indices.iter().zip(shape) {
        points[idx] = (x0 + dx, y0 + dy);
    }
}

impl LandmarkBackend for StubLandmarks {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn landmarks(&mut self, _frame: &RgbImage) -> Result<Option<FaceLandmarks>> {
        if self.pattern.is_empty() {
            return Ok(None);
        }
        let closed = self.pattern[self.cursor % self.pattern.len()];
        self.cursor = self.cursor.wrapping_add(1);
        Ok(Some(Self::face(closed)))
    }
}
