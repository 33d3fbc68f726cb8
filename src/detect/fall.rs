//! Fall geometry: where does the dominant foreground object sit?

use image::{imageops, GrayImage};
use imageproc::contours::{find_contours, BorderType, Contour};

use crate::profile::DetectionProfile;

/// Motion energy floor below which a low-lying object is treated as static
/// background rather than a fallen person. Not part of the tunable profile.
pub const FALL_MOTION_FLOOR: u64 = 500;

/// Axis-aligned bounding box in mask pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Row just below the box.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FallAssessment {
    /// Bottom edge of the dominant object as a fraction of frame height.
    pub relative_height: Option<f32>,
    pub fall_detected: bool,
}

/// Largest external contour of `mask` by enclosed area. Ties keep the first
/// contour found. Regions touching the frame border are included.
pub fn dominant_region(mask: &GrayImage) -> Option<BoundingBox> {
    // Border following needs a zero pixel left of every outer border start.
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut padded, mask, 1, 1);
    let contours = find_contours::<u32>(&padded);
    let mut best: Option<(f64, BoundingBox)> = None;
    for contour in contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
    {
        let Some(bbox) = bounding_box(contour) else {
            continue;
        };
        let area = polygon_area(contour);
        match best {
            Some((best_area, _)) if area <= best_area => {}
            _ => best = Some((area, bbox)),
        }
    }
    best.map(|(_, bbox)| bbox)
}

/// `fall_detected` requires the object's bottom edge below
/// `1 - fall_height_ratio` of the frame and more than `FALL_MOTION_FLOOR`
/// foreground pixels.
pub fn assess_fall(mask: &GrayImage, motion_energy: u64, profile: &DetectionProfile) -> FallAssessment {
    let frame_height = mask.height();
    if frame_height == 0 {
        return FallAssessment::default();
    }
    let Some(bbox) = dominant_region(mask) else {
        return FallAssessment::default();
    };
    let relative_height = bbox.bottom() as f32 / frame_height as f32;
    let low = relative_height > 1.0 - profile.fall_height_ratio;
    FallAssessment {
        relative_height: Some(relative_height),
        fall_detected: low && motion_energy > FALL_MOTION_FLOOR,
    }
}

/// Bounding box in unpadded mask coordinates.
fn bounding_box(contour: &Contour<u32>) -> Option<BoundingBox> {
    let first = contour.points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &contour.points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(BoundingBox {
        x: min_x.saturating_sub(1),
        y: min_y.saturating_sub(1),
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

/// Shoelace area of the contour polygon through pixel centers.
fn polygon_area(contour: &Contour<u32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0f64;
    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        twice_area += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
    }
    twice_area.abs() / 2.0
}
