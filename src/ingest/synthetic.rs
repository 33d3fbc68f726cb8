//! Synthetic frame source (`stub://` URLs).
//!
//! Renders a simple room: a shaded background with sensor noise and one bright
//! "person" block whose behavior depends on the scene.
//!
//! - `stub://idle`: the person stands still
//! - `stub://seizure`: the person shakes violently in place
//! - `stub://fall`: the person stands, then lies at the bottom of the frame, moving
//! - `stub://cycle` (or any other name): idle, seizure, idle, fall, repeating

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use rand::Rng;

use super::{FrameSource, SourceSettings, SourceStats};
use crate::frame::RawFrame;

/// Frames spent in each phase of a scene.
const PHASE_FRAMES: u64 = 60;
const BACKGROUND_LEVEL: u8 = 60;
const PERSON_COLOR: [u8; 3] = [210, 190, 170];

/// Behavior of the synthetic person.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scene {
    Idle,
    Seizure,
    Fall,
    Cycle,
}

impl Scene {
    fn from_url(url: &str) -> Self {
        let name = url.trim_start_matches("stub://");
        let name = name.split(['/', '?']).next().unwrap_or_default();
        match name {
            "idle" => Scene::Idle,
            "seizure" => Scene::Seizure,
            "fall" => Scene::Fall,
            _ => Scene::Cycle,
        }
    }
}

pub struct SyntheticSource {
    settings: SourceSettings,
    scene: Scene,
    opened: bool,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(settings: SourceSettings) -> Self {
        let scene = Scene::from_url(&settings.url);
        Self {
            settings,
            scene,
            opened: false,
            frame_count: 0,
        }
    }

    pub fn scene(&self) -> Scene {
        self.scene
    }

    /// Scene in effect for the current frame after resolving `Cycle`.
    fn phase(&self) -> Scene {
        match self.scene {
            Scene::Cycle => match (self.frame_count / PHASE_FRAMES) % 4 {
                0 | 2 => Scene::Idle,
                1 => Scene::Seizure,
                _ => Scene::Fall,
            },
            scene => scene,
        }
    }

    fn render(&self) -> RgbImage {
        let width = self.settings.width;
        let height = self.settings.height;
        let mut rng = rand::thread_rng();
        let mut image = RgbImage::from_fn(width, height, |_, y| {
            let shade = BACKGROUND_LEVEL as u32 + (y * 20) / height.max(1);
            let noise: i32 = rng.gen_range(-2..=2);
            let level = (shade as i32 + noise).clamp(0, 255) as u8;
            Rgb([level, level, level])
        });

        let person_w = (width / 10).max(4);
        let person_h = (height * 2 / 5).max(8);
        let center_x = (width / 2) as i32;
        let frame_in_phase = self.frame_count % PHASE_FRAMES;

        let rect = match self.phase() {
            Scene::Idle | Scene::Cycle => {
                Rect::at(center_x - person_w as i32 / 2, (height / 4) as i32)
                    .of_size(person_w, person_h)
            }
            Scene::Seizure => {
                let swing = (width / 12) as i32;
                let offset = if self.frame_count % 2 == 0 { swing } else { -swing };
                Rect::at(center_x - person_w as i32 / 2 + offset, (height / 4) as i32)
                    .of_size(person_w, person_h)
            }
            Scene::Fall => {
                if self.scene == Scene::Fall && frame_in_phase < PHASE_FRAMES / 4 {
                    Rect::at(center_x - person_w as i32 / 2, (height / 4) as i32)
                        .of_size(person_w, person_h)
                } else {
                    // Lying across the floor, still moving.
                    let wiggle = if self.frame_count % 2 == 0 { 8 } else { -8 };
                    let lying_h = person_w;
                    let top = height.saturating_sub(lying_h + height / 40) as i32;
                    Rect::at(center_x - person_h as i32 / 2 + wiggle, top)
                        .of_size(person_h, lying_h)
                }
            }
        };
        draw_filled_rect_mut(&mut image, rect, Rgb(PERSON_COLOR));
        image
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.settings.url.clone()
    }

    /// Synthetic sources are always available.
    fn open(&mut self) -> Result<()> {
        self.opened = true;
        log::info!(
            "SyntheticSource: opened {} ({:?}, {}x{})",
            self.settings.url,
            self.scene,
            self.settings.width,
            self.settings.height
        );
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RawFrame> {
        if !self.opened {
            return Err(anyhow!("synthetic source {} is not open", self.settings.url));
        }
        self.frame_count += 1;
        Ok(RawFrame::from_image(self.render()).with_sequence(self.frame_count))
    }

    fn close(&mut self) {
        if self.opened {
            self.opened = false;
            log::info!("SyntheticSource: closed {}", self.settings.url);
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            read_failures: 0,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_settings(url: &str) -> SourceSettings {
        SourceSettings {
            url: url.to_string(),
            ..SourceSettings::default()
        }
    }

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let mut source = SyntheticSource::new(stub_settings("stub://idle"));
        source.open()?;

        let frame = source.read_frame()?;
        assert_eq!(frame.width, 640);
        assert_eq!(frame.height, 480);
        assert_eq!(frame.sequence(), 1);
        assert_eq!(source.stats().frames_captured, 1);

        Ok(())
    }

    #[test]
    fn read_before_open_fails() {
        let mut source = SyntheticSource::new(stub_settings("stub://idle"));
        assert!(source.read_frame().is_err());
    }

    #[test]
    fn close_is_idempotent() -> Result<()> {
        let mut source = SyntheticSource::new(stub_settings("stub://fall"));
        source.open()?;
        source.close();
        source.close();
        assert!(source.read_frame().is_err());
        Ok(())
    }

    #[test]
    fn scene_is_parsed_from_url() {
        assert_eq!(Scene::from_url("stub://seizure"), Scene::Seizure);
        assert_eq!(Scene::from_url("stub://fall?fps=10"), Scene::Fall);
        assert_eq!(Scene::from_url("stub://front_room"), Scene::Cycle);
    }

    #[test]
    fn fallen_person_sits_in_lower_band() -> Result<()> {
        let mut source = SyntheticSource::new(stub_settings("stub://fall"));
        source.open()?;
        let mut last = None;
        for _ in 0..PHASE_FRAMES {
            last = Some(source.read_frame()?);
        }
        let frame = last.expect("frames");
        let luma = frame.to_luma();
        let lowest_bright_row = (0..luma.height())
            .rev()
            .find(|&y| (0..luma.width()).any(|x| luma.get_pixel(x, y).0[0] > 150))
            .expect("person visible");
        assert!(lowest_bright_row as f32 / luma.height() as f32 > 0.9);
        Ok(())
    }
}
