//! Sensitivity profiles.
//!
//! Two named `DetectionProfile`s exist at all times, "normal" and "intensive".
//! Health mode selects the intensive one. The pair lives in an immutable
//! `ProfileSet` that is replaced wholesale on every change, so the detection
//! loop always reads a consistent set of thresholds for a whole frame.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;

pub const MIN_MOTION_THRESHOLD: u32 = 100;
pub const MAX_MOTION_THRESHOLD: u32 = 10_000;
pub const MIN_FALL_HEIGHT_RATIO: f32 = 0.1;
pub const MAX_FALL_HEIGHT_RATIO: f32 = 0.8;
pub const MIN_ALERT_COOLDOWN_SECS: u64 = 10;

/// Thresholds applied to every per-frame decision.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionProfile {
    /// Foreground pixels above which a frame counts as moving.
    pub motion_threshold: u32,
    /// Fraction of frame height, measured from the bottom, that counts as "on the floor".
    pub fall_height_ratio: f32,
    pub consecutive_frames: u32,
    /// Consecutive moving frames that confirm a seizure.
    pub motion_confirm_frames: u32,
    /// Consecutive low frames that confirm a fall.
    pub fall_confirm_frames: u32,
    /// Minimum seconds between two seizure alerts (and between two fall alerts).
    pub alert_cooldown_secs: u64,
}

impl DetectionProfile {
    pub fn normal() -> Self {
        Self::new(1000, 0.3, 5, 30)
    }

    pub fn intensive() -> Self {
        Self::new(500, 0.2, 5, 15)
    }

    /// Build a profile whose confirmation thresholds derive from
    /// `consecutive_frames`: motion needs twice as many frames as a fall.
    pub fn new(
        motion_threshold: u32,
        fall_height_ratio: f32,
        consecutive_frames: u32,
        alert_cooldown_secs: u64,
    ) -> Self {
        let consecutive_frames = consecutive_frames.max(1);
        Self {
            motion_threshold,
            fall_height_ratio,
            consecutive_frames,
            motion_confirm_frames: consecutive_frames.saturating_mul(2),
            fall_confirm_frames: consecutive_frames,
            alert_cooldown_secs,
        }
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    /// Same profile with every field forced into its allowed range.
    pub fn clamped(mut self) -> Self {
        self.motion_threshold = clamp_motion_threshold(self.motion_threshold);
        self.fall_height_ratio = clamp_fall_height_ratio(self.fall_height_ratio);
        self.alert_cooldown_secs = self.alert_cooldown_secs.max(MIN_ALERT_COOLDOWN_SECS);
        self.consecutive_frames = self.consecutive_frames.max(1);
        self.motion_confirm_frames = self.motion_confirm_frames.max(1);
        self.fall_confirm_frames = self.fall_confirm_frames.max(1);
        self
    }

    /// Reject out-of-range values instead of clamping them.
    pub fn validate(&self, name: &str) -> Result<()> {
        if !(MIN_MOTION_THRESHOLD..=MAX_MOTION_THRESHOLD).contains(&self.motion_threshold) {
            return Err(anyhow!(
                "profile {}: motion_threshold {} outside [{}, {}]",
                name,
                self.motion_threshold,
                MIN_MOTION_THRESHOLD,
                MAX_MOTION_THRESHOLD
            ));
        }
        if !(MIN_FALL_HEIGHT_RATIO..=MAX_FALL_HEIGHT_RATIO).contains(&self.fall_height_ratio) {
            return Err(anyhow!(
                "profile {}: fall_height_ratio {} outside [{}, {}]",
                name,
                self.fall_height_ratio,
                MIN_FALL_HEIGHT_RATIO,
                MAX_FALL_HEIGHT_RATIO
            ));
        }
        if self.alert_cooldown_secs < MIN_ALERT_COOLDOWN_SECS {
            return Err(anyhow!(
                "profile {}: alert_cooldown_secs must be at least {}",
                name,
                MIN_ALERT_COOLDOWN_SECS
            ));
        }
        if self.motion_confirm_frames == 0 || self.fall_confirm_frames == 0 {
            return Err(anyhow!("profile {}: confirm frames must be at least 1", name));
        }
        Ok(())
    }
}

pub fn clamp_motion_threshold(value: u32) -> u32 {
    value.clamp(MIN_MOTION_THRESHOLD, MAX_MOTION_THRESHOLD)
}

pub fn clamp_fall_height_ratio(value: f32) -> f32 {
    if value.is_nan() {
        return MIN_FALL_HEIGHT_RATIO;
    }
    value.clamp(MIN_FALL_HEIGHT_RATIO, MAX_FALL_HEIGHT_RATIO)
}

/// The two named profiles plus the selector between them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ProfileSet {
    pub normal: DetectionProfile,
    pub intensive: DetectionProfile,
    pub health_mode: bool,
}

impl ProfileSet {
    pub fn new(normal: DetectionProfile, intensive: DetectionProfile) -> Self {
        Self {
            normal,
            intensive,
            health_mode: false,
        }
    }

    pub fn active(&self) -> &DetectionProfile {
        if self.health_mode {
            &self.intensive
        } else {
            &self.normal
        }
    }

    fn active_mut(&mut self) -> &mut DetectionProfile {
        if self.health_mode {
            &mut self.intensive
        } else {
            &mut self.normal
        }
    }
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self::new(DetectionProfile::normal(), DetectionProfile::intensive())
    }
}

/// Single-writer holder of the current `ProfileSet`.
///
/// Readers take an `Arc` snapshot; writers build a modified copy and swap it in.
/// The lock is only held for the pointer read or write.
pub struct ProfileStore {
    current: RwLock<Arc<ProfileSet>>,
}

impl ProfileStore {
    pub fn new(set: ProfileSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    pub fn snapshot(&self) -> Arc<ProfileSet> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn health_mode(&self) -> bool {
        self.snapshot().health_mode
    }

    pub fn set_health_mode(&self, enabled: bool) {
        self.update(|set| set.health_mode = enabled);
    }

    /// Clamped to [100, 10000]. Applies to the active profile.
    pub fn set_motion_threshold(&self, threshold: u32) {
        let threshold = clamp_motion_threshold(threshold);
        self.update(|set| set.active_mut().motion_threshold = threshold);
    }

    /// Clamped to [0.1, 0.8]. Applies to the active profile.
    pub fn set_fall_threshold(&self, ratio: f32) {
        let ratio = clamp_fall_height_ratio(ratio);
        self.update(|set| set.active_mut().fall_height_ratio = ratio);
    }

    /// Floored at 10 seconds. Applies to the active profile.
    pub fn set_alert_cooldown(&self, secs: u64) {
        let secs = secs.max(MIN_ALERT_COOLDOWN_SECS);
        self.update(|set| set.active_mut().alert_cooldown_secs = secs);
    }

    /// Resets both confirmation thresholds from `frames` (fall N, motion 2N).
    pub fn set_consecutive_frames(&self, frames: u32) {
        self.update(|set| {
            let active = set.active_mut();
            *active = DetectionProfile::new(
                active.motion_threshold,
                active.fall_height_ratio,
                frames,
                active.alert_cooldown_secs,
            );
        });
    }

    fn update(&self, change: impl FnOnce(&mut ProfileSet)) {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = **guard;
        change(&mut next);
        *guard = Arc::new(next);
    }
}

impl Default for ProfileStore {
    fn default() -> Self {
        Self::new(ProfileSet::default())
    }
}
