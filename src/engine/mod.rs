//! Decision core.
//!
//! `DetectionEngine::step` turns one frame's `FrameSignals` into zero or more
//! `AlertEvent`s. It performs no I/O and takes time as an argument, so the whole
//! debounce / cooldown / blink-window state machine can be driven frame by frame
//! in tests.

mod blink_window;
mod cooldown;
mod debounce;

use std::time::{Duration, Instant};

pub use blink_window::{BlinkWindow, BLINK_WINDOW};
pub use cooldown::CooldownGate;
pub use debounce::{ChannelDebouncer, ChannelPhase};

use crate::alert::{AlertEvent, AlertKind};
use crate::detect::FrameSignals;
use crate::profile::DetectionProfile;

pub const DEFAULT_BLINK_RATE_LIMIT: u32 = 3;
pub const DEFAULT_BLINK_COOLDOWN: Duration = Duration::from_secs(10);

/// Settings that do not vary with the sensitivity profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Blinks per window above which a blink-rate alert is attempted.
    pub blink_rate_limit: u32,
    pub blink_cooldown: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            blink_rate_limit: DEFAULT_BLINK_RATE_LIMIT,
            blink_cooldown: DEFAULT_BLINK_COOLDOWN,
        }
    }
}

pub struct DetectionEngine {
    settings: EngineSettings,
    motion: ChannelDebouncer,
    fall: ChannelDebouncer,
    blink: BlinkWindow,
    cooldown: CooldownGate,
}

impl DetectionEngine {
    pub fn new(settings: EngineSettings, now: Instant) -> Self {
        Self {
            settings,
            motion: ChannelDebouncer::new(),
            fall: ChannelDebouncer::new(),
            blink: BlinkWindow::new(now),
            cooldown: CooldownGate::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn motion_channel(&self) -> &ChannelDebouncer {
        &self.motion
    }

    pub fn fall_channel(&self) -> &ChannelDebouncer {
        &self.fall
    }

    pub fn blink_window(&self) -> &BlinkWindow {
        &self.blink
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    /// Advance the state machine by one frame.
    ///
    /// Counters update first, then the blink window, then the motion and fall
    /// channels in that order. A confirmation always resets its counter, whether
    /// or not the cooldown lets the alert through.
    pub fn step(
        &mut self,
        signals: &FrameSignals,
        profile: &DetectionProfile,
        now: Instant,
    ) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();

        let motion_confirmed = self
            .motion
            .observe(signals.motion_detected, profile.motion_confirm_frames);
        let fall_confirmed = self
            .fall
            .observe(signals.fall_detected, profile.fall_confirm_frames);

        if let Some(count) =
            self.blink
                .update(signals.eye_closed, now, self.settings.blink_rate_limit)
        {
            if self
                .cooldown
                .try_fire(AlertKind::BlinkRate, now, self.settings.blink_cooldown)
            {
                alerts.push(AlertEvent::blink_rate(count, now));
            } else {
                log::debug!("blink_rate alert suppressed by cooldown ({} blinks)", count);
            }
        }

        if motion_confirmed {
            if self
                .cooldown
                .try_fire(AlertKind::Seizure, now, profile.alert_cooldown())
            {
                alerts.push(AlertEvent::seizure(now));
            } else {
                log::debug!("seizure alert suppressed by cooldown");
            }
        }

        if fall_confirmed {
            if self
                .cooldown
                .try_fire(AlertKind::Fall, now, profile.alert_cooldown())
            {
                alerts.push(AlertEvent::fall(now));
            } else {
                log::debug!("fall alert suppressed by cooldown");
            }
        }

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moving(energy: u64) -> FrameSignals {
        FrameSignals {
            motion_detected: energy > 1000,
            motion_energy: energy,
            ..FrameSignals::default()
        }
    }

    fn falling() -> FrameSignals {
        FrameSignals {
            fall_detected: true,
            motion_energy: 600,
            ..FrameSignals::default()
        }
    }

    #[test]
    fn nine_moving_frames_then_still_is_silent() {
        let profile = DetectionProfile::normal();
        let t0 = Instant::now();
        let mut engine = DetectionEngine::new(EngineSettings::default(), t0);
        let mut alerts = Vec::new();
        for i in 0..9 {
            alerts.extend(engine.step(&moving(2000), &profile, t0 + Duration::from_millis(i)));
        }
        alerts.extend(engine.step(&moving(0), &profile, t0 + Duration::from_millis(9)));
        assert!(alerts.is_empty());
        assert_eq!(engine.motion_channel().consecutive(), 0);
    }

    #[test]
    fn ten_moving_frames_fire_one_seizure() {
        let profile = DetectionProfile::normal();
        let t0 = Instant::now();
        let mut engine = DetectionEngine::new(EngineSettings::default(), t0);
        let mut alerts = Vec::new();
        let mut last = t0;
        for i in 0..10 {
            last = t0 + Duration::from_millis(i);
            alerts.extend(engine.step(&moving(2000), &profile, last));
        }
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Seizure);
        assert_eq!(alerts[0].at, last);
        assert_eq!(engine.cooldown().last_fired(AlertKind::Seizure), Some(last));
    }

    #[test]
    fn confirmation_inside_cooldown_still_resets_counter() {
        let profile = DetectionProfile::normal();
        let t0 = Instant::now();
        let mut engine = DetectionEngine::new(EngineSettings::default(), t0);
        let mut fired = 0;
        for i in 0..20 {
            fired += engine
                .step(&moving(2000), &profile, t0 + Duration::from_millis(i))
                .len();
        }
        assert_eq!(fired, 1);
        assert_eq!(engine.motion_channel().consecutive(), 0);
    }

    #[test]
    fn fall_confirms_after_n_frames() {
        let profile = DetectionProfile::normal();
        let t0 = Instant::now();
        let mut engine = DetectionEngine::new(EngineSettings::default(), t0);
        let alerts: Vec<_> = (0..5)
            .flat_map(|i| engine.step(&falling(), &profile, t0 + Duration::from_millis(i)))
            .collect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Fall);
        assert_eq!(alerts[0].message, "possible fall detected");
    }

    #[test]
    fn blink_storm_fires_blink_rate() {
        let profile = DetectionProfile::normal();
        let t0 = Instant::now();
        let mut engine = DetectionEngine::new(EngineSettings::default(), t0);
        let mut alerts = Vec::new();
        for i in 0..10u64 {
            let signals = FrameSignals {
                eye_closed: i % 2 == 0,
                ..FrameSignals::default()
            };
            alerts.extend(engine.step(&signals, &profile, t0 + Duration::from_millis(90 * i)));
        }
        alerts.extend(engine.step(&FrameSignals::default(), &profile, t0 + BLINK_WINDOW));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::BlinkRate);
        assert_eq!(engine.blink_window().blink_count(), 0);
    }
}
