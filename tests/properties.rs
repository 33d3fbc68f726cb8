use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use proptest::prelude::*;

use carewatch::alert::AlertKind;
use carewatch::engine::{ChannelDebouncer, CooldownGate};
use carewatch::{DetectionEngine, DetectionProfile, EngineSettings, FrameSignals, ProfileStore};

proptest! {
    #[test]
    fn debounce_confirms_exactly_at_run_length(
        frames in prop::collection::vec(any::<bool>(), 0..300),
        confirm in 1u32..20,
    ) {
        let mut channel = ChannelDebouncer::new();
        let mut run = 0u32;
        for signal in frames {
            let confirmed = channel.observe(signal, confirm);
            if signal {
                run += 1;
            } else {
                run = 0;
            }
            let expected = run == confirm;
            if expected {
                run = 0;
            }
            prop_assert_eq!(confirmed, expected);
            prop_assert_eq!(channel.consecutive(), run);
        }
    }

    #[test]
    fn short_runs_never_confirm(confirm in 2u32..30, repeats in 1usize..20) {
        let mut channel = ChannelDebouncer::new();
        for _ in 0..repeats {
            for _ in 0..confirm - 1 {
                prop_assert!(!channel.observe(true, confirm));
            }
            prop_assert!(!channel.observe(false, confirm));
        }
    }

    #[test]
    fn motion_needs_twice_the_fall_frames(n in 1u32..15) {
        let profile = DetectionProfile::new(1000, 0.3, n, 30);
        let t0 = Instant::now();
        let mut engine = DetectionEngine::new(EngineSettings::default(), t0);
        let moving = FrameSignals {
            motion_detected: true,
            motion_energy: 5000,
            ..FrameSignals::default()
        };
        for i in 0..(2 * n - 1) {
            let alerts = engine.step(&moving, &profile, t0 + Duration::from_millis(i as u64));
            prop_assert!(alerts.is_empty());
        }
        let alerts = engine.step(&moving, &profile, t0 + Duration::from_millis(2 * n as u64));
        prop_assert_eq!(alerts.len(), 1);
        prop_assert_eq!(alerts[0].kind, AlertKind::Seizure);
    }

    #[test]
    fn cooldown_spacing_holds(
        gaps in prop::collection::vec(0u64..40_000, 1..200),
        cooldown_secs in 10u64..60,
    ) {
        let cooldown = Duration::from_secs(cooldown_secs);
        let t0 = Instant::now();
        let mut gate = CooldownGate::new();
        let mut now = t0;
        let mut last_fired: Option<Instant> = None;
        for gap in gaps {
            now += Duration::from_millis(gap);
            let fired = gate.try_fire(AlertKind::Fall, now, cooldown);
            let expected = last_fired.map_or(true, |last| now - last >= cooldown);
            prop_assert_eq!(fired, expected);
            if fired {
                last_fired = Some(now);
            }
            prop_assert_eq!(gate.last_fired(AlertKind::Fall), last_fired);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn readers_never_see_a_half_updated_profile(thresholds in prop::collection::vec(100u32..=10_000, 1..50)) {
        let store = Arc::new(ProfileStore::default());
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                for threshold in thresholds {
                    store.set_health_mode(true);
                    store.set_health_mode(false);
                    store.set_motion_threshold(threshold);
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let intensive = DetectionProfile::intensive();
        let mut checked = 0u32;
        while !done.load(Ordering::SeqCst) || checked == 0 {
            let snapshot = store.snapshot();
            let active = snapshot.active();
            if snapshot.health_mode {
                prop_assert_eq!(*active, intensive);
            } else {
                // Only the motion threshold of the normal profile is ever changed.
                let mut expected = DetectionProfile::normal();
                expected.motion_threshold = active.motion_threshold;
                prop_assert_eq!(*active, expected);
            }
            checked += 1;
        }
        writer.join().expect("writer panicked");
    }
}

#[test]
fn frame_loop_sees_whole_profiles_while_health_mode_toggles() {
    let store = Arc::new(ProfileStore::default());
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            let mut on = false;
            while !done.load(Ordering::SeqCst) {
                on = !on;
                store.set_health_mode(on);
            }
        })
    };

    let normal = DetectionProfile::normal();
    let intensive = DetectionProfile::intensive();
    let moving = FrameSignals {
        motion_detected: true,
        motion_energy: 5000,
        ..FrameSignals::default()
    };
    let t0 = Instant::now();
    let mut engine = DetectionEngine::new(EngineSettings::default(), t0);
    let mut alerts = Vec::new();

    // 1 ms per frame keeps the whole run inside the shortest alert cooldown.
    for i in 0..5_000u64 {
        let snapshot = store.snapshot();
        let active = snapshot.active();
        if snapshot.health_mode {
            assert_eq!(*active, intensive);
        } else {
            assert_eq!(*active, normal);
        }
        alerts.extend(engine.step(&moving, active, t0 + Duration::from_millis(i)));
        if i % 64 == 0 {
            std::thread::yield_now();
        }
    }
    done.store(true, Ordering::SeqCst);
    writer.join().expect("writer panicked");

    assert_eq!(alerts.len(), 1, "one seizure per cooldown: {:?}", alerts);
    assert_eq!(alerts[0].kind, AlertKind::Seizure);
}
