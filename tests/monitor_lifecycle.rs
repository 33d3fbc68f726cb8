use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use carewatch::ingest::ScriptedSource;
use carewatch::{
    AlertKind, LogVoice, MonitorController, MonitorSettings, MonitorState, NullBlinkEstimator,
    ProfileStore, RawFrame, StartError,
};

fn ignore_alerts(_: AlertKind, _: &str) -> Result<()> {
    Ok(())
}

fn fast_settings() -> MonitorSettings {
    MonitorSettings {
        loop_interval: Duration::from_millis(1),
        read_backoff: Duration::from_millis(1),
        stop_timeout: Duration::from_secs(2),
        processing_width: 32,
        processing_height: 24,
        ..MonitorSettings::default()
    }
}

fn monitor_with(source: ScriptedSource, settings: MonitorSettings) -> MonitorController {
    MonitorController::new(
        settings,
        Arc::new(ProfileStore::default()),
        Box::new(source),
        Box::new(NullBlinkEstimator),
        Arc::new(LogVoice),
    )
}

fn steady_source() -> ScriptedSource {
    ScriptedSource::from_fn("steady", |_| Ok(RawFrame::solid(32, 24, [120, 120, 120])))
}

fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}

#[test]
fn double_start_and_double_stop_return_false() {
    let monitor = monitor_with(steady_source(), fast_settings());

    assert!(!monitor.stop(), "stop while idle");
    assert!(monitor.start(ignore_alerts));
    assert!(!monitor.start(ignore_alerts), "second start");
    assert!(matches!(
        monitor.try_start(ignore_alerts),
        Err(StartError::AlreadyRunning)
    ));
    assert!(monitor.stop());
    assert!(!monitor.stop(), "second stop");
    assert_eq!(monitor.state(), MonitorState::Idle);
}

#[test]
fn unavailable_device_leaves_monitor_idle() {
    let source = ScriptedSource::unavailable("cam0");
    let counters = source.counters();
    let monitor = monitor_with(source, fast_settings());

    assert!(matches!(
        monitor.try_start(ignore_alerts),
        Err(StartError::DeviceUnavailable(_))
    ));
    assert!(!monitor.start(ignore_alerts));
    assert_eq!(monitor.state(), MonitorState::Idle);
    assert!(!monitor.status().is_monitoring);
    assert_eq!(counters.opens(), 0);
}

#[test]
fn stop_releases_source_and_restart_reopens_it() {
    let source = steady_source();
    let counters = source.counters();
    let monitor = monitor_with(source, fast_settings());

    assert!(monitor.start(ignore_alerts));
    assert!(wait_until(Duration::from_secs(2), || counters.reads() > 3));
    assert!(monitor.stop());
    assert_eq!(counters.opens(), 1);
    assert_eq!(counters.closes(), 1);

    assert!(monitor.start(ignore_alerts));
    assert_eq!(counters.opens(), 2);
    assert!(monitor.stop());
    assert_eq!(counters.closes(), 2);
}

#[test]
fn frames_are_processed_while_running() {
    let monitor = monitor_with(steady_source(), fast_settings());
    assert!(monitor.start(ignore_alerts));
    assert!(wait_until(Duration::from_secs(2), || {
        monitor.status().frames_processed >= 10
    }));
    let status = monitor.status();
    assert!(status.is_monitoring);
    assert_eq!(status.state, MonitorState::Running);
    assert_eq!(status.alerts_fired, 0);
    assert!(monitor.stop());
}

#[test]
fn transient_read_failures_are_skipped() {
    let source = ScriptedSource::from_fn("flaky", |seq| {
        if seq % 3 == 0 {
            anyhow::bail!("usb hiccup")
        }
        Ok(RawFrame::solid(32, 24, [60, 60, 60]))
    });
    let monitor = monitor_with(source, fast_settings());

    assert!(monitor.start(ignore_alerts));
    assert!(wait_until(Duration::from_secs(2), || {
        let status = monitor.status();
        status.frames_processed >= 10 && status.frame_failures >= 3
    }));
    assert!(monitor.is_monitoring());
    assert!(monitor.stop());
}

#[test]
fn persistent_read_failure_returns_to_idle() {
    let source = ScriptedSource::from_fn("dead", |_| anyhow::bail!("device unplugged"));
    let counters = source.counters();
    let monitor = monitor_with(source, fast_settings());

    assert!(monitor.start(ignore_alerts));
    assert!(wait_until(Duration::from_secs(2), || {
        monitor.state() == MonitorState::Idle
    }));
    assert_eq!(monitor.status().frame_failures, 5);
    assert_eq!(counters.closes(), 1);
    assert!(!monitor.stop(), "already idle");

    // The source comes back to the controller and can be opened again.
    assert!(monitor.start(ignore_alerts));
    assert_eq!(counters.opens(), 2);
    assert!(wait_until(Duration::from_secs(2), || {
        monitor.state() == MonitorState::Idle
    }));
}

#[test]
fn stop_timeout_leaves_slow_loop_behind() {
    let source = ScriptedSource::from_fn("slow", |_| {
        std::thread::sleep(Duration::from_millis(400));
        Ok(RawFrame::solid(32, 24, [10, 10, 10]))
    });
    let counters = source.counters();
    let settings = MonitorSettings {
        stop_timeout: Duration::from_millis(50),
        ..fast_settings()
    };
    let monitor = monitor_with(source, settings);

    assert!(monitor.start(ignore_alerts));
    assert!(wait_until(Duration::from_secs(1), || counters.reads() >= 1));

    let stop_started = Instant::now();
    assert!(monitor.stop());
    assert!(stop_started.elapsed() < Duration::from_millis(350));
    assert_eq!(monitor.state(), MonitorState::Idle);

    // The abandoned loop is still inside its slow read.
    assert!(matches!(
        monitor.try_start(ignore_alerts),
        Err(StartError::PreviousLoopActive)
    ));

    // Once it finishes, its resources are reclaimed by the next start.
    assert!(wait_until(Duration::from_secs(2), || counters.closes() == 1));
    assert!(wait_until(Duration::from_secs(2), || monitor.start(ignore_alerts)));
    assert_eq!(counters.opens(), 2);
    assert!(monitor.stop());
}

#[test]
fn abandoned_loop_drops_the_frame_it_was_reading() {
    let source = ScriptedSource::from_fn("slow", |_| {
        std::thread::sleep(Duration::from_millis(300));
        Ok(RawFrame::solid(32, 24, [10, 10, 10]))
    });
    let counters = source.counters();
    let settings = MonitorSettings {
        stop_timeout: Duration::from_millis(50),
        ..fast_settings()
    };
    let monitor = monitor_with(source, settings);

    assert!(monitor.start(ignore_alerts));
    assert!(wait_until(Duration::from_secs(1), || counters.reads() >= 1));
    assert!(monitor.stop());
    let processed = monitor.status().frames_processed;

    // The slow read completes after stop gave up waiting; the loop then exits.
    assert!(wait_until(Duration::from_secs(2), || counters.closes() == 1));
    assert_eq!(monitor.status().frames_processed, processed);
    assert_eq!(monitor.status().alerts_fired, 0);
}

#[test]
fn health_protocol_enables_intensive_profile_and_starts() {
    let monitor = monitor_with(steady_source(), fast_settings());

    assert!(monitor.activate_health_protocol(ignore_alerts));
    let status = monitor.status();
    assert!(status.is_monitoring);
    assert!(status.health_mode);
    assert_eq!(status.motion_threshold, 500);
    assert_eq!(status.fall_threshold, 0.2);

    // Already running: mode stays on and nothing restarts.
    assert!(monitor.activate_health_protocol(ignore_alerts));
    assert!(monitor.stop());
}

#[test]
fn setters_are_visible_in_status() {
    let monitor = monitor_with(steady_source(), fast_settings());
    monitor.set_motion_threshold(20_000);
    monitor.set_fall_threshold(0.05);
    monitor.set_alert_cooldown(3);
    let status = monitor.status();
    assert_eq!(status.motion_threshold, 10_000);
    assert_eq!(status.fall_threshold, 0.1);
    assert_eq!(status.alert_cooldown, 10);
}

#[test]
fn concurrent_start_stop_never_panics() {
    let monitor = Arc::new(monitor_with(steady_source(), fast_settings()));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let monitor = Arc::clone(&monitor);
            std::thread::spawn(move || {
                for _ in 0..20 {
                    if i % 2 == 0 {
                        monitor.start(ignore_alerts);
                    } else {
                        monitor.stop();
                    }
                    let _ = monitor.status();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("control thread panicked");
    }
    monitor.stop();
    assert_eq!(monitor.state(), MonitorState::Idle);
}
