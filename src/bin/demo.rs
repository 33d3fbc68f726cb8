//! demo - end-to-end synthetic run of the monitor
//!
//! Drives a `stub://` scene through the full pipeline and prints every alert as
//! one JSON line on stdout. Progress goes to stderr.

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::{Duration, Instant};

use carewatch::detect::{LandmarkBlinkEstimator, StubLandmarks};
use carewatch::{
    build_source, AlertKind, BlinkEstimator, LogVoice, MonitorController, MonitorSettings,
    NullBlinkEstimator, ProfileStore, SourceSettings,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    Seizure,
    Fall,
    Blink,
    Cycle,
}

impl Scenario {
    fn source_url(self) -> &'static str {
        match self {
            Scenario::Seizure => "stub://seizure",
            Scenario::Fall => "stub://fall",
            Scenario::Blink => "stub://idle",
            Scenario::Cycle => "stub://cycle",
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Synthetic scene to run.
    #[arg(long, value_enum, default_value_t = Scenario::Cycle)]
    scenario: Scenario,
    /// Duration in seconds.
    #[arg(long, default_value_t = 15)]
    seconds: u64,
    /// Frames per second for the synthetic source.
    #[arg(long, default_value_t = 20)]
    fps: u32,
    /// Use the intensive (health mode) profile.
    #[arg(long)]
    health_mode: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    stage(&format!("scenario {:?} for {}s at {} fps", args.scenario, args.seconds, args.fps));
    let source = build_source(&SourceSettings {
        url: args.scenario.source_url().to_string(),
        target_fps: args.fps,
        ..SourceSettings::default()
    })?;

    let blink: Box<dyn BlinkEstimator> = match args.scenario {
        // Eyes alternate closed/open every frame: one blink per two frames.
        Scenario::Blink | Scenario::Cycle => Box::new(LandmarkBlinkEstimator::new(Box::new(
            StubLandmarks::from_pattern(blink_pattern(args.scenario, args.fps)),
        ))),
        _ => Box::new(NullBlinkEstimator),
    };

    let settings = MonitorSettings {
        loop_interval: Duration::from_secs(1) / args.fps,
        ..MonitorSettings::default()
    };
    let profiles = Arc::new(ProfileStore::default());
    profiles.set_health_mode(args.health_mode);
    let monitor = MonitorController::new(settings, profiles, source, blink, Arc::new(LogVoice));

    let started = Instant::now();
    monitor
        .try_start(move |kind: AlertKind, message: &str| -> Result<()> {
            let line = serde_json::json!({
                "kind": kind,
                "message": message,
                "elapsed_ms": started.elapsed().as_millis() as u64,
            });
            println!("{}", line);
            Ok(())
        })
        .map_err(|err| anyhow!("failed to start monitor: {}", err))?;

    let deadline = started + Duration::from_secs(args.seconds);
    while Instant::now() < deadline && monitor.is_monitoring() {
        std::thread::sleep(Duration::from_millis(100));
    }
    monitor.stop();

    let status = monitor.status();
    stage(&format!(
        "done: {} frames, {} alerts, {} read failures",
        status.frames_processed, status.alerts_fired, status.frame_failures
    ));
    Ok(())
}

/// Rapid blinking for the blink scene; for the cycle, one burst of two seconds
/// at the start of every ten.
fn blink_pattern(scenario: Scenario, fps: u32) -> Vec<bool> {
    let fps = fps as usize;
    match scenario {
        Scenario::Blink => vec![true, false],
        _ => (0..fps * 10).map(|i| i < fps * 2 && i % 2 == 0).collect(),
    }
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}
