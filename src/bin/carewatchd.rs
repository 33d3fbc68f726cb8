//! carewatchd - emergency detection daemon
//!
//! This daemon:
//! 1. Loads configuration (CAREWATCH_CONFIG plus environment overrides)
//! 2. Opens the configured frame source
//! 3. Runs the monitor loop, logging alerts and speaking them when a TTS command is set
//! 4. Logs a status line every few seconds until Ctrl-C

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use carewatch::{
    build_source, select_blink_estimator, AlertKind, BlinkSettings, CommandSpeaker,
    LandmarkBackend, LogVoice, MonitorConfig, MonitorController, ProfileStore, ThreadedVoice,
    VoiceSink,
};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = MonitorConfig::load()?;
    log::info!(
        "carewatchd {} starting (source {}, health mode {})",
        env!("CARGO_PKG_VERSION"),
        config.source.url,
        config.profiles.health_mode
    );

    let source = build_source(&config.source)?;
    let blink = select_blink_estimator(
        landmark_backend(&config.blink),
        config.blink.ear_threshold,
    );
    let voice: Arc<dyn VoiceSink> = match config
        .voice_command
        .as_deref()
        .and_then(CommandSpeaker::from_command_line)
    {
        Some(speaker) => {
            log::info!("voice alerts via {}", speaker.program());
            Arc::new(ThreadedVoice::new(speaker))
        }
        None => Arc::new(LogVoice),
    };

    let profiles = Arc::new(ProfileStore::new(config.profiles));
    let monitor = MonitorController::new(config.runtime.clone(), profiles, source, blink, voice);

    monitor
        .try_start(|kind: AlertKind, message: &str| -> Result<()> {
            log::info!("alert delivered: kind={} message={}", kind, message);
            Ok(())
        })
        .map_err(|err| anyhow!("failed to start monitor: {}", err))?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|err| anyhow!("error setting Ctrl-C handler: {}", err))?;

    log::info!("carewatchd running; Ctrl-C to stop");
    loop {
        match rx.recv_timeout(STATUS_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        let status = monitor.status();
        log::info!("status: {}", serde_json::to_string(&status)?);
        if !status.is_monitoring {
            log::error!("monitor stopped on its own (source failure); exiting");
            return Err(anyhow!("frame source {} failed", config.source.url));
        }
    }

    log::info!("shutdown signal received, stopping monitor...");
    monitor.stop();
    Ok(())
}

fn landmark_backend(settings: &BlinkSettings) -> Option<Box<dyn LandmarkBackend>> {
    let Some(path) = settings.model_path.as_ref() else {
        log::warn!("no landmark model configured");
        return None;
    };

    #[cfg(feature = "landmarks-tract")]
    {
        match carewatch::detect::TractFaceMesh::load(path) {
            Ok(mesh) => {
                log::info!("landmark model loaded from {}", path.display());
                Some(Box::new(mesh))
            }
            Err(err) => {
                log::warn!("landmark model unavailable ({:#})", err);
                None
            }
        }
    }
    #[cfg(not(feature = "landmarks-tract"))]
    {
        log::warn!(
            "landmark model {} ignored: built without landmarks-tract",
            path.display()
        );
        None
    }
}
