//! Monitor controller.
//!
//! Owns the frame source, the detection state and one loop thread. Control calls
//! (`start`, `stop`, setters, `status`) come from any thread through `&self` and
//! are serialized by a control mutex that the loop never takes. The loop talks
//! back only through atomics and the shared `ProfileStore`.
//!
//! Lifecycle: `Idle -> Running` on start, `Running -> Stopping -> Idle` on stop,
//! and `Running -> Idle` when the loop gives up on a failing source.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::alert::{AlertCallback, AlertDispatcher, AlertKind, VoiceSink};
use crate::detect::{BlinkEstimator, FrameSignals, SignalExtractor};
use crate::engine::{DetectionEngine, EngineSettings};
use crate::frame::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::ingest::FrameSource;
use crate::profile::ProfileStore;

const WAIT_SLICE: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Idle,
    Running,
    Stopping,
}

impl MonitorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => MonitorState::Running,
            2 => MonitorState::Stopping,
            _ => MonitorState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            MonitorState::Idle => 0,
            MonitorState::Running => 1,
            MonitorState::Stopping => 2,
        }
    }
}

/// Why `try_start` refused to start.
#[derive(Debug)]
pub enum StartError {
    AlreadyRunning,
    /// The frame source could not be opened.
    DeviceUnavailable(anyhow::Error),
    /// A loop abandoned by a timed-out `stop` has not exited yet.
    PreviousLoopActive,
    /// The loop thread could not be spawned. The source is lost.
    Spawn(std::io::Error),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::AlreadyRunning => write!(f, "monitor already running"),
            StartError::DeviceUnavailable(err) => write!(f, "device unavailable: {:#}", err),
            StartError::PreviousLoopActive => {
                write!(f, "previous monitor loop has not finished yet")
            }
            StartError::Spawn(err) => write!(f, "failed to spawn monitor thread: {}", err),
        }
    }
}

impl std::error::Error for StartError {}

/// Loop timing and processing settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Sleep after every processed frame.
    pub loop_interval: Duration,
    /// Sleep after a failed read.
    pub read_backoff: Duration,
    /// Consecutive failed reads after which the loop gives up.
    pub max_read_failures: u32,
    /// Upper bound on how long `stop` waits for the loop.
    pub stop_timeout: Duration,
    pub processing_width: u32,
    pub processing_height: u32,
    pub engine: EngineSettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            loop_interval: Duration::from_millis(50),
            read_backoff: Duration::from_secs(1),
            max_read_failures: 5,
            stop_timeout: Duration::from_secs(2),
            processing_width: DEFAULT_WIDTH,
            processing_height: DEFAULT_HEIGHT,
            engine: EngineSettings::default(),
        }
    }
}

/// Point-in-time view of the monitor.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonitorStatus {
    pub is_monitoring: bool,
    pub state: MonitorState,
    pub motion_threshold: u32,
    pub fall_threshold: f32,
    pub alert_cooldown: u64,
    pub seizure_detected: bool,
    pub fall_detected: bool,
    pub eye_closed: bool,
    pub health_mode: bool,
    pub blink_detection: bool,
    pub frames_processed: u64,
    pub frame_failures: u64,
    pub alerts_fired: u64,
}

/// Written by the loop, read by `status`.
#[derive(Default)]
struct SharedStatus {
    state: AtomicU8,
    seizure_detected: AtomicBool,
    fall_detected: AtomicBool,
    eye_closed: AtomicBool,
    blink_detection: AtomicBool,
    frames_processed: AtomicU64,
    frame_failures: AtomicU64,
    alerts_fired: AtomicU64,
}

impl SharedStatus {
    fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: MonitorState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn transition(&self, from: MonitorState, to: MonitorState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn reset_run(&self) {
        self.seizure_detected.store(false, Ordering::SeqCst);
        self.fall_detected.store(false, Ordering::SeqCst);
        self.eye_closed.store(false, Ordering::SeqCst);
    }
}

/// Everything the loop thread borrows for one run and hands back on exit.
struct Resources {
    source: Box<dyn FrameSource>,
    extractor: SignalExtractor,
}

struct Control {
    /// Present while idle.
    resources: Option<Resources>,
    /// Present while running, or after a stop that timed out.
    worker: Option<JoinHandle<Resources>>,
    stop_flag: Arc<AtomicBool>,
}

pub struct MonitorController {
    settings: MonitorSettings,
    profiles: Arc<ProfileStore>,
    voice: Arc<dyn VoiceSink>,
    shared: Arc<SharedStatus>,
    control: Mutex<Control>,
}

impl MonitorController {
    pub fn new(
        settings: MonitorSettings,
        profiles: Arc<ProfileStore>,
        source: Box<dyn FrameSource>,
        blink: Box<dyn BlinkEstimator>,
        voice: Arc<dyn VoiceSink>,
    ) -> Self {
        let extractor =
            SignalExtractor::new(settings.processing_width, settings.processing_height, blink);
        let shared = Arc::new(SharedStatus::default());
        shared
            .blink_detection
            .store(extractor.blink_available(), Ordering::SeqCst);
        Self {
            settings,
            profiles,
            voice,
            shared,
            control: Mutex::new(Control {
                resources: Some(Resources { source, extractor }),
                worker: None,
                stop_flag: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    pub fn profiles(&self) -> &Arc<ProfileStore> {
        &self.profiles
    }

    pub fn state(&self) -> MonitorState {
        self.shared.state()
    }

    pub fn is_monitoring(&self) -> bool {
        self.state() == MonitorState::Running
    }

    /// Start monitoring. Returns false if already running or the source cannot
    /// be opened.
    pub fn start<C>(&self, callback: C) -> bool
    where
        C: AlertCallback + 'static,
    {
        match self.try_start(callback) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("monitor start refused: {}", err);
                false
            }
        }
    }

    pub fn try_start<C>(&self, callback: C) -> Result<(), StartError>
    where
        C: AlertCallback + 'static,
    {
        let mut control = self.lock_control();
        if self.shared.state() != MonitorState::Idle {
            return Err(StartError::AlreadyRunning);
        }

        if let Some(handle) = control.worker.take() {
            // A loop that gave up on its source may still be unwinding.
            if !wait_finished(&handle, self.settings.stop_timeout) {
                control.worker = Some(handle);
                return Err(StartError::PreviousLoopActive);
            }
            match handle.join() {
                Ok(resources) => control.resources = Some(resources),
                Err(_) => log::error!("previous monitor loop panicked; its source is lost"),
            }
        }

        let Some(mut resources) = control.resources.take() else {
            return Err(StartError::DeviceUnavailable(anyhow::anyhow!(
                "frame source was lost by a previous run"
            )));
        };

        if let Err(err) = resources.source.open() {
            log::warn!(
                "Monitor: failed to open source {}: {:#}",
                resources.source.describe(),
                err
            );
            control.resources = Some(resources);
            return Err(StartError::DeviceUnavailable(err));
        }
        resources.extractor.reset();

        let stop_flag = Arc::new(AtomicBool::new(false));
        control.stop_flag = Arc::clone(&stop_flag);
        self.shared.reset_run();
        self.shared.set_state(MonitorState::Running);

        let description = resources.source.describe();
        let worker = MonitorLoop {
            resources,
            dispatcher: AlertDispatcher::new(Arc::new(callback), Arc::clone(&self.voice)),
            profiles: Arc::clone(&self.profiles),
            shared: Arc::clone(&self.shared),
            stop: stop_flag,
            settings: self.settings.clone(),
        };
        let spawned = std::thread::Builder::new()
            .name("carewatch-monitor".to_string())
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                control.worker = Some(handle);
                log::info!("Monitor: started on {}", description);
                Ok(())
            }
            Err(err) => {
                self.shared.set_state(MonitorState::Idle);
                Err(StartError::Spawn(err))
            }
        }
    }

    /// Stop monitoring. Returns false if the monitor was not running.
    ///
    /// Waits at most `stop_timeout` for the loop. A loop that does not exit in
    /// time is left to finish on its own and reclaimed by the next `start`.
    pub fn stop(&self) -> bool {
        let mut control = self.lock_control();
        if !self
            .shared
            .transition(MonitorState::Running, MonitorState::Stopping)
        {
            return false;
        }
        control.stop_flag.store(true, Ordering::SeqCst);

        if let Some(handle) = control.worker.take() {
            if wait_finished(&handle, self.settings.stop_timeout) {
                match handle.join() {
                    Ok(mut resources) => {
                        resources.source.close();
                        control.resources = Some(resources);
                    }
                    Err(_) => log::error!("monitor loop panicked; its source is lost"),
                }
            } else {
                log::warn!(
                    "Monitor: loop did not exit within {:?}; leaving it to finish",
                    self.settings.stop_timeout
                );
                control.worker = Some(handle);
            }
        }

        self.shared.set_state(MonitorState::Idle);
        log::info!("Monitor: stopped");
        true
    }

    pub fn status(&self) -> MonitorStatus {
        let profiles = self.profiles.snapshot();
        let active = profiles.active();
        let state = self.shared.state();
        MonitorStatus {
            is_monitoring: state == MonitorState::Running,
            state,
            motion_threshold: active.motion_threshold,
            fall_threshold: active.fall_height_ratio,
            alert_cooldown: active.alert_cooldown_secs,
            seizure_detected: self.shared.seizure_detected.load(Ordering::SeqCst),
            fall_detected: self.shared.fall_detected.load(Ordering::SeqCst),
            eye_closed: self.shared.eye_closed.load(Ordering::SeqCst),
            health_mode: profiles.health_mode,
            blink_detection: self.shared.blink_detection.load(Ordering::SeqCst),
            frames_processed: self.shared.frames_processed.load(Ordering::SeqCst),
            frame_failures: self.shared.frame_failures.load(Ordering::SeqCst),
            alerts_fired: self.shared.alerts_fired.load(Ordering::SeqCst),
        }
    }

    pub fn set_motion_threshold(&self, threshold: u32) {
        self.profiles.set_motion_threshold(threshold);
    }

    pub fn set_fall_threshold(&self, ratio: f32) {
        self.profiles.set_fall_threshold(ratio);
    }

    pub fn set_alert_cooldown(&self, secs: u64) {
        self.profiles.set_alert_cooldown(secs);
    }

    pub fn set_consecutive_frames(&self, frames: u32) {
        self.profiles.set_consecutive_frames(frames);
    }

    /// Takes effect from the next frame.
    pub fn set_health_mode(&self, enabled: bool) {
        self.profiles.set_health_mode(enabled);
        log::info!(
            "Monitor: health mode {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Switch to the intensive profile and make sure monitoring is running.
    /// Returns true when the monitor is running afterwards.
    pub fn activate_health_protocol<C>(&self, callback: C) -> bool
    where
        C: AlertCallback + 'static,
    {
        self.set_health_mode(true);
        if self.is_monitoring() {
            return true;
        }
        self.start(callback)
    }

    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn wait_finished<T>(handle: &JoinHandle<T>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(WAIT_SLICE);
    }
    true
}

impl Drop for MonitorController {
    fn drop(&mut self) {
        self.stop();
    }
}

// ----------------------------------------------------------------------------
// Loop thread
// ----------------------------------------------------------------------------

struct MonitorLoop {
    resources: Resources,
    dispatcher: AlertDispatcher,
    profiles: Arc<ProfileStore>,
    shared: Arc<SharedStatus>,
    stop: Arc<AtomicBool>,
    settings: MonitorSettings,
}

impl MonitorLoop {
    fn run(mut self) -> Resources {
        let mut engine = DetectionEngine::new(self.settings.engine, Instant::now());
        let mut consecutive_failures = 0u32;
        let mut gave_up = false;

        while !self.stop.load(Ordering::SeqCst) {
            let frame = match self.resources.source.read_frame() {
                Ok(frame) => {
                    consecutive_failures = 0;
                    frame
                }
                Err(err) => {
                    consecutive_failures += 1;
                    self.shared.frame_failures.fetch_add(1, Ordering::SeqCst);
                    if consecutive_failures >= self.settings.max_read_failures.max(1) {
                        log::error!(
                            "Monitor: {} consecutive read failures on {}, giving up: {:#}",
                            consecutive_failures,
                            self.resources.source.describe(),
                            err
                        );
                        gave_up = true;
                        break;
                    }
                    log::warn!("Monitor: frame read failed: {:#}", err);
                    self.pause(self.settings.read_backoff);
                    continue;
                }
            };
            // A stop that timed out during the read must not see this frame.
            if self.stop.load(Ordering::SeqCst) {
                break;
            }

            let profiles = self.profiles.snapshot();
            let profile = profiles.active();
            let extractor = &mut self.resources.extractor;
            let signals =
                match catch_unwind(AssertUnwindSafe(|| extractor.extract(&frame, profile))) {
                    Ok(Ok(signals)) => signals,
                    Ok(Err(failure)) => {
                        log::warn!("Monitor: frame {} skipped: {}", frame.sequence(), failure);
                        FrameSignals::default()
                    }
                    Err(_) => {
                        log::error!("Monitor: frame {} processing panicked", frame.sequence());
                        FrameSignals::default()
                    }
                };
            drop(frame);
            if self.stop.load(Ordering::SeqCst) {
                break;
            }

            self.shared
                .eye_closed
                .store(signals.eye_closed, Ordering::SeqCst);
            for event in engine.step(&signals, profile, Instant::now()) {
                match event.kind {
                    AlertKind::Seizure => self.shared.seizure_detected.store(true, Ordering::SeqCst),
                    AlertKind::Fall => self.shared.fall_detected.store(true, Ordering::SeqCst),
                    AlertKind::BlinkRate => {}
                }
                self.shared.alerts_fired.fetch_add(1, Ordering::SeqCst);
                self.dispatcher.dispatch(&event);
            }
            self.shared.frames_processed.fetch_add(1, Ordering::SeqCst);

            self.pause(self.settings.loop_interval);
        }

        self.resources.source.close();
        if gave_up
            && self
                .shared
                .transition(MonitorState::Running, MonitorState::Idle)
        {
            log::info!("Monitor: returned to idle after source failure");
        }
        self.resources
    }

    /// Sleep for `duration`, waking early when stop is requested.
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(WAIT_SLICE));
        }
    }
}
