//! carewatch
//!
//! Real-time emergency detection over a live video stream. Frames from a
//! camera are turned into per-frame signals (motion, fall geometry, eye
//! closure), debounced over consecutive frames, rate-limited per alert kind,
//! and delivered to a callback and a voice channel.
//!
//! # Module Structure
//!
//! - `frame`: RawFrame, the ephemeral pixel container
//! - `ingest`: Frame sources (synthetic, scripted, V4L2 cameras)
//! - `detect`: Background model, fall geometry, blink estimation, per-frame signals
//! - `engine`: Debounce, cooldown and blink-rate state machine
//! - `profile`: Sensitivity profiles and the shared profile store
//! - `alert`: Alert events, callbacks, voice output
//! - `monitor`: Lifecycle controller and loop thread
//! - `config`: Daemon configuration loading
//!
//! Frames are never stored, serialized or transmitted. Only alert kinds and
//! short messages leave the monitor.

pub mod alert;
pub mod config;
pub mod detect;
pub mod engine;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod profile;

pub use alert::{
    AlertCallback, AlertDispatcher, AlertEvent, AlertKind, CommandSpeaker, LogVoice, Speaker,
    ThreadedVoice, VoiceSink,
};
pub use config::{BlinkSettings, MonitorConfig};
pub use detect::{
    select_blink_estimator, BlinkEstimator, FrameOutcome, FrameSignals, LandmarkBackend,
    NullBlinkEstimator, SignalExtractor, Stage, StageFailure,
};
pub use engine::{DetectionEngine, EngineSettings};
pub use frame::RawFrame;
pub use ingest::{build_source, FrameSource, SourceSettings, SourceStats};
pub use monitor::{MonitorController, MonitorSettings, MonitorState, MonitorStatus, StartError};
pub use profile::{DetectionProfile, ProfileSet, ProfileStore};
