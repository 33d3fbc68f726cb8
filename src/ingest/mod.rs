//! Frame ingestion sources.
//!
//! This module provides the sources the monitor reads frames from:
//! - Local camera devices (feature: ingest-v4l2)
//! - Synthetic scenes (`stub://` URLs) for demos and soak runs
//! - Scripted sources (queued frames and injected failures) for tests
//!
//! A source owns its device lifecycle. The monitor opens it on `start`, reads
//! frames in acquisition order from the loop thread, and closes it on exit.
//!
//! Sources MUST NOT:
//! - Store frames to disk
//! - Transmit frames over network
//! - Log frame content

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod scripted;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::frame::{RawFrame, DEFAULT_HEIGHT, DEFAULT_WIDTH};

pub use scripted::{ScriptStep, ScriptedSource, SourceCounters};
pub use synthetic::{Scene, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// A supplier of raw color frames.
///
/// `close` must be idempotent: the monitor may release a source more than once
/// when a stop races with the loop shutting itself down.
pub trait FrameSource: Send {
    /// Human-readable identifier for logs (URL or device path).
    fn describe(&self) -> String;

    /// Acquire the device. Failure here surfaces as `DeviceUnavailable`.
    fn open(&mut self) -> Result<()>;

    /// Read the next frame. Errors are treated as transient by the monitor
    /// until they persist.
    fn read_frame(&mut self) -> Result<RawFrame>;

    /// Release the device. Calling this on a closed source is a no-op.
    fn close(&mut self);

    /// Capture statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub read_failures: u64,
}

/// Configuration for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSettings {
    /// `stub://<scene>` or a local device path (e.g., "/dev/video0").
    pub url: String,
    /// Width requested at open time.
    pub width: u32,
    /// Height requested at open time.
    pub height: u32,
    /// Requested capture rate.
    pub target_fps: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: "stub://cycle".to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            target_fps: 20,
        }
    }
}

/// Build the source named by `settings.url`. The source is returned unopened.
pub fn build_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    if settings.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings.clone())));
    }
    if settings.url.contains("://") {
        anyhow::bail!(
            "unsupported source url '{}': only stub:// and local device paths are accepted",
            settings.url
        );
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Source::new(settings.clone())))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        anyhow::bail!("camera device sources require the ingest-v4l2 feature")
    }
}
