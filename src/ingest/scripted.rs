//! Scripted frame source.
//!
//! Replays a queue of frames and injected read failures, or frames produced by a
//! generator closure. Used by the integration tests and the demo binary to
//! drive the monitor deterministically.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{FrameSource, SourceStats};
use crate::frame::RawFrame;

/// One scripted read.
pub enum ScriptStep {
    Frame(RawFrame),
    Fail(String),
}

type FrameGenerator = Box<dyn FnMut(u64) -> Result<RawFrame> + Send>;

/// Shared counters for observing a source after it has been moved into a monitor.
#[derive(Clone, Debug, Default)]
pub struct SourceCounters {
    opens: Arc<AtomicU64>,
    closes: Arc<AtomicU64>,
    reads: Arc<AtomicU64>,
}

impl SourceCounters {
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of close calls that actually released an open source.
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

pub struct ScriptedSource {
    name: String,
    generator: FrameGenerator,
    open_error: Option<String>,
    opened: bool,
    stats: SourceStats,
    counters: SourceCounters,
}

impl ScriptedSource {
    /// Frames produced by `generator(sequence)`; sequence numbers start at 1.
    pub fn from_fn<F>(name: &str, generator: F) -> Self
    where
        F: FnMut(u64) -> Result<RawFrame> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            generator: Box::new(generator),
            open_error: None,
            opened: false,
            stats: SourceStats::default(),
            counters: SourceCounters::default(),
        }
    }

    /// Replays `steps` in order; reads past the end fail.
    pub fn from_steps(name: &str, steps: Vec<ScriptStep>) -> Self {
        let mut queue: VecDeque<ScriptStep> = steps.into();
        Self::from_fn(name, move |_| match queue.pop_front() {
            Some(ScriptStep::Frame(frame)) => Ok(frame),
            Some(ScriptStep::Fail(reason)) => Err(anyhow!(reason)),
            None => Err(anyhow!("script exhausted")),
        })
    }

    /// A source whose device can never be opened.
    pub fn unavailable(name: &str) -> Self {
        let mut source = Self::from_fn(name, |_| Err(anyhow!("device not open")));
        source.open_error = Some(format!("{} is not connected", name));
        source
    }

    pub fn counters(&self) -> SourceCounters {
        self.counters.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn describe(&self) -> String {
        format!("script://{}", self.name)
    }

    fn open(&mut self) -> Result<()> {
        if let Some(reason) = &self.open_error {
            return Err(anyhow!("failed to open {}: {}", self.describe(), reason));
        }
        self.opened = true;
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RawFrame> {
        if !self.opened {
            return Err(anyhow!("{} is not open", self.describe()));
        }
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let sequence = self.stats.frames_captured + self.stats.read_failures + 1;
        match (self.generator)(sequence) {
            Ok(frame) => {
                self.stats.frames_captured += 1;
                Ok(frame.with_sequence(sequence))
            }
            Err(err) => {
                self.stats.read_failures += 1;
                Err(err)
            }
        }
    }

    fn close(&mut self) {
        if self.opened {
            self.opened = false;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_replay_in_order_then_exhaust() -> Result<()> {
        let mut source = ScriptedSource::from_steps(
            "steps",
            vec![
                ScriptStep::Frame(RawFrame::solid(4, 4, [0, 0, 0])),
                ScriptStep::Fail("usb hiccup".to_string()),
                ScriptStep::Frame(RawFrame::solid(4, 4, [9, 9, 9])),
            ],
        );
        source.open()?;

        assert_eq!(source.read_frame()?.sequence(), 1);
        let err = source.read_frame().unwrap_err();
        assert!(err.to_string().contains("usb hiccup"));
        assert_eq!(source.read_frame()?.sequence(), 3);
        assert!(source.read_frame().is_err());

        let stats = source.stats();
        assert_eq!(stats.frames_captured, 2);
        assert_eq!(stats.read_failures, 2);
        Ok(())
    }

    #[test]
    fn unavailable_source_fails_to_open() {
        let mut source = ScriptedSource::unavailable("cam0");
        let counters = source.counters();
        assert!(source.open().is_err());
        assert_eq!(counters.opens(), 0);
    }

    #[test]
    fn counters_track_only_effective_closes() -> Result<()> {
        let mut source = ScriptedSource::from_fn("gen", |_| Ok(RawFrame::solid(2, 2, [1, 1, 1])));
        let counters = source.counters();
        source.open()?;
        source.close();
        source.close();
        assert_eq!(counters.opens(), 1);
        assert_eq!(counters.closes(), 1);
        Ok(())
    }
}
