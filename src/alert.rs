//! Alerts and their delivery.
//!
//! The decision core produces `AlertEvent`s; the `AlertDispatcher` hands each one
//! to the user callback and the voice channel. Nothing a callback or speaker does
//! can reach back into the monitor loop: errors are logged, panics are caught.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Seizure,
    Fall,
    BlinkRate,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Seizure => "seizure",
            AlertKind::Fall => "fall",
            AlertKind::BlinkRate => "blink_rate",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One confirmed, non-suppressed alert.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub message: String,
    /// Monotonic instant the alert was admitted by the cooldown gate.
    pub at: Instant,
    /// Wall-clock time of the same moment, for display.
    pub timestamp: SystemTime,
}

impl AlertEvent {
    pub fn new(kind: AlertKind, message: impl Into<String>, at: Instant) -> Self {
        Self {
            kind,
            message: message.into(),
            at,
            timestamp: SystemTime::now(),
        }
    }

    pub fn seizure(at: Instant) -> Self {
        Self::new(AlertKind::Seizure, "possible seizure detected", at)
    }

    pub fn fall(at: Instant) -> Self {
        Self::new(AlertKind::Fall, "possible fall detected", at)
    }

    pub fn blink_rate(blinks_per_second: u32, at: Instant) -> Self {
        Self::new(
            AlertKind::BlinkRate,
            format!("blink rate elevated: {}/s", blinks_per_second),
            at,
        )
    }

    /// Utterance for the voice channel.
    pub fn spoken_text(&self) -> String {
        format!("Attention: {}", self.message)
    }
}

/// Receiver of alerts. Implemented for any `Fn(AlertKind, &str) -> Result<()>`.
pub trait AlertCallback: Send + Sync {
    fn on_alert(&self, kind: AlertKind, message: &str) -> Result<()>;
}

impl<F> AlertCallback for F
where
    F: Fn(AlertKind, &str) -> Result<()> + Send + Sync,
{
    fn on_alert(&self, kind: AlertKind, message: &str) -> Result<()> {
        self(kind, message)
    }
}

// ----------------------------------------------------------------------------
// Voice
// ----------------------------------------------------------------------------

/// Fire-and-forget speech output. Must not block the caller on synthesis.
pub trait VoiceSink: Send + Sync {
    fn speak_async(&self, text: &str);
}

/// Writes utterances to the log instead of speaking them.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogVoice;

impl VoiceSink for LogVoice {
    fn speak_async(&self, text: &str) {
        log::info!("voice: {}", text);
    }
}

/// Blocking text-to-speech engine.
pub trait Speaker: Send + Sync + 'static {
    fn speak(&self, text: &str) -> Result<()>;
}

/// Runs a local TTS command with the text as its final argument.
#[derive(Clone, Debug)]
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
}

impl CommandSpeaker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Split a command line such as `"espeak -s 150"` on whitespace.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Speaker for CommandSpeaker {
    fn speak(&self, text: &str) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("failed to run TTS command {}", self.program))?;
        if !status.success() {
            anyhow::bail!("TTS command {} exited with {}", self.program, status);
        }
        Ok(())
    }
}

/// Speaks each utterance on its own short-lived thread.
pub struct ThreadedVoice<S: Speaker> {
    speaker: Arc<S>,
}

impl<S: Speaker> ThreadedVoice<S> {
    pub fn new(speaker: S) -> Self {
        Self {
            speaker: Arc::new(speaker),
        }
    }
}

impl<S: Speaker> VoiceSink for ThreadedVoice<S> {
    fn speak_async(&self, text: &str) {
        let speaker = Arc::clone(&self.speaker);
        let text = text.to_string();
        let spawned = std::thread::Builder::new()
            .name("carewatch-voice".to_string())
            .spawn(move || {
                if let Err(err) = speaker.speak(&text) {
                    log::warn!("voice output failed: {:#}", err);
                }
            });
        if let Err(err) = spawned {
            log::warn!("voice thread spawn failed: {}", err);
        }
    }
}

// ----------------------------------------------------------------------------
// Dispatch
// ----------------------------------------------------------------------------

/// Delivers alerts to the voice channel and the callback.
pub struct AlertDispatcher {
    callback: Arc<dyn AlertCallback>,
    voice: Arc<dyn VoiceSink>,
}

impl AlertDispatcher {
    pub fn new(callback: Arc<dyn AlertCallback>, voice: Arc<dyn VoiceSink>) -> Self {
        Self { callback, voice }
    }

    /// Returns true when the callback accepted the alert.
    pub fn dispatch(&self, event: &AlertEvent) -> bool {
        log::warn!("ALERT [{}]: {}", event.kind, event.message);

        let spoken = event.spoken_text();
        if catch_unwind(AssertUnwindSafe(|| self.voice.speak_async(&spoken))).is_err() {
            log::error!("voice sink panicked on {} alert", event.kind);
        }

        match catch_unwind(AssertUnwindSafe(|| {
            self.callback.on_alert(event.kind, &event.message)
        })) {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                log::error!("alert callback failed for {}: {:#}", event.kind, err);
                false
            }
            Err(_) => {
                log::error!("alert callback panicked for {}", event.kind);
                false
            }
        }
    }
}
