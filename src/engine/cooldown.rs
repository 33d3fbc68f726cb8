use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::alert::AlertKind;

/// Minimum interval between two alerts of the same kind.
#[derive(Clone, Debug, Default)]
pub struct CooldownGate {
    last: HashMap<AlertKind, Instant>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit an alert of `kind` at `now`. The check and the stamp are one step:
    /// on success `now` becomes the kind's last-alert instant.
    pub fn try_fire(&mut self, kind: AlertKind, now: Instant, cooldown: Duration) -> bool {
        if let Some(last) = self.last.get(&kind) {
            if now.saturating_duration_since(*last) < cooldown {
                return false;
            }
        }
        self.last.insert(kind, now);
        true
    }

    pub fn last_fired(&self, kind: AlertKind) -> Option<Instant> {
        self.last.get(&kind).copied()
    }
}
