/// Where a channel is in its confirmation cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelPhase {
    Quiet,
    Accumulating,
    /// Reported for the frame that reached the threshold; the count is already 0.
    Confirmed,
}

/// Consecutive-frame confirmation for one binary signal.
#[derive(Clone, Debug)]
pub struct ChannelDebouncer {
    consecutive: u32,
    phase: ChannelPhase,
}

impl ChannelDebouncer {
    pub fn new() -> Self {
        Self {
            consecutive: 0,
            phase: ChannelPhase::Quiet,
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn phase(&self) -> ChannelPhase {
        self.phase
    }

    /// Feed one frame. Returns true on the frame that completes `confirm_frames`
    /// consecutive positives; the count then starts again from zero.
    pub fn observe(&mut self, signal: bool, confirm_frames: u32) -> bool {
        if !signal {
            self.consecutive = 0;
            self.phase = ChannelPhase::Quiet;
            return false;
        }
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive >= confirm_frames.max(1) {
            self.consecutive = 0;
            self.phase = ChannelPhase::Confirmed;
            true
        } else {
            self.phase = ChannelPhase::Accumulating;
            false
        }
    }
}

impl Default for ChannelDebouncer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirms_on_nth_frame_and_resets() {
        let mut channel = ChannelDebouncer::new();
        for _ in 0..4 {
            assert!(!channel.observe(true, 5));
        }
        assert_eq!(channel.phase(), ChannelPhase::Accumulating);
        assert!(channel.observe(true, 5));
        assert_eq!(channel.phase(), ChannelPhase::Confirmed);
        assert_eq!(channel.consecutive(), 0);
        assert!(!channel.observe(true, 5));
    }

    #[test]
    fn negative_frame_clears_progress() {
        let mut channel = ChannelDebouncer::new();
        for _ in 0..4 {
            channel.observe(true, 5);
        }
        assert!(!channel.observe(false, 5));
        assert_eq!(channel.phase(), ChannelPhase::Quiet);
        for _ in 0..4 {
            assert!(!channel.observe(true, 5));
        }
    }

    #[test]
    fn zero_threshold_behaves_as_one() {
        let mut channel = ChannelDebouncer::new();
        assert!(channel.observe(true, 0));
    }
}
