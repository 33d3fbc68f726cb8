use std::time::{Duration, Instant};

pub const BLINK_WINDOW: Duration = Duration::from_secs(1);

/// One-second blink counter.
///
/// A blink is a closed-to-open transition. When a window of at least one second
/// has elapsed the count is evaluated and the window restarts at `now`.
#[derive(Clone, Debug)]
pub struct BlinkWindow {
    window_start: Instant,
    blink_count: u32,
    eye_currently_closed: bool,
}

impl BlinkWindow {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            blink_count: 0,
            eye_currently_closed: false,
        }
    }

    pub fn blink_count(&self) -> u32 {
        self.blink_count
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    pub fn eye_currently_closed(&self) -> bool {
        self.eye_currently_closed
    }

    /// Feed one frame's eye state. Returns the blink count of a window that just
    /// closed with more than `limit` blinks.
    pub fn update(&mut self, eye_closed: bool, now: Instant, limit: u32) -> Option<u32> {
        if eye_closed && !self.eye_currently_closed {
            self.eye_currently_closed = true;
        } else if !eye_closed && self.eye_currently_closed {
            self.eye_currently_closed = false;
            self.blink_count = self.blink_count.saturating_add(1);
        }

        if now.saturating_duration_since(self.window_start) < BLINK_WINDOW {
            return None;
        }
        let count = self.blink_count;
        self.blink_count = 0;
        // Never move the window backwards.
        if now > self.window_start {
            self.window_start = now;
        }
        (count > limit).then_some(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blink_times(window: &mut BlinkWindow, t0: Instant, blinks: u32, limit: u32) -> Option<u32> {
        for i in 0..blinks {
            let base = t0 + Duration::from_millis(100 * i as u64);
            assert!(window.update(true, base, limit).is_none());
            assert!(window.update(false, base + Duration::from_millis(50), limit).is_none());
        }
        window.update(false, t0 + BLINK_WINDOW, limit)
    }

    #[test]
    fn five_blinks_over_limit_three() {
        let t0 = Instant::now();
        let mut window = BlinkWindow::new(t0);
        assert_eq!(blink_times(&mut window, t0, 5, 3), Some(5));
        assert_eq!(window.blink_count(), 0);
        assert_eq!(window.window_start(), t0 + BLINK_WINDOW);
    }

    #[test]
    fn three_blinks_at_limit_do_not_fire_but_reset() {
        let t0 = Instant::now();
        let mut window = BlinkWindow::new(t0);
        assert_eq!(blink_times(&mut window, t0, 3, 3), None);
        assert_eq!(window.blink_count(), 0);
    }

    #[test]
    fn held_closed_eye_is_not_a_blink() {
        let t0 = Instant::now();
        let mut window = BlinkWindow::new(t0);
        for i in 0..10 {
            window.update(true, t0 + Duration::from_millis(10 * i), 3);
        }
        assert_eq!(window.blink_count(), 0);
        assert!(window.eye_currently_closed());
    }
}
