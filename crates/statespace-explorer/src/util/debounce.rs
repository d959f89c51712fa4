use std::time::{Duration, Instant};

/// At most one run per window; calls inside the window leave a pending run.
#[derive(Debug, Clone)]
pub struct Debounce {
    window: Duration,
    last: Option<Instant>,
    pending: bool,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: None,
            pending: false,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Registers a request; `true` means run now.
    pub fn hit(&mut self, now: Instant) -> bool {
        if self.elapsed(now) {
            self.ran(now);
            true
        } else {
            self.pending = true;
            false
        }
    }

    /// A pending run whose window has passed.
    pub fn due(&mut self, now: Instant) -> bool {
        if self.pending && self.elapsed(now) {
            self.ran(now);
            true
        } else {
            false
        }
    }

    /// Takes the pending run regardless of the window.
    pub fn take(&mut self, now: Instant) -> bool {
        if self.pending {
            self.ran(now);
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn settle(&mut self) {
        self.pending = false;
    }

    fn ran(&mut self, now: Instant) {
        self.last = Some(now);
        self.pending = false;
    }

    fn elapsed(&self, now: Instant) -> bool {
        self.last
            .map_or(true, |t| now.saturating_duration_since(t) >= self.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesces_inside_window() {
        let t0 = Instant::now();
        let mut d = Debounce::new(Duration::from_millis(50));
        assert!(d.hit(t0));
        assert!(!d.hit(t0 + Duration::from_millis(10)));
        assert!(!d.hit(t0 + Duration::from_millis(20)));
        assert!(!d.due(t0 + Duration::from_millis(30)));
        assert!(d.due(t0 + Duration::from_millis(60)));
        assert!(!d.is_pending());
    }

    #[test]
    fn take_forces_pending_run() {
        let t0 = Instant::now();
        let mut d = Debounce::new(Duration::from_millis(50));
        assert!(d.hit(t0));
        assert!(!d.take(t0));
        assert!(!d.hit(t0 + Duration::from_millis(1)));
        assert!(d.take(t0 + Duration::from_millis(2)));
    }
}
