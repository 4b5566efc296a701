//! Refresh coalescing.

use std::time::Duration;
use tokio::time::Instant;

/// Allows at most one refresh per interval. A request inside the interval
/// is remembered and served once at the end of it.
#[derive(Debug, Clone)]
pub struct RefreshThrottle {
    interval: Duration,
    last_run: Option<Instant>,
    pending: bool,
}

impl RefreshThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            pending: false,
        }
    }

    /// Returns true if a refresh may run now; otherwise marks one pending.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        let ready = self
            .last_run
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if !ready {
            self.pending = true;
        }
        ready
    }

    pub fn mark_ran(&mut self, now: Instant) {
        self.last_run = Some(now);
        self.pending = false;
    }

    /// When the coalesced refresh is due, if one is pending.
    pub fn pending_deadline(&self) -> Option<Instant> {
        match (self.pending, self.last_run) {
            (true, Some(last)) => Some(last + self.interval),
            (true, None) => Some(Instant::now()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bursts_coalesce_into_one_pending_refresh() {
        let interval = Duration::from_millis(1500);
        let mut throttle = RefreshThrottle::new(interval);
        let t0 = Instant::now();

        assert!(throttle.try_acquire(t0));
        throttle.mark_ran(t0);
        assert_eq!(throttle.pending_deadline(), None);

        for ms in [100, 400, 900] {
            assert!(!throttle.try_acquire(t0 + Duration::from_millis(ms)));
        }
        assert_eq!(throttle.pending_deadline(), Some(t0 + interval));

        assert!(throttle.try_acquire(t0 + interval));
        throttle.mark_ran(t0 + interval);
        assert_eq!(throttle.pending_deadline(), None);
    }
}
