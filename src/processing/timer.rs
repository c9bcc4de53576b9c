//! Interval timer driven by injected timestamps

use serde::{Deserialize, Serialize};

/// Fires at most once per interval; time only advances through `poll`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicTimer {
    interval_ms: u64,
    last_fired_ms: Option<u64>,
}

impl PeriodicTimer {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_fired_ms: None,
        }
    }

    /// Timer that counts its first interval from `now_ms`
    pub fn started_at(interval_ms: u64, now_ms: u64) -> Self {
        Self {
            interval_ms,
            last_fired_ms: Some(now_ms),
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn set_interval_ms(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms;
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.last_fired_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
        }
    }

    /// Fire if due. A timestamp older than the last firing never fires.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if self.is_due(now_ms) {
            self.last_fired_ms = Some(now_ms);
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.last_fired_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_interval() {
        let mut timer = PeriodicTimer::new(1000);
        assert!(timer.poll(0));
        assert!(!timer.poll(500));
        assert!(!timer.poll(999));
        assert!(timer.poll(1000));
        assert!(!timer.poll(1500));
        assert!(timer.poll(2600));
    }

    #[test]
    fn test_started_timer_waits_first_interval() {
        let mut timer = PeriodicTimer::started_at(2000, 100);
        assert!(!timer.poll(100));
        assert!(!timer.poll(2099));
        assert!(timer.poll(2100));
    }

    #[test]
    fn test_backwards_time_does_not_fire() {
        let mut timer = PeriodicTimer::started_at(1000, 5000);
        assert!(!timer.poll(100));
        timer.reset();
        assert!(timer.poll(100));
    }
}
