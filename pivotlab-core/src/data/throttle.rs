//! Request throttle.
//!
//! Alpha Vantage answers bursts with a rate-limit notice instead of data, so
//! requests are spaced by a fixed minimum interval.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Blocks callers so that consecutive requests start at least `interval` apart.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Reserve the next request slot and sleep until it starts.
    pub fn wait(&self) {
        let wait_for = {
            let mut next = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let start = match *next {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            *next = Some(start + self.interval);
            start.saturating_duration_since(now)
        };
        if !wait_for.is_zero() {
            std::thread::sleep(wait_for);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_is_immediate() {
        let throttle = Throttle::new(Duration::from_secs(10));
        let started = Instant::now();
        throttle.wait();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn consecutive_requests_are_spaced() {
        let throttle = Throttle::new(Duration::from_millis(30));
        let started = Instant::now();
        throttle.wait();
        throttle.wait();
        throttle.wait();
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
