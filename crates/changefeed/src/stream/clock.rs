use std::time::SystemTime;

/// Source of arrival timestamps for captured records.
///
/// Retention is measured against this clock, so tests can plug in a clock
/// that follows paused tokio time.
pub trait ArrivalClock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ArrivalClock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Wall time at creation plus elapsed [`tokio::time::Instant`] time.
///
/// Never goes backwards, and follows `tokio::time::pause` / `advance`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    wall: SystemTime,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            wall: SystemTime::now(),
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrivalClock for TokioClock {
    fn now(&self) -> SystemTime {
        self.wall + self.origin.elapsed()
    }
}
