//! Time sources and sleeping, injected so caches and pacing can be tested
//! without a wall clock.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic microsecond clock.
pub trait Clock: Send + Sync {
    fn now_us(&self) -> u64;

    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }
}

/// Wall clock measured from process start.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Clock advanced by hand.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at_ms(ms: u64) -> Self {
        Self {
            now_us: AtomicU64::new(ms * 1000),
        }
    }

    pub fn advance_us(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance_us(ms * 1000);
    }

    pub fn set_ms(&self, ms: u64) {
        self.now_us.store(ms * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }
}

/// Blocking sleep used by pacing.
pub trait Sleeper: Send + Sync {
    fn sleep_us(&self, us: u64);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep_us(&self, us: u64) {
        if us > 0 {
            std::thread::sleep(Duration::from_micros(us));
        }
    }
}

/// Records requested sleeps instead of blocking, optionally advancing a
/// [`ManualClock`] by the same amount.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<u64>>,
    clock: Option<Arc<ManualClock>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<ManualClock>) -> Self {
        Self {
            sleeps: Mutex::new(Vec::new()),
            clock: Some(clock),
        }
    }

    pub fn sleeps(&self) -> Vec<u64> {
        self.sleeps.lock().clone()
    }

    pub fn total_us(&self) -> u64 {
        self.sleeps.lock().iter().sum()
    }

    pub fn take(&self) -> Vec<u64> {
        std::mem::take(&mut *self.sleeps.lock())
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep_us(&self, us: u64) {
        if us == 0 {
            return;
        }
        self.sleeps.lock().push(us);
        if let Some(clock) = &self.clock {
            clock.advance_us(us);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::starting_at_ms(5);
        clock.advance_ms(10);
        clock.advance_us(500);
        assert_eq!(clock.now_us(), 15_500);
        assert_eq!(clock.now_ms(), 15);
    }

    #[test]
    fn test_recording_sleeper_moves_clock() {
        let clock = Arc::new(ManualClock::new());
        let sleeper = RecordingSleeper::with_clock(clock.clone());
        sleeper.sleep_us(0);
        sleeper.sleep_us(4000);
        sleeper.sleep_us(250);
        assert_eq!(sleeper.sleeps(), vec![4000, 250]);
        assert_eq!(clock.now_us(), 4250);
        assert_eq!(sleeper.take().len(), 2);
        assert_eq!(sleeper.total_us(), 0);
    }
}
