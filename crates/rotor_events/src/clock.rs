//! Wall-clock seam so time reads can be faked in tests and replayed from a
//! log in production runs.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock readings.
pub trait Clock {
    /// Microseconds since the Unix epoch.
    fn now_us(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch");
        u64::try_from(elapsed.as_micros()).expect("system clock out of u64 range")
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FakeClock {
    now_us: Cell<u64>,
}

impl FakeClock {
    /// A clock frozen at the given microsecond timestamp.
    pub fn new(start_us: u64) -> Self {
        Self { now_us: Cell::new(start_us) }
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: Duration) {
        let delta = u64::try_from(delta.as_micros()).expect("advance out of u64 range");
        self.now_us.set(self.now_us.get().saturating_add(delta));
    }
}

impl Clock for FakeClock {
    fn now_us(&self) -> u64 {
        self.now_us.get()
    }
}
