// TASALIGN PACE: MONOTONIC TIME + BLOCKING SLEEP
// EVERY WAIT IN THE LOOP (RETRY BACKOFF, SETTLE, POLL INTERVAL) GOES THROUGH
// A Pace SO TESTS AND OFFLINE SIMULATION RUN WITHOUT REAL DELAYS.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub trait Pace {
    // MONOTONIC TIME SINCE THIS PACE WAS CREATED
    fn elapsed(&self) -> Duration;
    fn sleep(&self, d: Duration);
}

pub struct SystemPace {
    start: Instant,
}

impl SystemPace {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemPace {
    fn default() -> Self {
        Self::new()
    }
}

impl Pace for SystemPace {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

// VIRTUAL TIME. sleep ADVANCES THE SHARED COUNTER INSTANTLY, CLONES SHARE
// THE SAME TIMELINE.
#[derive(Clone, Default)]
pub struct ManualPace {
    now: Rc<Cell<Duration>>,
    slept: Rc<Cell<Duration>>,
}

impl ManualPace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now.set(self.now.get() + d);
    }

    // TOTAL TIME SPENT INSIDE sleep() (EXCLUDES advance())
    pub fn slept(&self) -> Duration {
        self.slept.get()
    }
}

impl Pace for ManualPace {
    fn elapsed(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, d: Duration) {
        self.slept.set(self.slept.get() + d);
        self.advance(d);
    }
}
