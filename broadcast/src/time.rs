//! Time keeping for throughput measurements.
//!
//! The ingest tester measures how many bytes the transport managed to send over a period of
//! wall clock time.  Since every piece of work happens inside the host's polling loop the
//! measurement only needs a monotonic "now", which is abstracted by the `Clock` trait.  This
//! allows hosts (and tests) to drive the tester with a `ManualClock` instead of real time.
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//! use rml_broadcast::time::{ManualClock, Stopwatch};
//!
//! let clock = Rc::new(ManualClock::new());
//! let mut stopwatch = Stopwatch::new(clock.clone());
//!
//! stopwatch.restart();
//! clock.advance_ms(250);
//! assert_eq!(stopwatch.elapsed_ms(), 250);
//!
//! stopwatch.stop();
//! clock.advance_ms(100);
//! assert_eq!(stopwatch.elapsed_ms(), 250);
//!
//! stopwatch.reset();
//! assert_eq!(stopwatch.elapsed_ms(), 0);
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A monotonic source of time.  The epoch is arbitrary, only differences are meaningful.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Clock backed by `std::time::Instant`
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Clock that only moves when told to
#[derive(Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> ManualClock {
        ManualClock {
            now: Cell::new(Duration::from_millis(0)),
        }
    }

    pub fn advance(&self, amount: Duration) {
        self.now.set(self.now.get() + amount);
    }

    pub fn advance_ms(&self, milliseconds: u64) {
        self.advance(Duration::from_millis(milliseconds));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// Accumulates elapsed time between `start()` and `stop()` calls
pub struct Stopwatch {
    clock: Rc<dyn Clock>,
    running_since: Option<Duration>,
    accumulated: Duration,
}

impl Stopwatch {
    pub fn new(clock: Rc<dyn Clock>) -> Stopwatch {
        Stopwatch {
            clock,
            running_since: None,
            accumulated: Duration::from_millis(0),
        }
    }

    /// Starts (or resumes) measuring.  Has no effect if already running.
    pub fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(self.clock.now());
        }
    }

    pub fn stop(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += self.clock.now().saturating_sub(since);
        }
    }

    /// Stops the stopwatch and clears the elapsed time
    pub fn reset(&mut self) {
        self.running_since = None;
        self.accumulated = Duration::from_millis(0);
    }

    /// Clears the elapsed time and starts measuring again
    pub fn restart(&mut self) {
        self.reset();
        self.start();
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + self.clock.now().saturating_sub(since),
            None => self.accumulated,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }
}
