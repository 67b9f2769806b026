//! Wall clock time as seen by the retransmission timer.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::time_tricks::InstantExt;

const USEC_PER_SEC: u32 = 1_000_000;

/// A point in time, or a remaining duration, as whole seconds plus microseconds.
///
/// `usec` is always below one million. [`Timeval::ZERO`] is both "expired" and
/// "nothing left".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timeval {
    sec: u64,
    usec: u32,
}

impl Timeval {
    pub const ZERO: Timeval = Timeval { sec: 0, usec: 0 };

    /// Create a timeval, carrying excess microseconds into seconds.
    pub const fn new(sec: u64, usec: u32) -> Self {
        Timeval {
            sec: sec + (usec / USEC_PER_SEC) as u64,
            usec: usec % USEC_PER_SEC,
        }
    }

    pub fn sec(&self) -> u64 {
        self.sec
    }

    pub fn usec(&self) -> u32 {
        self.usec
    }

    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.usec == 0
    }

    /// Total microseconds.
    pub fn as_micros(&self) -> u64 {
        self.sec * USEC_PER_SEC as u64 + self.usec as u64
    }

    pub fn from_micros(micros: u64) -> Self {
        Timeval {
            sec: micros / USEC_PER_SEC as u64,
            usec: (micros % USEC_PER_SEC as u64) as u32,
        }
    }

    /// `self - other`, borrowing from the seconds when the microseconds underflow.
    ///
    /// `None` if `other` is later than `self`.
    pub fn checked_sub(self, other: Timeval) -> Option<Timeval> {
        let mut sec = self.sec.checked_sub(other.sec)?;
        let usec = if self.usec >= other.usec {
            self.usec - other.usec
        } else {
            sec = sec.checked_sub(1)?;
            self.usec + USEC_PER_SEC - other.usec
        };
        Some(Timeval { sec, usec })
    }

    pub fn saturating_sub(self, other: Timeval) -> Timeval {
        self.checked_sub(other).unwrap_or(Timeval::ZERO)
    }

    pub fn add_duration(self, d: Duration) -> Timeval {
        let d = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
        let micros = self.as_micros().saturating_add(d);
        Timeval::from_micros(micros)
    }
}

impl From<Duration> for Timeval {
    fn from(d: Duration) -> Self {
        Timeval {
            sec: d.as_secs(),
            usec: d.subsec_micros(),
        }
    }
}

impl From<Timeval> for Duration {
    fn from(t: Timeval) -> Self {
        Duration::new(t.sec, t.usec * 1_000)
    }
}

impl fmt::Display for Timeval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}s", self.sec, self.usec)
    }
}

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> Timeval;
}

/// The operating system's wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timeval {
        let since_epoch = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        Timeval::from(since_epoch)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a driver (or a test) can keep one handle and
/// give another to the [`Session`](crate::Session).
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timeval) -> Self {
        ManualClock {
            micros: Arc::new(AtomicU64::new(start.as_micros())),
        }
    }

    pub fn set(&self, now: Timeval) {
        self.micros.store(now.as_micros(), Ordering::Relaxed);
    }

    /// Drive the clock from a monotonic `Instant`.
    pub fn set_instant(&self, now: Instant) {
        self.set(now.to_timeval());
    }

    pub fn advance(&self, d: Duration) {
        self.micros
            .fetch_add(d.as_micros() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timeval {
        Timeval::from_micros(self.micros.load(Ordering::Relaxed))
    }
}
