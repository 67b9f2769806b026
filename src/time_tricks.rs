use std::time::{Instant, SystemTime};

use once_cell::sync::Lazy;

use crate::clock::Timeval;

// A frozen pair of "the same moment" in both Instant and SystemTime. Drivers hand
// us monotonic Instants, while the timer state is kept as wall clock timevals.
static BEGINNING_OF_TIME: Lazy<(Instant, SystemTime)> =
    Lazy::new(|| (Instant::now(), SystemTime::now()));

pub trait InstantExt {
    /// Convert an Instant to wall clock time since the unix epoch.
    ///
    /// Instants from before the first conversion are mapped backwards from the
    /// frozen reference point.
    fn to_timeval(&self) -> Timeval;
}

impl InstantExt for Instant {
    fn to_timeval(&self) -> Timeval {
        let (base, base_sys) = *BEGINNING_OF_TIME;

        let system_time = if *self >= base {
            base_sys + (*self - base)
        } else {
            trace!("Instant before beginning of time");
            base_sys
                .checked_sub(base - *self)
                .unwrap_or(SystemTime::UNIX_EPOCH)
        };

        let since_epoch = system_time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();

        Timeval::from(since_epoch)
    }
}
