//! The two timing calls a connection driver makes.
//!
//! A driver's poll loop only ever asks "how long may I sleep" and reports
//! "the timer fired". Everything else a connection does is not timing related
//! and goes straight to the connection's own control value.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::session::{Retransmit, Session};
use crate::Error;

/// Timing interface polled by the connection driver.
pub trait TimerControl {
    /// Time left until [`on_timer_fired`](Self::on_timer_fired) must be called.
    ///
    /// `None` when nothing is armed. A zero duration means now.
    fn get_remaining_timeout(&self) -> Option<Duration>;

    /// The driver's timer fired.
    ///
    /// Returns [`Retransmit::NotExpired`] on an early or spurious wake-up.
    /// [`Error::ReadTimeoutExpired`] means the connection must be torn down.
    fn on_timer_fired(&mut self) -> Result<Retransmit, Error>;
}

impl TimerControl for Session {
    fn get_remaining_timeout(&self) -> Option<Duration> {
        self.remaining_timeout()
    }

    fn on_timer_fired(&mut self) -> Result<Retransmit, Error> {
        self.handle_timeout()
    }
}

/// A session paired with the rest of a connection's controls.
///
/// The timing calls go to the session. Every other method of `C` is reached
/// through `Deref`, untouched.
#[derive(Debug)]
pub struct Connection<C> {
    session: Session,
    control: C,
}

impl<C> Connection<C> {
    pub fn new(session: Session, control: C) -> Self {
        Connection { session, control }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn into_parts(self) -> (Session, C) {
        (self.session, self.control)
    }
}

impl<C> TimerControl for Connection<C> {
    fn get_remaining_timeout(&self) -> Option<Duration> {
        self.session.get_remaining_timeout()
    }

    fn on_timer_fired(&mut self) -> Result<Retransmit, Error> {
        self.session.on_timer_fired()
    }
}

impl<C> Deref for Connection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.control
    }
}

impl<C> DerefMut for Connection<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.control
    }
}
