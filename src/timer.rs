use std::time::Duration;

use crate::clock::Timeval;
use crate::transport::Transport;
use crate::{Config, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timeout {
    Unarmed,
    Armed(Timeval),
    Failed,
}

/// Retransmission timer with exponential backoff.
///
/// The timer is Idle until started. Once armed it expires at its deadline;
/// handling an expiry doubles the duration (up to the configured ceiling) and
/// re-arms. Every handled expiry counts as an alert; too many alerts is
/// terminal.
#[derive(Debug)]
pub struct RetransmitTimer {
    timeout: Timeout,
    duration: Duration,
    num_alerts: u32,
    read_timeouts: u32,
    mtu: usize,

    initial: Duration,
    ceiling: Duration,
    slop: Duration,
    max_alerts: u32,
    max_read_timeouts: u32,
    mtu_fallback_after: u32,
}

impl RetransmitTimer {
    pub fn new(config: &Config) -> Self {
        RetransmitTimer {
            timeout: Timeout::Unarmed,
            duration: config.initial_timeout(),
            num_alerts: 0,
            read_timeouts: 0,
            mtu: 0,
            initial: config.initial_timeout(),
            ceiling: config.max_timeout(),
            slop: config.timer_slop(),
            max_alerts: config.max_timeout_alerts(),
            max_read_timeouts: config.max_read_timeouts(),
            mtu_fallback_after: config.mtu_fallback_after(),
        }
    }

    /// Arm the timer at `now + duration`.
    ///
    /// An idle timer starts over at the initial duration; an armed one keeps
    /// its current duration. The last call defines the deadline.
    pub fn start(&mut self, now: Timeval, transport: &mut dyn Transport) {
        match self.timeout {
            Timeout::Failed => {
                debug!("Not arming failed timer");
                return;
            }
            Timeout::Unarmed => self.duration = self.initial,
            Timeout::Armed(_) => {}
        }

        let deadline = now.add_duration(self.duration);
        debug!(
            "Retransmit timer armed in {:.03}s",
            self.duration.as_secs_f32()
        );
        self.timeout = Timeout::Armed(deadline);
        transport.arm(Some(deadline));
    }

    /// Time left until the deadline.
    ///
    /// `None` when no timer is running. An expired timer, or one with less
    /// than the slop left, reports [`Timeval::ZERO`].
    pub fn remaining(&self, now: Timeval) -> Option<Timeval> {
        let Timeout::Armed(deadline) = self.timeout else {
            return None;
        };

        if deadline <= now {
            return Some(Timeval::ZERO);
        }

        let left = deadline.saturating_sub(now);

        if Duration::from(left) < self.slop {
            return Some(Timeval::ZERO);
        }

        Some(left)
    }

    /// Whether a running timer has run out.
    pub fn is_expired(&self, now: Timeval) -> bool {
        self.remaining(now).is_some_and(|t| t.is_zero())
    }

    /// Double the duration, clamped to the ceiling, and re-arm.
    pub fn double(&mut self, now: Timeval, transport: &mut dyn Transport) {
        self.duration = self.duration.saturating_mul(2).min(self.ceiling);
        self.start(now, transport);
    }

    /// Count one retransmission round.
    ///
    /// After a few rounds the transport's fallback MTU is adopted. Beyond the
    /// alert ceiling the timer fails for good.
    pub fn check_alerts(&mut self, transport: &mut dyn Transport) -> Result<(), Error> {
        self.num_alerts += 1;

        if self.num_alerts > self.mtu_fallback_after {
            let fallback = transport.query_fallback_mtu();
            if fallback > 0 && (self.mtu == 0 || fallback < self.mtu) {
                debug!("MTU fallback {} -> {}", self.mtu, fallback);
                self.mtu = fallback;
            }
        }

        if self.num_alerts > self.max_alerts {
            warn!(
                "Read timeout expired after {} retransmissions",
                self.num_alerts - 1
            );
            self.timeout = Timeout::Failed;
            transport.arm(None);
            return Err(Error::ReadTimeoutExpired);
        }

        Ok(())
    }

    /// Count a read timeout, wrapping to 1 above the configured maximum.
    pub fn note_read_timeout(&mut self) {
        self.read_timeouts += 1;
        if self.read_timeouts > self.max_read_timeouts {
            self.read_timeouts = 1;
        }
    }

    /// Disarm and start the next backoff sequence from scratch.
    ///
    /// A failed timer stays failed.
    pub fn stop(&mut self, transport: &mut dyn Transport) {
        if self.timeout != Timeout::Failed {
            self.timeout = Timeout::Unarmed;
        }
        self.duration = self.initial;
        self.num_alerts = 0;
        self.read_timeouts = 0;
        transport.arm(None);
        debug!("Retransmit timer stopped");
    }

    /// Forget everything, including the learned MTU and a failure.
    pub(crate) fn reset(&mut self) {
        self.timeout = Timeout::Unarmed;
        self.duration = self.initial;
        self.num_alerts = 0;
        self.read_timeouts = 0;
        self.mtu = 0;
    }

    pub(crate) fn set_mtu(&mut self, mtu: usize) {
        self.mtu = mtu;
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.timeout, Timeout::Armed(_))
    }

    pub fn is_failed(&self) -> bool {
        self.timeout == Timeout::Failed
    }

    pub fn deadline(&self) -> Option<Timeval> {
        match self.timeout {
            Timeout::Armed(d) => Some(d),
            _ => None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn num_alerts(&self) -> u32 {
        self.num_alerts
    }

    pub fn read_timeouts(&self) -> u32 {
        self.read_timeouts
    }

    /// Learned path MTU, 0 when none.
    pub fn mtu(&self) -> usize {
        self.mtu
    }
}
