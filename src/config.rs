use std::time::Duration;

use crate::Error;

/// Retransmission and buffering configuration.
#[derive(Debug, Clone)]
pub struct Config {
    mtu: usize,
    no_query_mtu: bool,
    initial_timeout: Duration,
    max_timeout: Duration,
    timer_slop: Duration,
    max_timeout_alerts: u32,
    max_read_timeouts: u32,
    mtu_fallback_after: u32,
    max_queue_rx: usize,
    max_queue_tx: usize,
    cookie_len: usize,
    max_handshake_len: usize,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            mtu: 1150,
            no_query_mtu: false,
            initial_timeout: Duration::from_secs(1),
            max_timeout: Duration::from_secs(60),
            timer_slop: Duration::from_millis(15),
            max_timeout_alerts: 12,
            max_read_timeouts: 2,
            mtu_fallback_after: 2,
            max_queue_rx: 100,
            max_queue_tx: 100,
            cookie_len: 256,
            max_handshake_len: 102_400,
        }
    }

    /// Max transmission unit.
    ///
    /// Used when no path MTU has been learned and the transport can't tell.
    #[inline(always)]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Whether the learned MTU survives a session clear.
    #[inline(always)]
    pub fn no_query_mtu(&self) -> bool {
        self.no_query_mtu
    }

    /// Time of first retransmission.
    ///
    /// Every backoff sequence restarts with this value.
    #[inline(always)]
    pub fn initial_timeout(&self) -> Duration {
        self.initial_timeout
    }

    /// Ceiling for the doubled timeout.
    #[inline(always)]
    pub fn max_timeout(&self) -> Duration {
        self.max_timeout
    }

    /// Remaining time below this is reported as already expired.
    #[inline(always)]
    pub fn timer_slop(&self) -> Duration {
        self.timer_slop
    }

    /// Retransmission rounds allowed before the connection fails.
    #[inline(always)]
    pub fn max_timeout_alerts(&self) -> u32 {
        self.max_timeout_alerts
    }

    /// Read timeout counter wraps back to 1 above this value.
    #[inline(always)]
    pub fn max_read_timeouts(&self) -> u32 {
        self.max_read_timeouts
    }

    /// Retransmission rounds after which the transport's fallback MTU is used.
    #[inline(always)]
    pub fn mtu_fallback_after(&self) -> u32 {
        self.mtu_fallback_after
    }

    /// Max amount of entries in each inbound queue.
    #[inline(always)]
    pub fn max_queue_rx(&self) -> usize {
        self.max_queue_rx
    }

    /// Max amount of entries in each outbound queue.
    #[inline(always)]
    pub fn max_queue_tx(&self) -> usize {
        self.max_queue_tx
    }

    /// Size of the stateless retry cookie slot reserved for servers.
    #[inline(always)]
    pub fn cookie_len(&self) -> usize {
        self.cookie_len
    }

    /// Largest inbound handshake message accepted for reassembly.
    #[inline(always)]
    pub fn max_handshake_len(&self) -> usize {
        self.max_handshake_len
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    mtu: usize,
    no_query_mtu: bool,
    initial_timeout: Duration,
    max_timeout: Duration,
    timer_slop: Duration,
    max_timeout_alerts: u32,
    max_read_timeouts: u32,
    mtu_fallback_after: u32,
    max_queue_rx: usize,
    max_queue_tx: usize,
    cookie_len: usize,
    max_handshake_len: usize,
}

impl ConfigBuilder {
    /// Set the max transmission unit (MTU).
    ///
    /// Defaults to 1150.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Keep the learned MTU across a session clear.
    ///
    /// Defaults to false.
    pub fn no_query_mtu(mut self, v: bool) -> Self {
        self.no_query_mtu = v;
        self
    }

    /// Set the time of first retransmission. Must be whole seconds.
    ///
    /// Defaults to 1 second.
    pub fn initial_timeout(mut self, timeout: Duration) -> Self {
        self.initial_timeout = timeout;
        self
    }

    /// Set the ceiling for the doubled timeout.
    ///
    /// Defaults to 60 seconds.
    pub fn max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = timeout;
        self
    }

    /// Set the threshold below which a remaining timeout counts as expired.
    ///
    /// Defaults to 15ms, which covers the granularity of common OS timers.
    pub fn timer_slop(mut self, slop: Duration) -> Self {
        self.timer_slop = slop;
        self
    }

    /// Set the number of retransmission rounds before failing.
    ///
    /// Defaults to 12.
    pub fn max_timeout_alerts(mut self, n: u32) -> Self {
        self.max_timeout_alerts = n;
        self
    }

    /// Set where the read timeout counter wraps.
    ///
    /// Defaults to 2.
    pub fn max_read_timeouts(mut self, n: u32) -> Self {
        self.max_read_timeouts = n;
        self
    }

    /// Set after how many rounds the fallback MTU is queried.
    ///
    /// Defaults to 2.
    pub fn mtu_fallback_after(mut self, n: u32) -> Self {
        self.mtu_fallback_after = n;
        self
    }

    /// Defaults to 100.
    pub fn max_queue_rx(mut self, n: usize) -> Self {
        self.max_queue_rx = n;
        self
    }

    /// Defaults to 100.
    pub fn max_queue_tx(mut self, n: usize) -> Self {
        self.max_queue_tx = n;
        self
    }

    /// Defaults to 256.
    pub fn cookie_len(mut self, n: usize) -> Self {
        self.cookie_len = n;
        self
    }

    /// Set the largest inbound handshake message to reassemble.
    ///
    /// The reassembly buffer is sized from the peer's declared length, so
    /// this bounds what a single fragment can make us allocate.
    ///
    /// Defaults to 100KiB.
    pub fn max_handshake_len(mut self, n: usize) -> Self {
        self.max_handshake_len = n;
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::ConfigError` if the values can't work together.
    pub fn build(self) -> Result<Config, Error> {
        if self.initial_timeout < Duration::from_secs(1) || self.initial_timeout.subsec_nanos() != 0
        {
            return Err(Error::ConfigError(format!(
                "initial_timeout must be whole seconds >= 1: {:?}",
                self.initial_timeout
            )));
        }

        if self.max_timeout < self.initial_timeout {
            return Err(Error::ConfigError(format!(
                "max_timeout {:?} < initial_timeout {:?}",
                self.max_timeout, self.initial_timeout
            )));
        }

        // Record header + handshake header + at least some body.
        if self.mtu < 64 {
            return Err(Error::ConfigError(format!("mtu too small: {}", self.mtu)));
        }

        if self.max_read_timeouts == 0 {
            return Err(Error::ConfigError("max_read_timeouts must be > 0".into()));
        }

        Ok(Config {
            mtu: self.mtu,
            no_query_mtu: self.no_query_mtu,
            initial_timeout: self.initial_timeout,
            max_timeout: self.max_timeout,
            timer_slop: self.timer_slop,
            max_timeout_alerts: self.max_timeout_alerts,
            max_read_timeouts: self.max_read_timeouts,
            mtu_fallback_after: self.mtu_fallback_after,
            max_queue_rx: self.max_queue_rx,
            max_queue_tx: self.max_queue_tx,
            cookie_len: self.cookie_len,
            max_handshake_len: self.max_handshake_len,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder()
            .build()
            .expect("Default config should always validate")
    }
}
