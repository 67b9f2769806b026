//! dtls-flight
//!
//! The reliability layer of a DTLS endpoint. DTLS runs a handshake designed for
//! reliable, in-order streams over datagrams that may be lost, duplicated or
//! reordered. This crate holds the pieces that make that work:
//!
//! * A retransmission timer with bounded exponential backoff. When a flight is
//!   not answered in time, the whole flight is resent and the timer doubles, up
//!   to a ceiling. After a number of unanswered rounds the path MTU is reduced,
//!   and after more the connection is failed with [`Error::ReadTimeoutExpired`].
//! * Ordered buffers keyed by `(epoch, sequence)`: records waiting for the
//!   record layer, validated records, handshake messages framed for sending,
//!   the history of the last sent flight, early application data and inbound
//!   handshake fragments awaiting reassembly.
//! * A [`Session`] that creates, clears and destroys all of the above as one
//!   unit, and a narrow [`TimerControl`] interface that the connection driver
//!   polls.
//!
//! Everything is sans-IO. Datagrams go out through a [`Transport`] and time is
//! read from a [`Clock`], both supplied by the caller.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use dtls_flight::{
//!     Config, ContentType, ManualClock, MessageType, Role, Session, Timeval, TimerControl,
//!     Transport,
//! };
//!
//! #[derive(Default)]
//! struct Udp;
//!
//! impl Transport for Udp {
//!     fn send(&mut self, _: ContentType, _: u16, _: &[u8]) -> std::io::Result<()> {
//!         Ok(())
//!     }
//!     fn query_fallback_mtu(&mut self) -> usize {
//!         576
//!     }
//!     fn arm(&mut self, _: Option<Timeval>) {}
//! }
//!
//! let clock = ManualClock::new(Timeval::new(1_000, 0));
//! let config = Arc::new(Config::default());
//! let mut session =
//!     Session::new(config, Role::Client, Box::new(Udp), Box::new(clock.clone())).unwrap();
//!
//! session
//!     .write_handshake(0, MessageType::ClientHello, b"hello", None)
//!     .unwrap();
//! session.flush_flight().unwrap();
//!
//! assert_eq!(session.get_remaining_timeout(), Some(Duration::from_secs(1)));
//!
//! clock.advance(Duration::from_millis(1_020));
//! session.on_timer_fired().unwrap();
//! assert_eq!(session.timer().duration(), Duration::from_secs(2));
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

mod buffer;
pub use buffer::{Buf, BufferPool, ToBuf};

mod buffers;
pub use buffers::Buffers;

mod clock;
pub use clock::{Clock, ManualClock, SystemClock, Timeval};

mod config;
pub use config::{Config, ConfigBuilder};

mod control;
pub use control::{Connection, TimerControl};

mod error;
pub use error::Error;

mod fragment;
pub use fragment::{HandshakeFragment, HandshakeHeader};

mod queue;
pub use queue::Queue;

mod record;
pub use record::{RecordEntry, RecordHeader};

mod session;
pub use session::{Retransmit, Role, Session};

mod time_tricks;
pub use time_tricks::InstantExt;

mod timer;
pub use timer::RetransmitTimer;

mod transcript;
pub use transcript::FinishedHash;

mod transport;
pub use transport::Transport;

mod types;
pub use types::{ContentType, MessageType, Sequence};

mod util;
