//! Shared helpers for session integration tests.

#![allow(unused)]

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dtls_flight::{
    Config, ContentType, ManualClock, MessageType, Role, Session, Timeval, Transport,
};

/// One payload handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub content_type: ContentType,
    pub epoch: u16,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct Wire {
    pub sent: Vec<Sent>,
    pub armed: Option<Timeval>,
    pub fallback_mtu: usize,
    pub path_mtu: Option<usize>,
    pub fail_sends: bool,
}

/// Transport that records everything. Clones share the same wire.
#[derive(Debug, Clone, Default)]
pub struct MockTransport(pub Arc<Mutex<Wire>>);

impl MockTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.0.lock().unwrap().sent.clone()
    }

    pub fn take_sent(&self) -> Vec<Sent> {
        std::mem::take(&mut self.0.lock().unwrap().sent)
    }

    pub fn armed(&self) -> Option<Timeval> {
        self.0.lock().unwrap().armed
    }

    pub fn set_fail_sends(&self, v: bool) {
        self.0.lock().unwrap().fail_sends = v;
    }

    pub fn set_fallback_mtu(&self, mtu: usize) {
        self.0.lock().unwrap().fallback_mtu = mtu;
    }
}

impl Transport for MockTransport {
    fn send(&mut self, content_type: ContentType, epoch: u16, payload: &[u8]) -> io::Result<()> {
        let mut wire = self.0.lock().unwrap();
        if wire.fail_sends {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "socket full"));
        }
        wire.sent.push(Sent {
            content_type,
            epoch,
            bytes: payload.to_vec(),
        });
        Ok(())
    }

    fn query_fallback_mtu(&mut self) -> usize {
        self.0.lock().unwrap().fallback_mtu
    }

    fn arm(&mut self, deadline: Option<Timeval>) {
        self.0.lock().unwrap().armed = deadline;
    }

    fn path_mtu(&self) -> Option<usize> {
        self.0.lock().unwrap().path_mtu
    }
}

/// Start of time in every test.
pub const T0: Timeval = Timeval::new(1000, 0);

pub struct Harness {
    pub session: Session,
    pub transport: MockTransport,
    pub clock: ManualClock,
}

pub fn harness(role: Role, config: Config) -> Harness {
    let _ = env_logger::try_init();

    let transport = MockTransport::default();
    transport.set_fallback_mtu(548);
    let clock = ManualClock::new(T0);

    let session = Session::new(
        Arc::new(config),
        role,
        Box::new(transport.clone()),
        Box::new(clock.clone()),
    )
    .expect("create session");

    Harness {
        session,
        transport,
        clock,
    }
}

pub fn client() -> Harness {
    harness(Role::Client, Config::default())
}

/// Push the clock to the current deadline.
pub fn expire(h: &Harness) {
    let left = h
        .session
        .timer()
        .remaining(h.clock_now())
        .expect("timer armed");
    h.clock.advance(Duration::from(left));
}

impl Harness {
    pub fn clock_now(&self) -> Timeval {
        use dtls_flight::Clock;
        self.clock.now()
    }
}

/// A serialized handshake fragment.
pub fn fragment(msg_type: MessageType, seq: u16, total: u32, offset: u32, body: &[u8]) -> Vec<u8> {
    let mut out = vec![msg_type.as_u8()];
    out.extend_from_slice(&total.to_be_bytes()[1..]);
    out.extend_from_slice(&seq.to_be_bytes());
    out.extend_from_slice(&offset.to_be_bytes()[1..]);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(body);
    out
}

/// A serialized DTLS 1.2 record.
pub fn record(content_type: ContentType, epoch: u16, seq: u64, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![content_type.as_u8(), 0xFE, 0xFD];
    out.extend_from_slice(&epoch.to_be_bytes());
    out.extend_from_slice(&seq.to_be_bytes()[2..]);
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}
