#![no_main]

//! Fuzz target for handshake fragment reassembly.
//!
//! Arbitrary bytes are fed as the payload of handshake records. Whatever the
//! input, the session must not panic and a message handed out must be
//! complete and of its declared length.

use libfuzzer_sys::fuzz_target;
use std::io;
use std::sync::Arc;

use dtls_flight::{Config, ContentType, ManualClock, Role, Session, Timeval, Transport};

struct Sink;

impl Transport for Sink {
    fn send(&mut self, _: ContentType, _: u16, _: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn query_fallback_mtu(&mut self) -> usize {
        576
    }

    fn arm(&mut self, _: Option<Timeval>) {}
}

fuzz_target!(|data: &[u8]| {
    let session = Session::new(
        Arc::new(Config::default()),
        Role::Server,
        Box::new(Sink),
        Box::new(ManualClock::default()),
    );
    let Ok(mut session) = session else {
        return;
    };

    // First byte picks the epoch, the rest is split into records.
    let Some((&epoch, rest)) = data.split_first() else {
        return;
    };

    for chunk in rest.chunks(64) {
        let _ = session.receive_handshake_fragment((epoch & 1) as u16, chunk);

        while let Ok(Some(message)) = session.next_message(None) {
            assert!(message.is_complete());
            assert_eq!(message.body().len(), message.header().length as usize);
        }
    }

    session.clear();
    assert!(session.buffers().is_empty());
});
