//! Create, clear and destroy.

use std::time::Duration;

use dtls_flight::{Config, ContentType, Error, MessageType, Role, Sequence, TimerControl};

use crate::common::*;

fn busy(h: &mut Harness) {
    let s = &mut h.session;

    s.receive_record(&record(ContentType::Handshake, 0, 1, &[1, 2, 3]))
        .unwrap();
    s.receive_record(&record(ContentType::ApplicationData, 1, 0, &[4]))
        .unwrap();
    let r = s.buffers_mut().next_unprocessed().unwrap();
    s.buffers_mut().enqueue_processed(r).unwrap();
    let r = s.buffers_mut().next_unprocessed().unwrap();
    s.buffers_mut().buffer_app_data(r).unwrap();

    s.receive_record(&record(ContentType::Handshake, 0, 2, &[5]))
        .unwrap();

    s.write_handshake(0, MessageType::ClientHello, &[1; 20], None)
        .unwrap();
    s.flush_flight().unwrap();
    s.write_handshake(0, MessageType::Certificate, &[2; 20], None)
        .unwrap();

    s.receive_handshake_fragment(0, &fragment(MessageType::ServerHello, 0, 8, 0, &[0; 4]))
        .unwrap();
}

fn run_timeouts(h: &mut Harness, n: usize) {
    for _ in 0..n {
        expire(h);
        h.session.on_timer_fired().unwrap();
    }
}

#[test]
fn new_session_is_idle_and_empty() {
    let h = client();
    assert!(h.session.buffers().is_empty());
    assert!(!h.session.timer().is_armed());
    assert_eq!(h.session.get_remaining_timeout(), None);
    assert_eq!(h.session.role(), Role::Client);
    assert!(!h.session.failed());
}

#[test]
fn records_pop_in_key_order() {
    let mut h = client();
    for (epoch, seq) in [(1, 0), (0, 7), (0, 3)] {
        h.session
            .receive_record(&record(ContentType::Handshake, epoch, seq, &[0]))
            .unwrap();
    }

    let b = h.session.buffers_mut();
    let keys: Vec<_> = std::iter::from_fn(|| b.next_unprocessed().ok())
        .map(|r| r.sequence())
        .collect();
    assert_eq!(
        keys,
        vec![Sequence::at(0, 3), Sequence::at(0, 7), Sequence::at(1, 0)]
    );
}

#[test]
fn duplicate_record_is_rejected() {
    let mut h = client();
    let datagram = record(ContentType::Handshake, 0, 5, &[1]);
    h.session.receive_record(&datagram).unwrap();

    let err = h.session.receive_record(&datagram).unwrap_err();
    assert!(matches!(err, Error::DuplicateKey(k) if k == Sequence::at(0, 5)));
    assert_eq!(h.session.buffers().unprocessed_len(), 1);
}

#[test]
fn released_records_are_reused() {
    let mut h = client();
    h.session
        .receive_record(&record(ContentType::Handshake, 0, 1, &[1, 2]))
        .unwrap();
    let entry = h.session.buffers_mut().next_unprocessed().unwrap();
    assert_eq!(entry.fragment(), &[1, 2]);

    h.session.release_record(entry);
    assert_eq!(h.session.buffers().pooled(), 1);

    h.session
        .receive_record(&record(ContentType::Handshake, 0, 2, &[3]))
        .unwrap();
    assert_eq!(h.session.buffers().pooled(), 0);
}

#[test]
fn clear_resets_everything() {
    let mut h = client();
    busy(&mut h);
    run_timeouts(&mut h, 3);
    assert_eq!(h.session.timer().mtu(), 548);

    let b = h.session.buffers();
    assert_eq!(b.unprocessed_len(), 1);
    assert_eq!(b.processed_len(), 1);
    assert_eq!(b.app_data_len(), 1);
    assert_eq!(b.buffered_messages_len(), 1);
    assert_eq!(b.sent_messages_len(), 1);
    assert_eq!(b.reassembly_len(), 1);

    h.session.clear();

    assert!(h.session.buffers().is_empty());
    let t = h.session.timer();
    assert_eq!(t.num_alerts(), 0);
    assert_eq!(t.read_timeouts(), 0);
    assert_eq!(t.mtu(), 0);
    assert_eq!(t.duration(), Duration::from_secs(1));
    assert!(!t.is_armed());
    assert_eq!(h.transport.armed(), None);
    assert_eq!(h.session.next_handshake_seq(), 0);
    assert_eq!(h.session.handshake_read_seq(), 0);
}

#[test]
fn clear_keeps_mtu_when_not_requerying() {
    let config = Config::builder().no_query_mtu(true).build().unwrap();
    let mut h = harness(Role::Client, config);
    h.session.start_retransmission_timer();
    run_timeouts(&mut h, 3);
    assert_eq!(h.session.timer().mtu(), 548);

    h.session.clear();
    assert_eq!(h.session.timer().mtu(), 548);
    assert_eq!(h.session.timer().num_alerts(), 0);
    assert_eq!(h.session.effective_mtu(), 548);
}

#[test]
fn clear_is_idempotent() {
    let mut h = client();
    h.session.clear();
    h.session.clear();
    assert!(h.session.buffers().is_empty());
}

#[test]
fn clear_recovers_failed_session() {
    let config = Config::builder().max_timeout_alerts(1).build().unwrap();
    let mut h = harness(Role::Client, config);
    h.session.start_retransmission_timer();
    run_timeouts(&mut h, 1);
    expire(&h);
    assert!(h.session.on_timer_fired().is_err());
    assert!(h.session.failed());

    h.session.clear();
    assert!(!h.session.failed());
    h.session
        .write_handshake(0, MessageType::ClientHello, &[1], None)
        .unwrap();
    assert_eq!(h.session.flush_flight().unwrap(), 1);
}

#[test]
fn server_cookie_is_cleared() {
    let mut h = harness(Role::Server, Config::default());
    h.session.set_cookie(&[0xC0; 20]).unwrap();
    assert_eq!(h.session.cookie().len(), 20);

    h.session.clear();
    assert!(h.session.cookie().is_empty());
}

#[test]
fn destroy_releases_in_any_state() {
    let mut h = client();
    busy(&mut h);
    assert!(h.transport.armed().is_some());

    let Harness {
        session, transport, ..
    } = h;
    session.destroy();
    assert_eq!(transport.armed(), None);
}
