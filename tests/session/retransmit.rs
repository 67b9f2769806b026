//! Timer expiry, backoff and flight retransmission.

use std::time::Duration;

use dtls_flight::{
    Config, ContentType, Error, MessageType, Retransmit, Role, TimerControl, Timeval,
};

use crate::common::*;

#[test]
fn first_timeout_doubles_and_resends() {
    let mut h = client();

    h.session
        .write_handshake(0, MessageType::ClientHello, &[0xAB; 40], None)
        .unwrap();
    assert_eq!(h.session.flush_flight().unwrap(), 1);
    assert_eq!(h.transport.armed(), Some(Timeval::new(1001, 0)));

    let first = h.transport.take_sent();
    assert_eq!(first.len(), 1);

    h.clock.advance(Duration::from_millis(1020));
    let r = h.session.on_timer_fired().unwrap();
    assert_eq!(r, Retransmit::Resent { messages: 1 });

    let timer = h.session.timer();
    assert_eq!(timer.duration(), Duration::from_secs(2));
    assert_eq!(timer.num_alerts(), 1);
    assert_eq!(timer.read_timeouts(), 1);
    assert_eq!(timer.deadline(), Some(Timeval::new(1003, 20_000)));
    assert_eq!(h.transport.armed(), Some(Timeval::new(1003, 20_000)));

    assert_eq!(h.transport.take_sent(), first, "resend is byte identical");
}

#[test]
fn early_wakeup_changes_nothing() {
    let mut h = client();
    h.session
        .write_handshake(0, MessageType::ClientHello, &[1; 10], None)
        .unwrap();
    h.session.flush_flight().unwrap();
    h.transport.take_sent();

    h.clock.advance(Duration::from_millis(500));
    assert_eq!(h.session.on_timer_fired().unwrap(), Retransmit::NotExpired);

    let timer = h.session.timer();
    assert_eq!(timer.duration(), Duration::from_secs(1));
    assert_eq!(timer.num_alerts(), 0);
    assert_eq!(timer.read_timeouts(), 0);
    assert_eq!(h.session.buffers().sent_messages_len(), 1);
    assert!(h.transport.sent().is_empty());
}

#[test]
fn idle_timer_is_not_expired() {
    let mut h = client();
    assert_eq!(h.session.get_remaining_timeout(), None);
    h.clock.advance(Duration::from_secs(100));
    assert_eq!(h.session.on_timer_fired().unwrap(), Retransmit::NotExpired);
}

#[test]
fn remaining_under_slop_counts_as_expired() {
    let mut h = client();
    h.session.start_retransmission_timer();

    h.clock.advance(Duration::from_millis(990));
    assert_eq!(h.session.get_remaining_timeout(), Some(Duration::ZERO));
    assert!(matches!(
        h.session.on_timer_fired(),
        Ok(Retransmit::Resent { messages: 0 })
    ));
}

#[test]
fn fails_on_the_alert_after_the_ceiling() {
    let mut h = client();
    h.session
        .write_handshake(0, MessageType::ClientHello, &[1; 10], None)
        .unwrap();
    h.session.flush_flight().unwrap();

    let max = h.session.config().max_timeout_alerts();
    for round in 1..=max {
        expire(&h);
        let r = h.session.on_timer_fired();
        assert!(r.is_ok(), "round {} failed early: {:?}", round, r);
    }

    expire(&h);
    let err = h.session.on_timer_fired().unwrap_err();
    assert!(matches!(err, Error::ReadTimeoutExpired));
    assert!(err.is_fatal());
    assert!(h.session.failed());
    assert_eq!(h.transport.armed(), None);
    assert_eq!(h.session.get_remaining_timeout(), None);

    assert!(matches!(
        h.session.on_timer_fired(),
        Err(Error::ConnectionFailed)
    ));
    assert!(matches!(
        h.session
            .write_handshake(0, MessageType::ClientHello, &[], None),
        Err(Error::ConnectionFailed)
    ));

    h.session.start_retransmission_timer();
    assert_eq!(h.session.get_remaining_timeout(), None);
}

#[test]
fn backoff_clamps_at_ceiling() {
    let config = Config::builder().max_timeout_alerts(100).build().unwrap();
    let mut h = harness(Role::Client, config);
    h.session.start_retransmission_timer();

    let mut last = Duration::ZERO;
    for _ in 0..10 {
        expire(&h);
        h.session.on_timer_fired().unwrap();
        let d = h.session.timer().duration();
        assert!(d >= last);
        assert!(d <= Duration::from_secs(60));
        last = d;
    }
    assert_eq!(last, Duration::from_secs(60));
}

#[test]
fn restart_while_armed_keeps_backoff() {
    let mut h = client();
    h.session.start_retransmission_timer();
    expire(&h);
    h.session.on_timer_fired().unwrap();
    assert_eq!(h.session.timer().duration(), Duration::from_secs(2));

    h.clock.advance(Duration::from_millis(700));
    h.session.start_retransmission_timer();
    assert_eq!(h.session.timer().duration(), Duration::from_secs(2));
    assert_eq!(h.session.get_remaining_timeout(), Some(Duration::from_secs(2)));
}

#[test]
fn fallback_mtu_refragments_next_resend() {
    let mut h = client();
    h.transport.set_fallback_mtu(300);

    h.session
        .write_handshake(0, MessageType::Certificate, &[7; 1000], None)
        .unwrap();
    h.session.flush_flight().unwrap();
    assert_eq!(h.transport.take_sent().len(), 1);

    for _ in 0..2 {
        expire(&h);
        h.session.on_timer_fired().unwrap();
        assert_eq!(h.session.timer().mtu(), 0);
        assert_eq!(h.transport.take_sent().len(), 1);
    }

    expire(&h);
    h.session.on_timer_fired().unwrap();
    assert_eq!(h.session.timer().mtu(), 300);
    assert_eq!(h.session.effective_mtu(), 300);

    let sent = h.transport.take_sent();
    assert_eq!(sent.len(), 4);
    assert!(sent.iter().all(|s| s.bytes.len() + 13 <= 300));

    h.transport.set_fallback_mtu(1400);
    expire(&h);
    h.session.on_timer_fired().unwrap();
    assert_eq!(h.session.timer().mtu(), 300, "mtu never grows");
}

#[test]
fn flight_replays_in_key_order() {
    let mut h = client();
    h.session
        .write_handshake(0, MessageType::ClientKeyExchange, &[1; 8], None)
        .unwrap();
    h.session.write_change_cipher_spec(0).unwrap();
    h.session
        .write_handshake(1, MessageType::Finished, &[2; 12], None)
        .unwrap();

    let kinds = |sent: Vec<Sent>| -> Vec<(ContentType, u16)> {
        sent.into_iter().map(|s| (s.content_type, s.epoch)).collect()
    };

    h.session.flush_flight().unwrap();
    let expected = vec![
        (ContentType::Handshake, 0),
        (ContentType::ChangeCipherSpec, 0),
        (ContentType::Handshake, 1),
    ];
    assert_eq!(kinds(h.transport.take_sent()), expected);

    expire(&h);
    h.session.on_timer_fired().unwrap();
    assert_eq!(kinds(h.transport.take_sent()), expected);
}

#[test]
fn stop_drops_flight_and_disarms() {
    let mut h = client();
    h.session
        .write_handshake(0, MessageType::ClientHello, &[1; 10], None)
        .unwrap();
    h.session.flush_flight().unwrap();
    expire(&h);
    h.session.on_timer_fired().unwrap();

    h.session.stop_retransmission_timer();
    assert_eq!(h.session.get_remaining_timeout(), None);
    assert_eq!(h.transport.armed(), None);
    assert_eq!(h.session.buffers().sent_messages_len(), 0);
    assert_eq!(h.session.timer().duration(), Duration::from_secs(1));

    h.clock.advance(Duration::from_secs(10));
    assert_eq!(h.session.on_timer_fired().unwrap(), Retransmit::NotExpired);
}

#[test]
fn send_failure_keeps_flight_for_retry() {
    let mut h = client();
    h.transport.set_fail_sends(true);
    h.session
        .write_handshake(0, MessageType::ClientHello, &[1; 10], None)
        .unwrap();

    let err = h.session.flush_flight().unwrap_err();
    assert!(matches!(err, Error::SendFailure(_)));
    assert!(!err.is_fatal());
    assert_eq!(h.session.buffers().sent_messages_len(), 1);
    assert!(h.session.get_remaining_timeout().is_some());

    h.transport.set_fail_sends(false);
    expire(&h);
    assert_eq!(
        h.session.on_timer_fired().unwrap(),
        Retransmit::Resent { messages: 1 }
    );
    assert_eq!(h.transport.sent().len(), 1);
}

#[test]
fn resend_failure_is_transient() {
    let mut h = client();
    h.session
        .write_handshake(0, MessageType::ClientHello, &[1; 10], None)
        .unwrap();
    h.session.flush_flight().unwrap();

    h.transport.set_fail_sends(true);
    expire(&h);
    let err = h.session.on_timer_fired().unwrap_err();
    assert!(matches!(err, Error::RetransmitSendFailure(_)));
    assert!(!err.is_fatal());
    assert!(!h.session.failed());
    assert_eq!(h.session.timer().num_alerts(), 1);

    h.transport.set_fail_sends(false);
    expire(&h);
    assert!(h.session.on_timer_fired().is_ok());
}

#[test]
fn retired_messages_are_not_resent() {
    let mut h = client();
    let first = h
        .session
        .write_handshake(0, MessageType::Certificate, &[1; 10], None)
        .unwrap();
    h.session
        .write_handshake(0, MessageType::ServerKeyExchange, &[2; 10], None)
        .unwrap();
    h.session.flush_flight().unwrap();
    h.transport.take_sent();

    assert_eq!(h.session.retire_sent_through(first), 1);

    expire(&h);
    assert_eq!(
        h.session.on_timer_fired().unwrap(),
        Retransmit::Resent { messages: 1 }
    );
}
