use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::Buf;
use crate::buffers::Buffers;
use crate::clock::Clock;
use crate::fragment::{HandshakeFragment, HandshakeHeader};
use crate::record::{RecordEntry, RecordHeader};
use crate::timer::RetransmitTimer;
use crate::transcript::FinishedHash;
use crate::transport::Transport;
use crate::types::{ContentType, MessageType, Sequence};
use crate::{Config, Error};

/// Which end of the handshake this session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Outcome of handling a timer wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retransmit {
    /// The deadline has not passed. Nothing changed.
    NotExpired,
    /// The last flight was sent again.
    Resent { messages: usize },
}

/// Per-connection reliability state.
///
/// Owns the buffers and the retransmission timer, and creates, clears and
/// destroys them together. Each connection has its own session; nothing is
/// shared between sessions.
pub struct Session {
    config: Arc<Config>,
    role: Role,
    transport: Box<dyn Transport + Send>,
    clock: Box<dyn Clock + Send>,

    buffers: Buffers,
    timer: RetransmitTimer,

    /// Stateless retry cookie.
    cookie: Vec<u8>,

    /// Next outbound handshake message_seq.
    next_handshake_seq: u16,

    /// Next inbound handshake message_seq to hand out.
    handshake_read_seq: u16,

    /// Serialization space for outgoing fragments.
    scratch: Buf,
}

impl Session {
    /// Create the buffers and timer for a new connection.
    ///
    /// Servers also get a cookie slot of `cookie_len` bytes. Any allocation
    /// failure fails the whole call and nothing is kept.
    pub fn new(
        config: Arc<Config>,
        role: Role,
        transport: Box<dyn Transport + Send>,
        clock: Box<dyn Clock + Send>,
    ) -> Result<Self, Error> {
        let buffers = Buffers::new(&config)?;
        let timer = RetransmitTimer::new(&config);

        let mut cookie = Vec::new();
        if role == Role::Server {
            cookie
                .try_reserve_exact(config.cookie_len())
                .map_err(|_| Error::AllocationFailure)?;
        }

        debug!("Create {:?} session", role);

        Ok(Session {
            config,
            role,
            transport,
            clock,
            buffers,
            timer,
            cookie,
            next_handshake_seq: 0,
            handshake_read_seq: 0,
            scratch: Buf::new(),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn buffers(&self) -> &Buffers {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut Buffers {
        &mut self.buffers
    }

    pub fn timer(&self) -> &RetransmitTimer {
        &self.timer
    }

    /// The stateless retry cookie, empty if none is set.
    pub fn cookie(&self) -> &[u8] {
        &self.cookie
    }

    pub fn set_cookie(&mut self, cookie: &[u8]) -> Result<(), Error> {
        let max = self.config.cookie_len();
        if cookie.len() > max {
            return Err(Error::CookieTooLong {
                len: cookie.len(),
                max,
            });
        }
        self.cookie.clear();
        self.cookie
            .try_reserve_exact(cookie.len())
            .map_err(|_| Error::AllocationFailure)?;
        self.cookie.extend_from_slice(cookie);
        Ok(())
    }

    /// Whether too many retransmissions went unanswered.
    ///
    /// A failed session does no more I/O until cleared.
    pub fn failed(&self) -> bool {
        self.timer.is_failed()
    }

    /// MTU used to size outgoing fragments.
    ///
    /// A fallback MTU learned through timeouts wins, then whatever the
    /// transport reports, then the configured value.
    pub fn effective_mtu(&self) -> usize {
        if self.timer.mtu() > 0 {
            return self.timer.mtu();
        }
        self.transport
            .path_mtu()
            .filter(|m| *m > 0)
            .unwrap_or(self.config.mtu())
    }

    /// Next handshake message_seq this side will send.
    pub fn next_handshake_seq(&self) -> u16 {
        self.next_handshake_seq
    }

    /// Next handshake message_seq expected from the peer.
    pub fn handshake_read_seq(&self) -> u16 {
        self.handshake_read_seq
    }

    /// Arm the retransmission timer.
    pub fn start_retransmission_timer(&mut self) {
        let now = self.clock.now();
        self.timer.start(now, &mut *self.transport);
    }

    /// Stop the timer and drop the sent flight.
    ///
    /// Called when the peer makes progress, at which point resending the last
    /// flight is pointless.
    pub fn stop_retransmission_timer(&mut self) {
        self.timer.stop(&mut *self.transport);
        self.buffers.clear_sent();
    }

    /// Time until the timer needs attention. `None` when no timer is running.
    pub fn remaining_timeout(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.timer.remaining(now).map(Duration::from)
    }

    /// React to a timer wake-up.
    ///
    /// On expiry the timeout is doubled, the alert is counted and the last
    /// flight is resent in key order. Failing the alert count is terminal.
    pub fn handle_timeout(&mut self) -> Result<Retransmit, Error> {
        if self.timer.is_failed() {
            return Err(Error::ConnectionFailed);
        }

        let now = self.clock.now();

        if !self.timer.is_expired(now) {
            return Ok(Retransmit::NotExpired);
        }

        self.timer.double(now, &mut *self.transport);
        self.timer.check_alerts(&mut *self.transport)?;
        self.timer.note_read_timeout();
        self.timer.start(now, &mut *self.transport);

        let messages = self.retransmit()?;

        Ok(Retransmit::Resent { messages })
    }

    fn retransmit(&mut self) -> Result<usize, Error> {
        let max_body = self.max_fragment_body();
        let Session {
            buffers,
            transport,
            scratch,
            ..
        } = self;

        debug!(
            "Resending flight of {} messages due to timeout",
            buffers.sent_messages_len()
        );

        let mut count = 0;
        for (key, message) in buffers.sent_messages() {
            send_message(&mut **transport, scratch, key.epoch, message, max_body).map_err(
                |e| match e {
                    Error::SendFailure(io) => Error::RetransmitSendFailure(io),
                    e => e,
                },
            )?;
            count += 1;
        }

        Ok(count)
    }

    fn max_fragment_body(&self) -> usize {
        self.effective_mtu()
            .saturating_sub(RecordHeader::LEN + HandshakeHeader::LEN)
    }

    fn check_not_failed(&self) -> Result<(), Error> {
        if self.timer.is_failed() {
            return Err(Error::ConnectionFailed);
        }
        Ok(())
    }

    /// Frame a handshake message for the current flight.
    ///
    /// The message gets the next outbound message_seq. When a transcript is
    /// given the message is folded into it as a single fragment. Fails with
    /// [`Error::MessageSeqExhausted`] once message_seq 65534 has been used.
    pub fn write_handshake(
        &mut self,
        epoch: u16,
        msg_type: MessageType,
        body: &[u8],
        transcript: Option<&mut dyn FinishedHash>,
    ) -> Result<Sequence, Error> {
        self.check_not_failed()?;

        let next_seq = self
            .next_handshake_seq
            .checked_add(1)
            .ok_or(Error::MessageSeqExhausted)?;

        let message = HandshakeFragment::complete(msg_type, self.next_handshake_seq, body)?;
        let key = self.buffers.buffer_message(epoch, message)?;

        if let (Some(hash), Some(message)) = (transcript, self.buffers.buffered_message(key)) {
            message.add_to_finished_hash(hash);
        }

        trace!(
            "Buffered {:?} message_seq {} at {}",
            msg_type,
            self.next_handshake_seq,
            key
        );
        self.next_handshake_seq = next_seq;

        Ok(key)
    }

    /// Queue a ChangeCipherSpec ahead of the next handshake message.
    pub fn write_change_cipher_spec(&mut self, epoch: u16) -> Result<Sequence, Error> {
        self.check_not_failed()?;
        let message = HandshakeFragment::change_cipher_spec(self.next_handshake_seq);
        self.buffers.buffer_message(epoch, message)
    }

    /// Send everything buffered for the current flight and arm the timer.
    ///
    /// Sent messages are kept for retransmission. If the transport fails the
    /// whole flight is still kept and armed, so the next timeout retries it.
    pub fn flush_flight(&mut self) -> Result<usize, Error> {
        self.check_not_failed()?;

        let mut keys = Vec::with_capacity(self.buffers.buffered_messages_len());
        while let Ok((key, message)) = self.buffers.next_buffered_message() {
            self.buffers.record_sent(key, message)?;
            keys.push(key);
        }

        if keys.is_empty() {
            return Ok(0);
        }

        self.start_retransmission_timer();

        let max_body = self.max_fragment_body();
        let Session {
            buffers,
            transport,
            scratch,
            ..
        } = self;

        for (key, message) in buffers.sent_messages() {
            if keys.binary_search(&key).is_err() {
                continue;
            }
            send_message(&mut **transport, scratch, key.epoch, message, max_body)?;
        }

        debug!("Flight of {} messages sent", keys.len());

        Ok(keys.len())
    }

    /// Retire sent messages the peer has acknowledged by progressing.
    pub fn retire_sent_through(&mut self, key: Sequence) -> usize {
        self.buffers.retire_sent_through(key)
    }

    /// Copy the first record of a datagram into the unprocessed queue.
    pub fn receive_record(&mut self, datagram: &[u8]) -> Result<Sequence, Error> {
        let buf = self.buffers.pop_buffer();
        let entry = RecordEntry::parse(datagram, buf)?;
        let key = entry.sequence();
        self.buffers.enqueue_unprocessed(entry)?;
        Ok(key)
    }

    /// Done with a record popped from one of the record queues.
    pub fn release_record(&mut self, entry: RecordEntry) {
        self.buffers.release_record(entry);
    }

    /// Feed the handshake fragments of one record into reassembly.
    ///
    /// Fragments of messages already handed out are dropped. Returns whether
    /// the next expected message is now complete.
    pub fn receive_handshake_fragment(
        &mut self,
        epoch: u16,
        mut input: &[u8],
    ) -> Result<bool, Error> {
        while !input.is_empty() {
            let (rest, (header, body)) = HandshakeHeader::parse_with_body(input)?;
            input = rest;

            if header.message_seq < self.handshake_read_seq {
                trace!(
                    "Drop stale fragment message_seq {} < {}",
                    header.message_seq,
                    self.handshake_read_seq
                );
                continue;
            }

            self.buffers.buffer_handshake_fragment(epoch, &header, body)?;
        }

        Ok(self.next_message_ready())
    }

    fn next_message_ready(&self) -> bool {
        self.buffers
            .reassembly_key(self.handshake_read_seq)
            .is_some_and(|k| self.buffers.has_complete_message(k))
    }

    /// Hand out the next inbound handshake message, in message_seq order.
    ///
    /// `None` until the message is complete. The message is folded into the
    /// transcript when one is given. The last message_seq (65535) is never
    /// handed out since nothing could follow it.
    pub fn next_message(
        &mut self,
        transcript: Option<&mut dyn FinishedHash>,
    ) -> Result<Option<HandshakeFragment>, Error> {
        let Some(key) = self.buffers.reassembly_key(self.handshake_read_seq) else {
            return Ok(None);
        };

        if !self.buffers.has_complete_message(key) {
            return Ok(None);
        }

        let next_seq = self
            .handshake_read_seq
            .checked_add(1)
            .ok_or(Error::MessageSeqExhausted)?;

        let message = self.buffers.take_complete_message(key)?;

        if let Some(hash) = transcript {
            message.add_to_finished_hash(hash);
        }

        self.handshake_read_seq = next_seq;

        Ok(Some(message))
    }

    /// Reset for a fresh handshake on the same connection.
    ///
    /// Every buffer is emptied and every counter zeroed. The learned MTU is
    /// kept only when the config says not to query it again.
    pub fn clear(&mut self) {
        let mtu = if self.config.no_query_mtu() {
            self.timer.mtu()
        } else {
            0
        };

        self.buffers.clear();
        self.timer.reset();
        self.timer.set_mtu(mtu);
        self.transport.arm(None);

        self.cookie.clear();
        self.next_handshake_seq = 0;
        self.handshake_read_seq = 0;

        debug!("Session cleared (mtu: {})", mtu);
    }

    /// Tear down the session, releasing every buffer.
    pub fn destroy(self) {
        drop(self);
    }
}

fn send_message(
    transport: &mut dyn Transport,
    scratch: &mut Buf,
    epoch: u16,
    message: &HandshakeFragment,
    max_body: usize,
) -> Result<(), Error> {
    let content_type = if message.is_ccs() {
        ContentType::ChangeCipherSpec
    } else {
        ContentType::Handshake
    };

    message.for_each_wire_fragment(max_body, scratch, |bytes| {
        transport
            .send(content_type, epoch, bytes)
            .map_err(Error::SendFailure)
    })
}

impl Drop for Session {
    fn drop(&mut self) {
        self.buffers.release_all();
        self.transport.arm(None);
        debug!("Session destroyed");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("timer", &self.timer)
            .field("buffers", &self.buffers)
            .field("cookie_len", &self.cookie.len())
            .field("next_handshake_seq", &self.next_handshake_seq)
            .field("handshake_read_seq", &self.handshake_read_seq)
            .finish()
    }
}
