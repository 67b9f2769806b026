//! The per-connection buffers.
//!
//! Six ordered queues, each with its own job:
//!
//! * unprocessed records: received, not yet validated by the record layer
//! * processed records: validated, waiting for the handshake or application
//! * buffered messages: outbound handshake messages framed but not yet sent
//! * sent messages: the last flight, replayed verbatim on timeout
//! * early application data: records that arrived before the handshake
//!   allowed them to be delivered
//! * reassembly: inbound handshake messages still missing fragments
//!
//! All of them are torn down the same way, see [`Buffers::clear`].

use std::fmt;

use crate::buffer::{Buf, BufferPool};
use crate::fragment::{HandshakeFragment, HandshakeHeader};
use crate::queue::Queue;
use crate::record::RecordEntry;
use crate::types::Sequence;
use crate::{Config, Error};

pub struct Buffers {
    unprocessed: Queue<RecordEntry>,
    processed: Queue<RecordEntry>,
    buffered_messages: Queue<HandshakeFragment>,
    sent_messages: Queue<HandshakeFragment>,
    app_data: Queue<RecordEntry>,
    reassembly: Queue<HandshakeFragment>,
    pool: BufferPool,
    max_queue_rx: usize,
    max_queue_tx: usize,
    max_handshake_len: usize,
}

impl Buffers {
    pub fn new(config: &Config) -> Result<Self, Error> {
        Ok(Buffers {
            unprocessed: Queue::new("unprocessed"),
            processed: Queue::new("processed"),
            buffered_messages: Queue::new("buffered_messages"),
            sent_messages: Queue::new("sent_messages"),
            app_data: Queue::new("app_data"),
            reassembly: Queue::new("reassembly"),
            pool: BufferPool::with_capacity(config.max_queue_rx())?,
            max_queue_rx: config.max_queue_rx(),
            max_queue_tx: config.max_queue_tx(),
            max_handshake_len: config.max_handshake_len(),
        })
    }

    fn check_rx(&self, queue: &Queue<RecordEntry>) -> Result<(), Error> {
        if queue.len() >= self.max_queue_rx {
            warn!("Receive queue full (max {}): {:?}", self.max_queue_rx, queue);
            return Err(Error::ReceiveQueueFull);
        }
        Ok(())
    }

    /// Queue a freshly received record for the record layer.
    pub fn enqueue_unprocessed(&mut self, entry: RecordEntry) -> Result<(), Error> {
        self.check_rx(&self.unprocessed)?;
        self.unprocessed.insert(entry.sequence(), entry)
    }

    /// The unprocessed record with the lowest key.
    pub fn next_unprocessed(&mut self) -> Result<RecordEntry, Error> {
        self.unprocessed.pop_min().map(|(_, e)| e)
    }

    /// Queue a record the record layer has validated.
    pub fn enqueue_processed(&mut self, entry: RecordEntry) -> Result<(), Error> {
        self.check_rx(&self.processed)?;
        self.processed.insert(entry.sequence(), entry)
    }

    pub fn next_processed(&mut self) -> Result<RecordEntry, Error> {
        self.processed.pop_min().map(|(_, e)| e)
    }

    /// Hold application data until the handshake allows delivery.
    pub fn buffer_app_data(&mut self, entry: RecordEntry) -> Result<(), Error> {
        self.check_rx(&self.app_data)?;
        self.app_data.insert(entry.sequence(), entry)
    }

    pub fn next_app_data(&mut self) -> Result<RecordEntry, Error> {
        self.app_data.pop_min().map(|(_, e)| e)
    }

    /// Give a record's buffer back for reuse.
    pub fn release_record(&mut self, entry: RecordEntry) {
        entry.release(&mut self.pool);
    }

    /// Queue an outbound message (or ChangeCipherSpec) for the current flight.
    pub fn buffer_message(
        &mut self,
        epoch: u16,
        message: HandshakeFragment,
    ) -> Result<Sequence, Error> {
        if self.buffered_messages.len() >= self.max_queue_tx {
            warn!(
                "Transmit queue full (max {}): {:?}",
                self.max_queue_tx, self.buffered_messages
            );
            return Err(Error::TransmitQueueFull);
        }
        let key = Sequence::flight(epoch, message.message_seq(), message.is_ccs());
        self.buffered_messages.insert(key, message)?;
        Ok(key)
    }

    /// An outbound message that is framed but not yet sent.
    pub fn buffered_message(&self, key: Sequence) -> Option<&HandshakeFragment> {
        self.buffered_messages.get(key)
    }

    /// The outbound message with the lowest key.
    pub fn next_buffered_message(&mut self) -> Result<(Sequence, HandshakeFragment), Error> {
        self.buffered_messages.pop_min()
    }

    /// Remember a message as sent, for retransmission.
    pub fn record_sent(&mut self, key: Sequence, message: HandshakeFragment) -> Result<(), Error> {
        self.sent_messages.insert(key, message)
    }

    /// The current flight in replay order.
    pub fn sent_messages(&self) -> impl Iterator<Item = (Sequence, &HandshakeFragment)> + '_ {
        self.sent_messages.iter()
    }

    /// Retire sent messages up to and including `key`.
    ///
    /// Returns how many were retired.
    pub fn retire_sent_through(&mut self, key: Sequence) -> usize {
        let mut n = 0;
        loop {
            let next = match self.sent_messages.peek_min() {
                Ok((k, _)) => k,
                Err(_) => break,
            };
            if next > key {
                break;
            }
            if let Ok((_, message)) = self.sent_messages.pop_min() {
                self.pool.push(message.into_body());
            }
            n += 1;
        }
        n
    }

    /// Drop the whole sent flight.
    pub fn clear_sent(&mut self) {
        let pool = &mut self.pool;
        self.sent_messages
            .drain_with(|_, m| pool.push(m.into_body()));
    }

    /// Add an inbound handshake fragment to its message.
    ///
    /// Messages are keyed by `(epoch, message_seq)`, with at most one entry per
    /// message_seq: the newest epoch wins. A fragment from an older epoch than
    /// the one buffered is dropped, and a newer epoch replaces what is there.
    /// Returns whether the message is complete.
    pub fn buffer_handshake_fragment(
        &mut self,
        epoch: u16,
        header: &HandshakeHeader,
        data: &[u8],
    ) -> Result<bool, Error> {
        let key = Sequence::at(epoch, header.message_seq as u64);

        if let Some(existing) = self.reassembly.get_mut(key) {
            return existing.insert(header, data);
        }

        if let Some(other) = self.reassembly_key(header.message_seq) {
            if other.epoch > epoch {
                trace!(
                    "Drop message_seq {} fragment from epoch {} < {}",
                    header.message_seq,
                    epoch,
                    other.epoch
                );
                return Ok(self.has_complete_message(other));
            }
            debug!(
                "Epoch {} replaces message_seq {} from epoch {}",
                epoch, header.message_seq, other.epoch
            );
            self.discard_message(other);
        }

        if self.reassembly.len() >= self.max_queue_rx {
            warn!(
                "Reassembly queue full (max {}): {:?}",
                self.max_queue_rx, self.reassembly
            );
            return Err(Error::ReceiveQueueFull);
        }

        if header.length as usize > self.max_handshake_len {
            warn!(
                "Handshake message_seq {} too long: {}",
                header.message_seq, header.length
            );
            return Err(Error::MessageTooLong {
                len: header.length as usize,
                max: self.max_handshake_len,
            });
        }

        let mut message = HandshakeFragment::new(header)?;
        let complete = message.insert(header, data)?;
        self.reassembly.insert(key, message)?;

        Ok(complete)
    }

    /// Key of the inbound message with `message_seq`, complete or not.
    ///
    /// There is never more than one, see
    /// [`buffer_handshake_fragment`](Self::buffer_handshake_fragment).
    pub fn reassembly_key(&self, message_seq: u16) -> Option<Sequence> {
        self.reassembly
            .iter()
            .find(|(k, _)| k.sequence_number == message_seq as u64)
            .map(|(k, _)| k)
    }

    pub fn has_complete_message(&self, key: Sequence) -> bool {
        self.reassembly.get(key).is_some_and(|m| m.is_complete())
    }

    /// Take a completed inbound message.
    ///
    /// An incomplete message stays where it is and [`Error::Empty`] is returned.
    pub fn take_complete_message(&mut self, key: Sequence) -> Result<HandshakeFragment, Error> {
        if !self.has_complete_message(key) {
            return Err(Error::Empty);
        }
        self.reassembly.remove(key).ok_or(Error::Empty)
    }

    /// Drop an inbound message, complete or not.
    pub fn discard_message(&mut self, key: Sequence) {
        if let Some(m) = self.reassembly.remove(key) {
            self.pool.push(m.into_body());
        }
    }

    /// Empty every queue, releasing every owned buffer.
    ///
    /// The queue containers themselves are kept for reuse. Clearing empty
    /// buffers is a no-op.
    pub fn clear(&mut self) {
        let pool = &mut self.pool;

        for queue in [
            &mut self.unprocessed,
            &mut self.processed,
            &mut self.app_data,
        ] {
            queue.drain_with(|_, e| e.release(pool));
        }

        for queue in [
            &mut self.buffered_messages,
            &mut self.sent_messages,
            &mut self.reassembly,
        ] {
            queue.drain_with(|_, m| pool.push(m.into_body()));
        }
    }

    /// Clear and also drop the idle buffers in the pool.
    pub(crate) fn release_all(&mut self) {
        self.clear();
        self.pool.release_all();
    }

    /// Whether every queue is empty.
    pub fn is_empty(&self) -> bool {
        self.unprocessed.is_empty()
            && self.processed.is_empty()
            && self.buffered_messages.is_empty()
            && self.sent_messages.is_empty()
            && self.app_data.is_empty()
            && self.reassembly.is_empty()
    }

    pub fn unprocessed_len(&self) -> usize {
        self.unprocessed.len()
    }

    pub fn processed_len(&self) -> usize {
        self.processed.len()
    }

    pub fn buffered_messages_len(&self) -> usize {
        self.buffered_messages.len()
    }

    pub fn sent_messages_len(&self) -> usize {
        self.sent_messages.len()
    }

    pub fn app_data_len(&self) -> usize {
        self.app_data.len()
    }

    pub fn reassembly_len(&self) -> usize {
        self.reassembly.len()
    }

    /// Take a buffer from the pool.
    pub fn pop_buffer(&mut self) -> Buf {
        self.pool.pop()
    }

    /// Return a buffer to the pool.
    pub fn push_buffer(&mut self, buf: Buf) {
        self.pool.push(buf);
    }

    pub fn pooled(&self) -> usize {
        self.pool.len()
    }
}

impl fmt::Debug for Buffers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffers")
            .field("unprocessed", &self.unprocessed)
            .field("processed", &self.processed)
            .field("buffered_messages", &self.buffered_messages)
            .field("sent_messages", &self.sent_messages)
            .field("app_data", &self.app_data)
            .field("reassembly", &self.reassembly)
            .field("pool", &self.pool)
            .finish()
    }
}
