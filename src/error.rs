use std::io;

use thiserror::Error;

use crate::types::Sequence;

/// Errors surfaced by the reliability layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A buffer or queue could not be allocated. Nothing was left half built.
    #[error("Allocation failed")]
    AllocationFailure,

    /// An entry with the same key is already queued. The queue is unchanged.
    #[error("Duplicate key {0}")]
    DuplicateKey(Sequence),

    /// Peek or pop on an empty queue.
    #[error("Queue is empty")]
    Empty,

    /// Too many retransmission rounds went unanswered.
    #[error("Read timeout expired")]
    ReadTimeoutExpired,

    /// The transport failed while resending a flight.
    #[error("Retransmission send failed: {0}")]
    RetransmitSendFailure(#[source] io::Error),

    /// The transport failed while sending a flight for the first time.
    #[error("Send failed: {0}")]
    SendFailure(#[source] io::Error),

    #[error("Receive queue full")]
    ReceiveQueueFull,

    #[error("Transmit queue full")]
    TransmitQueueFull,

    #[error("Parse error: {0:?}")]
    ParseError(nom::error::ErrorKind),

    #[error("Parse incomplete")]
    ParseIncomplete,

    #[error("Fragment {offset}+{length} is outside message of length {total}")]
    FragmentOutOfBounds { offset: u32, length: u32, total: u32 },

    #[error("Fragment does not match buffered message {0}")]
    FragmentMismatch(u16),

    /// The 16 bit handshake message_seq has no room for another message.
    #[error("Handshake message_seq exhausted")]
    MessageSeqExhausted,

    #[error("Handshake message too long (> {max}): {len}")]
    MessageTooLong { len: usize, max: usize },

    #[error("Cookie too long (> {max}): {len}")]
    CookieTooLong { len: usize, max: usize },

    /// I/O was attempted after the connection failed.
    #[error("Connection failed")]
    ConnectionFailed,

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Whether the connection must be torn down.
    ///
    /// Anything else is transient and the driver should try again on the next
    /// wake-up.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ReadTimeoutExpired
                | Error::ConnectionFailed
                | Error::AllocationFailure
                | Error::MessageSeqExhausted
        )
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match value {
            nom::Err::Incomplete(_) => Error::ParseIncomplete,
            nom::Err::Error(e) | nom::Err::Failure(e) => Error::ParseError(e.code),
        }
    }
}
