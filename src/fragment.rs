//! Handshake message headers and reassembly.

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u24};
use nom::IResult;
use tinyvec::TinyVec;

use crate::buffer::Buf;
use crate::transcript::FinishedHash;
use crate::types::MessageType;
use crate::util::put_u24;
use crate::Error;

/// The 12 byte DTLS handshake header.
///
/// type:1, length:3, message_seq:2, fragment_offset:3, fragment_length:3, all
/// big endian.
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct HandshakeHeader {
    pub msg_type: MessageType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl HandshakeHeader {
    pub const LEN: usize = 12;

    /// Header of a message sent as a single fragment.
    pub fn unfragmented(msg_type: MessageType, length: u32, message_seq: u16) -> Self {
        HandshakeHeader {
            msg_type,
            length,
            message_seq,
            fragment_offset: 0,
            fragment_length: length,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], HandshakeHeader> {
        let (input, msg_type) = MessageType::parse(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;

        Ok((
            input,
            HandshakeHeader {
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    /// Parse a header and the fragment body that follows it.
    pub fn parse_with_body(input: &[u8]) -> IResult<&[u8], (HandshakeHeader, &[u8])> {
        let (input, header) = Self::parse(input)?;
        let (input, body) = take(header.fragment_length as usize)(input)?;
        Ok((input, (header, body)))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.msg_type.as_u8());
        put_u24(output, self.length);
        output.extend_from_slice(&self.message_seq.to_be_bytes());
        put_u24(output, self.fragment_offset);
        put_u24(output, self.fragment_length);
    }

    /// The header as if the whole message was one fragment.
    ///
    /// This is what goes into the finished hash regardless of how the message
    /// was fragmented on the wire.
    pub fn serialize_as_single_fragment(&self, output: &mut Buf) {
        HandshakeHeader::unfragmented(self.msg_type, self.length, self.message_seq)
            .serialize(output);
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_offset > 0 || self.fragment_length < self.length
    }
}

/// Received byte range `[start, end)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: u32,
    end: u32,
}

/// A handshake message being assembled from fragments, or a complete message
/// kept for (re)transmission.
///
/// The body buffer is sized to the full message length up front. Received
/// ranges are kept merged and sorted, so completion is a single check.
#[derive(Debug)]
pub struct HandshakeFragment {
    header: HandshakeHeader,
    is_ccs: bool,
    body: Buf,
    spans: TinyVec<[Span; 4]>,
}

impl HandshakeFragment {
    /// Largest body the 24 bit length field can describe.
    pub const MAX_LEN: usize = 0xFF_FFFF;

    /// An empty reassembly unit for the message described by `header`.
    pub fn new(header: &HandshakeHeader) -> Result<Self, Error> {
        let body = Buf::try_zeroed(header.length as usize)?;
        Ok(HandshakeFragment {
            header: HandshakeHeader::unfragmented(
                header.msg_type,
                header.length,
                header.message_seq,
            ),
            is_ccs: false,
            body,
            spans: TinyVec::new(),
        })
    }

    /// A complete outbound handshake message.
    ///
    /// The body must fit the 24 bit length field.
    pub fn complete(msg_type: MessageType, message_seq: u16, body: &[u8]) -> Result<Self, Error> {
        if body.len() > Self::MAX_LEN {
            return Err(Error::MessageTooLong {
                len: body.len(),
                max: Self::MAX_LEN,
            });
        }
        let header = HandshakeHeader::unfragmented(msg_type, body.len() as u32, message_seq);
        let mut fragment = Self::new(&header)?;
        fragment.insert(&header, body)?;
        Ok(fragment)
    }

    /// A ChangeCipherSpec entry that travels with the flight.
    ///
    /// It takes the message_seq of the handshake message that follows it.
    pub fn change_cipher_spec(message_seq: u16) -> Self {
        let mut spans = TinyVec::new();
        spans.push(Span { start: 0, end: 1 });
        HandshakeFragment {
            header: HandshakeHeader::unfragmented(MessageType::Unknown(0), 1, message_seq),
            is_ccs: true,
            body: Buf::from_slice(&[1]),
            spans,
        }
    }

    pub fn header(&self) -> &HandshakeHeader {
        &self.header
    }

    pub fn msg_type(&self) -> MessageType {
        self.header.msg_type
    }

    pub fn message_seq(&self) -> u16 {
        self.header.message_seq
    }

    pub fn is_ccs(&self) -> bool {
        self.is_ccs
    }

    /// The message body. Only meaningful once [`is_complete`](Self::is_complete).
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Take the body buffer, e.g. to return it to a pool.
    pub fn into_body(self) -> Buf {
        self.body
    }

    /// Copy a received fragment into place.
    ///
    /// Overlaps and exact duplicates are accepted. Returns whether the message
    /// is complete after this fragment.
    pub fn insert(&mut self, header: &HandshakeHeader, data: &[u8]) -> Result<bool, Error> {
        if header.msg_type != self.header.msg_type
            || header.length != self.header.length
            || header.message_seq != self.header.message_seq
            || data.len() != header.fragment_length as usize
        {
            return Err(Error::FragmentMismatch(self.header.message_seq));
        }

        let start = header.fragment_offset;
        let end = start as u64 + header.fragment_length as u64;
        if end > self.header.length as u64 {
            return Err(Error::FragmentOutOfBounds {
                offset: header.fragment_offset,
                length: header.fragment_length,
                total: self.header.length,
            });
        }
        let end = end as u32;

        self.body[start as usize..end as usize].copy_from_slice(data);
        self.mark(Span { start, end });

        Ok(self.is_complete())
    }

    fn mark(&mut self, span: Span) {
        if span.start == span.end {
            return;
        }

        let mut merged = span;
        let mut placed = false;
        let mut out: TinyVec<[Span; 4]> = TinyVec::new();

        for s in std::mem::take(&mut self.spans) {
            if s.end < merged.start {
                out.push(s);
            } else if s.start > merged.end {
                if !placed {
                    out.push(merged);
                    placed = true;
                }
                out.push(s);
            } else {
                merged.start = merged.start.min(s.start);
                merged.end = merged.end.max(s.end);
            }
        }

        if !placed {
            out.push(merged);
        }

        self.spans = out;
    }

    /// Whether `[0, length)` has been received without gaps.
    pub fn is_complete(&self) -> bool {
        if self.header.length == 0 {
            return true;
        }
        matches!(
            self.spans.as_slice(),
            [only] if only.start == 0 && only.end == self.header.length
        )
    }

    /// Bytes received so far.
    pub fn received(&self) -> u32 {
        self.spans.iter().map(|s| s.end - s.start).sum()
    }

    /// Fold the message into a running transcript hash.
    ///
    /// ChangeCipherSpec is not a handshake message and is skipped.
    pub fn add_to_finished_hash(&self, hash: &mut dyn FinishedHash) {
        if self.is_ccs {
            return;
        }
        let mut header = Buf::new();
        self.header.serialize_as_single_fragment(&mut header);
        hash.update(&header);
        hash.update(&self.body);
    }

    /// Serialize the message as wire fragments of at most `max_body` body bytes.
    ///
    /// `emit` is called once per fragment with the serialized header and body.
    /// A message with an empty body still produces one header-only fragment.
    pub fn for_each_wire_fragment<F>(
        &self,
        max_body: usize,
        scratch: &mut Buf,
        mut emit: F,
    ) -> Result<(), Error>
    where
        F: FnMut(&[u8]) -> Result<(), Error>,
    {
        if self.is_ccs {
            return emit(&self.body[..]);
        }

        let max_body = max_body.max(1);
        let total_len = self.body.len();
        let mut offset = 0;

        loop {
            let chunk_len = total_len.saturating_sub(offset).min(max_body);

            let header = HandshakeHeader {
                fragment_offset: offset as u32,
                fragment_length: chunk_len as u32,
                ..self.header
            };

            scratch.clear();
            header.serialize(scratch);
            scratch.extend_from_slice(&self.body[offset..offset + chunk_len]);
            emit(&scratch[..])?;

            offset += chunk_len;
            if offset >= total_len {
                break;
            }
        }

        Ok(())
    }
}
