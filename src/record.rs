//! Inbound records as held by the record queues.

use nom::number::complete::be_u16;
use nom::IResult;

use crate::buffer::{Buf, BufferPool};
use crate::types::{ContentType, Sequence};
use crate::util::be_u48;
use crate::Error;

/// The fields of a DTLS record header needed to key the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub version: u16,
    pub sequence: Sequence,
    pub length: u16,
}

impl RecordHeader {
    /// content_type(1) + version(2) + epoch(2) + sequence(6) + length(2)
    pub const LEN: usize = 13;

    pub fn parse(input: &[u8]) -> IResult<&[u8], RecordHeader> {
        let (input, content_type) = ContentType::parse(input)?;
        let (input, version) = be_u16(input)?;
        let (input, epoch) = be_u16(input)?;
        let (input, sequence_number) = be_u48(input)?;
        let (input, length) = be_u16(input)?;

        Ok((
            input,
            RecordHeader {
                content_type,
                version,
                sequence: Sequence::at(epoch, sequence_number),
                length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Buf) {
        output.push(self.content_type.as_u8());
        output.extend_from_slice(&self.version.to_be_bytes());
        output.extend_from_slice(&self.sequence.epoch.to_be_bytes());
        output.extend_from_slice(&self.sequence.sequence_number.to_be_bytes()[2..]);
        output.extend_from_slice(&self.length.to_be_bytes());
    }
}

/// One received record and the buffer holding its bytes.
///
/// The entry owns the buffer until it is released back into a pool or dropped.
#[derive(Debug)]
pub struct RecordEntry {
    header: RecordHeader,
    buf: Buf,
}

impl RecordEntry {
    /// Copy the first record of `datagram` into `into` and key it.
    ///
    /// Anything after the first record is ignored; the record layer splits
    /// datagrams before they get here.
    pub fn parse(datagram: &[u8], mut into: Buf) -> Result<RecordEntry, Error> {
        let (rest, header) = RecordHeader::parse(datagram)?;

        if rest.len() < header.length as usize {
            return Err(Error::ParseIncomplete);
        }

        let total = RecordHeader::LEN + header.length as usize;
        into.clear();
        into.extend_from_slice(&datagram[..total]);

        Ok(RecordEntry { header, buf: into })
    }

    pub fn new(header: RecordHeader, buf: Buf) -> Self {
        RecordEntry { header, buf }
    }

    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub fn sequence(&self) -> Sequence {
        self.header.sequence
    }

    pub fn content_type(&self) -> ContentType {
        self.header.content_type
    }

    /// The record payload after the header.
    pub fn fragment(&self) -> &[u8] {
        self.buf.get(RecordHeader::LEN..).unwrap_or(&[])
    }

    /// The whole record as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Give the buffer back to `pool`, if there is one to give.
    pub fn release(self, pool: &mut BufferPool) {
        if !self.buf.is_empty() {
            pool.push(self.buf);
        }
    }

    pub fn into_buffer(self) -> Buf {
        self.buf
    }
}
