#![no_main]

//! Fuzz target for keying inbound records.
//!
//! DTLS 1.2 record format:
//! - ContentType: 1 byte (20-24 valid values)
//! - ProtocolVersion: 2 bytes (0xFEFD for DTLS 1.2, 0xFEFF for DTLS 1.0)
//! - Epoch: 2 bytes
//! - Sequence Number: 6 bytes (u48)
//! - Length: 2 bytes
//! - Fragment: variable (up to 2^14 bytes for plaintext)

use libfuzzer_sys::fuzz_target;

use dtls_flight::{Buf, BufferPool, RecordEntry, RecordHeader};

/// Maximum DTLS fragment size
const MAX_FRAGMENT_SIZE: usize = 16384;

fuzz_target!(|data: &[u8]| {
    let mut pool = match BufferPool::with_capacity(4) {
        Ok(p) => p,
        Err(_) => return,
    };

    // The input as-is exercises the error paths.
    if let Ok(entry) = RecordEntry::parse(data, pool.pop()) {
        assert!(entry.as_bytes().len() >= RecordHeader::LEN);
        assert_eq!(entry.fragment().len(), entry.header().length as usize);
        entry.release(&mut pool);
    }

    if data.is_empty() {
        return;
    }

    // Same bytes behind a well formed header must always parse.
    let frag_len = data.len().min(MAX_FRAGMENT_SIZE);
    let mut record = Buf::new();
    record.push(22u8); // ContentType::Handshake
    record.extend_from_slice(&[0xFE, 0xFD]);
    record.extend_from_slice(&[0, 0]);
    record.extend_from_slice(&[0, 0, 0, 0, 0, 1]);
    record.extend_from_slice(&(frag_len as u16).to_be_bytes());
    record.extend_from_slice(&data[..frag_len]);

    let entry = RecordEntry::parse(&record, pool.pop()).expect("well formed record");
    assert_eq!(entry.fragment(), &data[..frag_len]);
});
