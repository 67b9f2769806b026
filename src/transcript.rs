use crate::buffer::Buf;

/// Running handshake transcript, as used for the Finished MAC.
///
/// The surrounding handshake layer owns the hash; this crate only feeds it
/// serialized headers and bodies.
pub trait FinishedHash {
    fn update(&mut self, data: &[u8]);
}

/// Keep the raw transcript bytes and hash them later.
impl FinishedHash for Buf {
    fn update(&mut self, data: &[u8]) {
        self.extend_from_slice(data);
    }
}

impl FinishedHash for sha2::Sha256 {
    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(self, data);
    }
}
