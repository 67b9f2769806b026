use std::io;

use crate::clock::Timeval;
use crate::types::ContentType;

/// The datagram side of a connection, as seen by the reliability layer.
///
/// Implementations wrap the record layer and socket. `send` is expected not to
/// block; a failure is handed back to the caller and not retried here.
pub trait Transport {
    /// Send one record payload in the given epoch.
    fn send(&mut self, content_type: ContentType, epoch: u16, payload: &[u8]) -> io::Result<()>;

    /// A smaller MTU to fall back to after repeated timeouts.
    fn query_fallback_mtu(&mut self) -> usize;

    /// Tell the datagram source when the poll loop must wake up.
    ///
    /// `None` disarms.
    fn arm(&mut self, deadline: Option<Timeval>);

    /// The path MTU, if the transport knows it.
    fn path_mtu(&self) -> Option<usize> {
        None
    }
}
