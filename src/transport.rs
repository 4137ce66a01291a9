//! OBEX Transport Abstraction
//!
//! OBEX runs over any reliable byte stream: RFCOMM, L2CAP, TCP, or a cable.
//! This module defines the seam between the protocol engine and whatever
//! carries its bytes. The engine owns packet framing; a transport only moves
//! raw bytes and reports link failures.
//!
//! ## Contract
//!
//! - `write_all` delivers the whole buffer or fails. The engine writes one
//!   complete OBEX packet per call.
//! - `read` fills at most `buf.len()` bytes and returns how many were read.
//!   `Ok(0)` means the peer closed the link. The engine never requests more
//!   bytes than the packet it is currently reassembling.
//! - `close` releases the underlying link. Further calls on the session fail.

use core::fmt;

/// Errors reported by a transport implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The link is closed, either by the peer or by a prior `close`
    Disconnected,
    /// The transport gave up waiting for the peer
    TimedOut,
    /// Any other transport-level failure
    Failed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "transport disconnected"),
            Self::TimedOut => write!(f, "transport timed out"),
            Self::Failed => write!(f, "transport failure"),
        }
    }
}

/// Reliable byte-stream transport carrying OBEX packets.
///
/// Implementations wrap an RFCOMM channel, an L2CAP channel, a TCP socket, or
/// any other ordered, lossless stream. The engine performs strictly
/// alternating request/response exchanges, so a transport never sees
/// concurrent reads and writes.
#[allow(async_fn_in_trait)]
pub trait ObexTransport {
    /// Write the entire buffer to the link.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the buffer cannot be delivered.
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    /// Read up to `buf.len()` bytes from the link.
    ///
    /// Returns the number of bytes read; `Ok(0)` indicates the peer closed
    /// the link.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the link failed before any byte was
    /// read.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Close the underlying link.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the link did not shut down cleanly.
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory transport for exercising the engine without a peer.

    use super::{ObexTransport, TransportError};
    use crate::constants::MAX_PACKET_LENGTH;
    use heapless::Vec;

    /// Maximum packets a script can record or replay
    pub const MAX_SCRIPT_PACKETS: usize = 16;

    /// Transport double that records every outgoing packet and replays a
    /// scripted sequence of incoming ones.
    ///
    /// Each `write_all` call is recorded as one packet, matching the engine's
    /// one-call-per-packet behavior. Reads serve the scripted replies in
    /// order, optionally a few bytes at a time to exercise reassembly, and
    /// report `Ok(0)` once the script is exhausted.
    pub struct ScriptedTransport {
        sent: Vec<Vec<u8, MAX_PACKET_LENGTH>, MAX_SCRIPT_PACKETS>,
        replies: Vec<Vec<u8, MAX_PACKET_LENGTH>, MAX_SCRIPT_PACKETS>,
        reply_at: usize,
        reply_pos: usize,
        read_chunk: Option<usize>,
        fail_writes: bool,
        pub(crate) closed: bool,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self {
                sent: Vec::new(),
                replies: Vec::new(),
                reply_at: 0,
                reply_pos: 0,
                read_chunk: None,
                fail_writes: false,
                closed: false,
            }
        }

        /// Queue one incoming packet to be served by later reads.
        pub fn push_reply(&mut self, packet: &[u8]) {
            let mut copy = Vec::new();
            copy.extend_from_slice(packet).unwrap();
            self.replies.push(copy).unwrap();
        }

        /// Serve at most `n` bytes per read call.
        pub fn limit_read_chunk(&mut self, n: usize) {
            self.read_chunk = Some(n);
        }

        /// Make every later write fail with `TransportError::Failed`.
        pub fn fail_writes(&mut self) {
            self.fail_writes = true;
        }

        pub fn sent_count(&self) -> usize {
            self.sent.len()
        }

        pub fn sent(&self, i: usize) -> &[u8] {
            &self.sent[i]
        }

        /// Replies not yet consumed by the engine.
        pub fn replies_remaining(&self) -> usize {
            self.replies.len() - self.reply_at
        }
    }

    impl ObexTransport for ScriptedTransport {
        async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::Disconnected);
            }
            if self.fail_writes {
                return Err(TransportError::Failed);
            }
            let mut copy = Vec::new();
            copy.extend_from_slice(buf).unwrap();
            self.sent.push(copy).unwrap();
            Ok(())
        }

        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            if self.closed {
                return Err(TransportError::Disconnected);
            }
            if self.reply_at >= self.replies.len() {
                return Ok(0);
            }
            let reply = &self.replies[self.reply_at];
            let remaining = reply.len() - self.reply_pos;
            let mut n = buf.len().min(remaining);
            if let Some(chunk) = self.read_chunk {
                n = n.min(chunk);
            }
            buf[..n].copy_from_slice(&reply[self.reply_pos..self.reply_pos + n]);
            self.reply_pos += n;
            if self.reply_pos == reply.len() {
                self.reply_at += 1;
                self.reply_pos = 0;
            }
            Ok(n)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closed = true;
            Ok(())
        }
    }
}
