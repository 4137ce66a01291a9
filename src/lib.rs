#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(dead_code, clippy::too_many_lines)]

mod auth;
pub mod client;
pub mod constants;
pub mod header;
mod header_set;
pub mod packet;
pub mod transport;

use crate::constants::{MAX_PACKET_LENGTH, MAX_PASSWORD_LENGTH, MAX_USER_ID_LENGTH};
use core::fmt;
use heapless::Vec;

pub use client::{
    ClientOperation, ClientSession, GetInputStream, OperationKind, PutOutputStream,
};
pub use header::{Header, HeaderIdentifier};
pub use header_set::{HeaderOwner, HeaderSet};
pub use packet::{OpCode, PacketError, ResponseCode};
pub use transport::{ObexTransport, TransportError};

/// Errors surfaced by sessions, operations, and streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ObexError {
    /// CONNECT on a session that is already connected
    AlreadyConnected,
    /// The request needs a completed CONNECT first
    NotConnected,
    /// Another operation is still in flight on this session
    OperationInProgress,
    /// The operation behind this handle is gone
    OperationClosed,
    /// The operation was aborted
    OperationAborted,
    /// The operation already reached its terminal response
    OperationEnded,
    /// A second stream of the same direction on one operation
    StreamAlreadyOpen,
    /// The stream handle was closed
    StreamClosed,
    /// The operation has no live stream in that direction
    StreamUnavailable,
    /// A header set not built by the caller cannot seed a request
    InvalidHeaders,
    /// A TARGET header cannot ride on a connection with an assigned id
    HeaderConflict,
    /// The server rejected the request with this terminal response code
    Rejected(ResponseCode),
    /// Packet framing failed mid-exchange; only close is possible
    LinkBroken,
    /// The transport failed
    Transport(TransportError),
    /// Encoding or decoding a packet failed
    Packet(PacketError),
}

impl fmt::Display for ObexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConnected => write!(f, "Session is already connected"),
            Self::NotConnected => write!(f, "Session is not connected"),
            Self::OperationInProgress => write!(f, "Another operation is in progress"),
            Self::OperationClosed => write!(f, "Operation has been closed"),
            Self::OperationAborted => write!(f, "Operation has been aborted"),
            Self::OperationEnded => write!(f, "Operation has already ended"),
            Self::StreamAlreadyOpen => write!(f, "Stream is already open"),
            Self::StreamClosed => write!(f, "Stream has been closed"),
            Self::StreamUnavailable => write!(f, "No such stream on this operation"),
            Self::InvalidHeaders => write!(f, "Header set is not usable for a request"),
            Self::HeaderConflict => {
                write!(f, "TARGET header conflicts with the assigned connection id")
            }
            Self::Rejected(code) => {
                write!(
                    f,
                    "Request rejected with response code 0x{:02X}",
                    code.value()
                )
            }
            Self::LinkBroken => write!(f, "Link is broken"),
            Self::Transport(e) => write!(f, "Transport error: {e}"),
            Self::Packet(e) => write!(f, "Packet error: {e}"),
        }
    }
}

impl From<TransportError> for ObexError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<PacketError> for ObexError {
    fn from(e: PacketError) -> Self {
        Self::Packet(e)
    }
}

/// Digest authentication credentials of this client.
///
/// The password proves possession when a server challenges a request; the
/// user id rides along in the response when one is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub(crate) user_id: Vec<u8, MAX_USER_ID_LENGTH>,
    pub(crate) password: Vec<u8, MAX_PASSWORD_LENGTH>,
}

impl Credentials {
    /// Build credentials from raw bytes. The user id may be empty.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::ValueTooLarge`] if either value exceeds its
    /// fixed capacity.
    pub fn new(user_id: &[u8], password: &[u8]) -> Result<Self, PacketError> {
        let mut id = Vec::new();
        id.extend_from_slice(user_id)
            .map_err(|()| PacketError::ValueTooLarge)?;
        let mut pw = Vec::new();
        pw.extend_from_slice(password)
            .map_err(|()| PacketError::ValueTooLarge)?;
        Ok(Self {
            user_id: id,
            password: pw,
        })
    }
}

/// Options for configuring a [`ClientSession`]
///
/// # Examples
///
/// ```rust
/// use pigeonpost::{Credentials, SessionConfig};
///
/// // Use default options
/// let config = SessionConfig::default();
///
/// // Small receive buffer and digest credentials
/// let authenticated = SessionConfig {
///     receive_mtu: 1024,
///     credentials: Some(Credentials::new(b"client", b"secret").unwrap()),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Largest packet the session advertises it can receive, in bytes
    ///
    /// Clamped to the protocol minimum of 255 and the engine's buffer of
    /// [`constants::MAX_PACKET_LENGTH`] bytes.
    pub receive_mtu: u16,
    /// Digest credentials answering server challenges, when configured
    pub credentials: Option<Credentials>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            receive_mtu: MAX_PACKET_LENGTH as u16,
            credentials: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_capacity() {
        assert!(Credentials::new(b"", b"pw").is_ok());
        assert!(Credentials::new(&[0x61; 20], &[0x62; 32]).is_ok());
        assert_eq!(
            Credentials::new(&[0x61; 21], b"pw"),
            Err(PacketError::ValueTooLarge)
        );
        assert_eq!(
            Credentials::new(b"u", &[0x62; 33]),
            Err(PacketError::ValueTooLarge)
        );
    }

    #[test]
    fn test_error_conversions() {
        let e: ObexError = TransportError::Disconnected.into();
        assert_eq!(e, ObexError::Transport(TransportError::Disconnected));
        let e: ObexError = PacketError::BufferTooSmall.into();
        assert_eq!(e, ObexError::Packet(PacketError::BufferTooSmall));
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.receive_mtu as usize, MAX_PACKET_LENGTH);
        assert!(config.credentials.is_none());
    }
}
