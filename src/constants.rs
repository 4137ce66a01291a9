//! `Pigeonpost` Constants
//!
//! This module contains all the constants used throughout the `Pigeonpost`
//! library. These constants define the OBEX protocol parameters, buffer
//! capacities, and default values used in the implementation.

/// OBEX protocol version 1.0 (major in the high nibble, minor in the low)
pub const OBEX_VERSION: u8 = 0x10;

/// CONNECT request flags (all reserved, must be zero)
pub const CONNECT_FLAGS: u8 = 0x00;

/// SETPATH constants byte (reserved, must be zero)
pub const SETPATH_CONSTANTS: u8 = 0x00;

/// SETPATH flag: back up one directory level before applying the name
pub const SETPATH_FLAG_BACKUP: u8 = 0x01;

/// SETPATH flag: do not create the directory if it does not exist
pub const SETPATH_FLAG_NO_CREATE: u8 = 0x02;

/// Final bit, OR-ed into the opcode of the last packet of a request
pub const FINAL_BIT: u8 = 0x80;

/// Length of the opcode + packet-length prefix of every packet
pub const PACKET_PREFIX_LENGTH: usize = 3;

/// Offset of the first header in a CONNECT request or response
/// (prefix + version + flags + maximum packet length)
pub const CONNECT_HEADER_OFFSET: usize = 7;

/// Offset of the first header in a SETPATH request
/// (prefix + flags + constants)
pub const SETPATH_HEADER_OFFSET: usize = 5;

/// Smallest packet size a conforming peer may advertise
pub const MIN_PACKET_LENGTH: usize = 255;

/// Largest packet this implementation sends or accepts; both packet
/// buffers are allocated at this size
pub const MAX_PACKET_LENGTH: usize = 4096;

/// Maximum number of headers a `HeaderSet` can hold
pub const MAX_HEADERS: usize = 16;

/// Maximum length in bytes of a text header value (NAME, TYPE, ...)
pub const MAX_TEXT_LENGTH: usize = 255;

/// Maximum length in bytes of a byte-sequence header value (TARGET, WHO, ...)
pub const MAX_BYTES_LENGTH: usize = 255;

/// Maximum encoded length of an authentication challenge or response value
pub const MAX_AUTH_LENGTH: usize = 64;

/// Maximum user-id length in a digest response, fixed by the protocol
pub const MAX_USER_ID_LENGTH: usize = 20;

/// Maximum password length accepted for digest responses
pub const MAX_PASSWORD_LENGTH: usize = 32;

/// Maximum realm length retained from a digest challenge
pub const MAX_REALM_LENGTH: usize = 32;

/// Length of a digest nonce and of the computed request-digest
pub const DIGEST_LENGTH: usize = 16;
