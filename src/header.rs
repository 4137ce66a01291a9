//! OBEX Header Codec
//!
//! Every OBEX packet after the opcode/length prefix is a run of headers.
//! A header starts with a one-byte identifier whose upper two bits select
//! the wire encoding of its value:
//!
//! - `0b00` - Unicode text: 2-byte length (covering identifier + length +
//!   value), UTF-16BE code units, null terminated. An empty value omits the
//!   terminator and encodes as length 3.
//! - `0b01` - byte sequence: 2-byte length, raw bytes.
//! - `0b10` - single byte value.
//! - `0b11` - 4-byte big-endian value.
//!
//! [`Header`] pairs each known identifier with a typed value and owns the
//! per-header encode/decode. BODY and END-OF-BODY are deliberately absent
//! from [`Header`]: object bytes are framed and consumed in place by the
//! packet layer and never stored in a header collection.
//!
//! Unknown identifiers are skipped over on decode; their length is always
//! recoverable from the encoding class, so a packet with headers this
//! implementation does not model still parses.

use crate::constants::{MAX_AUTH_LENGTH, MAX_BYTES_LENGTH, MAX_TEXT_LENGTH};
use crate::packet::PacketError;
use heapless::{String, Vec};

/// Wire encoding class of a header, selected by identifier bits 7..6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaderEncoding {
    /// Length-prefixed, null-terminated UTF-16BE text
    Text,
    /// Length-prefixed byte sequence
    Bytes,
    /// Single byte
    Byte,
    /// 4-byte big-endian value
    Int,
}

impl HeaderEncoding {
    /// Encoding class of a raw identifier byte.
    #[must_use]
    pub const fn of(identifier: u8) -> Self {
        match identifier >> 6 {
            0b00 => Self::Text,
            0b01 => Self::Bytes,
            0b10 => Self::Byte,
            _ => Self::Int,
        }
    }
}

/// Identifier of an OBEX header.
///
/// The values are fixed by the protocol; the encoding class is part of the
/// value (upper two bits). `User` covers the application-defined space:
/// identifiers whose lower six bits fall in `0x30..=0x3F`, in any encoding
/// class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaderIdentifier {
    /// Number of objects in this operation
    Count,
    /// Object name, UTF-16
    Name,
    /// Object type as a null-terminated ASCII string (MIME style)
    Type,
    /// Object length in bytes
    Length,
    /// Timestamp as an ISO 8601 byte string
    TimeIso8601,
    /// Timestamp as seconds since the epoch
    Time4Byte,
    /// Object description, UTF-16
    Description,
    /// Service selector of a directed connection
    Target,
    /// HTTP 1.x header line
    Http,
    /// Object bytes (framed by the packet layer, never stored)
    Body,
    /// Final chunk of object bytes
    EndOfBody,
    /// Identity of the responding service
    Who,
    /// Multiplexing identifier of a directed connection
    ConnectionId,
    /// Application-defined tag/length/value parameters
    ApplicationParameters,
    /// Authentication challenge
    AuthenticationChallenge,
    /// Authentication response
    AuthenticationResponse,
    /// Creator of the object
    CreatorId,
    /// OBEX object class of the object
    ObjectClass,
    /// Application-defined identifier (lower six bits in `0x30..=0x3F`)
    User(u8),
}

impl HeaderIdentifier {
    /// Raw identifier byte.
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::Count => 0xC0,
            Self::Name => 0x01,
            Self::Type => 0x42,
            Self::Length => 0xC3,
            Self::TimeIso8601 => 0x44,
            Self::Time4Byte => 0xC4,
            Self::Description => 0x05,
            Self::Target => 0x46,
            Self::Http => 0x47,
            Self::Body => 0x48,
            Self::EndOfBody => 0x49,
            Self::Who => 0x4A,
            Self::ConnectionId => 0xCB,
            Self::ApplicationParameters => 0x4C,
            Self::AuthenticationChallenge => 0x4D,
            Self::AuthenticationResponse => 0x4E,
            Self::CreatorId => 0xCF,
            Self::ObjectClass => 0x51,
            Self::User(id) => id,
        }
    }

    /// Convert from a raw identifier byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xC0 => Some(Self::Count),
            0x01 => Some(Self::Name),
            0x42 => Some(Self::Type),
            0xC3 => Some(Self::Length),
            0x44 => Some(Self::TimeIso8601),
            0xC4 => Some(Self::Time4Byte),
            0x05 => Some(Self::Description),
            0x46 => Some(Self::Target),
            0x47 => Some(Self::Http),
            0x48 => Some(Self::Body),
            0x49 => Some(Self::EndOfBody),
            0x4A => Some(Self::Who),
            0xCB => Some(Self::ConnectionId),
            0x4C => Some(Self::ApplicationParameters),
            0x4D => Some(Self::AuthenticationChallenge),
            0x4E => Some(Self::AuthenticationResponse),
            0xCF => Some(Self::CreatorId),
            0x51 => Some(Self::ObjectClass),
            id if is_user_identifier(id) => Some(Self::User(id)),
            _ => None,
        }
    }

    /// Encoding class of this identifier.
    #[must_use]
    pub const fn encoding(self) -> HeaderEncoding {
        HeaderEncoding::of(self.value())
    }
}

/// Whether a raw identifier lies in the application-defined space.
#[must_use]
pub const fn is_user_identifier(id: u8) -> bool {
    let low = id & 0x3F;
    low >= 0x30 && low <= 0x3F
}

/// Value of an application-defined header, one variant per encoding class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValue {
    /// UTF-16 text value (identifier class `0b00`)
    Text(String<MAX_TEXT_LENGTH>),
    /// Byte-sequence value (identifier class `0b01`)
    Bytes(Vec<u8, MAX_BYTES_LENGTH>),
    /// Single byte value (identifier class `0b10`)
    Byte(u8),
    /// 4-byte value (identifier class `0b11`)
    Int(u32),
}

impl UserValue {
    const fn encoding(&self) -> HeaderEncoding {
        match self {
            Self::Text(_) => HeaderEncoding::Text,
            Self::Bytes(_) => HeaderEncoding::Bytes,
            Self::Byte(_) => HeaderEncoding::Byte,
            Self::Int(_) => HeaderEncoding::Int,
        }
    }
}

/// A typed OBEX header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    /// Number of objects in this operation
    Count(u32),
    /// Object name
    Name(String<MAX_TEXT_LENGTH>),
    /// Object type, e.g. `text/x-vcard`
    Type(String<MAX_TEXT_LENGTH>),
    /// Object length in bytes
    Length(u32),
    /// Timestamp, ISO 8601 text such as `20260301T120000Z`
    TimeIso8601(String<MAX_TEXT_LENGTH>),
    /// Timestamp, seconds since the epoch
    Time4Byte(u32),
    /// Object description
    Description(String<MAX_TEXT_LENGTH>),
    /// Service selector of a directed connection
    Target(Vec<u8, MAX_BYTES_LENGTH>),
    /// HTTP 1.x header line
    Http(Vec<u8, MAX_BYTES_LENGTH>),
    /// Identity of the responding service
    Who(Vec<u8, MAX_BYTES_LENGTH>),
    /// Multiplexing identifier assigned by the server
    ConnectionId(u32),
    /// Application-defined tag/length/value parameters
    ApplicationParameters(Vec<u8, MAX_BYTES_LENGTH>),
    /// Authentication challenge, raw tag/length/value bytes
    AuthenticationChallenge(Vec<u8, MAX_AUTH_LENGTH>),
    /// Authentication response, raw tag/length/value bytes
    AuthenticationResponse(Vec<u8, MAX_AUTH_LENGTH>),
    /// Creator of the object
    CreatorId(u32),
    /// OBEX object class
    ObjectClass(Vec<u8, MAX_BYTES_LENGTH>),
    /// Application-defined header
    User {
        /// Raw identifier, lower six bits in `0x30..=0x3F`
        id: u8,
        /// Value matching the identifier's encoding class
        value: UserValue,
    },
}

fn text_value(s: &str) -> Result<String<MAX_TEXT_LENGTH>, PacketError> {
    let mut value = String::new();
    value.push_str(s).map_err(|()| PacketError::ValueTooLarge)?;
    Ok(value)
}

fn bytes_value<const N: usize>(b: &[u8]) -> Result<Vec<u8, N>, PacketError> {
    let mut value = Vec::new();
    value
        .extend_from_slice(b)
        .map_err(|()| PacketError::ValueTooLarge)?;
    Ok(value)
}

impl Header {
    /// Build a NAME header.
    ///
    /// An empty name is legal; SETPATH uses it to address the root folder.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::ValueTooLarge`] if the name exceeds
    /// [`MAX_TEXT_LENGTH`] bytes.
    pub fn name(name: &str) -> Result<Self, PacketError> {
        Ok(Self::Name(text_value(name)?))
    }

    /// Build a TYPE header.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::ValueTooLarge`] if the type exceeds
    /// [`MAX_TEXT_LENGTH`] bytes.
    pub fn object_type(mime: &str) -> Result<Self, PacketError> {
        Ok(Self::Type(text_value(mime)?))
    }

    /// Build a DESCRIPTION header.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::ValueTooLarge`] if the text exceeds
    /// [`MAX_TEXT_LENGTH`] bytes.
    pub fn description(text: &str) -> Result<Self, PacketError> {
        Ok(Self::Description(text_value(text)?))
    }

    /// Build an ISO 8601 TIME header.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::ValueTooLarge`] if the text exceeds
    /// [`MAX_TEXT_LENGTH`] bytes.
    pub fn time_iso8601(time: &str) -> Result<Self, PacketError> {
        Ok(Self::TimeIso8601(text_value(time)?))
    }

    /// Build a TARGET header.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::ValueTooLarge`] if the value exceeds
    /// [`MAX_BYTES_LENGTH`] bytes.
    pub fn target(value: &[u8]) -> Result<Self, PacketError> {
        Ok(Self::Target(bytes_value(value)?))
    }

    /// Build an HTTP header.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::ValueTooLarge`] if the value exceeds
    /// [`MAX_BYTES_LENGTH`] bytes.
    pub fn http(value: &[u8]) -> Result<Self, PacketError> {
        Ok(Self::Http(bytes_value(value)?))
    }

    /// Build a WHO header.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::ValueTooLarge`] if the value exceeds
    /// [`MAX_BYTES_LENGTH`] bytes.
    pub fn who(value: &[u8]) -> Result<Self, PacketError> {
        Ok(Self::Who(bytes_value(value)?))
    }

    /// Build an APPLICATION-PARAMETERS header.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::ValueTooLarge`] if the value exceeds
    /// [`MAX_BYTES_LENGTH`] bytes.
    pub fn application_parameters(value: &[u8]) -> Result<Self, PacketError> {
        Ok(Self::ApplicationParameters(bytes_value(value)?))
    }

    /// Build an OBJECT-CLASS header.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::ValueTooLarge`] if the value exceeds
    /// [`MAX_BYTES_LENGTH`] bytes.
    pub fn object_class(value: &[u8]) -> Result<Self, PacketError> {
        Ok(Self::ObjectClass(bytes_value(value)?))
    }

    /// Build an application-defined header.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Identifier`] if `id` is outside the
    /// application-defined space or its encoding class does not match the
    /// value.
    pub fn user(id: u8, value: UserValue) -> Result<Self, PacketError> {
        if !is_user_identifier(id) || HeaderEncoding::of(id) != value.encoding() {
            return Err(PacketError::Identifier(id));
        }
        Ok(Self::User { id, value })
    }

    /// Identifier of this header.
    #[must_use]
    pub const fn identifier(&self) -> HeaderIdentifier {
        match self {
            Self::Count(_) => HeaderIdentifier::Count,
            Self::Name(_) => HeaderIdentifier::Name,
            Self::Type(_) => HeaderIdentifier::Type,
            Self::Length(_) => HeaderIdentifier::Length,
            Self::TimeIso8601(_) => HeaderIdentifier::TimeIso8601,
            Self::Time4Byte(_) => HeaderIdentifier::Time4Byte,
            Self::Description(_) => HeaderIdentifier::Description,
            Self::Target(_) => HeaderIdentifier::Target,
            Self::Http(_) => HeaderIdentifier::Http,
            Self::Who(_) => HeaderIdentifier::Who,
            Self::ConnectionId(_) => HeaderIdentifier::ConnectionId,
            Self::ApplicationParameters(_) => HeaderIdentifier::ApplicationParameters,
            Self::AuthenticationChallenge(_) => HeaderIdentifier::AuthenticationChallenge,
            Self::AuthenticationResponse(_) => HeaderIdentifier::AuthenticationResponse,
            Self::CreatorId(_) => HeaderIdentifier::CreatorId,
            Self::ObjectClass(_) => HeaderIdentifier::ObjectClass,
            Self::User { id, .. } => HeaderIdentifier::User(*id),
        }
    }

    /// Encoded length of this header in bytes, including the identifier and
    /// any length prefix.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Count(_)
            | Self::Length(_)
            | Self::Time4Byte(_)
            | Self::ConnectionId(_)
            | Self::CreatorId(_)
            | Self::User {
                value: UserValue::Int(_),
                ..
            } => 5,
            Self::User {
                value: UserValue::Byte(_),
                ..
            } => 2,
            Self::Name(s)
            | Self::Description(s)
            | Self::User {
                value: UserValue::Text(s),
                ..
            } => text_encoded_len(s),
            Self::Type(s) => 3 + s.len() + 1,
            Self::TimeIso8601(s) => 3 + s.len(),
            Self::Target(b)
            | Self::Http(b)
            | Self::Who(b)
            | Self::ApplicationParameters(b)
            | Self::ObjectClass(b) => 3 + b.len(),
            Self::AuthenticationChallenge(b) | Self::AuthenticationResponse(b) => 3 + b.len(),
            Self::User {
                value: UserValue::Bytes(b),
                ..
            } => 3 + b.len(),
        }
    }

    /// Append the encoded header to `buf`.
    ///
    /// The append is all-or-nothing: on error `buf` is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::BufferTooSmall`] if the header does not fit
    /// the remaining capacity.
    pub fn encode_into<const N: usize>(&self, buf: &mut Vec<u8, N>) -> Result<(), PacketError> {
        if N - buf.len() < self.encoded_len() {
            return Err(PacketError::BufferTooSmall);
        }
        let id = self.identifier().value();
        match self {
            Self::Count(v)
            | Self::Length(v)
            | Self::Time4Byte(v)
            | Self::ConnectionId(v)
            | Self::CreatorId(v)
            | Self::User {
                value: UserValue::Int(v),
                ..
            } => {
                push(buf, id);
                push_slice(buf, &v.to_be_bytes());
            }
            Self::User {
                value: UserValue::Byte(v),
                ..
            } => {
                push(buf, id);
                push(buf, *v);
            }
            Self::Name(s)
            | Self::Description(s)
            | Self::User {
                value: UserValue::Text(s),
                ..
            } => encode_text(buf, id, s),
            Self::Type(s) => {
                push(buf, id);
                push_slice(buf, &u16_to_be(3 + s.len() + 1));
                push_slice(buf, s.as_bytes());
                push(buf, 0x00);
            }
            Self::TimeIso8601(s) => {
                push(buf, id);
                push_slice(buf, &u16_to_be(3 + s.len()));
                push_slice(buf, s.as_bytes());
            }
            Self::Target(b)
            | Self::Http(b)
            | Self::Who(b)
            | Self::ApplicationParameters(b)
            | Self::ObjectClass(b)
            | Self::User {
                value: UserValue::Bytes(b),
                ..
            } => {
                push(buf, id);
                push_slice(buf, &u16_to_be(3 + b.len()));
                push_slice(buf, b);
            }
            Self::AuthenticationChallenge(b) | Self::AuthenticationResponse(b) => {
                push(buf, id);
                push_slice(buf, &u16_to_be(3 + b.len()));
                push_slice(buf, b);
            }
        }
        Ok(())
    }

    /// Decode one header starting at `at`.
    ///
    /// Returns the decoded header and the number of bytes it occupied.
    /// `None` with a byte count means the header was well-formed but is not
    /// modeled here (BODY, END-OF-BODY, or an unrecognized identifier) and
    /// was skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::MalformedHeader`] if the buffer ends inside
    /// the header or its length field is inconsistent, and
    /// [`PacketError::MalformedText`] if a text value is not valid UTF-16.
    pub fn decode_at(buf: &[u8], at: usize) -> Result<(Option<Self>, usize), PacketError> {
        let id = *buf.get(at).ok_or(PacketError::MalformedHeader)?;
        let (payload, total) = match HeaderEncoding::of(id) {
            HeaderEncoding::Text | HeaderEncoding::Bytes => {
                if at + 3 > buf.len() {
                    return Err(PacketError::MalformedHeader);
                }
                let len = u16::from_be_bytes([buf[at + 1], buf[at + 2]]) as usize;
                if len < 3 || at + len > buf.len() {
                    return Err(PacketError::MalformedHeader);
                }
                (&buf[at + 3..at + len], len)
            }
            HeaderEncoding::Byte => {
                if at + 2 > buf.len() {
                    return Err(PacketError::MalformedHeader);
                }
                (&buf[at + 1..at + 2], 2)
            }
            HeaderEncoding::Int => {
                if at + 5 > buf.len() {
                    return Err(PacketError::MalformedHeader);
                }
                (&buf[at + 1..at + 5], 5)
            }
        };
        let header = match HeaderIdentifier::from_u8(id) {
            Some(HeaderIdentifier::Count) => Some(Self::Count(be_u32(payload))),
            Some(HeaderIdentifier::Length) => Some(Self::Length(be_u32(payload))),
            Some(HeaderIdentifier::Time4Byte) => Some(Self::Time4Byte(be_u32(payload))),
            Some(HeaderIdentifier::ConnectionId) => Some(Self::ConnectionId(be_u32(payload))),
            Some(HeaderIdentifier::CreatorId) => Some(Self::CreatorId(be_u32(payload))),
            Some(HeaderIdentifier::Name) => Some(Self::Name(decode_text(payload)?)),
            Some(HeaderIdentifier::Description) => Some(Self::Description(decode_text(payload)?)),
            Some(HeaderIdentifier::Type) => Some(Self::Type(decode_terminated_ascii(payload)?)),
            Some(HeaderIdentifier::TimeIso8601) => {
                Some(Self::TimeIso8601(decode_ascii(payload)?))
            }
            Some(HeaderIdentifier::Target) => Some(Self::Target(bytes_value(payload)?)),
            Some(HeaderIdentifier::Http) => Some(Self::Http(bytes_value(payload)?)),
            Some(HeaderIdentifier::Who) => Some(Self::Who(bytes_value(payload)?)),
            Some(HeaderIdentifier::ApplicationParameters) => {
                Some(Self::ApplicationParameters(bytes_value(payload)?))
            }
            Some(HeaderIdentifier::ObjectClass) => Some(Self::ObjectClass(bytes_value(payload)?)),
            Some(HeaderIdentifier::AuthenticationChallenge) => {
                Some(Self::AuthenticationChallenge(bytes_value(payload)?))
            }
            Some(HeaderIdentifier::AuthenticationResponse) => {
                Some(Self::AuthenticationResponse(bytes_value(payload)?))
            }
            Some(HeaderIdentifier::User(user_id)) => {
                let value = match HeaderEncoding::of(user_id) {
                    HeaderEncoding::Text => UserValue::Text(decode_text(payload)?),
                    HeaderEncoding::Bytes => UserValue::Bytes(bytes_value(payload)?),
                    HeaderEncoding::Byte => UserValue::Byte(payload[0]),
                    HeaderEncoding::Int => UserValue::Int(be_u32(payload)),
                };
                Some(Self::User { id: user_id, value })
            }
            Some(HeaderIdentifier::Body | HeaderIdentifier::EndOfBody) | None => None,
        };
        Ok((header, total))
    }
}

fn push<const N: usize>(buf: &mut Vec<u8, N>, byte: u8) {
    // capacity verified by encode_into before any write
    let _ = buf.push(byte);
}

fn push_slice<const N: usize>(buf: &mut Vec<u8, N>, slice: &[u8]) {
    let _ = buf.extend_from_slice(slice);
}

fn u16_to_be(len: usize) -> [u8; 2] {
    (len as u16).to_be_bytes()
}

fn be_u32(payload: &[u8]) -> u32 {
    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
}

fn text_encoded_len(s: &str) -> usize {
    if s.is_empty() {
        3
    } else {
        3 + 2 * (s.encode_utf16().count() + 1)
    }
}

fn encode_text<const N: usize>(buf: &mut Vec<u8, N>, id: u8, s: &str) {
    push(buf, id);
    push_slice(buf, &u16_to_be(text_encoded_len(s)));
    if !s.is_empty() {
        for unit in s.encode_utf16() {
            push_slice(buf, &unit.to_be_bytes());
        }
        push_slice(buf, &[0x00, 0x00]);
    }
}

fn decode_text(payload: &[u8]) -> Result<String<MAX_TEXT_LENGTH>, PacketError> {
    if payload.len() % 2 != 0 {
        return Err(PacketError::MalformedText);
    }
    // tolerate a missing terminator on decode; always emit one
    let raw = match payload {
        [head @ .., 0x00, 0x00] => head,
        other => other,
    };
    let units = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    let mut out = String::new();
    for ch in char::decode_utf16(units) {
        let ch = ch.map_err(|_| PacketError::MalformedText)?;
        out.push(ch).map_err(|()| PacketError::ValueTooLarge)?;
    }
    Ok(out)
}

fn decode_ascii(payload: &[u8]) -> Result<String<MAX_TEXT_LENGTH>, PacketError> {
    let text = core::str::from_utf8(payload).map_err(|_| PacketError::MalformedText)?;
    text_value(text)
}

fn decode_terminated_ascii(payload: &[u8]) -> Result<String<MAX_TEXT_LENGTH>, PacketError> {
    let trimmed = match payload.last() {
        Some(0x00) => &payload[..payload.len() - 1],
        _ => payload,
    };
    decode_ascii(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_PACKET_LENGTH;

    fn encode(header: &Header) -> Vec<u8, MAX_PACKET_LENGTH> {
        let mut buf = Vec::new();
        header.encode_into(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_encoding_classes() {
        assert_eq!(HeaderEncoding::of(0x01), HeaderEncoding::Text);
        assert_eq!(HeaderEncoding::of(0x42), HeaderEncoding::Bytes);
        assert_eq!(HeaderEncoding::of(0x90), HeaderEncoding::Byte);
        assert_eq!(HeaderEncoding::of(0xC0), HeaderEncoding::Int);
    }

    #[test]
    fn test_identifier_round_trip() {
        for id in [0xC0, 0x01, 0x42, 0xC3, 0x44, 0xC4, 0x05, 0x46, 0x47, 0x4A, 0xCB, 0x4C, 0x4D,
            0x4E, 0xCF, 0x51]
        {
            let identifier = HeaderIdentifier::from_u8(id).unwrap();
            assert_eq!(identifier.value(), id);
        }
        assert_eq!(
            HeaderIdentifier::from_u8(0x30),
            Some(HeaderIdentifier::User(0x30))
        );
        assert_eq!(HeaderIdentifier::from_u8(0x15), None);
    }

    #[test]
    fn test_name_header_layout() {
        let header = Header::name("test.txt").unwrap();
        let bytes = encode(&header);
        // 3-byte prefix + 8 UTF-16 units + terminator
        assert_eq!(bytes.len(), 3 + 2 * 9);
        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..3], &[0x00, 0x15]);
        assert_eq!(&bytes[3..5], &[0x00, b't']);
        assert_eq!(&bytes[bytes.len() - 2..], &[0x00, 0x00]);

        let (decoded, used) = Header::decode_at(&bytes, 0).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(decoded, Some(header));
    }

    #[test]
    fn test_name_header_non_ascii() {
        let header = Header::name("héllo").unwrap();
        let bytes = encode(&header);
        let (decoded, _) = Header::decode_at(&bytes, 0).unwrap();
        assert_eq!(decoded, Some(header));
    }

    #[test]
    fn test_empty_name_has_no_terminator() {
        let header = Header::name("").unwrap();
        let bytes = encode(&header);
        assert_eq!(&bytes[..], &[0x01, 0x00, 0x03]);

        let (decoded, used) = Header::decode_at(&bytes, 0).unwrap();
        assert_eq!(used, 3);
        assert_eq!(decoded, Some(header));
    }

    #[test]
    fn test_text_decode_without_terminator() {
        // "ab" with no trailing null still decodes
        let bytes = [0x01, 0x00, 0x07, 0x00, b'a', 0x00, b'b'];
        let (decoded, _) = Header::decode_at(&bytes, 0).unwrap();
        assert_eq!(decoded, Some(Header::name("ab").unwrap()));
    }

    #[test]
    fn test_type_header_null_terminated() {
        let header = Header::object_type("text/plain").unwrap();
        let bytes = encode(&header);
        assert_eq!(bytes[0], 0x42);
        assert_eq!(&bytes[1..3], &[0x00, 14]);
        assert_eq!(bytes[bytes.len() - 1], 0x00);

        let (decoded, _) = Header::decode_at(&bytes, 0).unwrap();
        assert_eq!(decoded, Some(header));
    }

    #[test]
    fn test_connection_id_layout() {
        let bytes = encode(&Header::ConnectionId(1));
        assert_eq!(&bytes[..], &[0xCB, 0x00, 0x00, 0x00, 0x01]);

        let (decoded, used) = Header::decode_at(&bytes, 0).unwrap();
        assert_eq!(used, 5);
        assert_eq!(decoded, Some(Header::ConnectionId(1)));
    }

    #[test]
    fn test_int_headers() {
        let bytes = encode(&Header::Length(0x0001_3880));
        assert_eq!(&bytes[..], &[0xC3, 0x00, 0x01, 0x38, 0x80]);
        let bytes = encode(&Header::Count(2));
        assert_eq!(&bytes[..], &[0xC0, 0x00, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn test_byte_sequence_target() {
        let target = [0xF9, 0xEC, 0x7B, 0xC4, 0x95, 0x3C, 0x11, 0xD2];
        let header = Header::target(&target).unwrap();
        let bytes = encode(&header);
        assert_eq!(bytes[0], 0x46);
        assert_eq!(&bytes[1..3], &[0x00, 11]);
        assert_eq!(&bytes[3..], &target);

        let (decoded, _) = Header::decode_at(&bytes, 0).unwrap();
        assert_eq!(decoded, Some(header));
    }

    #[test]
    fn test_user_defined_headers() {
        let header = Header::user(0xF0, UserValue::Int(7)).unwrap();
        let bytes = encode(&header);
        assert_eq!(&bytes[..], &[0xF0, 0x00, 0x00, 0x00, 0x07]);
        let (decoded, _) = Header::decode_at(&bytes, 0).unwrap();
        assert_eq!(decoded, Some(header));

        let header = Header::user(0xB0, UserValue::Byte(0xAA)).unwrap();
        let bytes = encode(&header);
        assert_eq!(&bytes[..], &[0xB0, 0xAA]);
    }

    #[test]
    fn test_user_identifier_validation() {
        // outside the user space
        assert_eq!(
            Header::user(0x20, UserValue::Byte(0)),
            Err(PacketError::Identifier(0x20))
        );
        // class mismatch: 0x30 is text class
        assert_eq!(
            Header::user(0x30, UserValue::Byte(0)),
            Err(PacketError::Identifier(0x30))
        );
    }

    #[test]
    fn test_unknown_identifier_skipped() {
        // 0x15 is unassigned, text class; skipped but consumed
        let bytes = [0x15, 0x00, 0x05, 0x00, 0x41];
        let (decoded, used) = Header::decode_at(&bytes, 0).unwrap();
        assert_eq!(decoded, None);
        assert_eq!(used, 5);
    }

    #[test]
    fn test_body_not_modeled() {
        let bytes = [0x48, 0x00, 0x06, 0x01, 0x02, 0x03];
        let (decoded, used) = Header::decode_at(&bytes, 0).unwrap();
        assert_eq!(decoded, None);
        assert_eq!(used, 6);
    }

    #[test]
    fn test_malformed_headers() {
        // length field runs past the buffer
        assert_eq!(
            Header::decode_at(&[0x01, 0x00, 0x09, 0x00], 0),
            Err(PacketError::MalformedHeader)
        );
        // length below the minimum
        assert_eq!(
            Header::decode_at(&[0x46, 0x00, 0x02], 0),
            Err(PacketError::MalformedHeader)
        );
        // truncated 4-byte header
        assert_eq!(
            Header::decode_at(&[0xC3, 0x00, 0x01], 0),
            Err(PacketError::MalformedHeader)
        );
        // odd UTF-16 payload
        assert_eq!(
            Header::decode_at(&[0x01, 0x00, 0x06, 0x00, 0x41, 0x00], 0),
            Err(PacketError::MalformedText)
        );
    }

    #[test]
    fn test_encode_into_full_buffer() {
        let mut buf: Vec<u8, 4> = Vec::new();
        let err = Header::ConnectionId(1).encode_into(&mut buf).unwrap_err();
        assert_eq!(err, PacketError::BufferTooSmall);
        assert!(buf.is_empty());
    }
}
