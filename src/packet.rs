//! OBEX Packet Stream
//!
//! Every OBEX exchange is one request packet answered by one response
//! packet. A packet is a one-byte opcode or response code, a 16-bit
//! big-endian total length, and a run of headers; PUT and GET carry object
//! bytes inside BODY/END-OF-BODY headers.
//!
//! [`PacketStream`] owns the transport and two fixed packet buffers that are
//! reused for the life of the session: one outgoing packet under
//! construction and one received packet being parsed. All framing mutates
//! these buffers in place.
//!
//! ## Architecture
//!
//! The stream exposes small composable primitives rather than a
//! packet-per-call API:
//!
//! - `packet_begin` / `packet_end` / `packet_mark_final` frame a packet;
//! - `packet_add_*` append the connection id, a pending authentication
//!   response, headers (spilling what does not fit into a queue for the
//!   following packets), and body data (growing a single BODY header in
//!   place);
//! - `send_packet` / `recv_packet` move whole packets over the transport;
//! - `parse_packet_headers` and the `parse_packet_data*` family walk a
//!   received packet, filing headers into a [`HeaderSet`] and exposing body
//!   bytes without copying them out of the receive buffer.
//!
//! Authentication challenges are intercepted during parsing: the challenge
//! is stored, and the next outgoing packet picks up the computed response.
//! The operation and session layers sequence these primitives into the
//! protocol state machine.

use crate::auth::DigestChallenge;
use crate::constants::{
    FINAL_BIT, MAX_HEADERS, MAX_PACKET_LENGTH, MIN_PACKET_LENGTH, PACKET_PREFIX_LENGTH,
};
use crate::header::{Header, HeaderIdentifier};
use crate::header_set::{HeaderOwner, HeaderSet};
use crate::transport::{ObexTransport, TransportError};
use crate::{Credentials, ObexError};
use heapless::Vec;

/// OBEX packet and header codec errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketError {
    /// An encode target has no room for the value
    BufferTooSmall,
    /// A packet length field is below the protocol minimum or above the
    /// buffer capacity
    PacketLength,
    /// A single header exceeds the negotiated packet size and can never be
    /// sent
    HeaderTooLarge,
    /// A header set is at capacity
    HeaderSetFull,
    /// An identifier is outside the application-defined space or does not
    /// match its value's encoding class
    Identifier(u8),
    /// A response packet carried an unknown response code
    ResponseCode(u8),
    /// A header's length field is inconsistent with the packet
    MalformedHeader,
    /// A text header is not valid UTF-16
    MalformedText,
    /// A value exceeds its fixed capacity
    ValueTooLarge,
    /// An authentication challenge is malformed or lacks a nonce
    Challenge,
}

impl core::fmt::Display for PacketError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BufferTooSmall => write!(f, "No room left in packet buffer"),
            Self::PacketLength => write!(f, "Packet length outside protocol bounds"),
            Self::HeaderTooLarge => write!(f, "Header exceeds negotiated packet size"),
            Self::HeaderSetFull => write!(f, "Header set is full"),
            Self::Identifier(id) => write!(f, "Invalid header identifier 0x{id:02X}"),
            Self::ResponseCode(code) => write!(f, "Unknown response code 0x{code:02X}"),
            Self::MalformedHeader => write!(f, "Malformed header"),
            Self::MalformedText => write!(f, "Header text is not valid UTF-16"),
            Self::ValueTooLarge => write!(f, "Header value exceeds capacity"),
            Self::Challenge => write!(f, "Malformed authentication challenge"),
        }
    }
}

/// Request opcodes sent by a client.
///
/// The wire byte of the last packet of a request additionally carries the
/// final bit (`0x80`); `CONNECT`, `DISCONNECT`, `SETPATH` and `ABORT` are
/// single-packet requests and always go out final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OpCode {
    /// Establish an OBEX connection
    Connect = 0x80,
    /// Tear down an OBEX connection
    Disconnect = 0x81,
    /// Push an object to the server
    Put = 0x02,
    /// Pull an object from the server
    Get = 0x03,
    /// Change the working folder
    SetPath = 0x85,
    /// Abandon the operation in progress
    Abort = 0xFF,
}

impl OpCode {
    /// Raw opcode byte, without the final bit.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Opcode byte with the final bit set.
    #[must_use]
    pub const fn final_value(self) -> u8 {
        self.value() | FINAL_BIT
    }
}

/// Response codes sent by a server.
///
/// The values mirror HTTP status codes with the final bit always set;
/// `Continue` is the one non-terminal code and drives multi-packet
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ResponseCode {
    /// More packets expected for this operation
    Continue = 0x90,
    /// Success
    Ok = 0xA0,
    Created = 0xA1,
    Accepted = 0xA2,
    NonAuthoritative = 0xA3,
    NoContent = 0xA4,
    Reset = 0xA5,
    PartialContent = 0xA6,
    MultipleChoices = 0xB0,
    MovedPermanently = 0xB1,
    MovedTemporarily = 0xB2,
    SeeOther = 0xB3,
    NotModified = 0xB4,
    UseProxy = 0xB5,
    BadRequest = 0xC0,
    /// The request must carry an authentication response
    Unauthorized = 0xC1,
    PaymentRequired = 0xC2,
    Forbidden = 0xC3,
    NotFound = 0xC4,
    MethodNotAllowed = 0xC5,
    NotAcceptable = 0xC6,
    ProxyAuthenticationRequired = 0xC7,
    RequestTimeOut = 0xC8,
    Conflict = 0xC9,
    Gone = 0xCA,
    LengthRequired = 0xCB,
    PreconditionFailed = 0xCC,
    RequestedEntityTooLarge = 0xCD,
    RequestedUrlTooLarge = 0xCE,
    UnsupportedMediaType = 0xCF,
    InternalServerError = 0xD0,
    NotImplemented = 0xD1,
    BadGateway = 0xD2,
    ServiceUnavailable = 0xD3,
    GatewayTimeout = 0xD4,
    HttpVersionNotSupported = 0xD5,
    DatabaseFull = 0xE0,
    DatabaseLocked = 0xE1,
}

impl ResponseCode {
    /// Convert from a raw response byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x90 => Some(Self::Continue),
            0xA0 => Some(Self::Ok),
            0xA1 => Some(Self::Created),
            0xA2 => Some(Self::Accepted),
            0xA3 => Some(Self::NonAuthoritative),
            0xA4 => Some(Self::NoContent),
            0xA5 => Some(Self::Reset),
            0xA6 => Some(Self::PartialContent),
            0xB0 => Some(Self::MultipleChoices),
            0xB1 => Some(Self::MovedPermanently),
            0xB2 => Some(Self::MovedTemporarily),
            0xB3 => Some(Self::SeeOther),
            0xB4 => Some(Self::NotModified),
            0xB5 => Some(Self::UseProxy),
            0xC0 => Some(Self::BadRequest),
            0xC1 => Some(Self::Unauthorized),
            0xC2 => Some(Self::PaymentRequired),
            0xC3 => Some(Self::Forbidden),
            0xC4 => Some(Self::NotFound),
            0xC5 => Some(Self::MethodNotAllowed),
            0xC6 => Some(Self::NotAcceptable),
            0xC7 => Some(Self::ProxyAuthenticationRequired),
            0xC8 => Some(Self::RequestTimeOut),
            0xC9 => Some(Self::Conflict),
            0xCA => Some(Self::Gone),
            0xCB => Some(Self::LengthRequired),
            0xCC => Some(Self::PreconditionFailed),
            0xCD => Some(Self::RequestedEntityTooLarge),
            0xCE => Some(Self::RequestedUrlTooLarge),
            0xCF => Some(Self::UnsupportedMediaType),
            0xD0 => Some(Self::InternalServerError),
            0xD1 => Some(Self::NotImplemented),
            0xD2 => Some(Self::BadGateway),
            0xD3 => Some(Self::ServiceUnavailable),
            0xD4 => Some(Self::GatewayTimeout),
            0xD5 => Some(Self::HttpVersionNotSupported),
            0xE0 => Some(Self::DatabaseFull),
            0xE1 => Some(Self::DatabaseLocked),
            _ => None,
        }
    }

    /// Raw response byte.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Whether this is a terminal success code (the `0xA0..=0xA6` range).
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.value() >= 0xA0 && self.value() <= 0xA6
    }
}

/// Packet framing engine over a transport.
///
/// Owns the negotiated packet size, the connection id, the spill queue for
/// headers that did not fit their packet, authentication bookkeeping, and
/// the broken-link flag.
pub(crate) struct PacketStream<T: ObexTransport> {
    transport: T,
    /// outgoing packet under construction
    tx: Vec<u8, MAX_PACKET_LENGTH>,
    /// offset of this packet's BODY header, grown in place by `packet_add_data`
    body_at: Option<usize>,
    /// last received packet
    rx: Vec<u8, MAX_PACKET_LENGTH>,
    /// body-parse cursor into `rx`
    data_at: usize,
    /// unconsumed body bytes of the current BODY header, as a range in `rx`
    body_window: Option<(usize, usize)>,
    eof: bool,
    max_send: usize,
    connected: bool,
    connection_id: Option<u32>,
    queued: Vec<Header, MAX_HEADERS>,
    credentials: Option<Credentials>,
    challenge: Option<DigestChallenge>,
    status: Option<ResponseCode>,
    broken: bool,
}

impl<T: ObexTransport> PacketStream<T> {
    pub(crate) fn new(transport: T, credentials: Option<Credentials>) -> Self {
        Self {
            transport,
            tx: Vec::new(),
            body_at: None,
            rx: Vec::new(),
            data_at: 0,
            body_window: None,
            eof: false,
            max_send: MIN_PACKET_LENGTH,
            connected: false,
            connection_id: None,
            queued: Vec::new(),
            credentials,
            challenge: None,
            status: None,
            broken: false,
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub(crate) fn connection_id(&self) -> Option<u32> {
        self.connection_id
    }

    pub(crate) fn set_connection_id(&mut self, id: u32) {
        self.connection_id = Some(id);
    }

    pub(crate) fn max_send(&self) -> usize {
        self.max_send
    }

    /// Install the negotiated outgoing packet size, clamped to the buffer.
    pub(crate) fn set_max_send(&mut self, max: usize) {
        self.max_send = max.min(MAX_PACKET_LENGTH);
    }

    pub(crate) fn status(&self) -> Option<ResponseCode> {
        self.status
    }

    pub(crate) fn is_broken(&self) -> bool {
        self.broken
    }

    pub(crate) fn mark_broken(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::warn!("[STREAM] link marked broken");
        self.broken = true;
    }

    pub(crate) fn has_queued_headers(&self) -> bool {
        !self.queued.is_empty()
    }

    pub(crate) fn clear_queued_headers(&mut self) {
        self.queued.clear();
    }

    /// Whether a parsed challenge awaits a response we are able to give.
    pub(crate) fn should_send_auth_response(&self) -> bool {
        self.challenge.is_some() && self.credentials.is_some()
    }

    /// Forget receive-side body state; used when a new operation starts and
    /// when one restarts after authentication.
    pub(crate) fn reset_receive_state(&mut self) {
        self.data_at = 0;
        self.body_window = None;
        self.eof = false;
    }

    /// Close the transport.
    pub(crate) async fn close_transport(&mut self) -> Result<(), ObexError> {
        self.transport.close().await?;
        Ok(())
    }

    fn tx_room(&self) -> usize {
        self.max_send.saturating_sub(self.tx.len())
    }

    /// Start an outgoing packet with the given first byte; the length field
    /// is patched by `packet_end`.
    pub(crate) fn packet_begin(&mut self, first_byte: u8) {
        self.tx.clear();
        let _ = self.tx.extend_from_slice(&[first_byte, 0x00, 0x00]);
        self.body_at = None;
    }

    /// Append raw prefix bytes, e.g. the CONNECT version block or the
    /// SETPATH flags.
    pub(crate) fn packet_extend(&mut self, bytes: &[u8]) {
        let _ = self.tx.extend_from_slice(bytes);
    }

    /// Inject the connection-id header if a connection id is assigned.
    pub(crate) fn packet_add_connection_id(&mut self) {
        if let Some(id) = self.connection_id {
            // always fits: injected right after packet_begin
            let _ = Header::ConnectionId(id).encode_into(&mut self.tx);
        }
    }

    /// Append the response to a pending challenge, consuming it. A response
    /// that does not fit this packet stays pending for the next one.
    pub(crate) fn packet_add_auth_response(&mut self) {
        let (Some(challenge), Some(credentials)) = (&self.challenge, &self.credentials) else {
            return;
        };
        let header = Header::AuthenticationResponse(challenge.response(credentials));
        if header.encoded_len() <= self.tx_room() {
            let _ = header.encode_into(&mut self.tx);
            self.challenge = None;
            #[cfg(feature = "defmt")]
            defmt::debug!("[STREAM] authentication response attached");
        }
    }

    fn fits_or_queue(&mut self, header: &Header, spilled: bool) -> Result<bool, PacketError> {
        let len = header.encoded_len();
        if len > self.max_send - PACKET_PREFIX_LENGTH {
            return Err(PacketError::HeaderTooLarge);
        }
        if !spilled && len <= self.tx_room() {
            let _ = header.encode_into(&mut self.tx);
            Ok(false)
        } else {
            self.queued
                .push(header.clone())
                .map_err(|_| PacketError::HeaderSetFull)?;
            Ok(true)
        }
    }

    /// Append headers in order, spilling whatever does not fit into the
    /// queue for the following packets. Once one header spills, the rest
    /// follow it to keep wire order.
    ///
    /// Returns `true` when everything fit.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::HeaderTooLarge`] for a header that can never
    /// fit a packet, [`PacketError::HeaderSetFull`] if the spill queue
    /// overflows.
    pub(crate) fn packet_add_headers(&mut self, headers: &HeaderSet) -> Result<bool, PacketError> {
        let mut spilled = false;
        for header in headers {
            spilled = self.fits_or_queue(header, spilled)?;
        }
        #[cfg(feature = "defmt")]
        if spilled {
            defmt::debug!(
                "[STREAM] {} header(s) queued for following packets",
                self.queued.len()
            );
        }
        Ok(!spilled)
    }

    /// Move queued headers into the current packet, in order, until one
    /// does not fit. Returns `true` when the queue drained.
    pub(crate) fn packet_add_queued(&mut self) -> bool {
        while let Some(header) = self.queued.first() {
            if header.encoded_len() > self.tx_room() {
                return false;
            }
            let header = self.queued.remove(0);
            let _ = header.encode_into(&mut self.tx);
        }
        true
    }

    /// Consume as much of `data` as fits the current packet into a BODY
    /// header, growing the header in place across calls. Returns the number
    /// of bytes consumed, which is zero when the packet is full.
    pub(crate) fn packet_add_data(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        if self.body_at.is_none() {
            // identifier + length + at least one byte
            if self.tx_room() < 4 {
                return 0;
            }
            self.body_at = Some(self.tx.len());
            let _ = self
                .tx
                .extend_from_slice(&[HeaderIdentifier::Body.value(), 0x00, 0x03]);
        }
        let n = data.len().min(self.tx_room());
        if n > 0 {
            let _ = self.tx.extend_from_slice(&data[..n]);
            let at = self.body_at.unwrap_or(0);
            let header_len = (self.tx.len() - at) as u16;
            self.tx[at + 1..at + 3].copy_from_slice(&header_len.to_be_bytes());
        }
        n
    }

    /// Try to append an empty END-OF-BODY header; `false` when it does not
    /// fit and the packet must be exchanged first.
    pub(crate) fn packet_eof_body(&mut self) -> bool {
        if self.tx_room() < 3 {
            return false;
        }
        let _ = self
            .tx
            .extend_from_slice(&[HeaderIdentifier::EndOfBody.value(), 0x00, 0x03]);
        true
    }

    /// Set the final bit on the packet under construction.
    pub(crate) fn packet_mark_final(&mut self) {
        self.tx[0] |= FINAL_BIT;
    }

    /// Patch the packet length field; the packet is ready to send.
    pub(crate) fn packet_end(&mut self) {
        let len = (self.tx.len() as u16).to_be_bytes();
        self.tx[1..3].copy_from_slice(&len);
    }

    /// Write the finished packet to the transport.
    pub(crate) async fn send_packet(&mut self) -> Result<(), ObexError> {
        if self.broken {
            return Err(ObexError::LinkBroken);
        }
        #[cfg(feature = "defmt")]
        defmt::trace!(
            "[STREAM] send opcode=0x{:02X} len={}",
            self.tx[0],
            self.tx.len()
        );
        self.transport.write_all(&self.tx).await?;
        Ok(())
    }

    /// Read one whole packet into the receive buffer and return its
    /// response code.
    pub(crate) async fn recv_packet(&mut self) -> Result<ResponseCode, ObexError> {
        if self.broken {
            return Err(ObexError::LinkBroken);
        }
        let mut prefix = [0u8; PACKET_PREFIX_LENGTH];
        self.read_exact(&mut prefix).await?;
        let total = u16::from_be_bytes([prefix[1], prefix[2]]) as usize;
        if total < PACKET_PREFIX_LENGTH || total > MAX_PACKET_LENGTH {
            self.mark_broken();
            return Err(ObexError::Packet(PacketError::PacketLength));
        }
        self.rx.clear();
        let _ = self.rx.extend_from_slice(&prefix);
        let _ = self.rx.resize(total, 0);
        if total > PACKET_PREFIX_LENGTH {
            // take the buffer out to read into it while borrowing the transport
            let mut buf = core::mem::take(&mut self.rx);
            let result = self.read_exact(&mut buf[PACKET_PREFIX_LENGTH..]).await;
            self.rx = buf;
            result?;
        }
        let Some(code) = ResponseCode::from_u8(self.rx[0]) else {
            self.mark_broken();
            return Err(ObexError::Packet(PacketError::ResponseCode(self.rx[0])));
        };
        self.status = Some(code);
        #[cfg(feature = "defmt")]
        defmt::trace!("[STREAM] recv code=0x{:02X} len={}", code.value(), total);
        Ok(code)
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ObexError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.transport.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(ObexError::Transport(TransportError::Disconnected));
            }
            filled += n;
        }
        Ok(())
    }

    /// Parse all headers of the received packet starting at `from`, filing
    /// them into `into`. Challenges are intercepted and stored for
    /// [`Self::packet_add_auth_response`]; body headers are skipped.
    pub(crate) fn parse_packet_headers(
        &mut self,
        into: &mut HeaderSet,
        from: usize,
    ) -> Result<(), ObexError> {
        let mut at = from;
        while at < self.rx.len() {
            let (header, used) = Header::decode_at(&self.rx, at)?;
            at += used;
            match header {
                Some(Header::AuthenticationChallenge(value)) => self.note_challenge(&value)?,
                Some(header) => into.add(header)?,
                None => {
                    #[cfg(feature = "defmt")]
                    defmt::trace!("[STREAM] skipped unmodeled header 0x{:02X}", self.rx[at - used]);
                }
            }
        }
        Ok(())
    }

    fn note_challenge(&mut self, value: &[u8]) -> Result<(), ObexError> {
        let challenge = DigestChallenge::parse(value)?;
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "[STREAM] authentication challenge received, answerable={}",
            self.credentials.is_some()
        );
        self.challenge = Some(challenge);
        Ok(())
    }

    /// Begin body parsing of the received packet at `from`. Headers before
    /// the first body chunk are filed into `into`.
    pub(crate) fn parse_packet_data_begin(
        &mut self,
        into: &mut HeaderSet,
        from: usize,
    ) -> Result<(), ObexError> {
        self.data_at = from;
        self.body_window = None;
        self.advance_to_body(into)
    }

    /// Copy body bytes out of the received packet. Returns zero when this
    /// packet has no unconsumed body bytes left; [`Self::is_eof`] tells
    /// whether END-OF-BODY has been seen.
    pub(crate) fn parse_packet_data(
        &mut self,
        into: &mut HeaderSet,
        out: &mut [u8],
    ) -> Result<usize, ObexError> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if let Some((start, end)) = self.body_window {
                let n = out.len().min(end - start);
                if n > 0 {
                    out[..n].copy_from_slice(&self.rx[start..start + n]);
                    self.body_window = if start + n < end {
                        Some((start + n, end))
                    } else {
                        None
                    };
                    return Ok(n);
                }
                self.body_window = None;
            }
            self.advance_to_body(into)?;
            if self.body_window.is_none() {
                return Ok(0);
            }
        }
    }

    /// Whether unconsumed body bytes are available in the received packet.
    pub(crate) fn body_available(&self) -> bool {
        matches!(self.body_window, Some((start, end)) if start < end)
    }

    /// Whether END-OF-BODY has been seen for the current operation.
    pub(crate) fn is_eof(&self) -> bool {
        self.eof
    }

    /// Add every header to the packet or fail; requests without a
    /// continuation convention cannot spill into a second packet.
    pub(crate) fn packet_add_all(&mut self, headers: &HeaderSet) -> Result<(), ObexError> {
        for header in headers {
            if header.encoded_len() > self.tx_room() {
                return Err(ObexError::Packet(PacketError::BufferTooSmall));
            }
            header.encode_into(&mut self.tx).map_err(ObexError::Packet)?;
        }
        Ok(())
    }

    /// Walk headers from the cursor until a body chunk or the packet end.
    fn advance_to_body(&mut self, into: &mut HeaderSet) -> Result<(), ObexError> {
        while self.data_at < self.rx.len() && self.body_window.is_none() {
            let at = self.data_at;
            let id = self.rx[at];
            let (header, used) = Header::decode_at(&self.rx, at)?;
            self.data_at = at + used;
            if id == HeaderIdentifier::Body.value() || id == HeaderIdentifier::EndOfBody.value() {
                // chunk bytes start past the 3-byte header prefix
                self.body_window = Some((at + 3, self.data_at));
                if id == HeaderIdentifier::EndOfBody.value() {
                    self.eof = true;
                }
                return Ok(());
            }
            match header {
                Some(Header::AuthenticationChallenge(value)) => self.note_challenge(&value)?,
                Some(header) => into.add(header)?,
                None => {}
            }
        }
        Ok(())
    }

    /// Build, send, and receive one single-packet request: DISCONNECT,
    /// SETPATH, ABORT. The request goes out final, carrying the connection
    /// id, any pending authentication response, and `headers`.
    ///
    /// Returns the parsed response set with its response code.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::BufferTooSmall`] if the headers exceed one
    /// packet; these requests have no continuation convention.
    pub(crate) async fn send_request(
        &mut self,
        opcode: OpCode,
        extra: &[u8],
        headers: Option<&HeaderSet>,
    ) -> Result<HeaderSet, ObexError> {
        self.packet_begin(opcode.final_value());
        self.packet_extend(extra);
        self.packet_add_connection_id();
        self.packet_add_auth_response();
        if let Some(headers) = headers {
            self.packet_add_all(headers)?;
        }
        self.packet_end();
        self.send_packet().await?;
        let code = self.recv_packet().await?;
        let mut response = HeaderSet::with_owner(HeaderOwner::Server);
        self.parse_packet_headers(&mut response, PACKET_PREFIX_LENGTH)?;
        response.set_response_code(code);
        Ok(response)
    }

    /// Received packet bytes, for prefix fields outside the header run.
    pub(crate) fn received(&self) -> &[u8] {
        &self.rx
    }

    /// Outgoing packet bytes; tests assert on exact layouts.
    #[cfg(test)]
    pub(crate) fn outgoing(&self) -> &[u8] {
        &self.tx
    }

    #[cfg(test)]
    pub(crate) fn transport_ref(&self) -> &T {
        &self.transport
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::ScriptedTransport;
    use embassy_futures::block_on;

    fn stream(credentials: Option<Credentials>) -> PacketStream<ScriptedTransport> {
        PacketStream::new(ScriptedTransport::new(), credentials)
    }

    fn creds() -> Credentials {
        Credentials::new(b"user", b"pw").unwrap()
    }

    #[test]
    fn test_opcode_values() {
        assert_eq!(OpCode::Connect.value(), 0x80);
        assert_eq!(OpCode::Put.value(), 0x02);
        assert_eq!(OpCode::Put.final_value(), 0x82);
        assert_eq!(OpCode::Get.final_value(), 0x83);
        assert_eq!(OpCode::Abort.value(), 0xFF);
    }

    #[test]
    fn test_response_code_table() {
        assert_eq!(ResponseCode::from_u8(0x90), Some(ResponseCode::Continue));
        assert_eq!(ResponseCode::from_u8(0xA0), Some(ResponseCode::Ok));
        assert_eq!(ResponseCode::from_u8(0xC1), Some(ResponseCode::Unauthorized));
        assert_eq!(ResponseCode::from_u8(0xE1), Some(ResponseCode::DatabaseLocked));
        assert_eq!(ResponseCode::from_u8(0x42), None);

        assert!(ResponseCode::Ok.is_success());
        assert!(ResponseCode::PartialContent.is_success());
        assert!(!ResponseCode::Continue.is_success());
        assert!(!ResponseCode::NotFound.is_success());
    }

    #[test]
    fn test_packet_begin_end_layout() {
        let mut ps = stream(None);
        ps.packet_begin(OpCode::Put.final_value());
        ps.packet_end();
        assert_eq!(ps.outgoing(), &[0x82, 0x00, 0x03]);
    }

    #[test]
    fn test_mark_final() {
        let mut ps = stream(None);
        ps.packet_begin(OpCode::Put.value());
        ps.packet_mark_final();
        ps.packet_end();
        assert_eq!(ps.outgoing(), &[0x82, 0x00, 0x03]);
    }

    #[test]
    fn test_add_data_grows_single_body_header() {
        let mut ps = stream(None);
        ps.packet_begin(OpCode::Put.value());
        assert_eq!(ps.packet_add_data(b"hel"), 3);
        assert_eq!(ps.packet_add_data(b"lo"), 2);
        ps.packet_end();
        // one BODY header spanning both writes
        assert_eq!(
            ps.outgoing(),
            &[0x02, 0x00, 0x0B, 0x48, 0x00, 0x08, b'h', b'e', b'l', b'l', b'o']
        );
    }

    #[test]
    fn test_add_data_partial_consumption() {
        let mut ps = stream(None);
        ps.set_max_send(16);
        ps.packet_begin(OpCode::Put.value());
        // room: 16 - 3 prefix - 3 body header = 10 data bytes
        assert_eq!(ps.packet_add_data(&[0xAA; 32]), 10);
        assert_eq!(ps.packet_add_data(&[0xBB; 32]), 0);
        ps.packet_end();
        assert_eq!(ps.outgoing().len(), 16);
    }

    #[test]
    fn test_eof_body_fit() {
        let mut ps = stream(None);
        ps.set_max_send(16);
        ps.packet_begin(OpCode::Put.value());
        assert!(ps.packet_eof_body());

        ps.packet_begin(OpCode::Put.value());
        ps.packet_add_data(&[0xAA; 32]);
        // packet is full now
        assert!(!ps.packet_eof_body());
    }

    #[test]
    fn test_headers_spill_to_queue_in_order() {
        use crate::header::UserValue;

        let mut ps = stream(None);
        ps.set_max_send(32);
        let mut headers = HeaderSet::new();
        // 25 bytes encoded; leaves 4 bytes of room
        headers.add(Header::name("photo.jpeg").unwrap()).unwrap();
        headers.add(Header::Length(9)).unwrap();
        // 2 bytes encoded; would fit the room but must follow the spill
        headers
            .add(Header::user(0xB0, UserValue::Byte(5)).unwrap())
            .unwrap();

        ps.packet_begin(OpCode::Put.value());
        assert!(!ps.packet_add_headers(&headers).unwrap());
        assert!(ps.has_queued_headers());
        assert_eq!(ps.outgoing().len(), 3 + 25);

        ps.set_max_send(MAX_PACKET_LENGTH);
        ps.packet_begin(OpCode::Put.value());
        assert!(ps.packet_add_queued());
        assert!(!ps.has_queued_headers());
        ps.packet_end();
        // length first, the user header after it
        assert_eq!(ps.outgoing()[3], 0xC3);
        assert_eq!(ps.outgoing()[3 + 5], 0xB0);
    }

    #[test]
    fn test_header_never_fitting_is_an_error() {
        let mut ps = stream(None);
        ps.set_max_send(16);
        let mut headers = HeaderSet::new();
        headers.add(Header::name("far-too-long-for-a-packet").unwrap()).unwrap();
        assert_eq!(
            ps.packet_add_headers(&headers),
            Err(PacketError::HeaderTooLarge)
        );
    }

    #[test]
    fn test_send_and_recv() {
        block_on(async {
            let mut ps = stream(None);
            ps.packet_begin(OpCode::Disconnect.final_value());
            ps.packet_end();

            // reach into the transport to script the reply
            ps.transport.push_reply(&[0xA0, 0x00, 0x03]);
            ps.send_packet().await.unwrap();
            let code = ps.recv_packet().await.unwrap();
            assert_eq!(code, ResponseCode::Ok);
            assert_eq!(ps.status(), Some(ResponseCode::Ok));
            assert_eq!(ps.transport.sent(0), &[0x81, 0x00, 0x03]);
        });
    }

    #[test]
    fn test_recv_reassembles_chunked_reads() {
        block_on(async {
            let mut ps = stream(None);
            ps.transport.push_reply(&[0xA0, 0x00, 0x08, 0xC3, 0x00, 0x00, 0x00, 0x2A]);
            ps.transport.limit_read_chunk(2);
            let code = ps.recv_packet().await.unwrap();
            assert_eq!(code, ResponseCode::Ok);

            let mut set = HeaderSet::new();
            ps.parse_packet_headers(&mut set, 3).unwrap();
            assert_eq!(set.length(), Some(0x2A));
        });
    }

    #[test]
    fn test_recv_rejects_bad_length() {
        block_on(async {
            let mut ps = stream(None);
            ps.transport.push_reply(&[0xA0, 0x00, 0x02]);
            assert_eq!(
                ps.recv_packet().await,
                Err(ObexError::Packet(PacketError::PacketLength))
            );
            assert!(ps.is_broken());
            // fail-fast from now on
            assert_eq!(ps.recv_packet().await, Err(ObexError::LinkBroken));
        });
    }

    #[test]
    fn test_recv_rejects_unknown_code() {
        block_on(async {
            let mut ps = stream(None);
            ps.transport.push_reply(&[0x42, 0x00, 0x03]);
            assert_eq!(
                ps.recv_packet().await,
                Err(ObexError::Packet(PacketError::ResponseCode(0x42)))
            );
            assert!(ps.is_broken());
        });
    }

    #[test]
    fn test_recv_peer_close_is_disconnect() {
        block_on(async {
            let mut ps = stream(None);
            assert_eq!(
                ps.recv_packet().await,
                Err(ObexError::Transport(TransportError::Disconnected))
            );
        });
    }

    #[test]
    fn test_challenge_intercepted_not_filed() {
        block_on(async {
            let mut ps = stream(Some(creds()));
            // UNAUTHORIZED carrying a nonce and an options TLV
            let mut reply: Vec<u8, 64> = Vec::new();
            reply.extend_from_slice(&[0xC1, 0x00, 0x1B, 0x4D, 0x00, 0x18, 0x00, 0x10]).unwrap();
            reply.extend_from_slice(&[0u8; 16]).unwrap();
            reply.extend_from_slice(&[0x01, 0x01, 0x00]).unwrap();
            ps.transport.push_reply(&reply);

            ps.recv_packet().await.unwrap();
            let mut set = HeaderSet::new();
            ps.parse_packet_headers(&mut set, 3).unwrap();
            assert!(set.is_empty());
            assert!(ps.should_send_auth_response());
        });
    }

    #[test]
    fn test_auth_response_consumed_once() {
        block_on(async {
            let mut ps = stream(Some(creds()));
            let mut reply: Vec<u8, 64> = Vec::new();
            reply.extend_from_slice(&[0xC1, 0x00, 0x18, 0x4D, 0x00, 0x15, 0x00, 0x10]).unwrap();
            reply.extend_from_slice(&[0u8; 16]).unwrap();
            ps.transport.push_reply(&reply);
            ps.recv_packet().await.unwrap();
            let mut set = HeaderSet::new();
            ps.parse_packet_headers(&mut set, 3).unwrap();
            assert!(ps.should_send_auth_response());

            ps.packet_begin(OpCode::Connect.value());
            ps.packet_add_auth_response();
            assert!(!ps.should_send_auth_response());
            // 0x4E header present
            assert_eq!(ps.outgoing()[3], 0x4E);

            ps.packet_begin(OpCode::Connect.value());
            ps.packet_add_auth_response();
            assert_eq!(ps.outgoing().len(), 3);
        });
    }

    #[test]
    fn test_parse_data_interleaved_headers_and_body() {
        block_on(async {
            let mut ps = stream(None);
            // OK carrying LENGTH, BODY "ab", COUNT, then END-OF-BODY "c"
            let mut reply: Vec<u8, 64> = Vec::new();
            reply.extend_from_slice(&[0xA0, 0x00, 0x00]).unwrap();
            reply.extend_from_slice(&[0xC3, 0x00, 0x00, 0x00, 0x03]).unwrap();
            reply.extend_from_slice(&[0x48, 0x00, 0x05, b'a', b'b']).unwrap();
            reply.extend_from_slice(&[0xC0, 0x00, 0x00, 0x00, 0x07]).unwrap();
            reply.extend_from_slice(&[0x49, 0x00, 0x04, b'c']).unwrap();
            let total = reply.len() as u16;
            reply[1..3].copy_from_slice(&total.to_be_bytes());
            ps.transport.push_reply(&reply);

            ps.recv_packet().await.unwrap();
            let mut set = HeaderSet::new();
            ps.parse_packet_data_begin(&mut set, 3).unwrap();
            assert!(ps.body_available());
            assert_eq!(set.length(), Some(3));

            let mut out = [0u8; 8];
            let n = ps.parse_packet_data(&mut set, &mut out).unwrap();
            assert_eq!(&out[..n], b"ab");
            let n = ps.parse_packet_data(&mut set, &mut out).unwrap();
            assert_eq!(&out[..n], b"c");
            assert!(ps.is_eof());
            let n = ps.parse_packet_data(&mut set, &mut out).unwrap();
            assert_eq!(n, 0);
            // the COUNT header between the chunks was collected on the way
            assert!(set.contains(HeaderIdentifier::Count));
        });
    }

    #[test]
    fn test_send_request_layout_and_response() {
        block_on(async {
            let mut ps = stream(None);
            ps.set_connection_id(7);
            ps.transport.push_reply(&[0xA0, 0x00, 0x08, 0x4A, 0x00, 0x05, b'o', b'k']);

            let response = ps
                .send_request(OpCode::Disconnect, &[], None)
                .await
                .unwrap();
            assert_eq!(response.response_code(), Some(ResponseCode::Ok));
            assert_eq!(response.who(), Some(&b"ok"[..]));

            // final DISCONNECT with the connection id injected first
            let sent = ps.transport.sent(0);
            assert_eq!(sent[0], 0x81);
            assert_eq!(&sent[3..8], &[0xCB, 0x00, 0x00, 0x00, 0x07]);
        });
    }
}
