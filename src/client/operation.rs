//! OBEX Client Operation
//!
//! A PUT or GET in flight. The request phase assembles packets from headers
//! and object data, exchanging them one at a time while the server answers
//! CONTINUE; the final packet carries the FINAL bit, after which a GET keeps
//! pulling response packets until the object is drained.
//!
//! ## Lifecycle
//!
//! The operation state lives in the session (one operation at a time); the
//! [`ClientOperation`] handle and the [`PutOutputStream`] / [`GetInputStream`]
//! stream handles all borrow the session and take its lock for every call.
//! Each open handle counts towards the operation's reference count; the last
//! `close` tears the operation down, sending a best-effort ABORT when the
//! exchange never completed. Teardown is explicit; there is no async drop.
//!
//! ## Authentication restart
//!
//! A challenge in a response is answered by rebuilding the first request
//! packet (connection id, digest response, accumulated headers) and
//! replaying the request. Rebuilding is pure buffer surgery; the loop that
//! noticed the challenge performs the resend. Once object data has been
//! delivered in either direction the operation can no longer be replayed and
//! the rejection surfaces instead.

use crate::ObexError;
use crate::client::OperationKind;
use crate::client::session::SessionInner;
use crate::constants::PACKET_PREFIX_LENGTH;
use crate::header::HeaderIdentifier;
use crate::header_set::{HeaderOwner, HeaderSet};
use crate::packet::{OpCode, PacketError, PacketStream, ResponseCode};
use crate::transport::ObexTransport;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;

/// Lifecycle phase of an operation.
///
/// Legal transitions: `SendingRequest → RequestSent → Ended`, early
/// `SendingRequest → Ended` when the server terminates, `Ended →
/// SendingRequest` on an authentication restart, and any phase to the
/// absorbing `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum OperationPhase {
    /// Request packets are still being assembled and exchanged
    SendingRequest,
    /// The final request packet is out; response packets are being pulled
    RequestSent,
    /// A terminal response code arrived
    Ended,
    /// The operation was abandoned
    Aborted,
}

/// State of the single in-flight operation, owned by the session.
pub(crate) struct OperationState {
    pub(crate) kind: OperationKind,
    pub(crate) phase: OperationPhase,
    /// Last response code; `Continue` until the first exchange completes
    pub(crate) status: ResponseCode,
    pub(crate) received: HeaderSet,
    /// Accumulated request headers kept for an authentication restart;
    /// `None` once the operation can no longer be replayed
    pub(crate) sent_headers: Option<HeaderSet>,
    /// One-shot rewind signal to the write loop after a restart
    pub(crate) restarting: bool,
    pub(crate) first_data_block: bool,
    pub(crate) open_handles: u8,
    pub(crate) input_open: bool,
    pub(crate) output_open: bool,
}

impl OperationState {
    pub(crate) fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            phase: OperationPhase::SendingRequest,
            status: ResponseCode::Continue,
            received: HeaderSet::with_owner(HeaderOwner::Server),
            sent_headers: None,
            restarting: false,
            first_data_block: true,
            open_handles: 1,
            input_open: false,
            output_open: false,
        }
    }

    /// Request opcode byte without the final bit.
    fn head(&self) -> u8 {
        self.kind.opcode().value()
    }
}

fn end_error(op: &OperationState) -> ObexError {
    if op.status.is_success() {
        ObexError::OperationEnded
    } else {
        ObexError::Rejected(op.status)
    }
}

/// Check that `seq` still names the live operation.
pub(crate) fn ensure_current<T: ObexTransport>(
    inner: &SessionInner<T>,
    seq: u16,
) -> Result<(), ObexError> {
    if inner.operation.is_none() || inner.op_seq != seq {
        return Err(ObexError::OperationClosed);
    }
    Ok(())
}

/// Validate and install a new operation, then prime it: first request packet
/// built, oversized header sets drained packet by packet.
///
/// # Errors
///
/// Fails without any wire traffic when the session is not connected, an
/// operation is already in flight, the header set is not caller-owned, or a
/// TARGET header meets an assigned connection id.
pub(crate) async fn start_operation<T: ObexTransport>(
    inner: &mut SessionInner<T>,
    kind: OperationKind,
    headers: &HeaderSet,
) -> Result<(), ObexError> {
    if !inner.stream.is_connected() {
        return Err(ObexError::NotConnected);
    }
    if inner.operation.is_some() {
        return Err(ObexError::OperationInProgress);
    }
    if headers.owner() != HeaderOwner::ClientUser {
        return Err(ObexError::InvalidHeaders);
    }
    if inner.stream.connection_id().is_some() && headers.contains(HeaderIdentifier::Target) {
        return Err(ObexError::HeaderConflict);
    }
    inner.operation = Some(OperationState::new(kind));
    inner.op_seq = inner.op_seq.wrapping_add(1);
    #[cfg(feature = "defmt")]
    defmt::debug!("[OP] start {}", kind);
    let result = prime_operation(inner, headers).await;
    if result.is_err() {
        inner.operation = None;
    }
    result
}

/// Build the first request packet and exchange until the header queue is
/// empty. The packet stays pending when everything fits, so object data can
/// ride in it. Stops early without error when the server terminates the
/// operation.
async fn prime_operation<T: ObexTransport>(
    inner: &mut SessionInner<T>,
    headers: &HeaderSet,
) -> Result<(), ObexError> {
    {
        let (stream, op) = inner.parts()?;
        stream.reset_receive_state();
        stream.clear_queued_headers();
        stream.packet_begin(op.head());
        stream.packet_add_connection_id();
        stream.packet_add_auth_response();
        stream.packet_add_headers(headers)?;
        let mut sent = HeaderSet::with_owner(HeaderOwner::Client);
        sent.merge(headers)?;
        op.sent_headers = Some(sent);
    }
    while inner.stream.has_queued_headers() {
        if !packet_exchange(inner).await? {
            break;
        }
    }
    if let Some(op) = inner.operation.as_mut() {
        op.restarting = false;
    }
    Ok(())
}

/// One protocol round for the live operation.
///
/// Returns `true` when the operation can take further packets: the server
/// answered CONTINUE, or an authentication restart rebuilt the request and
/// the caller's loop must resend it. `false` once the operation reached a
/// terminal response.
pub(crate) async fn packet_exchange<T: ObexTransport>(
    inner: &mut SessionInner<T>,
) -> Result<bool, ObexError> {
    let phase = inner.parts()?.1.phase;
    match phase {
        OperationPhase::Aborted => Ok(false),
        OperationPhase::Ended => {
            // a terminal response that demanded authentication can restart
            let (stream, op) = inner.parts()?;
            restart_operation(stream, op)
        }
        OperationPhase::SendingRequest => exchange_request(inner).await,
        OperationPhase::RequestSent => exchange_tail(inner).await,
    }
}

/// Request-phase round: send the packet under construction, receive and file
/// headers. On CONTINUE the next packet is begun with any pending
/// authentication response and queued headers.
async fn exchange_request<T: ObexTransport>(
    inner: &mut SessionInner<T>,
) -> Result<bool, ObexError> {
    let (stream, op) = inner.parts()?;
    stream.packet_end();
    stream.send_packet().await?;
    let code = stream.recv_packet().await?;
    op.status = code;
    stream.parse_packet_headers(&mut op.received, PACKET_PREFIX_LENGTH)?;
    if code == ResponseCode::Continue {
        stream.packet_begin(op.head());
        stream.packet_add_auth_response();
        stream.packet_add_queued();
        return Ok(true);
    }
    if restart_operation(stream, op)? {
        return Ok(true);
    }
    op.phase = OperationPhase::Ended;
    #[cfg(feature = "defmt")]
    defmt::debug!("[OP] ended by server, code=0x{:02X}", code.value());
    Ok(false)
}

/// Tail round for GET: a bare final request packet pulls the next slice of
/// the object. Returns `false` once the response code is terminal.
async fn exchange_tail<T: ObexTransport>(inner: &mut SessionInner<T>) -> Result<bool, ObexError> {
    let (stream, op) = inner.parts()?;
    stream.packet_begin(op.head());
    stream.packet_mark_final();
    stream.packet_add_auth_response();
    stream.packet_end();
    stream.send_packet().await?;
    let code = stream.recv_packet().await?;
    op.status = code;
    stream.parse_packet_data_begin(&mut op.received, PACKET_PREFIX_LENGTH)?;
    if code == ResponseCode::Continue {
        return Ok(true);
    }
    op.phase = OperationPhase::Ended;
    Ok(false)
}

/// Rebuild the first request packet to answer an authentication challenge.
///
/// Pure buffer surgery, no wire traffic: the caller's loop performs the
/// resend. Returns `false` when no computed response is pending or the
/// operation is no longer replayable.
fn restart_operation<T: ObexTransport>(
    stream: &mut PacketStream<T>,
    op: &mut OperationState,
) -> Result<bool, ObexError> {
    if !stream.should_send_auth_response() {
        return Ok(false);
    }
    let Some(sent) = op.sent_headers.as_ref() else {
        return Ok(false);
    };
    stream.clear_queued_headers();
    stream.reset_receive_state();
    stream.packet_begin(op.head());
    stream.packet_add_connection_id();
    stream.packet_add_auth_response();
    stream.packet_add_headers(sent)?;
    op.phase = OperationPhase::SendingRequest;
    op.status = ResponseCode::Continue;
    op.restarting = true;
    op.first_data_block = true;
    #[cfg(feature = "defmt")]
    defmt::debug!("[OP] restart after authentication challenge");
    Ok(true)
}

/// Finish the request phase.
///
/// Idempotent: a no-op when the final packet is already out or the
/// operation is over. PUT appends the empty END-OF-BODY marker (flushing
/// once via an exchange when it does not fit) and sends the final packet;
/// GET sends the final request and pulls packets until body bytes or EOF
/// are available. A challenge in the final response restarts the operation
/// and replays the sequence.
pub(crate) async fn request_end<T: ObexTransport>(
    inner: &mut SessionInner<T>,
) -> Result<(), ObexError> {
    'replay: loop {
        {
            let (_, op) = inner.parts()?;
            if op.phase != OperationPhase::SendingRequest {
                return Ok(());
            }
            op.restarting = false;
        }
        // headers that spilled past earlier packets go out first
        while inner.stream.has_queued_headers() {
            if !packet_exchange(inner).await? {
                continue 'replay;
            }
        }
        match inner.parts()?.1.kind {
            OperationKind::Put => {
                if !inner.stream.packet_eof_body() {
                    if !packet_exchange(inner).await? {
                        continue 'replay;
                    }
                    if !inner.stream.packet_eof_body() {
                        return Err(ObexError::Packet(PacketError::BufferTooSmall));
                    }
                }
                let (stream, op) = inner.parts()?;
                stream.packet_mark_final();
                stream.packet_end();
                stream.send_packet().await?;
                let code = stream.recv_packet().await?;
                op.status = code;
                stream.parse_packet_headers(&mut op.received, PACKET_PREFIX_LENGTH)?;
                if restart_operation(stream, op)? {
                    continue 'replay;
                }
                op.phase = OperationPhase::Ended;
                op.restarting = false;
                return Ok(());
            }
            OperationKind::Get => {
                {
                    let (stream, op) = inner.parts()?;
                    stream.packet_mark_final();
                    stream.packet_end();
                    stream.send_packet().await?;
                    let code = stream.recv_packet().await?;
                    op.status = code;
                    stream.parse_packet_data_begin(&mut op.received, PACKET_PREFIX_LENGTH)?;
                    op.phase = OperationPhase::RequestSent;
                }
                loop {
                    let (has_body, at_eof, status) = {
                        let (stream, op) = inner.parts()?;
                        (stream.body_available(), stream.is_eof(), op.status)
                    };
                    if has_body || at_eof {
                        inner.parts()?.1.restarting = false;
                        return Ok(());
                    }
                    if status == ResponseCode::Continue {
                        packet_exchange(inner).await?;
                        continue;
                    }
                    // terminal before any body: a challenge can restart it
                    let (stream, op) = inner.parts()?;
                    if restart_operation(stream, op)? {
                        continue 'replay;
                    }
                    op.phase = OperationPhase::Ended;
                    op.restarting = false;
                    return Ok(());
                }
            }
        }
    }
}

/// Write-loop core of the PUT output stream: consume `data` into BODY
/// bytes, exchanging whenever the packet fills or on the operation's very
/// first data block so early server errors surface. A restart rewinds to
/// the start of this call's buffer and replays it.
pub(crate) async fn write_data<T: ObexTransport>(
    inner: &mut SessionInner<T>,
    data: &[u8],
) -> Result<(), ObexError> {
    {
        let (_, op) = inner.parts()?;
        match op.phase {
            OperationPhase::Aborted => return Err(ObexError::OperationAborted),
            OperationPhase::RequestSent => return Err(ObexError::OperationEnded),
            OperationPhase::Ended => return Err(end_error(op)),
            OperationPhase::SendingRequest => {}
        }
    }
    if data.is_empty() {
        return Ok(());
    }
    let mut at = 0;
    loop {
        let (first, fits_all) = {
            let (stream, op) = inner.parts()?;
            at += stream.packet_add_data(&data[at..]);
            (op.first_data_block, at == data.len())
        };
        if fits_all && !first {
            return Ok(());
        }
        inner.parts()?.1.first_data_block = false;
        if !packet_exchange(inner).await? {
            return Err(end_error(inner.parts()?.1));
        }
        {
            let (_, op) = inner.parts()?;
            if op.restarting {
                op.restarting = false;
                at = 0;
            } else if at > 0 {
                // object bytes are durably out; no more replays
                op.sent_headers = None;
            }
        }
        if at == data.len() {
            return Ok(());
        }
    }
}

/// Read-loop core of the GET input stream: drain the current body window,
/// exchange for more, and keep exchanging past END-OF-BODY until the
/// response code is terminal. `Ok(0)` is end of object.
pub(crate) async fn read_data<T: ObexTransport>(
    inner: &mut SessionInner<T>,
    out: &mut [u8],
) -> Result<usize, ObexError> {
    {
        let (_, op) = inner.parts()?;
        if op.kind != OperationKind::Get {
            return Err(ObexError::StreamUnavailable);
        }
        if op.phase == OperationPhase::Aborted {
            return Err(ObexError::OperationAborted);
        }
    }
    if out.is_empty() {
        return Ok(0);
    }
    if inner.parts()?.1.phase == OperationPhase::SendingRequest {
        request_end(inner).await?;
    }
    loop {
        let n = {
            let (stream, op) = inner.parts()?;
            stream.parse_packet_data(&mut op.received, out)?
        };
        if n > 0 {
            // object bytes reached the caller; no more replays
            inner.parts()?.1.sent_headers = None;
            return Ok(n);
        }
        let (status, phase) = {
            let (_, op) = inner.parts()?;
            (op.status, op.phase)
        };
        if status == ResponseCode::Continue && phase == OperationPhase::RequestSent {
            packet_exchange(inner).await?;
            continue;
        }
        inner.parts()?.1.phase = OperationPhase::Ended;
        return Ok(0);
    }
}

/// Inject additional request headers mid-operation. Whatever does not fit
/// the packet under construction rides along on the following ones.
pub(crate) fn send_operation_headers<T: ObexTransport>(
    inner: &mut SessionInner<T>,
    headers: &HeaderSet,
) -> Result<(), ObexError> {
    if headers.owner() != HeaderOwner::ClientUser {
        return Err(ObexError::InvalidHeaders);
    }
    let (stream, op) = inner.parts()?;
    match op.phase {
        OperationPhase::Aborted => return Err(ObexError::OperationAborted),
        OperationPhase::RequestSent | OperationPhase::Ended => {
            return Err(ObexError::OperationEnded);
        }
        OperationPhase::SendingRequest => {}
    }
    if stream.connection_id().is_some() && headers.contains(HeaderIdentifier::Target) {
        return Err(ObexError::HeaderConflict);
    }
    stream.packet_add_headers(headers)?;
    if let Some(sent) = op.sent_headers.as_mut() {
        sent.merge(headers)?;
    }
    Ok(())
}

/// Send ABORT and expect OK.
///
/// The phase moves to `Aborted` before any wire traffic so a second abort
/// cannot fire. A response other than OK marks the link broken.
pub(crate) async fn abort_exchange<T: ObexTransport>(
    inner: &mut SessionInner<T>,
) -> Result<(), ObexError> {
    let (stream, op) = inner.parts()?;
    op.phase = OperationPhase::Aborted;
    #[cfg(feature = "defmt")]
    defmt::debug!("[OP] abort");
    stream.packet_begin(OpCode::Abort.final_value());
    stream.packet_add_connection_id();
    stream.packet_end();
    stream.send_packet().await?;
    let code = stream.recv_packet().await?;
    op.status = code;
    if code != ResponseCode::Ok {
        stream.mark_broken();
        return Err(ObexError::LinkBroken);
    }
    Ok(())
}

/// Drop one handle; the last one out tears the operation down, aborting on
/// the wire (best effort, errors swallowed) when it never completed.
pub(crate) async fn release_handle<T: ObexTransport>(inner: &mut SessionInner<T>) {
    let needs_abort = {
        let Ok((_, op)) = inner.parts() else { return };
        op.open_handles = op.open_handles.saturating_sub(1);
        if op.open_handles > 0 {
            return;
        }
        !matches!(op.phase, OperationPhase::Ended | OperationPhase::Aborted)
    };
    if needs_abort {
        let _ = abort_exchange(inner).await;
    }
    inner.operation = None;
    #[cfg(feature = "defmt")]
    defmt::trace!("[OP] torn down");
}

/// Live PUT or GET operation.
///
/// Every method takes the session lock, so operation and stream calls
/// serialize with each other and with the session. The handle participates
/// in the operation's reference count: call [`Self::close`] when done; the
/// last close across the operation and its streams tears the exchange down.
/// There is no implicit teardown on drop.
pub struct ClientOperation<'a, M: RawMutex, T: ObexTransport> {
    session: &'a Mutex<M, SessionInner<T>>,
    seq: u16,
    kind: OperationKind,
    closed: bool,
}

impl<'a, M: RawMutex, T: ObexTransport> ClientOperation<'a, M, T> {
    pub(crate) fn new(
        session: &'a Mutex<M, SessionInner<T>>,
        seq: u16,
        kind: OperationKind,
    ) -> Self {
        Self {
            session,
            seq,
            kind,
            closed: false,
        }
    }

    /// Transfer direction of this operation.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    fn claim(&self, inner: &SessionInner<T>) -> Result<(), ObexError> {
        if self.closed {
            return Err(ObexError::OperationClosed);
        }
        ensure_current(inner, self.seq)
    }

    /// Inject additional request headers while the request phase is open.
    ///
    /// # Errors
    ///
    /// Fails when the request phase is over, the set is not caller-owned,
    /// or a TARGET header meets an assigned connection id.
    pub async fn send_headers(&self, headers: &HeaderSet) -> Result<(), ObexError> {
        let mut inner = self.session.lock().await;
        let inner = &mut *inner;
        self.claim(inner)?;
        send_operation_headers(inner, headers)
    }

    /// Snapshot of the headers received so far, carrying the response code
    /// of the last exchange.
    ///
    /// # Errors
    ///
    /// Fails when the operation has been closed.
    pub async fn received_headers(&self) -> Result<HeaderSet, ObexError> {
        let mut inner = self.session.lock().await;
        let inner = &mut *inner;
        self.claim(inner)?;
        let (_, op) = inner.parts()?;
        let mut set = op.received.clone();
        set.set_response_code(op.status);
        Ok(set)
    }

    /// Final response code, finishing the request first when it is still
    /// open. Re-arms the stream-open gates so a follow-up stream can be
    /// opened on the same operation.
    ///
    /// # Errors
    ///
    /// Propagates transport and packet errors from finishing the request.
    pub async fn get_response_code(&self) -> Result<ResponseCode, ObexError> {
        let mut inner = self.session.lock().await;
        let inner = &mut *inner;
        self.claim(inner)?;
        request_end(inner).await?;
        let (_, op) = inner.parts()?;
        op.input_open = false;
        op.output_open = false;
        Ok(op.status)
    }

    /// Open the object data sink of a PUT.
    ///
    /// # Errors
    ///
    /// `StreamUnavailable` on a GET, `StreamAlreadyOpen` on a second open,
    /// and the usual state errors once the request phase is over.
    pub async fn open_output_stream(&self) -> Result<PutOutputStream<'a, M, T>, ObexError> {
        let mut inner = self.session.lock().await;
        let inner = &mut *inner;
        self.claim(inner)?;
        let (_, op) = inner.parts()?;
        if op.kind != OperationKind::Put {
            return Err(ObexError::StreamUnavailable);
        }
        match op.phase {
            OperationPhase::Aborted => return Err(ObexError::OperationAborted),
            OperationPhase::RequestSent | OperationPhase::Ended => {
                return Err(ObexError::OperationEnded);
            }
            OperationPhase::SendingRequest => {}
        }
        if op.output_open {
            return Err(ObexError::StreamAlreadyOpen);
        }
        op.output_open = true;
        op.open_handles += 1;
        Ok(PutOutputStream {
            session: self.session,
            seq: self.seq,
            closed: false,
        })
    }

    /// Open the object data source.
    ///
    /// On a GET this finishes the request first, so the stream is ready to
    /// read. On a PUT the returned stream exists only for lifecycle
    /// symmetry and every read fails with `StreamUnavailable`.
    ///
    /// # Errors
    ///
    /// `StreamAlreadyOpen` on a second open; propagates errors from
    /// finishing the request.
    pub async fn open_input_stream(&self) -> Result<GetInputStream<'a, M, T>, ObexError> {
        let mut inner = self.session.lock().await;
        let inner = &mut *inner;
        self.claim(inner)?;
        {
            let (_, op) = inner.parts()?;
            if op.phase == OperationPhase::Aborted {
                return Err(ObexError::OperationAborted);
            }
            if op.input_open {
                return Err(ObexError::StreamAlreadyOpen);
            }
        }
        if inner.parts()?.1.kind == OperationKind::Get {
            request_end(inner).await?;
        }
        let (_, op) = inner.parts()?;
        op.input_open = true;
        op.open_handles += 1;
        Ok(GetInputStream {
            session: self.session,
            seq: self.seq,
            closed: false,
        })
    }

    /// Abandon the operation. Expects the server's OK; any other response
    /// marks the link broken. The operation is gone afterwards for every
    /// handle, whatever the outcome.
    ///
    /// # Errors
    ///
    /// `OperationEnded`/`OperationAborted` when there is nothing left to
    /// abort; `LinkBroken` when the server does not acknowledge.
    pub async fn abort(&mut self) -> Result<(), ObexError> {
        let mut inner = self.session.lock().await;
        let inner = &mut *inner;
        self.claim(inner)?;
        {
            let (_, op) = inner.parts()?;
            match op.phase {
                OperationPhase::Aborted => return Err(ObexError::OperationAborted),
                OperationPhase::Ended => return Err(ObexError::OperationEnded),
                OperationPhase::SendingRequest | OperationPhase::RequestSent => {}
            }
        }
        let result = abort_exchange(inner).await;
        inner.operation = None;
        self.closed = true;
        result
    }

    /// Release this handle. Idempotent; the operation is torn down when the
    /// last handle across the operation and its streams is gone.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut inner = self.session.lock().await;
        let inner = &mut *inner;
        if ensure_current(inner, self.seq).is_err() {
            return;
        }
        release_handle(inner).await;
    }
}

/// Object data sink of a PUT operation.
///
/// Writes consume their buffer fully, exchanging packets as they fill.
/// Closing completes the request: remaining data is flushed, the
/// end-of-object marker appended, and the final response received.
pub struct PutOutputStream<'a, M: RawMutex, T: ObexTransport> {
    session: &'a Mutex<M, SessionInner<T>>,
    seq: u16,
    closed: bool,
}

impl<M: RawMutex, T: ObexTransport> PutOutputStream<'_, M, T> {
    fn claim(&self, inner: &SessionInner<T>) -> Result<(), ObexError> {
        if self.closed {
            return Err(ObexError::StreamClosed);
        }
        ensure_current(inner, self.seq)
    }

    /// Write all of `data` as object bytes.
    ///
    /// # Errors
    ///
    /// Fails when the stream or operation is closed, aborted, or ended,
    /// with `Rejected` carrying the code when the server refused the data.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), ObexError> {
        let mut inner = self.session.lock().await;
        let inner = &mut *inner;
        self.claim(inner)?;
        write_data(inner, data).await
    }

    /// Finish the object: flush remaining data, append the end-of-object
    /// marker, complete the request, and release this handle.
    ///
    /// # Errors
    ///
    /// Propagates errors from completing the request; the handle is
    /// released either way.
    pub async fn close(&mut self) -> Result<(), ObexError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut inner = self.session.lock().await;
        let inner = &mut *inner;
        if ensure_current(inner, self.seq).is_err() {
            return Ok(());
        }
        let result = request_end(inner).await;
        release_handle(inner).await;
        result
    }
}

/// Object data source of a GET operation.
pub struct GetInputStream<'a, M: RawMutex, T: ObexTransport> {
    session: &'a Mutex<M, SessionInner<T>>,
    seq: u16,
    closed: bool,
}

impl<M: RawMutex, T: ObexTransport> GetInputStream<'_, M, T> {
    fn claim(&self, inner: &SessionInner<T>) -> Result<(), ObexError> {
        if self.closed {
            return Err(ObexError::StreamClosed);
        }
        ensure_current(inner, self.seq)
    }

    /// Read object bytes into `out`. `Ok(0)` is end of object, now and on
    /// every later read.
    ///
    /// # Errors
    ///
    /// Fails when the stream or operation is closed or aborted, and always
    /// on the placeholder stream of a PUT.
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize, ObexError> {
        let mut inner = self.session.lock().await;
        let inner = &mut *inner;
        self.claim(inner)?;
        read_data(inner, out).await
    }

    /// Abandon reading and release this handle. When the transfer has not
    /// finished, a best-effort abort tells the server; wire errors are
    /// swallowed.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut inner = self.session.lock().await;
        let inner = &mut *inner;
        if ensure_current(inner, self.seq).is_err() {
            return;
        }
        let unfinished = inner
            .parts()
            .map(|(_, op)| {
                !matches!(op.phase, OperationPhase::Ended | OperationPhase::Aborted)
            })
            .unwrap_or(false);
        if unfinished {
            let _ = abort_exchange(inner).await;
        }
        release_handle(inner).await;
    }
}
