//! OBEX Client Session
//!
//! One session per transport link. The session runs the connection-scoped
//! exchanges (CONNECT, DISCONNECT, SETPATH, DELETE) and hands out operation
//! handles for PUT and GET. All state lives behind one async mutex, so
//! session calls, operation calls, and stream calls serialize; at most one
//! operation is in flight at a time.
//!
//! CONNECT negotiates the outgoing packet size: the server's advertised
//! maximum is clamped to the engine's buffer and everything sent afterwards
//! honors it. A CONNECT refused with UNAUTHORIZED and a digest challenge is
//! resent once with the computed response when credentials are configured.

use crate::client::OperationKind;
use crate::client::operation::{self, ClientOperation, OperationState};
use crate::constants::{
    CONNECT_FLAGS, CONNECT_HEADER_OFFSET, MAX_PACKET_LENGTH, MIN_PACKET_LENGTH, OBEX_VERSION,
    SETPATH_CONSTANTS, SETPATH_FLAG_BACKUP, SETPATH_FLAG_NO_CREATE,
};
use crate::header_set::{HeaderOwner, HeaderSet};
use crate::packet::{OpCode, PacketError, PacketStream, ResponseCode};
use crate::transport::ObexTransport;
use crate::{ObexError, SessionConfig};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;

/// Everything the session lock protects: the packet stream and the single
/// in-flight operation.
pub(crate) struct SessionInner<T: ObexTransport> {
    pub(crate) stream: PacketStream<T>,
    pub(crate) operation: Option<OperationState>,
    /// Bumped on every operation start; stale handles carry an old value
    pub(crate) op_seq: u16,
}

impl<T: ObexTransport> SessionInner<T> {
    pub(crate) fn new(stream: PacketStream<T>) -> Self {
        Self {
            stream,
            operation: None,
            op_seq: 0,
        }
    }

    /// Split into the packet stream and the live operation state.
    pub(crate) fn parts(
        &mut self,
    ) -> Result<(&mut PacketStream<T>, &mut OperationState), ObexError> {
        match self.operation.as_mut() {
            Some(op) => Ok((&mut self.stream, op)),
            None => Err(ObexError::OperationClosed),
        }
    }
}

/// OBEX client endpoint over one transport link.
///
/// Methods take `&self`; the session is `Send`-shareable across tasks when
/// the mutex kind `M` allows it, and every call serializes on the internal
/// lock. Teardown is explicit through [`Self::close`].
pub struct ClientSession<M: RawMutex, T: ObexTransport> {
    inner: Mutex<M, SessionInner<T>>,
    /// Largest packet this side is willing to receive, advertised in CONNECT
    receive_mtu: u16,
}

impl<M: RawMutex, T: ObexTransport> ClientSession<M, T> {
    /// Create a session over `transport`. No wire traffic until
    /// [`Self::connect`].
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let receive_mtu = config
            .receive_mtu
            .clamp(MIN_PACKET_LENGTH as u16, MAX_PACKET_LENGTH as u16);
        Self {
            inner: Mutex::new(SessionInner::new(PacketStream::new(
                transport,
                config.credentials,
            ))),
            receive_mtu,
        }
    }

    /// Whether a CONNECT exchange has completed successfully.
    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.stream.is_connected()
    }

    /// Connection id assigned by the server, once one arrived.
    pub async fn connection_id(&self) -> Option<u32> {
        self.inner.lock().await.stream.connection_id()
    }

    /// Run the CONNECT exchange and negotiate the packet size.
    ///
    /// Returns the server's response headers carrying the response code;
    /// the session counts as connected only when that code is OK. On
    /// UNAUTHORIZED with a digest challenge the request is resent once with
    /// the computed response, when credentials are configured.
    ///
    /// # Errors
    ///
    /// Fails when already connected, on transport and packet errors, and
    /// with [`PacketError::PacketLength`] when the server advertises a
    /// packet size below the protocol minimum.
    pub async fn connect(&self, headers: Option<&HeaderSet>) -> Result<HeaderSet, ObexError> {
        let inner = &mut *self.inner.lock().await;
        let stream = &mut inner.stream;
        if stream.is_connected() {
            return Err(ObexError::AlreadyConnected);
        }
        if let Some(headers) = headers {
            if headers.owner() != HeaderOwner::ClientUser {
                return Err(ObexError::InvalidHeaders);
            }
        }
        let mtu = self.receive_mtu.to_be_bytes();
        let mut resent = false;
        loop {
            stream.reset_receive_state();
            stream.packet_begin(OpCode::Connect.final_value());
            stream.packet_extend(&[OBEX_VERSION, CONNECT_FLAGS, mtu[0], mtu[1]]);
            stream.packet_add_auth_response();
            if let Some(headers) = headers {
                stream.packet_add_all(headers)?;
            }
            stream.packet_end();
            stream.send_packet().await?;
            let code = stream.recv_packet().await?;

            // the response prefix mirrors the request: version, flags,
            // peer maximum packet size
            if stream.received().len() < CONNECT_HEADER_OFFSET {
                stream.mark_broken();
                return Err(ObexError::Packet(PacketError::MalformedHeader));
            }
            let server_max =
                u16::from_be_bytes([stream.received()[5], stream.received()[6]]) as usize;
            let mut response = HeaderSet::with_owner(HeaderOwner::Server);
            stream.parse_packet_headers(&mut response, CONNECT_HEADER_OFFSET)?;
            response.set_response_code(code);

            if code == ResponseCode::Ok {
                if server_max < MIN_PACKET_LENGTH {
                    stream.mark_broken();
                    return Err(ObexError::Packet(PacketError::PacketLength));
                }
                stream.set_max_send(server_max);
                stream.set_connected(true);
                if let Some(id) = response.connection_id() {
                    stream.set_connection_id(id);
                }
                #[cfg(feature = "defmt")]
                defmt::debug!("[SESSION] connected, peer max packet {}", server_max);
                return Ok(response);
            }
            if code == ResponseCode::Unauthorized && !resent && stream.should_send_auth_response()
            {
                resent = true;
                #[cfg(feature = "defmt")]
                defmt::debug!("[SESSION] connect challenged, resending with digest");
                continue;
            }
            return Ok(response);
        }
    }

    /// Run the DISCONNECT exchange.
    ///
    /// The session counts as disconnected afterwards whatever the response
    /// code; the returned set carries it.
    ///
    /// # Errors
    ///
    /// Fails when not connected or while an operation is in flight, and on
    /// transport and packet errors.
    pub async fn disconnect(&self, headers: Option<&HeaderSet>) -> Result<HeaderSet, ObexError> {
        let inner = &mut *self.inner.lock().await;
        self.claim_session(inner, headers)?;
        let response = inner
            .stream
            .send_request(OpCode::Disconnect, &[], headers)
            .await?;
        inner.stream.set_connected(false);
        #[cfg(feature = "defmt")]
        defmt::debug!("[SESSION] disconnected");
        Ok(response)
    }

    /// Change the server's current folder. `backup` first moves one level
    /// up; `create` permits the server to create the target. An empty NAME
    /// header addresses the root folder.
    ///
    /// # Errors
    ///
    /// Fails when not connected or while an operation is in flight, and on
    /// transport and packet errors.
    pub async fn set_path(
        &self,
        headers: &HeaderSet,
        backup: bool,
        create: bool,
    ) -> Result<HeaderSet, ObexError> {
        let inner = &mut *self.inner.lock().await;
        self.claim_session(inner, Some(headers))?;
        let mut flags = 0;
        if backup {
            flags |= SETPATH_FLAG_BACKUP;
        }
        if !create {
            flags |= SETPATH_FLAG_NO_CREATE;
        }
        inner
            .stream
            .send_request(OpCode::SetPath, &[flags, SETPATH_CONSTANTS], Some(headers))
            .await
    }

    /// Delete the named object: a PUT that is finished without ever writing
    /// object data.
    ///
    /// # Errors
    ///
    /// Same conditions as starting and finishing a PUT.
    pub async fn delete(&self, headers: &HeaderSet) -> Result<HeaderSet, ObexError> {
        let inner = &mut *self.inner.lock().await;
        operation::start_operation(inner, OperationKind::Put, headers).await?;
        let result = operation::request_end(inner).await;
        let outcome = match result {
            Ok(()) => {
                let (_, op) = inner.parts()?;
                let mut response = op.received.clone();
                response.set_response_code(op.status);
                Ok(response)
            }
            Err(e) => Err(e),
        };
        inner.operation = None;
        outcome
    }

    /// Start a PUT operation sending `headers`.
    ///
    /// The first packet stays pending until object data, more headers, or
    /// the end of the request forces it out, so the object can start in the
    /// same packet. The operation and any streams opened from it must be
    /// closed.
    ///
    /// # Errors
    ///
    /// Fails when not connected, while another operation is in flight, for
    /// a header set that is not caller-owned, and when a TARGET header
    /// meets an assigned connection id.
    pub async fn put(&self, headers: &HeaderSet) -> Result<ClientOperation<'_, M, T>, ObexError> {
        self.start(OperationKind::Put, headers).await
    }

    /// Start a GET operation requesting the object named by `headers`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::put`].
    pub async fn get(&self, headers: &HeaderSet) -> Result<ClientOperation<'_, M, T>, ObexError> {
        self.start(OperationKind::Get, headers).await
    }

    async fn start(
        &self,
        kind: OperationKind,
        headers: &HeaderSet,
    ) -> Result<ClientOperation<'_, M, T>, ObexError> {
        let seq = {
            let inner = &mut *self.inner.lock().await;
            operation::start_operation(inner, kind, headers).await?;
            inner.op_seq
        };
        Ok(ClientOperation::new(&self.inner, seq, kind))
    }

    /// Drop all session state and close the transport. Any outstanding
    /// operation and stream handles become stale; their calls fail with
    /// `OperationClosed`.
    ///
    /// # Errors
    ///
    /// Reports a transport that did not shut down cleanly.
    pub async fn close(&self) -> Result<(), ObexError> {
        let inner = &mut *self.inner.lock().await;
        inner.operation = None;
        inner.stream.set_connected(false);
        #[cfg(feature = "defmt")]
        defmt::trace!("[SESSION] closed");
        inner.stream.close_transport().await
    }

    /// Shared guards of the single-packet session exchanges.
    fn claim_session(
        &self,
        inner: &SessionInner<T>,
        headers: Option<&HeaderSet>,
    ) -> Result<(), ObexError> {
        if !inner.stream.is_connected() {
            return Err(ObexError::NotConnected);
        }
        if inner.operation.is_some() {
            return Err(ObexError::OperationInProgress);
        }
        if let Some(headers) = headers {
            if headers.owner() != HeaderOwner::ClientUser {
                return Err(ObexError::InvalidHeaders);
            }
        }
        Ok(())
    }
}
