//! OBEX Client
//!
//! This module provides the client side of the OBEX protocol: a session that
//! owns the transport and runs CONNECT/DISCONNECT/SETPATH exchanges, and the
//! PUT/GET operation machinery with its streaming object transfer.

pub mod operation;
pub mod session;

// Re-export commonly used types
pub use operation::{ClientOperation, GetInputStream, PutOutputStream};
pub use session::ClientSession;

use crate::packet::OpCode;

/// Transfer direction of an object exchange operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperationKind {
    /// Push an object to the server
    Put,
    /// Pull an object from the server
    Get,
}

impl OperationKind {
    pub(crate) const fn opcode(self) -> OpCode {
        match self {
            Self::Put => OpCode::Put,
            Self::Get => OpCode::Get,
        }
    }
}
