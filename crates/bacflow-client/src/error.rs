use bacflow_core::types::{ErrorClass, ErrorCode};
use bacflow_core::{DecodeError, EncodeError, MalformedFrame};
use bacflow_datalink::DataLinkError;
use core::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    MalformedFrame(#[from] MalformedFrame),
    #[error("all 256 invoke IDs are outstanding")]
    TableExhausted,
    #[error("request timed out")]
    Timeout,
    #[error("remote rejected the request: {0}")]
    RemoteRejected(Rejection),
    #[error("remote abort reason {reason} (server={server})")]
    RemoteAborted { reason: u8, server: bool },
    #[error("session is not connected")]
    NotConnected,
    #[error("session is closing")]
    Closing,
    #[error("datalink error: {0}")]
    DataLink(#[from] DataLinkError),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("priority {0} is outside 1..=16")]
    InvalidPriority(u8),
    #[error("unexpected response")]
    UnexpectedResponse,
    #[error("remote answered with a segmented response")]
    SegmentationNotSupported,
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("transaction table: {0}")]
    Table(TableError),
}

impl From<TableError> for ClientError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::Exhausted => Self::TableExhausted,
            other => Self::Table(other),
        }
    }
}

/// A definitive negative answer from the remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Rejection {
    /// Error PDU.
    Error { class: ErrorClass, code: ErrorCode },
    /// Reject PDU.
    Reject { reason: u8 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error { class, code } => write!(f, "error class {class:?}, code {code:?}"),
            Self::Reject { reason } => write!(f, "reject reason {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("all 256 invoke IDs are outstanding")]
    Exhausted,
    #[error("no outstanding transaction with invoke ID {0}")]
    NotFound(u8),
    #[error("invoke ID {0} is already outstanding")]
    InvokeIdInUse(u8),
}
