use std::{future::Future, io, net::SocketAddr, pin::Pin, time::Duration};

use bytes::Bytes;

use crate::{codec::FrameError, command::CommandKind, pb::MessageCode};

pub mod tcp;

pub use tcp::{TcpTransport, TcpTransportConfig};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub kind: CommandKind,
    pub code: MessageCode,
    pub payload: Bytes,
}

impl WireRequest {
    pub fn encode<M: prost::Message>(kind: CommandKind, message: &M) -> Self {
        Self {
            kind,
            code: kind.request_code(),
            payload: Bytes::from(message.encode_to_vec()),
        }
    }
}

/// A response frame as received; `code` is kept raw so that unknown codes can
/// be reported rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub code: u8,
    pub payload: Bytes,
}

impl WireResponse {
    pub fn new(code: MessageCode, payload: impl Into<Bytes>) -> Self {
        Self {
            code: code.as_u8(),
            payload: payload.into(),
        }
    }

    pub fn encode<M: prost::Message>(code: MessageCode, message: &M) -> Self {
        Self::new(code, message.encode_to_vec())
    }
}

#[derive(Debug)]
pub enum TransportError {
    Connect { addr: SocketAddr, source: io::Error },
    Timeout { after: Duration },
    Frame(FrameError),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::Timeout { .. } => true,
            Self::Frame(e) => e.is_retryable(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect { addr, source } => write!(f, "connect to {addr} failed: {source}"),
            Self::Timeout { after } => write!(f, "timed out after {}ms", after.as_millis()),
            Self::Frame(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connect { source, .. } => Some(source),
            Self::Timeout { .. } => None,
            Self::Frame(e) => Some(e),
        }
    }
}

impl From<FrameError> for TransportError {
    fn from(value: FrameError) -> Self {
        Self::Frame(value)
    }
}

/// Delivers one encoded request to a node and resolves with its response.
///
/// Implementations are shared by many in-flight commands and must do their own
/// synchronization. The returned future resolves exactly once.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: WireRequest) -> BoxFuture<'_, Result<WireResponse, TransportError>>;
}
