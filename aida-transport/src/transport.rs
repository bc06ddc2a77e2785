use crate::codec::CodecError;
use aida_core::{Frame, MalformedFrame, RpcError};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec error: {0}")]
    Codec(String),
    /// The payload of one frame failed to decode. The connection is still
    /// usable.
    #[error("{0}")]
    Malformed(MalformedFrame),
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::IoError(io) => TransportError::Io(io),
            other => TransportError::Codec(other.to_string()),
        }
    }
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionClosed => RpcError::closed("connection closed"),
            TransportError::Codec(message) => RpcError::framing(message),
            TransportError::Io(io) => RpcError::closed(io.to_string()),
            TransportError::Malformed(malformed) => malformed.error,
        }
    }
}

/// A bidirectional frame connection.
#[async_trait]
pub trait RpcTransport: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;
    /// `Ok(None)` once the peer has closed the connection. A
    /// [`TransportError::Malformed`] affects only that one frame.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Write half of a split transport.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a split transport.
#[async_trait]
pub trait FrameStream: Send {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;
}

/// Transports that can be driven by separate reader and writer tasks.
pub trait SplitTransport: RpcTransport + Sized {
    type Sink: FrameSink + 'static;
    type Stream: FrameStream + 'static;

    fn into_split(self) -> (Self::Sink, Self::Stream);
}
