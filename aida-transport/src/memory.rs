use crate::codec::DEFAULT_MAX_FRAME_SIZE;
use crate::transport::{FrameSink, FrameStream, RpcTransport, SplitTransport, TransportError};
use aida_core::{Frame, FrameDecodeError};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Two connected in-process endpoints. Frames are still encoded to bytes
/// and decoded on the other side.
pub fn memory_pair() -> (MemoryTransport, MemoryTransport) {
    let (left_tx, right_rx) = mpsc::unbounded_channel();
    let (right_tx, left_rx) = mpsc::unbounded_channel();
    (
        MemoryTransport::new(left_tx, left_rx),
        MemoryTransport::new(right_tx, right_rx),
    )
}

#[derive(Debug)]
pub struct MemoryTransport {
    sink: MemorySink,
    stream: MemoryStream,
}

impl MemoryTransport {
    fn new(tx: mpsc::UnboundedSender<Bytes>, rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        MemoryTransport {
            sink: MemorySink { tx: Some(tx) },
            stream: MemoryStream { rx },
        }
    }
}

#[async_trait]
impl RpcTransport for MemoryTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.sink.send(frame).await
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        self.stream.recv().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.close().await
    }
}

impl SplitTransport for MemoryTransport {
    type Sink = MemorySink;
    type Stream = MemoryStream;

    fn into_split(self) -> (Self::Sink, Self::Stream) {
        (self.sink, self.stream)
    }
}

#[derive(Debug)]
pub struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
}

#[derive(Debug)]
pub struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        let bytes = frame.encode();
        if bytes.len() > DEFAULT_MAX_FRAME_SIZE {
            return Err(TransportError::Codec(format!(
                "Frame too large: {} bytes",
                bytes.len()
            )));
        }
        tx.send(bytes).map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.rx.recv().await {
            Some(bytes) => match Frame::decode_header_first(&bytes) {
                Ok(frame) => Ok(Some(frame)),
                Err(FrameDecodeError::Payload(malformed)) => {
                    Err(TransportError::Malformed(malformed))
                }
                Err(FrameDecodeError::Header(e)) => Err(TransportError::Codec(e.message)),
            },
            None => Ok(None),
        }
    }
}
