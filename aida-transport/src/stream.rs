use crate::codec::FrameCodec;
use crate::transport::{FrameSink, FrameStream, RpcTransport, SplitTransport, TransportError};
use aida_core::Frame;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::codec::{Framed, FramedRead, FramedWrite};

/// Frames over any async byte stream: TCP sockets, Unix sockets, duplex
/// pipes.
#[derive(Debug)]
pub struct StreamTransport<S> {
    framed: Framed<S, FrameCodec>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(stream: S) -> Self {
        Self::with_codec(stream, FrameCodec::new())
    }

    pub fn with_codec(stream: S, codec: FrameCodec) -> Self {
        StreamTransport {
            framed: Framed::new(stream, codec),
        }
    }

    pub fn get_ref(&self) -> &S {
        self.framed.get_ref()
    }
}

#[async_trait]
impl<S> RpcTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.framed.send(frame).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.framed.next().await {
            Some(Ok(Ok(frame))) => Ok(Some(frame)),
            Some(Ok(Err(malformed))) => Err(TransportError::Malformed(malformed)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::<Frame>::close(&mut self.framed).await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct StreamSink<S> {
    inner: FramedWrite<WriteHalf<S>, FrameCodec>,
}

#[derive(Debug)]
pub struct StreamSource<S> {
    inner: FramedRead<ReadHalf<S>, FrameCodec>,
}

impl<S> SplitTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Sink = StreamSink<S>;
    type Stream = StreamSource<S>;

    fn into_split(self) -> (Self::Sink, Self::Stream) {
        let parts = self.framed.into_parts();
        let codec = parts.codec;
        let (read, write) = tokio::io::split(parts.io);
        let mut reader = FramedRead::new(read, codec.clone());
        // keep bytes the combined transport already buffered
        reader.read_buffer_mut().extend_from_slice(&parts.read_buf);
        (
            StreamSink {
                inner: FramedWrite::new(write, codec),
            },
            StreamSource { inner: reader },
        )
    }
}

#[async_trait]
impl<S> FrameSink for StreamSink<S>
where
    S: AsyncWrite + Send + 'static,
{
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.inner.send(frame).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::<Frame>::close(&mut self.inner).await?;
        Ok(())
    }
}

#[async_trait]
impl<S> FrameStream for StreamSource<S>
where
    S: AsyncRead + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.inner.next().await {
            Some(Ok(Ok(frame))) => Ok(Some(frame)),
            Some(Ok(Err(malformed))) => Err(TransportError::Malformed(malformed)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aida_core::{Digest, MessageKind, ObjectId};

    #[tokio::test]
    async fn test_duplex_round_trip() {
        let (a, b) = tokio::io::duplex(1024);
        let mut left = StreamTransport::new(a);
        let mut right = StreamTransport::new(b);

        let mut frame = Frame::request(MessageKind::SignalEmit, ObjectId::new(3), Digest::new(4, 5));
        frame.payload_mut().push_float(0.5);
        left.send(frame.clone()).await.unwrap();

        assert_eq!(right.recv().await.unwrap(), Some(frame));

        left.close().await.unwrap();
        drop(left);
        assert_eq!(right.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_halves() {
        let (a, b) = tokio::io::duplex(1024);
        let (mut sink, _) = StreamTransport::new(a).into_split();
        let (_, mut stream) = StreamTransport::new(b).into_split();

        for id in 1..=3u64 {
            sink.send(Frame::request(MessageKind::OneWayCall, ObjectId::new(id), Digest::default()))
                .await
                .unwrap();
        }
        for id in 1..=3u64 {
            let frame = stream.recv().await.unwrap().unwrap();
            assert_eq!(frame.target(), ObjectId::new(id));
        }
    }
}
