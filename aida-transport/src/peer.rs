use crate::transport::{FrameSink, FrameStream, SplitTransport, TransportError};
use aida_core::{ConnectionId, Frame, MalformedFrame, PendingCalls, RpcError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub connection: ConnectionId,
    /// Requests and emits buffered before the reader waits on the consumer.
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            connection: ConnectionId::default(),
            inbound_capacity: 256,
            outbound_capacity: 256,
        }
    }
}

enum Outbound {
    Frame(Frame),
    Close,
}

#[derive(Debug)]
struct PeerShared {
    pending: PendingCalls,
    closed: AtomicBool,
    connection: ConnectionId,
}

impl PeerShared {
    fn shut_down(&self, reason: &str) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("{} closed: {}", self.connection, reason);
        }
        self.pending.fail_all(&RpcError::closed(reason));
    }
}

/// One end of a connection. A writer task drains outbound frames into the
/// transport and a reader task routes inbound frames: responses complete
/// pending calls by correlation id, everything else goes to the inbound
/// channel returned from [`Peer::start`].
#[derive(Debug, Clone)]
pub struct Peer {
    outbound: mpsc::Sender<Outbound>,
    shared: Arc<PeerShared>,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outbound::Frame(frame) => write!(f, "Frame({})", frame.header()),
            Outbound::Close => f.write_str("Close"),
        }
    }
}

impl Peer {
    pub fn start<T: SplitTransport>(transport: T, config: PeerConfig) -> (Peer, mpsc::Receiver<Frame>) {
        let (sink, stream) = transport.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));

        let shared = Arc::new(PeerShared {
            pending: PendingCalls::new(),
            closed: AtomicBool::new(false),
            connection: config.connection,
        });

        tokio::spawn(write_loop(sink, outbound_rx, shared.clone()));
        tokio::spawn(read_loop(stream, inbound_tx, outbound_tx.downgrade(), shared.clone()));

        (
            Peer {
                outbound: outbound_tx,
                shared,
            },
            inbound_rx,
        )
    }

    pub fn connection(&self) -> ConnectionId {
        self.shared.connection
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }

    /// Send a frame that expects no response: one-way calls, emits, and
    /// responses to the peer's own requests.
    pub async fn send(&self, mut frame: Frame) -> Result<(), RpcError> {
        if self.is_closed() {
            return Err(RpcError::closed("connection closed"));
        }
        frame.header_mut().connection = self.shared.connection;
        self.outbound
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| RpcError::closed("connection closed"))
    }

    /// Issue a two-way request and wait up to `deadline` for its response.
    ///
    /// The returned frame is either a call result or an error frame; see
    /// [`Frame::into_result`]. On timeout the correlation entry is dropped,
    /// so a late response is discarded.
    pub async fn call(&self, mut frame: Frame, deadline: Duration) -> Result<Frame, RpcError> {
        if !frame.kind().expects_response() {
            return Err(RpcError::internal(format!(
                "{} does not expect a response",
                frame.kind()
            )));
        }

        let (call_id, rx) = self.shared.pending.register();
        frame.set_call_id(call_id);
        trace!("Calling {} as {}", frame.header(), call_id);

        if let Err(e) = self.send(frame).await {
            self.shared.pending.cancel(call_id);
            return Err(e);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => Err(RpcError::closed("connection closed")),
            Err(_) => {
                self.shared.pending.cancel(call_id);
                debug!("{} timed out after {:?}", call_id, deadline);
                Err(RpcError::timeout(format!(
                    "no response within {} ms",
                    deadline.as_millis()
                )))
            }
        }
    }

    /// Flush queued frames, close the transport and fail pending calls.
    pub async fn close(&self) {
        let _ = self.outbound.send(Outbound::Close).await;
        self.shared.shut_down("closed locally");
    }
}

async fn write_loop<S: FrameSink>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Outbound>,
    shared: Arc<PeerShared>,
) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Frame(frame) => {
                if let Err(e) = sink.send(frame).await {
                    warn!("{} send failed: {}", shared.connection, e);
                    shared.shut_down("send failed");
                    return;
                }
            }
            Outbound::Close => break,
        }
    }
    if let Err(e) = sink.close().await {
        debug!("{} close failed: {}", shared.connection, e);
    }
}

async fn read_loop<S: FrameStream>(
    mut stream: S,
    inbound: mpsc::Sender<Frame>,
    outbound: mpsc::WeakSender<Outbound>,
    shared: Arc<PeerShared>,
) {
    loop {
        match stream.recv().await {
            Ok(Some(frame)) => {
                if frame.kind().is_response() {
                    shared.pending.complete(frame.call_id(), Ok(frame));
                } else if inbound.send(frame).await.is_err() {
                    debug!("{} inbound receiver dropped, discarding frame", shared.connection);
                }
            }
            Ok(None) => {
                shared.shut_down("connection closed by peer");
                break;
            }
            Err(TransportError::Malformed(malformed)) => {
                reject_malformed(malformed, &outbound, &shared).await;
            }
            Err(e) => {
                warn!("{} receive failed: {}", shared.connection, e);
                shared.shut_down("receive failed");
                break;
            }
        }
    }
}

/// A frame whose header decoded but whose payload did not. Responses fail
/// the pending call, requests get an error frame back, anything else is
/// dropped. The connection stays open.
async fn reject_malformed(
    malformed: MalformedFrame,
    outbound: &mpsc::WeakSender<Outbound>,
    shared: &PeerShared,
) {
    let MalformedFrame { mut header, error } = malformed;
    warn!("{} {}: {}", shared.connection, header, error);

    if header.kind.is_response() {
        shared.pending.complete(header.call_id, Err(error));
    } else if header.kind.expects_response() {
        header.connection = shared.connection;
        let reply = Frame::error_for(&header, &error);
        match outbound.upgrade() {
            Some(tx) => {
                if tx.send(Outbound::Frame(reply)).await.is_err() {
                    debug!("{} writer gone, cannot reject {}", shared.connection, header);
                }
            }
            None => debug!("{} writer gone, cannot reject {}", shared.connection, header),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameCodec;
    use crate::memory::memory_pair;
    use crate::stream::StreamTransport;
    use crate::transport::RpcTransport;
    use aida_core::{CallId, Digest, ErrorCode, FieldBuffer, MessageKind, ObjectId};
    use bytes::BytesMut;
    use futures::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_util::codec::{Encoder, Framed};

    #[tokio::test]
    async fn test_one_way_send_is_delivered_inbound() {
        let (left, right) = memory_pair();
        let (peer, _) = Peer::start(left, PeerConfig::default());
        let (_other, mut inbound) = Peer::start(right, PeerConfig::default());

        peer.send(Frame::request(MessageKind::SignalEmit, ObjectId::new(2), Digest::new(1, 1)))
            .await
            .unwrap();
        let frame = inbound.recv().await.unwrap();
        assert_eq!(frame.kind(), MessageKind::SignalEmit);
    }

    #[tokio::test]
    async fn test_call_rejects_one_way_kind() {
        let (left, _right) = memory_pair();
        let (peer, _) = Peer::start(left, PeerConfig::default());
        let err = peer
            .call(
                Frame::request(MessageKind::OneWayCall, ObjectId::new(1), Digest::default()),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Internal);
    }

    fn corrupt_last_byte(frame: Frame) -> Vec<u8> {
        let mut codec = FrameCodec::new();
        let mut bytes = BytesMut::new();
        codec.encode(frame, &mut bytes).unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 0xff;
        bytes.to_vec()
    }

    #[tokio::test]
    async fn test_bad_response_fails_only_its_call() {
        let (local, remote) = tokio::io::duplex(4096);
        let (peer, _) = Peer::start(StreamTransport::new(local), PeerConfig::default());
        let mut remote = Framed::new(remote, FrameCodec::new());

        let caller = peer.clone();
        let call = tokio::spawn(async move { caller.call(Frame::hello(), Duration::from_secs(5)).await });

        let request = remote.next().await.unwrap().unwrap().unwrap();
        let mut payload = FieldBuffer::new();
        payload.push_string("x");
        let bytes = corrupt_last_byte(Frame::result_for(request.header(), payload));
        remote.get_mut().write_all(&bytes).await.unwrap();

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::Framing);
        assert!(!peer.is_closed());

        // the connection still carries the next call
        let caller = peer.clone();
        let call = tokio::spawn(async move { caller.call(Frame::hello(), Duration::from_secs(5)).await });
        let request = remote.next().await.unwrap().unwrap().unwrap();
        let mut payload = FieldBuffer::new();
        payload.push_int(3);
        remote.send(Frame::result_for(request.header(), payload)).await.unwrap();
        let result = call.await.unwrap().unwrap().into_result().unwrap();
        assert_eq!(result.reader().pop_int().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_bad_request_is_answered_with_error() {
        let (local, remote) = tokio::io::duplex(4096);
        let (_peer, mut inbound) = Peer::start(StreamTransport::new(local), PeerConfig::default());
        let mut remote = Framed::new(remote, FrameCodec::new());

        let mut request = Frame::request(MessageKind::TwoWayCall, ObjectId::new(1), Digest::new(4, 5));
        request.set_call_id(CallId::new(42));
        request.payload_mut().push_string("x");
        remote.get_mut().write_all(&corrupt_last_byte(request)).await.unwrap();

        let reply = remote.next().await.unwrap().unwrap().unwrap();
        assert_eq!(reply.kind(), MessageKind::Error);
        assert_eq!(reply.call_id(), CallId::new(42));
        let err = reply.into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::Remote);
        assert_eq!(err.wire_domain(), "framing");
        assert!(inbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remote_close_fails_pending_calls() {
        let (left, mut right) = memory_pair();
        let (peer, _) = Peer::start(left, PeerConfig::default());

        let caller = peer.clone();
        let call = tokio::spawn(async move {
            caller
                .call(Frame::hello(), Duration::from_secs(5))
                .await
        });

        assert!(right.recv().await.unwrap().is_some());
        right.close().await.unwrap();
        drop(right);

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.code, ErrorCode::Closed);
        assert!(peer.is_closed());
        assert_eq!(peer.pending_calls(), 0);
    }
}
