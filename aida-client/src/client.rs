use crate::handle::RemoteHandle;
use aida_core::{
    Digest, FieldBuffer, Frame, MessageKind, ObjectId, ObjectIdAllocator, RpcError,
};
use aida_transport::{FrameCodec, Peer, PeerConfig, SplitTransport, StreamTransport, DEFAULT_MAX_FRAME_SIZE};
use anyhow::Context;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of the server
    pub addr: String,
    /// Deadline for every two-way request, in milliseconds
    pub timeout_ms: u64,
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            timeout_ms: 30000,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

type Subscriptions = DashMap<ObjectId, mpsc::UnboundedSender<SignalEvent>>;

/// One connection to a server. Cheap to clone; clones share the
/// connection and its correlation table.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    peer: Peer,
    subscriptions: Arc<Subscriptions>,
    handler_ids: Arc<ObjectIdAllocator>,
}

impl Client {
    /// Connect over TCP to `config.addr`.
    pub async fn connect(config: ClientConfig) -> anyhow::Result<Self> {
        let socket = TcpStream::connect(&config.addr)
            .await
            .with_context(|| format!("Failed to connect to {}", config.addr))?;
        socket.set_nodelay(true).context("Failed to set TCP_NODELAY")?;
        let codec = FrameCodec::with_max_frame_size(config.max_frame_size);
        Ok(Self::with_transport(StreamTransport::with_codec(socket, codec), config))
    }

    pub async fn connect_to(addr: &str) -> anyhow::Result<Self> {
        let config = ClientConfig {
            addr: addr.to_string(),
            ..Default::default()
        };
        Self::connect(config).await
    }

    /// Run over an already established transport.
    pub fn with_transport<T: SplitTransport>(transport: T, config: ClientConfig) -> Self {
        let (peer, inbound) = Peer::start(transport, PeerConfig::default());
        let subscriptions = Arc::new(Subscriptions::new());
        tokio::spawn(route_inbound(inbound, peer.clone(), subscriptions.clone()));
        Client {
            config,
            peer,
            subscriptions,
            handler_ids: Arc::new(ObjectIdAllocator::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    pub fn is_closed(&self) -> bool {
        self.peer.is_closed()
    }

    /// Ask the server for its root object.
    pub async fn hello(&self) -> Result<RemoteHandle, RpcError> {
        let response = self.peer.call(Frame::hello(), self.timeout()).await?;
        let payload = response.into_result()?;
        let mut reader = payload.reader();
        let root = reader.pop_object()?;
        reader.finish()?;
        debug!("Server root is {}", root);
        Ok(RemoteHandle::new(self.clone(), root))
    }

    /// Handle for an object reference obtained out of band or from a
    /// previous result.
    pub fn handle(&self, id: ObjectId) -> RemoteHandle {
        RemoteHandle::new(self.clone(), id)
    }

    /// Two-way request of `kind`, failing with a timeout after the
    /// configured deadline. Error frames come back as `Err`.
    pub async fn request(
        &self,
        kind: MessageKind,
        target: ObjectId,
        digest: Digest,
        args: FieldBuffer,
    ) -> Result<FieldBuffer, RpcError> {
        let frame = Frame::new(aida_core::Header::new(kind, target, digest), args);
        trace!("Request {} to {}", kind, target);
        self.peer.call(frame, self.timeout()).await?.into_result()
    }

    pub async fn call(
        &self,
        target: ObjectId,
        digest: Digest,
        args: FieldBuffer,
    ) -> Result<FieldBuffer, RpcError> {
        self.request(MessageKind::TwoWayCall, target, digest, args).await
    }

    /// Fire-and-forget request of a one-way `kind`.
    pub async fn post(
        &self,
        kind: MessageKind,
        target: ObjectId,
        digest: Digest,
        args: FieldBuffer,
    ) -> Result<(), RpcError> {
        if kind.expects_response() || kind.is_response() {
            return Err(RpcError::internal(format!("{} is not a one-way kind", kind)));
        }
        let frame = Frame::new(aida_core::Header::new(kind, target, digest), args);
        self.peer.send(frame).await
    }

    /// Connect to a signal of `target`. The connector receives a fresh
    /// handler id ahead of `args`; emits addressed to that id arrive on the
    /// returned subscription.
    pub async fn subscribe(
        &self,
        target: ObjectId,
        connector: Digest,
        args: FieldBuffer,
    ) -> Result<Subscription, RpcError> {
        let handler = self.handler_ids.allocate();
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.insert(handler, tx);

        let mut payload = FieldBuffer::with_capacity(args.len() + 1);
        payload.push_object(handler);
        payload.extend(args);

        match self
            .request(MessageKind::SignalConnect, target, connector, payload)
            .await
        {
            Ok(_) => {
                debug!("Subscribed {} on {}", handler, target);
                Ok(Subscription {
                    target,
                    connector,
                    handler,
                    events: rx,
                })
            }
            Err(e) => {
                self.subscriptions.remove(&handler);
                Err(e)
            }
        }
    }

    /// Stop delivery for `subscription` and tell the server to disconnect.
    pub async fn unsubscribe(&self, subscription: Subscription) -> Result<(), RpcError> {
        self.subscriptions.remove(&subscription.handler);
        let mut payload = FieldBuffer::with_capacity(1);
        payload.push_object(subscription.handler);
        self.post(
            MessageKind::SignalDisconnect,
            subscription.target,
            subscription.connector,
            payload,
        )
        .await
    }

    pub async fn close(&self) {
        self.subscriptions.clear();
        self.peer.close().await;
    }
}

type Reply = oneshot::Sender<Result<FieldBuffer, RpcError>>;

/// One signal emit. Two-way emits carry a reply slot: the emitter waits for
/// [`SignalEvent::reply`], and dropping the event unanswered acknowledges
/// it with an empty result.
#[derive(Debug)]
pub struct SignalEvent {
    args: FieldBuffer,
    reply: Option<Reply>,
}

impl SignalEvent {
    pub fn args(&self) -> &FieldBuffer {
        &self.args
    }

    pub fn into_args(self) -> FieldBuffer {
        self.args
    }

    /// Whether the emitter is waiting for a return value.
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Answer a two-way emit. A no-op for one-way emits.
    pub fn reply(mut self, result: Result<FieldBuffer, RpcError>) {
        if let Some(reply) = self.reply.take() {
            if reply.send(result).is_err() {
                debug!("Emitter no longer waiting for reply");
            }
        }
    }
}

/// Signal emits delivered to one connected handler.
#[derive(Debug)]
pub struct Subscription {
    target: ObjectId,
    connector: Digest,
    handler: ObjectId,
    events: mpsc::UnboundedReceiver<SignalEvent>,
}

impl Subscription {
    pub fn handler(&self) -> ObjectId {
        self.handler
    }

    /// Next emit, or `None` once the connection closes.
    pub async fn next(&mut self) -> Option<SignalEvent> {
        self.events.recv().await
    }
}

async fn route_inbound(
    mut inbound: mpsc::Receiver<Frame>,
    peer: Peer,
    subscriptions: Arc<Subscriptions>,
) {
    while let Some(frame) = inbound.recv().await {
        let (header, payload) = frame.into_parts();
        let sender = match header.kind {
            MessageKind::SignalEmit | MessageKind::SignalEmitTwoWay => {
                subscriptions.get(&header.target).map(|entry| entry.value().clone())
            }
            _ => None,
        };

        let (reply, answer) = if header.kind.expects_response() {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let event = SignalEvent {
            args: payload,
            reply,
        };
        let delivered = match sender {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        };

        if !delivered {
            warn!("Dropping {} for {}", header.kind, header.target);
        }
        let Some(answer) = answer else {
            continue;
        };
        if !delivered {
            let response = Frame::error_for(&header, &RpcError::dispatch("no such handler"));
            if let Err(e) = peer.send(response).await {
                debug!("Emit refusal dropped: {}", e);
            }
            continue;
        }

        // the subscriber may take its time; keep routing meanwhile
        let peer = peer.clone();
        tokio::spawn(async move {
            let response = match answer.await {
                Ok(Ok(result)) => Frame::result_for(&header, result),
                Ok(Err(error)) => Frame::error_for(&header, &error),
                Err(_) => Frame::result_for(&header, FieldBuffer::new()),
            };
            if let Err(e) = peer.send(response).await {
                debug!("Emit reply dropped: {}", e);
            }
        });
    }
    subscriptions.clear();
}
