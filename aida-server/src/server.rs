use crate::dispatcher::Dispatcher;
use aida_core::ConnectionId;
use aida_transport::{FrameCodec, Peer, PeerConfig, SplitTransport, StreamTransport, DEFAULT_MAX_FRAME_SIZE};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU16, Ordering};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pause after a failed accept, so a persistent error such as running out
/// of file descriptors does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Requests dispatched concurrently across all connections.
    pub max_in_flight: usize,
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8080,
            host: "127.0.0.1".to_string(),
            max_in_flight: 64,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Accepts connections and serves each with its own [`Peer`]. Every
/// inbound request runs on its own task, so one slow or failing handler
/// never holds up the connection.
#[derive(Debug, Clone)]
pub struct Server {
    config: ServerConfig,
    dispatcher: Dispatcher,
    in_flight: Arc<Semaphore>,
    connections: Arc<AtomicU16>,
}

impl Server {
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Server {
            config,
            dispatcher,
            in_flight,
            connections: Arc::new(AtomicU16::new(1)),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Aida server listening on {}", listener.local_addr()?);
        self.run_on(listener).await
    }

    /// Serve connections from an already bound listener. A failed accept
    /// is logged and the loop keeps going.
    pub async fn run_on(self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            if self.accepted(listener.accept().await).is_none() {
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    fn accepted(&self, accept: io::Result<(TcpStream, SocketAddr)>) -> Option<ConnectionId> {
        let (socket, remote) = match accept {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                return None;
            }
        };
        if let Err(e) = socket.set_nodelay(true) {
            debug!("set_nodelay failed for {}: {}", remote, e);
        }
        let codec = FrameCodec::with_max_frame_size(self.config.max_frame_size);
        let (connection, _) = self.serve(StreamTransport::with_codec(socket, codec));
        info!("Accepted {} from {}", connection, remote);
        Some(connection)
    }

    /// Serve one already established connection until it closes.
    pub fn serve<T: SplitTransport>(&self, transport: T) -> (ConnectionId, JoinHandle<()>) {
        let connection = ConnectionId::new(self.connections.fetch_add(1, Ordering::Relaxed));
        let config = PeerConfig {
            connection,
            ..PeerConfig::default()
        };
        let (peer, mut inbound) = Peer::start(transport, config);
        let dispatcher = self.dispatcher.clone();
        let in_flight = self.in_flight.clone();

        let handle = tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                let permit = match in_flight.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let dispatcher = dispatcher.clone();
                let peer = peer.clone();
                tokio::spawn(async move {
                    if let Some(response) = dispatcher.dispatch_from(frame, Some(peer.clone())).await {
                        if let Err(e) = peer.send(response).await {
                            warn!("{} response dropped: {}", peer.connection(), e);
                        }
                    }
                    drop(permit);
                });
            }
            info!("{} closed", connection);
        });
        (connection, handle)
    }
}
