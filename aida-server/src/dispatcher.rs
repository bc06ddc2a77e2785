use crate::broker::ObjectBroker;
use crate::registry::{Invocation, MethodRegistry, RegistryError, RegistryPhase};
use aida_core::{FieldBuffer, Frame, Header, MessageKind, RpcError};
use aida_transport::Peer;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Routes inbound request frames to registered handlers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    broker: Arc<dyn ObjectBroker>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<MethodRegistry>,
        broker: Arc<dyn ObjectBroker>,
    ) -> Result<Self, RegistryError> {
        if registry.phase() != RegistryPhase::Serving {
            return Err(RegistryError::NotSealed);
        }
        Ok(Dispatcher { registry, broker })
    }

    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    pub fn broker(&self) -> &Arc<dyn ObjectBroker> {
        &self.broker
    }

    /// Handle one request. Returns the response frame for two-way kinds.
    pub async fn dispatch(&self, frame: Frame) -> Option<Frame> {
        self.dispatch_from(frame, None).await
    }

    /// Like [`Dispatcher::dispatch`], handing the originating connection to
    /// the handler so it can emit signals back.
    pub async fn dispatch_from(&self, frame: Frame, peer: Option<Peer>) -> Option<Frame> {
        let (header, payload) = frame.into_parts();
        trace!("Dispatching {}", header);

        if header.kind.is_response() {
            warn!("Dropping unsolicited {} for {}", header.kind, header.call_id);
            return None;
        }

        if header.kind == MessageKind::HelloRequest {
            return Some(match self.broker.root() {
                Some(root) => {
                    let mut payload = FieldBuffer::with_capacity(1);
                    payload.push_object(root);
                    Frame::result_for(&header, payload)
                }
                None => Frame::error_for(&header, &RpcError::dispatch("no root object")),
            });
        }

        let handler = match self.registry.lookup(header.digest) {
            Ok(Some(handler)) => handler,
            Ok(None) => {
                let error = RpcError::dispatch(format!("unknown operation {}", header.digest));
                return self.fail(&header, error);
            }
            Err(e) => return self.fail(&header, RpcError::internal(e.to_string())),
        };

        let target = match self.broker.resolve(header.target) {
            Some(target) => target,
            None => {
                let error = RpcError::dispatch(format!("unresolved target {}", header.target));
                return self.fail(&header, error);
            }
        };

        let mut invocation = Invocation::new(header, payload, target);
        if let Some(peer) = peer {
            invocation = invocation.with_peer(peer);
        }

        let outcome = AssertUnwindSafe(handler.invoke(invocation))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(RpcError::internal(format!("handler panicked: {}", panic_message(&*panic))))
            });

        match outcome {
            Ok(result) => {
                if header.kind.expects_response() {
                    Some(Frame::result_for(&header, result))
                } else {
                    None
                }
            }
            Err(e) => {
                let name = self
                    .registry
                    .name_of(header.digest)
                    .unwrap_or_else(|| header.digest.to_string());
                warn!("{} failed: {}", name, e);
                self.fail(&header, e)
            }
        }
    }

    fn fail(&self, header: &Header, error: RpcError) -> Option<Frame> {
        if header.kind.expects_response() {
            debug!("Answering {} with {}", header.call_id, error);
            Some(Frame::error_for(header, &error))
        } else {
            warn!("Dropping one-way {}: {}", header.kind, error);
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish()
    }
}
