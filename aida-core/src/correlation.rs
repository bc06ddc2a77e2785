use crate::error::RpcError;
use crate::ids::{CallId, CallIdAllocator};
use crate::wire::Frame;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a waiting caller eventually receives.
pub type Response = Result<Frame, RpcError>;

/// Per-connection table of two-way calls awaiting a response.
///
/// Responses are matched only by correlation id. Each id is completed at
/// most once: a response for an id that already completed, timed out or was
/// never issued is dropped.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: DashMap<CallId, oneshot::Sender<Response>>,
    ids: CallIdAllocator,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a correlation id and the receiver its response arrives on.
    pub fn register(&self) -> (CallId, oneshot::Receiver<Response>) {
        let call_id = self.ids.allocate();
        let (tx, rx) = oneshot::channel();
        self.calls.insert(call_id, tx);
        (call_id, rx)
    }

    /// Deliver `response` to the caller waiting on `call_id`. Returns false
    /// when nobody was waiting.
    pub fn complete(&self, call_id: CallId, response: Response) -> bool {
        match self.calls.remove(&call_id) {
            Some((_, tx)) => {
                if tx.send(response).is_err() {
                    debug!("Caller for {} went away before its response", call_id);
                    return false;
                }
                true
            }
            None => {
                warn!("Discarding response for unknown or expired {}", call_id);
                false
            }
        }
    }

    /// Forget `call_id`, e.g. after its deadline passed.
    pub fn cancel(&self, call_id: CallId) -> bool {
        self.calls.remove(&call_id).is_some()
    }

    /// Fail every outstanding call, used when the connection goes away.
    pub fn fail_all(&self, error: &RpcError) -> usize {
        let ids: Vec<CallId> = self.calls.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for call_id in ids {
            if let Some((_, tx)) = self.calls.remove(&call_id) {
                let _ = tx.send(Err(error.clone()));
                failed += 1;
            }
        }
        if failed > 0 {
            debug!("Failed {} pending calls: {}", failed, error);
        }
        failed
    }

    pub fn contains(&self, call_id: CallId) -> bool {
        self.calls.contains_key(&call_id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
