use crate::broker::Servant;
use aida_core::{
    inherit, DefinitionError, Digest, DigestEngine, DigestRole, FieldBuffer, FieldReader, Header,
    RpcError, TypeId, TypeModel,
};
use aida_transport::Peer;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("digest {digest} registered twice: {existing} and {incoming}")]
    DigestCollision {
        digest: Digest,
        existing: String,
        incoming: String,
    },
    #[error("registry is sealed")]
    Sealed,
    #[error("registry is still collecting handlers")]
    NotSealed,
    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryPhase {
    Collecting,
    Serving,
}

/// Everything a handler sees of one inbound request.
pub struct Invocation {
    header: Header,
    payload: FieldBuffer,
    target: Arc<dyn Servant>,
    peer: Option<Peer>,
}

impl Invocation {
    pub fn new(header: Header, payload: FieldBuffer, target: Arc<dyn Servant>) -> Self {
        Invocation {
            header,
            payload,
            target,
            peer: None,
        }
    }

    pub fn with_peer(mut self, peer: Peer) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Reader positioned on the first argument.
    pub fn args(&self) -> FieldReader<'_> {
        self.payload.reader()
    }

    pub fn target(&self) -> &Arc<dyn Servant> {
        &self.target
    }

    /// Downcast the target to its concrete servant type.
    pub fn servant<T: Servant + 'static>(&self) -> Option<&T> {
        self.target.as_any().downcast_ref::<T>()
    }

    /// Connection the request arrived on; absent when dispatched directly.
    pub fn peer(&self) -> Option<&Peer> {
        self.peer.as_ref()
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("header", &self.header)
            .field("payload", &self.payload.len())
            .field("target", &self.target.interface())
            .finish()
    }
}

#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn invoke(&self, invocation: Invocation) -> Result<FieldBuffer, RpcError>;
}

#[async_trait]
impl<F, Fut> MethodHandler for F
where
    F: Fn(Invocation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FieldBuffer, RpcError>> + Send + 'static,
{
    async fn invoke(&self, invocation: Invocation) -> Result<FieldBuffer, RpcError> {
        (self)(invocation).await
    }
}

#[derive(Clone)]
struct Registered {
    name: String,
    handler: Arc<dyn MethodHandler>,
}

/// Handler table keyed by operation digest.
///
/// Handlers are added while collecting; [`MethodRegistry::seal`] freezes
/// the table and lookups are only answered after that.
///
/// Registrations hold `phase` shared and sealing holds it exclusively, so
/// a registration that returns `Ok` is always in the sealed table.
pub struct MethodRegistry {
    phase: RwLock<RegistryPhase>,
    collecting: DashMap<Digest, Registered>,
    serving: OnceLock<HashMap<Digest, Registered>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        MethodRegistry {
            phase: RwLock::new(RegistryPhase::Collecting),
            collecting: DashMap::new(),
            serving: OnceLock::new(),
        }
    }

    pub fn phase(&self) -> RegistryPhase {
        *self.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(
        &self,
        digest: Digest,
        name: impl Into<String>,
        handler: Arc<dyn MethodHandler>,
    ) -> Result<(), RegistryError> {
        let phase = self.phase.read().unwrap_or_else(PoisonError::into_inner);
        if *phase == RegistryPhase::Serving {
            return Err(RegistryError::Sealed);
        }
        let name = name.into();
        match self.collecting.entry(digest) {
            Entry::Occupied(existing) => Err(RegistryError::DigestCollision {
                digest,
                existing: existing.get().name.clone(),
                incoming: name,
            }),
            Entry::Vacant(slot) => {
                debug!("Registered {} as {}", name, digest);
                slot.insert(Registered { name, handler });
                Ok(())
            }
        }
    }

    /// Register the shared type-list query. The answer is the ancestry
    /// of whatever servant the request targets, as a sequence of
    /// `{hi, lo}` records.
    pub fn register_type_list(&self, model: Arc<TypeModel>) -> Result<Digest, RegistryError> {
        let digest = DigestEngine::new(&model).type_list();
        let handler = move |invocation: Invocation| {
            let model = model.clone();
            async move {
                let digests = inherit::type_list(&model, invocation.target().interface())
                    .map_err(|e| RpcError::internal(e.to_string()))?;
                let mut payload = FieldBuffer::new();
                payload.push_sequence(inherit::encode_type_list(&digests));
                Ok::<_, RpcError>(payload)
            }
        };
        self.register(digest, "type list", Arc::new(handler))?;
        Ok(digest)
    }

    /// Register one member of `iface` under its computed digest.
    pub fn register_member(
        &self,
        model: &TypeModel,
        iface: TypeId,
        role: DigestRole,
        member: &str,
        handler: Arc<dyn MethodHandler>,
    ) -> Result<Digest, RegistryError> {
        let engine = DigestEngine::new(model);
        let digest = match role {
            DigestRole::Call => engine.method(iface, member)?,
            DigestRole::Get => engine.getter(iface, member)?,
            DigestRole::Set => engine.setter(iface, member)?,
            DigestRole::Connect => engine.signal_connector(iface, member)?,
            DigestRole::TypeList => engine.type_list(),
        };
        let name = format!(
            "{}.{} ({})",
            model.type_info(iface).qualified_name(),
            member,
            role
        );
        self.register(digest, name, handler)?;
        Ok(digest)
    }

    pub fn register_interface<'a, I>(
        &self,
        model: &TypeModel,
        iface: TypeId,
        handlers: I,
    ) -> Result<Vec<Digest>, RegistryError>
    where
        I: IntoIterator<Item = (DigestRole, &'a str, Arc<dyn MethodHandler>)>,
    {
        handlers
            .into_iter()
            .map(|(role, member, handler)| self.register_member(model, iface, role, member, handler))
            .collect()
    }

    /// Freeze the table. Returns the number of registered operations.
    pub fn seal(&self) -> Result<usize, RegistryError> {
        let mut phase = self.phase.write().unwrap_or_else(PoisonError::into_inner);
        if *phase == RegistryPhase::Serving {
            return Err(RegistryError::Sealed);
        }
        let table: HashMap<Digest, Registered> = self
            .collecting
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        let count = table.len();
        self.serving
            .set(table)
            .map_err(|_| RegistryError::Sealed)?;
        self.collecting.clear();
        *phase = RegistryPhase::Serving;
        info!("Method registry sealed with {} operations", count);
        Ok(count)
    }

    pub fn lookup(&self, digest: Digest) -> Result<Option<Arc<dyn MethodHandler>>, RegistryError> {
        let table = self.serving.get().ok_or(RegistryError::NotSealed)?;
        Ok(table.get(&digest).map(|entry| entry.handler.clone()))
    }

    /// Registered name of an operation, for logs.
    pub fn name_of(&self, digest: Digest) -> Option<String> {
        match self.serving.get() {
            Some(table) => table.get(&digest).map(|entry| entry.name.clone()),
            None => self.collecting.get(&digest).map(|entry| entry.name.clone()),
        }
    }

    pub fn len(&self) -> usize {
        match self.serving.get() {
            Some(table) => table.len(),
            None => self.collecting.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("phase", &self.phase())
            .field("operations", &self.len())
            .finish()
    }
}
