use crate::client::{Client, Subscription};
use aida_core::inherit::{can_narrow, decode_type_list};
use aida_core::{Digest, DigestEngine, FieldBuffer, MessageKind, ModelBuilder, ObjectId, RpcError};
use std::sync::OnceLock;
use tracing::debug;

/// Digest of the type-list query. It only depends on the built-in
/// implicit base, so every model agrees on it.
pub fn type_list_digest() -> Result<Digest, RpcError> {
    static DIGEST: OnceLock<Digest> = OnceLock::new();
    if let Some(digest) = DIGEST.get() {
        return Ok(*digest);
    }
    let model = ModelBuilder::new()
        .finish()
        .map_err(|e| RpcError::internal(e.to_string()))?;
    Ok(*DIGEST.get_or_init(|| DigestEngine::new(&model).type_list()))
}

/// Client-side reference to a remote object.
#[derive(Debug, Clone)]
pub struct RemoteHandle {
    client: Client,
    id: ObjectId,
    interface: Option<Digest>,
}

impl RemoteHandle {
    pub(crate) fn new(client: Client, id: ObjectId) -> Self {
        RemoteHandle {
            client,
            id,
            interface: None,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Type identity digest this handle was narrowed to, if any.
    pub fn interface(&self) -> Option<Digest> {
        self.interface
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Type identity digests the object reports: its interface, every
    /// ancestor, then the implicit base.
    pub async fn type_list(&self) -> Result<Vec<Digest>, RpcError> {
        let payload = self
            .client
            .request(
                MessageKind::TypeListQuery,
                self.id,
                type_list_digest()?,
                FieldBuffer::new(),
            )
            .await?;
        let mut reader = payload.reader();
        let digests = decode_type_list(&mut reader)?;
        reader.finish()?;
        Ok(digests)
    }

    /// View this object as the interface with type identity `target`, if
    /// the object implements it.
    pub async fn narrow(&self, target: Digest) -> Result<Option<RemoteHandle>, RpcError> {
        let types = self.type_list().await?;
        if !can_narrow(&types, target) {
            debug!("{} does not implement {}", self.id, target);
            return Ok(None);
        }
        Ok(Some(RemoteHandle {
            client: self.client.clone(),
            id: self.id,
            interface: Some(target),
        }))
    }

    pub async fn call(&self, digest: Digest, args: FieldBuffer) -> Result<FieldBuffer, RpcError> {
        self.client.call(self.id, digest, args).await
    }

    /// One-way method call.
    pub async fn post(&self, digest: Digest, args: FieldBuffer) -> Result<(), RpcError> {
        self.client
            .post(MessageKind::OneWayCall, self.id, digest, args)
            .await
    }

    pub async fn get(&self, getter: Digest) -> Result<FieldBuffer, RpcError> {
        self.client
            .request(MessageKind::PropertyGet, self.id, getter, FieldBuffer::new())
            .await
    }

    pub async fn set(&self, setter: Digest, value: FieldBuffer) -> Result<(), RpcError> {
        self.client
            .post(MessageKind::PropertySet, self.id, setter, value)
            .await
    }

    pub async fn subscribe(
        &self,
        connector: Digest,
        args: FieldBuffer,
    ) -> Result<Subscription, RpcError> {
        self.client.subscribe(self.id, connector, args).await
    }
}
