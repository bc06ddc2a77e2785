use aida_core::{ObjectId, ObjectIdAllocator, TypeId};
use dashmap::DashMap;
use std::any::Any;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A server-side object reachable through an object reference.
pub trait Servant: Send + Sync {
    /// Most derived interface this object implements.
    fn interface(&self) -> TypeId;

    fn as_any(&self) -> &dyn Any;
}

/// Resolves object references carried in frame headers.
pub trait ObjectBroker: Send + Sync {
    fn resolve(&self, id: ObjectId) -> Option<Arc<dyn Servant>>;

    /// Object handed out in answer to a hello request.
    fn root(&self) -> Option<ObjectId>;
}

pub struct ObjectTable {
    objects: DashMap<ObjectId, Arc<dyn Servant>>,
    ids: ObjectIdAllocator,
    root: RwLock<Option<ObjectId>>,
}

impl ObjectTable {
    pub fn new() -> Self {
        ObjectTable {
            objects: DashMap::new(),
            ids: ObjectIdAllocator::new(),
            root: RwLock::new(None),
        }
    }

    /// Store `servant` under a fresh id.
    pub fn export(&self, servant: Arc<dyn Servant>) -> ObjectId {
        let id = self.ids.allocate();
        self.objects.insert(id, servant);
        debug!("Exported {}", id);
        id
    }

    /// Export `servant` and answer hello requests with it.
    pub fn export_root(&self, servant: Arc<dyn Servant>) -> ObjectId {
        let id = self.export(servant);
        self.set_root(id);
        id
    }

    pub fn set_root(&self, id: ObjectId) {
        match self.root.write() {
            Ok(mut root) => *root = Some(id),
            Err(poisoned) => *poisoned.into_inner() = Some(id),
        }
    }

    pub fn lookup(&self, id: ObjectId) -> Option<Arc<dyn Servant>> {
        self.objects.get(&id).map(|entry| Arc::clone(&*entry))
    }

    pub fn remove(&self, id: ObjectId) -> Option<Arc<dyn Servant>> {
        self.objects.remove(&id).map(|(_, v)| v)
    }

    pub fn clear(&self) {
        self.objects.clear();
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTable")
            .field("objects", &self.objects.len())
            .field("root", &self.root())
            .finish()
    }
}

impl ObjectBroker for ObjectTable {
    fn resolve(&self, id: ObjectId) -> Option<Arc<dyn Servant>> {
        if id.is_null() {
            return None;
        }
        self.lookup(id)
    }

    fn root(&self) -> Option<ObjectId> {
        match self.root.read() {
            Ok(root) => *root,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
