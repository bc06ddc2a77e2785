pub mod correlation;
pub mod digest;
pub mod error;
pub mod ids;
pub mod inherit;
pub mod types;
pub mod wire;

pub use correlation::{PendingCalls, Response};
pub use digest::{Digest, DigestEngine, DigestRole, OperationDescriptor, TYPE_LIST_MEMBER};
pub use error::{DefinitionError, ErrorCode, RpcError};
pub use ids::{CallId, CallIdAllocator, ConnectionId, ObjectId, ObjectIdAllocator};
pub use types::{ModelBuilder, TypeId, TypeInfo, TypeKind, TypeModel};
pub use wire::{
    FieldBuffer, FieldKind, FieldReader, FieldValue, Frame, FrameDecodeError, Header, MalformedFrame,
    MessageKind,
};
