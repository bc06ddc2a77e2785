pub mod field;
pub mod frame;
pub mod header;
pub mod value;

pub use field::{AnyCodec, FieldBuffer, FieldKind, FieldReader, FieldValue, OpaqueAny, MAX_NESTING};
pub use frame::{Frame, FrameDecodeError, MalformedFrame};
pub use header::{Header, MessageKind, HEADER_FIELDS};
pub use value::{Value, ValueCodec};
