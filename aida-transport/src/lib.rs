pub mod codec;
pub mod memory;
pub mod peer;
pub mod stream;
pub mod transport;

pub use codec::{CodecError, FrameCodec, DEFAULT_MAX_FRAME_SIZE};
pub use memory::{memory_pair, MemoryTransport};
pub use peer::{Peer, PeerConfig};
pub use stream::StreamTransport;
pub use transport::{FrameSink, FrameStream, RpcTransport, SplitTransport, TransportError};
