use super::field::{decode_split, FieldBuffer, FieldReader};
use super::header::{Header, MessageKind, HEADER_FIELDS};
use crate::digest::Digest;
use crate::error::RpcError;
use crate::ids::{CallId, ObjectId};
use bytes::Bytes;
use std::fmt;

/// A frame whose header decoded but whose payload did not.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedFrame {
    pub header: Header,
    pub error: RpcError,
}

impl fmt::Display for MalformedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed payload in {}: {}", self.header, self.error)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameDecodeError {
    /// Nothing in the frame can be trusted, not even its call id.
    #[error("malformed frame header: {0}")]
    Header(RpcError),
    #[error("{0}")]
    Payload(MalformedFrame),
}

impl FrameDecodeError {
    pub fn into_error(self) -> RpcError {
        match self {
            FrameDecodeError::Header(error) => error,
            FrameDecodeError::Payload(malformed) => malformed.error,
        }
    }
}

/// One protocol message: a [`Header`] followed by the operation's payload
/// fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    header: Header,
    payload: FieldBuffer,
}

impl Frame {
    pub fn new(header: Header, payload: FieldBuffer) -> Self {
        Frame { header, payload }
    }

    pub fn request(kind: MessageKind, target: ObjectId, digest: Digest) -> Self {
        Frame::new(Header::new(kind, target, digest), FieldBuffer::new())
    }

    /// Bootstrap request for the peer's root object.
    pub fn hello() -> Self {
        Frame::request(MessageKind::HelloRequest, ObjectId::NULL, Digest::default())
    }

    /// Successful answer to `request`, carrying `payload`.
    pub fn result_for(request: &Header, payload: FieldBuffer) -> Self {
        Frame::new(request.response(MessageKind::CallResult), payload)
    }

    /// Error answer to `request`: the error domain, then its message.
    pub fn error_for(request: &Header, error: &RpcError) -> Self {
        let mut payload = FieldBuffer::with_capacity(2);
        payload
            .push_string(error.wire_domain())
            .push_string(error.message.clone());
        Frame::new(request.response(MessageKind::Error), payload)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn kind(&self) -> MessageKind {
        self.header.kind
    }

    pub fn target(&self) -> ObjectId {
        self.header.target
    }

    pub fn digest(&self) -> Digest {
        self.header.digest
    }

    pub fn call_id(&self) -> CallId {
        self.header.call_id
    }

    pub fn set_call_id(&mut self, call_id: CallId) {
        self.header.call_id = call_id;
    }

    pub fn payload(&self) -> &FieldBuffer {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut FieldBuffer {
        &mut self.payload
    }

    /// Reader positioned right after the header.
    pub fn args(&self) -> FieldReader<'_> {
        self.payload.reader()
    }

    pub fn into_parts(self) -> (Header, FieldBuffer) {
        (self.header, self.payload)
    }

    /// Header and payload as one flat field list.
    pub fn to_buffer(&self) -> FieldBuffer {
        let mut buffer = FieldBuffer::with_capacity(HEADER_FIELDS + self.payload.len());
        self.header.write(&mut buffer);
        buffer.extend(self.payload.clone());
        buffer
    }

    pub fn from_buffer(buffer: FieldBuffer) -> Result<Self, RpcError> {
        let header = Header::read(&mut buffer.reader())?;
        let payload: Vec<_> = buffer.into_fields().into_iter().skip(HEADER_FIELDS).collect();
        Ok(Frame::new(header, payload.into()))
    }

    pub fn encode(&self) -> Bytes {
        self.to_buffer().encode()
    }

    pub fn decode(data: &[u8]) -> Result<Self, RpcError> {
        Frame::decode_header_first(data).map_err(FrameDecodeError::into_error)
    }

    /// Decode the header before the payload, so a bad argument field is
    /// reported against the message it arrived in.
    pub fn decode_header_first(data: &[u8]) -> Result<Self, FrameDecodeError> {
        let (head, rest) = decode_split(data, HEADER_FIELDS).map_err(FrameDecodeError::Header)?;
        let header = Header::read(&mut head.reader()).map_err(FrameDecodeError::Header)?;
        match rest {
            Ok(payload) => Ok(Frame::new(header, payload)),
            Err(error) => Err(FrameDecodeError::Payload(MalformedFrame { header, error })),
        }
    }

    /// Payload of a call result. Error frames surface as
    /// [`crate::ErrorCode::Remote`] failures, never as a payload.
    pub fn into_result(self) -> Result<FieldBuffer, RpcError> {
        match self.header.kind {
            MessageKind::CallResult => Ok(self.payload),
            MessageKind::Error => {
                let mut reader = self.payload.reader();
                let domain = reader.pop_string()?;
                let message = reader.pop_string()?;
                reader.finish()?;
                Err(RpcError::remote(domain, message))
            }
            other => Err(RpcError::framing(format!(
                "expected a response frame, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.header, self.payload)
    }
}
