use super::field::{FieldBuffer, FieldReader};
use crate::digest::Digest;
use crate::error::RpcError;
use crate::ids::{CallId, ConnectionId, ObjectId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of fields every frame starts with.
pub const HEADER_FIELDS: usize = 5;

const KIND_SHIFT: u32 = 56;
const CONNECTION_MASK: u64 = 0xffff;

/// Message kind, stored in the top byte of the header's message word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    OneWayCall,
    SignalDisconnect,
    SignalEmit,
    PropertySet,
    TypeListQuery,
    HelloRequest,
    TwoWayCall,
    SignalConnect,
    SignalEmitTwoWay,
    PropertyGet,
    CallResult,
    Error,
}

impl MessageKind {
    pub fn code(&self) -> u8 {
        match self {
            MessageKind::OneWayCall => 0x1,
            MessageKind::SignalDisconnect => 0x2,
            MessageKind::SignalEmit => 0x3,
            MessageKind::PropertySet => 0x4,
            MessageKind::TypeListQuery => 0x6,
            MessageKind::HelloRequest => 0x8,
            MessageKind::TwoWayCall => 0x9,
            MessageKind::SignalConnect => 0xa,
            MessageKind::SignalEmitTwoWay => 0xb,
            MessageKind::PropertyGet => 0xc,
            MessageKind::CallResult => 0xd,
            MessageKind::Error => 0xe,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, RpcError> {
        match code {
            0x1 => Ok(MessageKind::OneWayCall),
            0x2 => Ok(MessageKind::SignalDisconnect),
            0x3 => Ok(MessageKind::SignalEmit),
            0x4 => Ok(MessageKind::PropertySet),
            0x6 => Ok(MessageKind::TypeListQuery),
            0x8 => Ok(MessageKind::HelloRequest),
            0x9 => Ok(MessageKind::TwoWayCall),
            0xa => Ok(MessageKind::SignalConnect),
            0xb => Ok(MessageKind::SignalEmitTwoWay),
            0xc => Ok(MessageKind::PropertyGet),
            0xd => Ok(MessageKind::CallResult),
            0xe => Ok(MessageKind::Error),
            other => Err(RpcError::framing(format!(
                "unknown message kind 0x{:x}",
                other
            ))),
        }
    }

    pub fn expects_response(&self) -> bool {
        matches!(
            self,
            MessageKind::TypeListQuery
                | MessageKind::HelloRequest
                | MessageKind::TwoWayCall
                | MessageKind::SignalConnect
                | MessageKind::SignalEmitTwoWay
                | MessageKind::PropertyGet
        )
    }

    pub fn is_response(&self) -> bool {
        matches!(self, MessageKind::CallResult | MessageKind::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::OneWayCall => "one_way_call",
            MessageKind::SignalDisconnect => "signal_disconnect",
            MessageKind::SignalEmit => "signal_emit",
            MessageKind::PropertySet => "property_set",
            MessageKind::TypeListQuery => "type_list_query",
            MessageKind::HelloRequest => "hello_request",
            MessageKind::TwoWayCall => "two_way_call",
            MessageKind::SignalConnect => "signal_connect",
            MessageKind::SignalEmitTwoWay => "signal_emit_two_way",
            MessageKind::PropertyGet => "property_get",
            MessageKind::CallResult => "call_result",
            MessageKind::Error => "error",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First five fields of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: MessageKind,
    pub connection: ConnectionId,
    pub target: ObjectId,
    pub digest: Digest,
    pub call_id: CallId,
}

impl Header {
    pub fn new(kind: MessageKind, target: ObjectId, digest: Digest) -> Self {
        Header {
            kind,
            connection: ConnectionId::default(),
            target,
            digest,
            call_id: CallId::NONE,
        }
    }

    pub fn with_call_id(mut self, call_id: CallId) -> Self {
        self.call_id = call_id;
        self
    }

    pub fn with_connection(mut self, connection: ConnectionId) -> Self {
        self.connection = connection;
        self
    }

    /// Header of the response to this request: same target, digest and
    /// correlation id.
    pub fn response(&self, kind: MessageKind) -> Header {
        Header { kind, ..*self }
    }

    pub fn message_word(&self) -> i64 {
        let word = (u64::from(self.kind.code()) << KIND_SHIFT)
            | u64::from(self.connection.as_u16());
        word as i64
    }

    pub fn write(&self, buffer: &mut FieldBuffer) {
        buffer
            .push_int(self.message_word())
            .push_object(self.target)
            .push_int(self.digest.hi as i64)
            .push_int(self.digest.lo as i64)
            .push_int(self.call_id.as_u64() as i64);
    }

    pub fn read(reader: &mut FieldReader<'_>) -> Result<Header, RpcError> {
        let word = reader.pop_int()? as u64;
        let kind = MessageKind::from_code((word >> KIND_SHIFT) as u8)?;
        let connection = ConnectionId::new((word & CONNECTION_MASK) as u16);
        let target = reader.pop_object()?;
        let hi = reader.pop_int()? as u64;
        let lo = reader.pop_int()? as u64;
        let call_id = CallId::new(reader.pop_int()? as u64);
        Ok(Header {
            kind,
            connection,
            target,
            digest: Digest::new(hi, lo),
            call_id,
        })
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} target={} digest={} call={}",
            self.kind,
            self.target.as_u64(),
            self.digest,
            self.call_id.as_u64()
        )
    }
}
