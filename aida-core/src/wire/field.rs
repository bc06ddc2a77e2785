use crate::error::RpcError;
use crate::ids::ObjectId;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Nested records and sequences deeper than this are rejected on decode.
pub const MAX_NESTING: usize = 64;

/// Kind tag written in front of every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldKind {
    Bool = 0x01,
    Int = 0x02,
    Enum = 0x03,
    Float = 0x04,
    String = 0x05,
    Record = 0x06,
    Sequence = 0x07,
    Object = 0x08,
    Any = 0x09,
}

impl FieldKind {
    pub fn tag(&self) -> u8 {
        *self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(FieldKind::Bool),
            0x02 => Some(FieldKind::Int),
            0x03 => Some(FieldKind::Enum),
            0x04 => Some(FieldKind::Float),
            0x05 => Some(FieldKind::String),
            0x06 => Some(FieldKind::Record),
            0x07 => Some(FieldKind::Sequence),
            0x08 => Some(FieldKind::Object),
            0x09 => Some(FieldKind::Any),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "int64",
            FieldKind::Enum => "enum",
            FieldKind::Float => "float64",
            FieldKind::String => "string",
            FieldKind::Record => "record",
            FieldKind::Sequence => "sequence",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Enum(i64),
    Float(f64),
    String(String),
    Record(FieldBuffer),
    Sequence(FieldBuffer),
    Object(ObjectId),
    /// Opaque payload, see [`AnyCodec`].
    Any(Bytes),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Enum(_) => FieldKind::Enum,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::String(_) => FieldKind::String,
            FieldValue::Record(_) => FieldKind::Record,
            FieldValue::Sequence(_) => FieldKind::Sequence,
            FieldValue::Object(_) => FieldKind::Object,
            FieldValue::Any(_) => FieldKind::Any,
        }
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u8(self.kind().tag());
        match self {
            FieldValue::Bool(value) => buf.put_u8(u8::from(*value)),
            FieldValue::Int(value) | FieldValue::Enum(value) => buf.put_i64(*value),
            FieldValue::Float(value) => buf.put_f64(*value),
            FieldValue::String(value) => {
                buf.put_u32(value.len() as u32);
                buf.put_slice(value.as_bytes());
            }
            FieldValue::Record(nested) | FieldValue::Sequence(nested) => nested.encode_into(buf),
            FieldValue::Object(id) => buf.put_u64(id.as_u64()),
            FieldValue::Any(bytes) => {
                buf.put_u32(bytes.len() as u32);
                buf.put_slice(bytes);
            }
        }
    }

    fn encoded_len(&self) -> usize {
        1 + match self {
            FieldValue::Bool(_) => 1,
            FieldValue::Int(_)
            | FieldValue::Enum(_)
            | FieldValue::Float(_)
            | FieldValue::Object(_) => 8,
            FieldValue::String(value) => 4 + value.len(),
            FieldValue::Any(bytes) => 4 + bytes.len(),
            FieldValue::Record(nested) | FieldValue::Sequence(nested) => nested.encoded_len(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(value) => write!(f, "bool {}", value),
            FieldValue::Int(value) => write!(f, "int64 {}", value),
            FieldValue::Enum(value) => write!(f, "enum {}", value),
            FieldValue::Float(value) => write!(f, "float64 {}", value),
            FieldValue::String(value) => write!(f, "string {:?}", value),
            FieldValue::Record(nested) => write!(f, "record {}", nested),
            FieldValue::Sequence(nested) => write!(f, "sequence {}", nested),
            FieldValue::Object(id) => write!(f, "object {}", id.as_u64()),
            FieldValue::Any(bytes) => write!(f, "any ({} bytes)", bytes.len()),
        }
    }
}

/// Ordered, self-delimiting list of typed fields: one frame, or the body of
/// a nested record or sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldBuffer {
    fields: Vec<FieldValue>,
}

impl FieldBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        FieldBuffer {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldValue] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<FieldValue> {
        self.fields
    }

    pub fn push(&mut self, field: FieldValue) -> &mut Self {
        self.fields.push(field);
        self
    }

    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.push(FieldValue::Bool(value))
    }

    pub fn push_int(&mut self, value: i64) -> &mut Self {
        self.push(FieldValue::Int(value))
    }

    pub fn push_enum(&mut self, ordinal: i64) -> &mut Self {
        self.push(FieldValue::Enum(ordinal))
    }

    pub fn push_float(&mut self, value: f64) -> &mut Self {
        self.push(FieldValue::Float(value))
    }

    pub fn push_string(&mut self, value: impl Into<String>) -> &mut Self {
        self.push(FieldValue::String(value.into()))
    }

    pub fn push_record(&mut self, record: FieldBuffer) -> &mut Self {
        self.push(FieldValue::Record(record))
    }

    pub fn push_sequence(&mut self, elements: FieldBuffer) -> &mut Self {
        self.push(FieldValue::Sequence(elements))
    }

    pub fn push_object(&mut self, id: ObjectId) -> &mut Self {
        self.push(FieldValue::Object(id))
    }

    pub fn push_any(&mut self, payload: Bytes) -> &mut Self {
        self.push(FieldValue::Any(payload))
    }

    /// Encode `value` through `codec` and append it as an any field.
    pub fn push_any_with<C: AnyCodec>(
        &mut self,
        codec: &C,
        value: &C::Value,
    ) -> Result<&mut Self, RpcError> {
        let payload = codec.encode_any(value)?;
        Ok(self.push_any(payload))
    }

    pub fn extend(&mut self, other: FieldBuffer) -> &mut Self {
        self.fields.extend(other.fields);
        self
    }

    pub fn reader(&self) -> FieldReader<'_> {
        FieldReader::new(&self.fields)
    }

    /// Reader starting at field `position`, e.g. right after a header.
    pub fn reader_at(&self, position: usize) -> FieldReader<'_> {
        let start = position.min(self.fields.len());
        FieldReader::new(&self.fields[start..])
    }

    pub fn encoded_len(&self) -> usize {
        4 + self.fields.iter().map(FieldValue::encoded_len).sum::<usize>()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u32(self.fields.len() as u32);
        for field in &self.fields {
            field.encode_into(buf);
        }
    }

    /// Decode exactly one frame; bytes left over are a framing error.
    pub fn decode(data: &[u8]) -> Result<FieldBuffer, RpcError> {
        let mut cursor = data;
        let buffer = decode_frame(&mut cursor, 0)?;
        if cursor.has_remaining() {
            return Err(RpcError::framing(format!(
                "{} trailing bytes after frame",
                cursor.remaining()
            )));
        }
        Ok(buffer)
    }
}

/// Decode a frame in two parts: the leading `head` fields, then the rest.
///
/// An error in the head is returned as the outer error. An error after the
/// head comes back alongside the head that did decode, so the caller can
/// still tell which message it belonged to.
pub(crate) fn decode_split(
    data: &[u8],
    head: usize,
) -> Result<(FieldBuffer, Result<FieldBuffer, RpcError>), RpcError> {
    let mut cursor = data;
    need(&cursor, 4, "field count")?;
    let count = cursor.get_u32() as usize;
    if count > cursor.remaining() / 2 {
        return Err(RpcError::framing(format!(
            "field count {} exceeds frame size",
            count
        )));
    }
    if count < head {
        return Err(RpcError::framing(format!(
            "frame has {} fields, expected at least {}",
            count, head
        )));
    }

    let mut head_fields = Vec::with_capacity(head);
    for _ in 0..head {
        head_fields.push(decode_field(&mut cursor, 0)?);
    }

    let mut decode_rest = || -> Result<FieldBuffer, RpcError> {
        let mut fields = Vec::with_capacity(count - head);
        for _ in head..count {
            fields.push(decode_field(&mut cursor, 0)?);
        }
        if cursor.has_remaining() {
            return Err(RpcError::framing(format!(
                "{} trailing bytes after frame",
                cursor.remaining()
            )));
        }
        Ok(FieldBuffer { fields })
    };
    let rest = decode_rest();

    Ok((FieldBuffer { fields: head_fields }, rest))
}

impl From<Vec<FieldValue>> for FieldBuffer {
    fn from(fields: Vec<FieldValue>) -> Self {
        FieldBuffer { fields }
    }
}

impl fmt::Display for FieldBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, field) in self.fields.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", field)?;
        }
        f.write_str("]")
    }
}

fn need(cursor: &&[u8], bytes: usize, what: &str) -> Result<(), RpcError> {
    if cursor.remaining() < bytes {
        return Err(RpcError::framing(format!(
            "truncated {}: need {} bytes, have {}",
            what,
            bytes,
            cursor.remaining()
        )));
    }
    Ok(())
}

fn decode_frame(cursor: &mut &[u8], depth: usize) -> Result<FieldBuffer, RpcError> {
    if depth > MAX_NESTING {
        return Err(RpcError::framing("frame nesting too deep"));
    }
    need(cursor, 4, "field count")?;
    let count = cursor.get_u32() as usize;
    // every field takes at least two bytes
    if count > cursor.remaining() / 2 {
        return Err(RpcError::framing(format!(
            "field count {} exceeds frame size",
            count
        )));
    }

    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        fields.push(decode_field(cursor, depth)?);
    }
    Ok(FieldBuffer { fields })
}

fn decode_length_prefixed(cursor: &mut &[u8], what: &str) -> Result<Bytes, RpcError> {
    need(cursor, 4, what)?;
    let len = cursor.get_u32() as usize;
    need(cursor, len, what)?;
    Ok(cursor.copy_to_bytes(len))
}

fn decode_field(cursor: &mut &[u8], depth: usize) -> Result<FieldValue, RpcError> {
    need(cursor, 1, "field tag")?;
    let tag = cursor.get_u8();
    let kind = FieldKind::from_tag(tag)
        .ok_or_else(|| RpcError::framing(format!("unknown field tag 0x{:02x}", tag)))?;

    let field = match kind {
        FieldKind::Bool => {
            need(cursor, 1, "bool")?;
            match cursor.get_u8() {
                0 => FieldValue::Bool(false),
                1 => FieldValue::Bool(true),
                other => {
                    return Err(RpcError::framing(format!("invalid bool byte {}", other)));
                }
            }
        }
        FieldKind::Int => {
            need(cursor, 8, "int64")?;
            FieldValue::Int(cursor.get_i64())
        }
        FieldKind::Enum => {
            need(cursor, 8, "enum")?;
            FieldValue::Enum(cursor.get_i64())
        }
        FieldKind::Float => {
            need(cursor, 8, "float64")?;
            FieldValue::Float(cursor.get_f64())
        }
        FieldKind::String => {
            let bytes = decode_length_prefixed(cursor, "string")?;
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|_| RpcError::framing("string field is not valid UTF-8"))?;
            FieldValue::String(text)
        }
        FieldKind::Record => FieldValue::Record(decode_frame(cursor, depth + 1)?),
        FieldKind::Sequence => FieldValue::Sequence(decode_frame(cursor, depth + 1)?),
        FieldKind::Object => {
            need(cursor, 8, "object")?;
            FieldValue::Object(ObjectId::new(cursor.get_u64()))
        }
        FieldKind::Any => FieldValue::Any(decode_length_prefixed(cursor, "any")?),
    };
    Ok(field)
}

/// Pops fields in order, checking each against the kind the caller expects.
#[derive(Debug, Clone)]
pub struct FieldReader<'a> {
    fields: &'a [FieldValue],
    position: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(fields: &'a [FieldValue]) -> Self {
        FieldReader {
            fields,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.fields.len() - self.position
    }

    pub fn peek_kind(&self) -> Option<FieldKind> {
        self.fields.get(self.position).map(FieldValue::kind)
    }

    fn next(&mut self, expected: FieldKind) -> Result<&'a FieldValue, RpcError> {
        let field = self.fields.get(self.position).ok_or_else(|| {
            RpcError::framing(format!(
                "expected {} at field {}, frame has only {} fields",
                expected,
                self.position,
                self.fields.len()
            ))
        })?;
        if field.kind() != expected {
            return Err(RpcError::framing(format!(
                "expected {} at field {}, found {}",
                expected,
                self.position,
                field.kind()
            )));
        }
        self.position += 1;
        Ok(field)
    }

    pub fn pop_bool(&mut self) -> Result<bool, RpcError> {
        match self.next(FieldKind::Bool)? {
            FieldValue::Bool(value) => Ok(*value),
            _ => Err(RpcError::framing("expected bool")),
        }
    }

    pub fn pop_int(&mut self) -> Result<i64, RpcError> {
        match self.next(FieldKind::Int)? {
            FieldValue::Int(value) => Ok(*value),
            _ => Err(RpcError::framing("expected int64")),
        }
    }

    pub fn pop_enum(&mut self) -> Result<i64, RpcError> {
        match self.next(FieldKind::Enum)? {
            FieldValue::Enum(value) => Ok(*value),
            _ => Err(RpcError::framing("expected enum")),
        }
    }

    pub fn pop_float(&mut self) -> Result<f64, RpcError> {
        match self.next(FieldKind::Float)? {
            FieldValue::Float(value) => Ok(*value),
            _ => Err(RpcError::framing("expected float64")),
        }
    }

    pub fn pop_string(&mut self) -> Result<&'a str, RpcError> {
        match self.next(FieldKind::String)? {
            FieldValue::String(value) => Ok(value),
            _ => Err(RpcError::framing("expected string")),
        }
    }

    pub fn pop_record(&mut self) -> Result<FieldReader<'a>, RpcError> {
        match self.next(FieldKind::Record)? {
            FieldValue::Record(nested) => Ok(FieldReader::new(&nested.fields)),
            _ => Err(RpcError::framing("expected record")),
        }
    }

    pub fn pop_sequence(&mut self) -> Result<FieldReader<'a>, RpcError> {
        match self.next(FieldKind::Sequence)? {
            FieldValue::Sequence(nested) => Ok(FieldReader::new(&nested.fields)),
            _ => Err(RpcError::framing("expected sequence")),
        }
    }

    pub fn pop_object(&mut self) -> Result<ObjectId, RpcError> {
        match self.next(FieldKind::Object)? {
            FieldValue::Object(id) => Ok(*id),
            _ => Err(RpcError::framing("expected object")),
        }
    }

    pub fn pop_any(&mut self) -> Result<Bytes, RpcError> {
        match self.next(FieldKind::Any)? {
            FieldValue::Any(bytes) => Ok(bytes.clone()),
            _ => Err(RpcError::framing("expected any")),
        }
    }

    pub fn pop_any_with<C: AnyCodec>(&mut self, codec: &C) -> Result<C::Value, RpcError> {
        let payload = self.pop_any()?;
        codec.decode_any(&payload)
    }

    /// Writer and reader must agree on the field count: unread fields fail.
    pub fn finish(self) -> Result<(), RpcError> {
        if self.remaining() > 0 {
            return Err(RpcError::framing(format!(
                "{} unread fields after field {}",
                self.remaining(),
                self.position
            )));
        }
        Ok(())
    }
}

/// Extension point for any-typed fields. The frame layer only moves the
/// opaque bytes; a codec decides what they mean.
pub trait AnyCodec: Send + Sync {
    type Value;

    fn encode_any(&self, value: &Self::Value) -> Result<Bytes, RpcError>;

    fn decode_any(&self, payload: &[u8]) -> Result<Self::Value, RpcError>;
}

/// Passes any payloads through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueAny;

impl AnyCodec for OpaqueAny {
    type Value = Bytes;

    fn encode_any(&self, value: &Bytes) -> Result<Bytes, RpcError> {
        Ok(value.clone())
    }

    fn decode_any(&self, payload: &[u8]) -> Result<Bytes, RpcError> {
        Ok(Bytes::copy_from_slice(payload))
    }
}
