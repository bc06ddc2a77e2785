use super::field::{FieldBuffer, FieldKind, FieldReader};
use crate::error::RpcError;
use crate::ids::ObjectId;
use crate::types::{TypeId, TypeKind, TypeModel};
use bytes::Bytes;

/// A typed value as seen by generated code, before framing.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Enum ordinal.
    Enum(i64),
    /// Field values in declaration order.
    Record(Vec<Value>),
    Sequence(Vec<Value>),
    Object(ObjectId),
    Any(Bytes),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Enum(_) => "enum",
            Value::Record(_) => "record",
            Value::Sequence(_) => "sequence",
            Value::Object(_) => "object",
            Value::Any(_) => "any",
        }
    }
}

/// Writes and reads [`Value`]s positionally against their declared type.
#[derive(Debug, Clone, Copy)]
pub struct ValueCodec<'m> {
    model: &'m TypeModel,
}

impl<'m> ValueCodec<'m> {
    pub fn new(model: &'m TypeModel) -> Self {
        ValueCodec { model }
    }

    fn mismatch(&self, ty: TypeId, value: &Value) -> RpcError {
        RpcError::framing(format!(
            "{} value does not fit type {}",
            value.kind_name(),
            self.model.type_info(ty).qualified_name()
        ))
    }

    pub fn write(&self, buffer: &mut FieldBuffer, ty: TypeId, value: &Value) -> Result<(), RpcError> {
        let info = self.model.type_info(ty);
        match (&info.kind, value) {
            (TypeKind::Bool, Value::Bool(v)) => {
                buffer.push_bool(*v);
            }
            (TypeKind::Int, Value::Int(v)) => {
                buffer.push_int(*v);
            }
            (TypeKind::Float, Value::Float(v)) => {
                buffer.push_float(*v);
            }
            (TypeKind::String, Value::String(v)) => {
                buffer.push_string(v.clone());
            }
            (TypeKind::Enum(values), Value::Enum(ordinal)) => {
                if !values.iter().any(|v| v.ordinal == *ordinal) {
                    return Err(RpcError::framing(format!(
                        "{} has no value with ordinal {}",
                        info.qualified_name(),
                        ordinal
                    )));
                }
                buffer.push_enum(*ordinal);
            }
            (TypeKind::Record(fields), Value::Record(values)) => {
                if fields.len() != values.len() {
                    return Err(RpcError::framing(format!(
                        "{} has {} fields, value has {}",
                        info.qualified_name(),
                        fields.len(),
                        values.len()
                    )));
                }
                let mut nested = FieldBuffer::with_capacity(fields.len());
                for (field, value) in fields.iter().zip(values) {
                    self.write(&mut nested, field.ty, value)?;
                }
                buffer.push_record(nested);
            }
            (TypeKind::Sequence(element), Value::Sequence(values)) => {
                let mut nested = FieldBuffer::with_capacity(values.len());
                for value in values {
                    self.write(&mut nested, element.ty, value)?;
                }
                buffer.push_sequence(nested);
            }
            (TypeKind::Interface(_), Value::Object(id)) => {
                buffer.push_object(*id);
            }
            (TypeKind::Any, Value::Any(payload)) => {
                buffer.push_any(payload.clone());
            }
            _ => return Err(self.mismatch(ty, value)),
        }
        Ok(())
    }

    pub fn read(&self, reader: &mut FieldReader<'_>, ty: TypeId) -> Result<Value, RpcError> {
        let info = self.model.type_info(ty);
        let value = match &info.kind {
            TypeKind::Bool => Value::Bool(reader.pop_bool()?),
            TypeKind::Int => Value::Int(reader.pop_int()?),
            TypeKind::Float => Value::Float(reader.pop_float()?),
            TypeKind::String => Value::String(reader.pop_string()?.to_string()),
            TypeKind::Enum(values) => {
                let ordinal = reader.pop_enum()?;
                if !values.iter().any(|v| v.ordinal == ordinal) {
                    return Err(RpcError::framing(format!(
                        "{} has no value with ordinal {}",
                        info.qualified_name(),
                        ordinal
                    )));
                }
                Value::Enum(ordinal)
            }
            TypeKind::Record(fields) => {
                let mut nested = reader.pop_record()?;
                let mut values = Vec::with_capacity(fields.len());
                for field in fields {
                    values.push(self.read(&mut nested, field.ty)?);
                }
                nested.finish()?;
                Value::Record(values)
            }
            TypeKind::Sequence(element) => {
                let mut nested = reader.pop_sequence()?;
                let mut values = Vec::with_capacity(nested.remaining());
                while nested.remaining() > 0 {
                    values.push(self.read(&mut nested, element.ty)?);
                }
                Value::Sequence(values)
            }
            TypeKind::Interface(_) => Value::Object(reader.pop_object()?),
            TypeKind::Any => Value::Any(reader.pop_any()?),
            TypeKind::Void | TypeKind::Function(_) => {
                return Err(RpcError::framing(format!(
                    "type {} has no wire representation",
                    info.qualified_name()
                )));
            }
        };
        Ok(value)
    }

    /// Field kind a value of `ty` occupies, if it can be framed at all.
    pub fn field_kind(&self, ty: TypeId) -> Option<FieldKind> {
        match &self.model.type_info(ty).kind {
            TypeKind::Bool => Some(FieldKind::Bool),
            TypeKind::Int => Some(FieldKind::Int),
            TypeKind::Float => Some(FieldKind::Float),
            TypeKind::String => Some(FieldKind::String),
            TypeKind::Enum(_) => Some(FieldKind::Enum),
            TypeKind::Record(_) => Some(FieldKind::Record),
            TypeKind::Sequence(_) => Some(FieldKind::Sequence),
            TypeKind::Interface(_) => Some(FieldKind::Object),
            TypeKind::Any => Some(FieldKind::Any),
            TypeKind::Void | TypeKind::Function(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::types::{EnumBuilder, Field, InterfaceDef, ModelBuilder};

    struct Fixture {
        model: TypeModel,
        point: TypeId,
        points: TypeId,
        align: TypeId,
        widget: TypeId,
    }

    fn fixture() -> Fixture {
        let mut builder = ModelBuilder::new();
        let int = builder.builtins().int;
        let point = builder
            .add(
                "Ui",
                "Point",
                TypeKind::Record(vec![Field::new("x", int), Field::new("y", int)]),
            )
            .unwrap();
        let points = builder
            .add("Ui", "PointSeq", TypeKind::Sequence(Field::new("points", point)))
            .unwrap();
        let mut align = EnumBuilder::new("Ui::Align");
        align.value("LEFT", "Left", "").unwrap();
        align.value("RIGHT", "Right", "").unwrap();
        let align = builder.add("Ui", "Align", align.build()).unwrap();
        let widget = builder
            .add("Ui", "Widget", TypeKind::Interface(InterfaceDef::new()))
            .unwrap();
        Fixture {
            model: builder.finish().unwrap(),
            point,
            points,
            align,
            widget,
        }
    }

    #[test]
    fn test_record_encodes_as_nested_positional_frame() {
        let fx = fixture();
        let codec = ValueCodec::new(&fx.model);
        let mut buffer = FieldBuffer::new();
        codec
            .write(&mut buffer, fx.point, &Value::Record(vec![Value::Int(3), Value::Int(4)]))
            .unwrap();

        let mut reader = buffer.reader();
        let mut record = reader.pop_record().unwrap();
        assert_eq!(record.remaining(), 2);
        assert_eq!(record.pop_int().unwrap(), 3);
        assert_eq!(record.pop_int().unwrap(), 4);
    }

    #[test]
    fn test_sequence_of_records_round_trip() {
        let fx = fixture();
        let codec = ValueCodec::new(&fx.model);
        let value = Value::Sequence(vec![
            Value::Record(vec![Value::Int(1), Value::Int(2)]),
            Value::Record(vec![Value::Int(-5), Value::Int(i64::MAX)]),
        ]);

        let mut buffer = FieldBuffer::new();
        codec.write(&mut buffer, fx.points, &value).unwrap();
        let decoded = FieldBuffer::decode(&buffer.encode()).unwrap();
        let mut reader = decoded.reader();
        assert_eq!(codec.read(&mut reader, fx.points).unwrap(), value);
        reader.finish().unwrap();
    }

    #[test]
    fn test_shape_mismatches_are_framing_errors() {
        let fx = fixture();
        let codec = ValueCodec::new(&fx.model);
        let mut buffer = FieldBuffer::new();

        let short = Value::Record(vec![Value::Int(1)]);
        assert_eq!(
            codec.write(&mut buffer, fx.point, &short).unwrap_err().code,
            ErrorCode::Framing
        );
        assert!(codec.write(&mut buffer, fx.point, &Value::Int(1)).is_err());
        assert!(codec.write(&mut buffer, fx.align, &Value::Enum(7)).is_err());
        assert!(buffer.is_empty());

        codec.write(&mut buffer, fx.align, &Value::Enum(1)).unwrap();
        codec
            .write(&mut buffer, fx.widget, &Value::Object(ObjectId::new(3)))
            .unwrap();
        let mut reader = buffer.reader();
        assert_eq!(codec.read(&mut reader, fx.align).unwrap(), Value::Enum(1));
        assert!(codec.read(&mut reader, fx.align).is_err());
    }

    #[test]
    fn test_record_with_extra_fields_fails_to_read() {
        let fx = fixture();
        let codec = ValueCodec::new(&fx.model);
        let mut record = FieldBuffer::new();
        record.push_int(1).push_int(2).push_int(3);
        let mut buffer = FieldBuffer::new();
        buffer.push_record(record);

        let err = codec.read(&mut buffer.reader(), fx.point).unwrap_err();
        assert!(err.message.contains("unread"));
    }

    #[test]
    fn test_void_has_no_wire_form() {
        let fx = fixture();
        let codec = ValueCodec::new(&fx.model);
        let void = fx.model.builtins().void;
        assert_eq!(codec.field_kind(void), None);
        assert_eq!(codec.field_kind(fx.widget), Some(FieldKind::Object));
        assert!(codec.read(&mut FieldBuffer::new().reader(), void).is_err());
    }
}
