use super::auxdata::AuxData;
use crate::error::DefinitionError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Index of a [`TypeInfo`] inside the model that created it. Identity of a
/// type is its `TypeId`, never its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(u32);

impl TypeId {
    pub(crate) fn from_index(index: usize) -> Self {
        TypeId(index as u32)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Storage class of a type, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Storage {
    Void,
    Bool,
    Int,
    Float,
    String,
    Enum,
    Record,
    Sequence,
    Function,
    Interface,
    Any,
}

impl Storage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Storage::Void => "void",
            Storage::Bool => "bool",
            Storage::Int => "int",
            Storage::Float => "float",
            Storage::String => "string",
            Storage::Enum => "enum",
            Storage::Record => "record",
            Storage::Sequence => "sequence",
            Storage::Function => "function",
            Storage::Interface => "interface",
            Storage::Any => "any",
        }
    }

    /// Single byte folded into type identity digests.
    pub fn tag(&self) -> u8 {
        match self {
            Storage::Void => b'v',
            Storage::Bool => b'b',
            Storage::Int => b'i',
            Storage::Float => b'f',
            Storage::String => b's',
            Storage::Enum => b'e',
            Storage::Record => b'r',
            Storage::Sequence => b'q',
            Storage::Function => b'F',
            Storage::Interface => b'c',
            Storage::Any => b'Y',
        }
    }

    /// Empty payload used for forward declarations until `define` fills it.
    pub(crate) fn placeholder(&self, void: TypeId) -> TypeKind {
        match self {
            Storage::Void => TypeKind::Void,
            Storage::Bool => TypeKind::Bool,
            Storage::Int => TypeKind::Int,
            Storage::Float => TypeKind::Float,
            Storage::String => TypeKind::String,
            Storage::Any => TypeKind::Any,
            Storage::Enum => TypeKind::Enum(Vec::new()),
            Storage::Record => TypeKind::Record(Vec::new()),
            Storage::Sequence => TypeKind::Sequence(Field::new("", void)),
            Storage::Function => TypeKind::Function(FunctionSig::new(void)),
            Storage::Interface => TypeKind::Interface(InterfaceDef::default()),
        }
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An evaluated constant, as delivered by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub ident: String,
    pub label: String,
    pub blurb: String,
    pub ordinal: i64,
}

/// Named slot of a record, interface property or sequence element.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub ident: String,
    pub ty: TypeId,
    pub aux: AuxData,
}

impl Field {
    pub fn new(ident: impl Into<String>, ty: TypeId) -> Self {
        Field {
            ident: ident.into(),
            ty,
            aux: AuxData::default(),
        }
    }

    pub fn with_aux(mut self, aux: AuxData) -> Self {
        self.aux = aux;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub ident: String,
    pub ty: TypeId,
    pub default: Option<ConstValue>,
}

impl Arg {
    pub fn new(ident: impl Into<String>, ty: TypeId) -> Self {
        Arg {
            ident: ident.into(),
            ty,
            default: None,
        }
    }

    pub fn with_default(mut self, default: ConstValue) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSig {
    pub args: Vec<Arg>,
    pub ret: TypeId,
}

impl FunctionSig {
    pub fn new(ret: TypeId) -> Self {
        FunctionSig {
            args: Vec::new(),
            ret,
        }
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }
}

/// A method or signal declared on an interface.
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub sig: FunctionSig,
}

impl Method {
    pub fn new(name: impl Into<String>, sig: FunctionSig) -> Self {
        Method {
            name: name.into(),
            sig,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterfaceDef {
    pub prerequisites: Vec<TypeId>,
    /// Properties, in declaration order.
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub signals: Vec<Method>,
}

impl InterfaceDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prerequisite(mut self, iface: TypeId) -> Self {
        self.prerequisites.push(iface);
        self
    }

    pub fn property(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn signal(mut self, signal: Method) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn find_method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn find_signal(&self, name: &str) -> Option<&Method> {
        self.signals.iter().find(|s| s.name == name)
    }

    pub fn find_property(&self, ident: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.ident == ident)
    }
}

/// Closed set of type variants. Per-variant payloads make the shape rules
/// (only records and interfaces have fields, only sequences have an element,
/// only interfaces have prerequisites, methods and signals) unrepresentable
/// when broken.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Void,
    Bool,
    Int,
    Float,
    String,
    Enum(Vec<EnumValue>),
    Record(Vec<Field>),
    Sequence(Field),
    Function(FunctionSig),
    Interface(InterfaceDef),
    Any,
}

impl TypeKind {
    pub fn storage(&self) -> Storage {
        match self {
            TypeKind::Void => Storage::Void,
            TypeKind::Bool => Storage::Bool,
            TypeKind::Int => Storage::Int,
            TypeKind::Float => Storage::Float,
            TypeKind::String => Storage::String,
            TypeKind::Enum(_) => Storage::Enum,
            TypeKind::Record(_) => Storage::Record,
            TypeKind::Sequence(_) => Storage::Sequence,
            TypeKind::Function(_) => Storage::Function,
            TypeKind::Interface(_) => Storage::Interface,
            TypeKind::Any => Storage::Any,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub name: String,
    /// Enclosing namespaces, outermost first. Empty for builtins.
    pub namespace: Vec<String>,
    pub kind: TypeKind,
}

impl TypeInfo {
    pub fn new(name: impl Into<String>, namespace: Vec<String>, kind: TypeKind) -> Self {
        TypeInfo {
            name: name.into(),
            namespace,
            kind,
        }
    }

    /// `Outer::Inner::Name`, or just `Name` at the root.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.namespace.join("::"), self.name)
        }
    }

    pub fn storage(&self) -> Storage {
        self.kind.storage()
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface(_))
    }

    pub fn as_interface(&self) -> Option<&InterfaceDef> {
        match &self.kind {
            TypeKind::Interface(def) => Some(def),
            _ => None,
        }
    }

    /// Record fields or interface properties; empty for every other kind.
    pub fn fields(&self) -> &[Field] {
        match &self.kind {
            TypeKind::Record(fields) => fields,
            TypeKind::Interface(def) => &def.fields,
            _ => &[],
        }
    }

    pub fn elements(&self) -> Option<&Field> {
        match &self.kind {
            TypeKind::Sequence(element) => Some(element),
            _ => None,
        }
    }

    pub fn enum_values(&self) -> &[EnumValue] {
        match &self.kind {
            TypeKind::Enum(values) => values,
            _ => &[],
        }
    }

    pub fn prerequisites(&self) -> &[TypeId] {
        match &self.kind {
            TypeKind::Interface(def) => &def.prerequisites,
            _ => &[],
        }
    }

    /// Independent copy under a new name, e.g. a client-side view of an
    /// interface. The canonical declaration is left untouched.
    pub fn specialize(&self, name: impl Into<String>) -> TypeInfo {
        let mut copy = self.clone();
        copy.name = name.into();
        copy
    }
}

/// Collects enum values, assigning ordinals the way the IDL does: each value
/// takes the previous ordinal plus one unless given explicitly.
#[derive(Debug, Clone)]
pub struct EnumBuilder {
    enum_name: String,
    values: Vec<EnumValue>,
    seen: HashSet<i64>,
    next_ordinal: i64,
}

impl EnumBuilder {
    pub fn new(enum_name: impl Into<String>) -> Self {
        EnumBuilder {
            enum_name: enum_name.into(),
            values: Vec::new(),
            seen: HashSet::new(),
            next_ordinal: 0,
        }
    }

    pub fn value(
        &mut self,
        ident: impl Into<String>,
        label: impl Into<String>,
        blurb: impl Into<String>,
    ) -> Result<&mut Self, DefinitionError> {
        let ordinal = self.next_ordinal;
        self.push(ident.into(), label.into(), blurb.into(), ordinal)
    }

    pub fn value_with_ordinal(
        &mut self,
        ident: impl Into<String>,
        label: impl Into<String>,
        blurb: impl Into<String>,
        ordinal: i64,
    ) -> Result<&mut Self, DefinitionError> {
        self.push(ident.into(), label.into(), blurb.into(), ordinal)
    }

    fn push(
        &mut self,
        ident: String,
        label: String,
        blurb: String,
        ordinal: i64,
    ) -> Result<&mut Self, DefinitionError> {
        if self.values.iter().any(|v| v.ident == ident) {
            return Err(DefinitionError::DuplicateMember {
                owner: self.enum_name.clone(),
                member: ident,
            });
        }
        if !self.seen.insert(ordinal) {
            return Err(DefinitionError::DuplicateOrdinal {
                enum_name: self.enum_name.clone(),
                ident,
                ordinal,
            });
        }
        self.values.push(EnumValue {
            ident,
            label,
            blurb,
            ordinal,
        });
        self.next_ordinal = ordinal.saturating_add(1);
        Ok(self)
    }

    pub fn build(self) -> TypeKind {
        TypeKind::Enum(self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_ordinals_are_monotonic_with_overrides() {
        let mut builder = EnumBuilder::new("Ui::Align");
        builder.value("LEFT", "Left", "").unwrap();
        builder.value_with_ordinal("CENTER", "Center", "", 10).unwrap();
        builder.value("RIGHT", "Right", "").unwrap();

        let kind = builder.build();
        let TypeKind::Enum(values) = kind else {
            panic!("expected enum");
        };
        let ordinals: Vec<i64> = values.iter().map(|v| v.ordinal).collect();
        assert_eq!(ordinals, vec![0, 10, 11]);
    }

    #[test]
    fn test_enum_duplicate_ordinal_rejected() {
        let mut builder = EnumBuilder::new("Ui::Align");
        builder.value_with_ordinal("A", "", "", 1).unwrap();
        builder.value_with_ordinal("B", "", "", 0).unwrap();
        // B took 0 explicitly, so the implicit next ordinal (1) collides with A
        let err = builder.value("C", "", "").unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateOrdinal { ordinal: 1, .. }));
    }

    #[test]
    fn test_enum_duplicate_ident_rejected() {
        let mut builder = EnumBuilder::new("E");
        builder.value("A", "", "").unwrap();
        assert!(matches!(
            builder.value("A", "", ""),
            Err(DefinitionError::DuplicateMember { .. })
        ));
    }

    #[test]
    fn test_specialize_is_independent() {
        let original = TypeInfo::new(
            "Widget",
            vec!["Ui".into()],
            TypeKind::Interface(InterfaceDef::new().property(Field::new("name", TypeId(4)))),
        );
        let mut view = original.specialize("WidgetHandle");
        if let TypeKind::Interface(def) = &mut view.kind {
            def.fields.push(Field::new("extra", TypeId(3)));
        }

        assert_eq!(original.name, "Widget");
        assert_eq!(original.fields().len(), 1);
        assert_eq!(view.fields().len(), 2);
        assert_eq!(view.qualified_name(), "Ui::WidgetHandle");
    }

    #[test]
    fn test_accessors_respect_variant_shape() {
        let seq = TypeInfo::new("IntSeq", vec![], TypeKind::Sequence(Field::new("ints", TypeId(2))));
        assert!(seq.fields().is_empty());
        assert_eq!(seq.elements().map(|e| e.ident.as_str()), Some("ints"));
        assert!(seq.prerequisites().is_empty());
        assert_eq!(seq.storage(), Storage::Sequence);
        assert_eq!(seq.qualified_name(), "IntSeq");
    }
}
