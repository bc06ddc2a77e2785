//! Structural operation and type digests.
//!
//! A digest is the first 16 bytes of a SHA-256 over a canonical token
//! stream. Tokens are a tag byte followed by either a `u32` big-endian
//! length-prefixed UTF-8 string or a nested 16-byte digest. Nothing about
//! declaration order, target language or compiler run enters the stream, so
//! independently generated callers and callees agree bit for bit.

use crate::error::DefinitionError;
use crate::types::{TypeId, TypeKind, TypeModel};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

const OPERATION_DOMAIN: &str = "aida-op/1";
const TYPE_DOMAIN: &str = "aida-type/1";

/// Member name of the introspection query answered by every object.
pub const TYPE_LIST_MEMBER: &str = "__aida_typelist__";

const TOKEN_TEXT: u8 = 0x01;
const TOKEN_DIGEST: u8 = 0x02;
const TOKEN_KIND: u8 = 0x03;
const TOKEN_BACKREF: u8 = 0x04;

/// 128-bit structural identifier, `hi` holding the first eight hash bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest {
    pub hi: u64,
    pub lo: u64,
}

impl Digest {
    pub const fn new(hi: u64, lo: u64) -> Self {
        Digest { hi, lo }
    }

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.hi.to_be_bytes());
        bytes[8..].copy_from_slice(&self.lo.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut hi = [0u8; 8];
        let mut lo = [0u8; 8];
        hi.copy_from_slice(&bytes[..8]);
        lo.copy_from_slice(&bytes[8..]);
        Digest::new(u64::from_be_bytes(hi), u64::from_be_bytes(lo))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.hi, self.lo)
    }
}

/// Discriminates operations that would otherwise share a name and shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestRole {
    Call,
    Get,
    Set,
    Connect,
    TypeList,
}

impl DigestRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestRole::Call => "call",
            DigestRole::Get => "get",
            DigestRole::Set => "set",
            DigestRole::Connect => "connect",
            DigestRole::TypeList => "typelist",
        }
    }
}

impl fmt::Display for DigestRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatchable operation of an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub role: DigestRole,
    /// Qualified name of the declaring interface.
    pub interface: String,
    pub member: String,
    pub digest: Digest,
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} ({})", self.interface, self.member, self.role)
    }
}

struct TokenStream {
    hasher: Sha256,
}

impl TokenStream {
    fn new(domain: &str) -> Self {
        let mut stream = TokenStream {
            hasher: Sha256::new(),
        };
        stream.text(domain);
        stream
    }

    fn prefixed(&mut self, tag: u8, bytes: &[u8]) {
        self.hasher.update([tag]);
        self.hasher.update((bytes.len() as u32).to_be_bytes());
        self.hasher.update(bytes);
    }

    fn text(&mut self, text: &str) {
        self.prefixed(TOKEN_TEXT, text.as_bytes());
    }

    fn backref(&mut self, qualified_name: &str) {
        self.prefixed(TOKEN_BACKREF, qualified_name.as_bytes());
    }

    fn kind(&mut self, tag: u8) {
        self.hasher.update([TOKEN_KIND, tag]);
    }

    fn digest(&mut self, digest: Digest) {
        self.hasher.update([TOKEN_DIGEST]);
        self.hasher.update(digest.to_bytes());
    }

    fn finish(self) -> Digest {
        let hash = self.hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Digest::from_bytes(bytes)
    }
}

/// Computes digests from a resolved [`TypeModel`]. Pure: the same model
/// always yields the same digests.
#[derive(Debug, Clone, Copy)]
pub struct DigestEngine<'m> {
    model: &'m TypeModel,
}

impl<'m> DigestEngine<'m> {
    pub fn new(model: &'m TypeModel) -> Self {
        DigestEngine { model }
    }

    pub fn model(&self) -> &'m TypeModel {
        self.model
    }

    /// Identity digest of a type: storage class, qualified name and the
    /// recursively digested structure. Interfaces contribute their name only.
    pub fn type_digest(&self, id: TypeId) -> Digest {
        let mut active = Vec::new();
        self.type_digest_in(id, &mut active)
    }

    fn type_digest_in(&self, id: TypeId, active: &mut Vec<TypeId>) -> Digest {
        let info = self.model.type_info(id);
        let mut stream = TokenStream::new(TYPE_DOMAIN);
        stream.kind(info.storage().tag());
        stream.text(&info.qualified_name());

        active.push(id);
        match &info.kind {
            TypeKind::Enum(values) => {
                for value in values {
                    stream.text(&value.ident);
                    stream.text(&value.ordinal.to_string());
                }
            }
            TypeKind::Record(fields) => {
                for field in fields {
                    stream.text(&field.ident);
                    self.member_token(&mut stream, field.ty, active);
                }
            }
            TypeKind::Sequence(element) => {
                stream.text(&element.ident);
                self.member_token(&mut stream, element.ty, active);
            }
            TypeKind::Function(sig) => {
                for arg in &sig.args {
                    self.member_token(&mut stream, arg.ty, active);
                }
                self.member_token(&mut stream, sig.ret, active);
            }
            TypeKind::Interface(_)
            | TypeKind::Void
            | TypeKind::Bool
            | TypeKind::Int
            | TypeKind::Float
            | TypeKind::String
            | TypeKind::Any => {}
        }
        active.pop();

        stream.finish()
    }

    fn member_token(&self, stream: &mut TokenStream, ty: TypeId, active: &mut Vec<TypeId>) {
        if active.contains(&ty) {
            stream.backref(&self.model.type_info(ty).qualified_name());
        } else {
            stream.digest(self.type_digest_in(ty, active));
        }
    }

    /// Digest of `role` applied to `member` of `iface` with the given shape.
    pub fn operation(
        &self,
        role: DigestRole,
        iface: TypeId,
        member: &str,
        args: &[TypeId],
        ret: TypeId,
    ) -> Digest {
        let mut stream = TokenStream::new(OPERATION_DOMAIN);
        stream.text(role.as_str());
        stream.text(&self.model.type_info(iface).qualified_name());
        stream.text(member);
        for arg in args {
            stream.digest(self.type_digest(*arg));
        }
        stream.digest(self.type_digest(ret));
        let digest = stream.finish();
        trace!("Digest {} for {} {}", digest, role, member);
        digest
    }

    fn member_not_found(&self, iface: TypeId, member: &str) -> DefinitionError {
        DefinitionError::Unresolved(format!(
            "{}::{}",
            self.model.type_info(iface).qualified_name(),
            member
        ))
    }

    pub fn method(&self, iface: TypeId, name: &str) -> Result<Digest, DefinitionError> {
        let method = self
            .model
            .interface(iface)?
            .find_method(name)
            .ok_or_else(|| self.member_not_found(iface, name))?;
        let args: Vec<TypeId> = method.sig.args.iter().map(|a| a.ty).collect();
        Ok(self.operation(DigestRole::Call, iface, name, &args, method.sig.ret))
    }

    pub fn getter(&self, iface: TypeId, property: &str) -> Result<Digest, DefinitionError> {
        let field = self
            .model
            .interface(iface)?
            .find_property(property)
            .ok_or_else(|| self.member_not_found(iface, property))?;
        Ok(self.operation(DigestRole::Get, iface, property, &[], field.ty))
    }

    pub fn setter(&self, iface: TypeId, property: &str) -> Result<Digest, DefinitionError> {
        let field = self
            .model
            .interface(iface)?
            .find_property(property)
            .ok_or_else(|| self.member_not_found(iface, property))?;
        let void = self.model.builtins().void;
        Ok(self.operation(DigestRole::Set, iface, property, &[field.ty], void))
    }

    pub fn signal_connector(&self, iface: TypeId, signal: &str) -> Result<Digest, DefinitionError> {
        let signal_def = self
            .model
            .interface(iface)?
            .find_signal(signal)
            .ok_or_else(|| self.member_not_found(iface, signal))?;
        let args: Vec<TypeId> = signal_def.sig.args.iter().map(|a| a.ty).collect();
        Ok(self.operation(DigestRole::Connect, iface, signal, &args, signal_def.sig.ret))
    }

    /// The type-list query lives on the implicit base, so it has the same
    /// digest on every object.
    pub fn type_list(&self) -> Digest {
        let builtins = self.model.builtins();
        self.operation(
            DigestRole::TypeList,
            builtins.implicit_base,
            TYPE_LIST_MEMBER,
            &[],
            builtins.void,
        )
    }

    /// Every operation declared directly on `iface`: methods, property
    /// getters and setters, then signal connectors. The implicit base also
    /// reports the type-list query.
    pub fn interface_operations(
        &self,
        iface: TypeId,
    ) -> Result<Vec<OperationDescriptor>, DefinitionError> {
        let def = self.model.interface(iface)?;
        let interface = self.model.type_info(iface).qualified_name();
        let describe = |role: DigestRole, member: &str, digest: Digest| OperationDescriptor {
            role,
            interface: interface.clone(),
            member: member.to_string(),
            digest,
        };

        let mut operations = Vec::new();
        for method in &def.methods {
            operations.push(describe(
                DigestRole::Call,
                &method.name,
                self.method(iface, &method.name)?,
            ));
        }
        for field in &def.fields {
            operations.push(describe(
                DigestRole::Get,
                &field.ident,
                self.getter(iface, &field.ident)?,
            ));
            operations.push(describe(
                DigestRole::Set,
                &field.ident,
                self.setter(iface, &field.ident)?,
            ));
        }
        for signal in &def.signals {
            operations.push(describe(
                DigestRole::Connect,
                &signal.name,
                self.signal_connector(iface, &signal.name)?,
            ));
        }
        if iface == self.model.implicit_base() {
            operations.push(describe(
                DigestRole::TypeList,
                TYPE_LIST_MEMBER,
                self.type_list(),
            ));
        }
        Ok(operations)
    }

    /// Digest every operation of `ifaces` (plus the type-list query) and fail
    /// on the first digest claimed twice.
    pub fn check_collisions(
        &self,
        ifaces: &[TypeId],
    ) -> Result<Vec<OperationDescriptor>, DefinitionError> {
        let mut targets: Vec<TypeId> = ifaces.to_vec();
        let implicit_base = self.model.implicit_base();
        if !targets.contains(&implicit_base) {
            targets.push(implicit_base);
        }

        let mut seen: HashMap<Digest, OperationDescriptor> = HashMap::new();
        let mut all = Vec::new();
        for iface in targets {
            for op in self.interface_operations(iface)? {
                if let Some(first) = seen.get(&op.digest) {
                    return Err(DefinitionError::DigestCollision {
                        first: first.to_string(),
                        second: op.to_string(),
                        digest: op.digest.to_string(),
                    });
                }
                seen.insert(op.digest, op.clone());
                all.push(op);
            }
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Arg, Field, FunctionSig, InterfaceDef, Method, ModelBuilder, Storage, TypeKind,
    };

    fn widget_model() -> (TypeModel, TypeId) {
        let mut builder = ModelBuilder::new();
        let b = *builder.builtins();
        let widget = builder
            .add(
                "Ui",
                "Widget",
                TypeKind::Interface(
                    InterfaceDef::new()
                        .property(Field::new("width", b.int))
                        .method(Method::new(
                            "resize",
                            FunctionSig::new(b.boolean)
                                .arg(Arg::new("w", b.int))
                                .arg(Arg::new("h", b.int)),
                        ))
                        .signal(Method::new("changed", FunctionSig::new(b.void))),
                ),
            )
            .unwrap();
        (builder.finish().unwrap(), widget)
    }

    #[test]
    fn test_digest_display_and_bytes() {
        let digest = Digest::new(0x0123_4567_89ab_cdef, 0xfedc_ba98_7654_3210);
        assert_eq!(digest.to_string(), "0123456789abcdeffedcba9876543210");
        assert_eq!(Digest::from_bytes(digest.to_bytes()), digest);
    }

    #[test]
    fn test_digest_serde() {
        let digest = Digest::new(1, 2);
        let json = serde_json::to_string(&digest).unwrap();
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    #[test]
    fn test_operation_digests_are_deterministic() {
        let (model, widget) = widget_model();
        let engine = DigestEngine::new(&model);
        assert_eq!(
            engine.method(widget, "resize").unwrap(),
            engine.method(widget, "resize").unwrap()
        );

        let (other, widget_again) = widget_model();
        assert_eq!(
            engine.method(widget, "resize").unwrap(),
            DigestEngine::new(&other).method(widget_again, "resize").unwrap()
        );
    }

    #[test]
    fn test_getter_differs_from_setter() {
        let (model, widget) = widget_model();
        let engine = DigestEngine::new(&model);
        assert_ne!(
            engine.getter(widget, "width").unwrap(),
            engine.setter(widget, "width").unwrap()
        );
    }

    #[test]
    fn test_unknown_member_is_unresolved() {
        let (model, widget) = widget_model();
        let engine = DigestEngine::new(&model);
        assert_eq!(
            engine.method(widget, "missing").unwrap_err(),
            DefinitionError::Unresolved("Ui::Widget::missing".into())
        );
        assert!(engine.getter(widget, "resize").is_err());
        assert!(engine.method(model.builtins().int, "x").is_err());
    }

    #[test]
    fn test_self_referencing_record_terminates() {
        let mut builder = ModelBuilder::new();
        let b = *builder.builtins();
        let node = builder.declare("Tree", "Node", Storage::Record).unwrap();
        let children = builder
            .add("Tree", "NodeSeq", TypeKind::Sequence(Field::new("nodes", node)))
            .unwrap();
        builder
            .define(
                node,
                TypeKind::Record(vec![
                    Field::new("value", b.int),
                    Field::new("children", children),
                ]),
            )
            .unwrap();
        let model = builder.finish().unwrap();

        let engine = DigestEngine::new(&model);
        assert_ne!(engine.type_digest(node), engine.type_digest(children));
        assert_eq!(engine.type_digest(node), engine.type_digest(node));
    }

    #[test]
    fn test_interface_operations_lists_every_member() {
        let (model, widget) = widget_model();
        let engine = DigestEngine::new(&model);
        let ops = engine.interface_operations(widget).unwrap();
        let roles: Vec<DigestRole> = ops.iter().map(|op| op.role).collect();
        assert_eq!(
            roles,
            vec![
                DigestRole::Call,
                DigestRole::Get,
                DigestRole::Set,
                DigestRole::Connect
            ]
        );
        assert_eq!(ops[0].to_string(), "Ui::Widget.resize (call)");

        let base_ops = engine.interface_operations(model.implicit_base()).unwrap();
        assert_eq!(base_ops.len(), 1);
        assert_eq!(base_ops[0].digest, engine.type_list());
    }

    #[test]
    fn test_check_collisions_accepts_distinct_operations() {
        let (model, widget) = widget_model();
        let engine = DigestEngine::new(&model);
        let ops = engine.check_collisions(&[widget]).unwrap();
        assert_eq!(ops.len(), 5);
    }

    #[test]
    fn test_check_collisions_reports_duplicates() {
        let (model, widget) = widget_model();
        let engine = DigestEngine::new(&model);
        match engine.check_collisions(&[widget, widget]) {
            Err(DefinitionError::DigestCollision { first, second, .. }) => {
                assert_eq!(first, second);
            }
            other => panic!("expected collision, got {:?}", other),
        }
    }
}
