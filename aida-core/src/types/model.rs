use super::info::{ConstValue, InterfaceDef, Storage, TypeId, TypeInfo, TypeKind};
use super::namespace::Namespace;
use crate::error::DefinitionError;
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, trace};

pub const IMPLICIT_BASE_NAMESPACE: &str = "Aida";
pub const IMPLICIT_BASE_NAME: &str = "ImplicitBase";

/// Types every model starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtins {
    pub void: TypeId,
    pub boolean: TypeId,
    pub int: TypeId,
    pub float: TypeId,
    pub string: TypeId,
    pub any: TypeId,
    /// Root of every interface hierarchy, see [`crate::inherit::class_bases`].
    pub implicit_base: TypeId,
}

fn split_path(path: &str) -> Vec<String> {
    path.split("::")
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_path(path: &[String]) -> String {
    path.join("::")
}

/// Candidate `(namespace, leaf)` pairs for `name` looked up from `scope`,
/// innermost scope first, root last.
fn lookup_candidates(scope: &str, name: &str) -> Vec<(String, String)> {
    let scope = split_path(scope);
    let name = split_path(name);
    let Some((leaf, prefix)) = name.split_last() else {
        return Vec::new();
    };

    (0..=scope.len())
        .rev()
        .map(|depth| {
            let mut ns: Vec<String> = scope[..depth].to_vec();
            ns.extend(prefix.iter().cloned());
            (join_path(&ns), leaf.clone())
        })
        .collect()
}

fn resolve_type_in(
    namespaces: &IndexMap<String, Namespace>,
    scope: &str,
    name: &str,
) -> Result<TypeId, DefinitionError> {
    lookup_candidates(scope, name)
        .into_iter()
        .find_map(|(ns, leaf)| namespaces.get(&ns)?.find_type(&leaf).ok())
        .ok_or_else(|| DefinitionError::Unresolved(name.to_string()))
}

fn resolve_const_in<'a>(
    namespaces: &'a IndexMap<String, Namespace>,
    scope: &str,
    name: &str,
) -> Result<&'a ConstValue, DefinitionError> {
    lookup_candidates(scope, name)
        .into_iter()
        .find_map(|(ns, leaf)| namespaces.get(&ns)?.find_const(&leaf).ok())
        .ok_or_else(|| DefinitionError::Unresolved(name.to_string()))
}

/// Mutable stage of the model, standing in for the IDL resolver. Types can
/// be declared ahead of their definition so interfaces may refer to each
/// other; [`ModelBuilder::finish`] checks that everything got defined and
/// resolves.
#[derive(Debug)]
pub struct ModelBuilder {
    types: Vec<TypeInfo>,
    defined: Vec<bool>,
    namespaces: IndexMap<String, Namespace>,
    builtins: Builtins,
}

impl ModelBuilder {
    pub fn new() -> Self {
        let mut types = Vec::new();
        let mut root = Namespace::new(Vec::new());
        let mut builtin = |name: &str, kind: TypeKind| {
            let id = TypeId::from_index(types.len());
            types.push(TypeInfo::new(name, Vec::new(), kind));
            // builtin names are distinct
            let _ = root.add_type(name, id);
            id
        };

        let void = builtin("void", TypeKind::Void);
        let boolean = builtin("bool", TypeKind::Bool);
        let int = builtin("int", TypeKind::Int);
        let float = builtin("float", TypeKind::Float);
        let string = builtin("string", TypeKind::String);
        let any = builtin("any", TypeKind::Any);

        let implicit_base = TypeId::from_index(types.len());
        types.push(TypeInfo::new(
            IMPLICIT_BASE_NAME,
            vec![IMPLICIT_BASE_NAMESPACE.to_string()],
            TypeKind::Interface(InterfaceDef::new()),
        ));
        let mut aida = Namespace::new(vec![IMPLICIT_BASE_NAMESPACE.to_string()]);
        let _ = aida.add_type(IMPLICIT_BASE_NAME, implicit_base);

        let mut namespaces = IndexMap::new();
        namespaces.insert(String::new(), root);
        namespaces.insert(IMPLICIT_BASE_NAMESPACE.to_string(), aida);

        let defined = vec![true; types.len()];
        ModelBuilder {
            types,
            defined,
            namespaces,
            builtins: Builtins {
                void,
                boolean,
                int,
                float,
                string,
                any,
                implicit_base,
            },
        }
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// Open a namespace, creating it on first use.
    pub fn namespace(&mut self, path: &str) -> &mut Namespace {
        let segments = split_path(path);
        self.namespaces
            .entry(join_path(&segments))
            .or_insert_with(|| Namespace::new(segments))
    }

    /// Reserve `ns::name` with the given storage class. The payload stays
    /// empty until [`ModelBuilder::define`].
    pub fn declare(
        &mut self,
        ns: &str,
        name: &str,
        storage: Storage,
    ) -> Result<TypeId, DefinitionError> {
        let id = TypeId::from_index(self.types.len());
        let path = split_path(ns);
        self.namespace(ns).add_type(name, id)?;
        self.types.push(TypeInfo::new(
            name,
            path,
            storage.placeholder(self.builtins.void),
        ));
        self.defined.push(false);
        trace!("Declared {} {}::{}", storage, ns, name);
        Ok(id)
    }

    pub fn define(&mut self, id: TypeId, kind: TypeKind) -> Result<(), DefinitionError> {
        let index = id.index();
        let info = self
            .types
            .get_mut(index)
            .ok_or_else(|| DefinitionError::Unresolved(id.to_string()))?;

        if self.defined[index] {
            return Err(DefinitionError::Duplicate {
                namespace: join_path(&info.namespace),
                name: info.name.clone(),
            });
        }
        if info.storage() != kind.storage() {
            return Err(DefinitionError::WrongKind {
                name: info.qualified_name(),
                expected: info.storage().as_str(),
            });
        }

        info.kind = kind;
        self.defined[index] = true;
        Ok(())
    }

    pub fn add(&mut self, ns: &str, name: &str, kind: TypeKind) -> Result<TypeId, DefinitionError> {
        let id = self.declare(ns, name, kind.storage())?;
        self.define(id, kind)?;
        Ok(id)
    }

    pub fn add_const(
        &mut self,
        ns: &str,
        name: &str,
        value: ConstValue,
    ) -> Result<(), DefinitionError> {
        self.namespace(ns).add_const(name, value)
    }

    /// Look `name` up from `scope`, walking out to the root namespace.
    pub fn resolve(&self, scope: &str, name: &str) -> Result<TypeId, DefinitionError> {
        resolve_type_in(&self.namespaces, scope, name)
    }

    pub fn resolve_const(&self, scope: &str, name: &str) -> Result<&ConstValue, DefinitionError> {
        resolve_const_in(&self.namespaces, scope, name)
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeInfo> {
        self.types.get(id.index())
    }

    /// Validate the declaration graph and freeze it.
    pub fn finish(self) -> Result<TypeModel, DefinitionError> {
        for (info, defined) in self.types.iter().zip(&self.defined) {
            if !defined {
                return Err(DefinitionError::Undefined(info.qualified_name()));
            }
        }

        for info in &self.types {
            self.check_shape(info)?;
        }
        self.check_acyclic()?;

        debug!(
            "Type model resolved: {} types in {} namespaces",
            self.types.len(),
            self.namespaces.len()
        );

        Ok(TypeModel {
            types: self.types,
            namespaces: self.namespaces,
            builtins: self.builtins,
        })
    }

    fn check_ref(&self, owner: &TypeInfo, id: TypeId) -> Result<(), DefinitionError> {
        if id.index() < self.types.len() {
            Ok(())
        } else {
            Err(DefinitionError::Unresolved(format!(
                "{} referenced from {}",
                id,
                owner.qualified_name()
            )))
        }
    }

    fn check_unique<'a, I>(owner: &TypeInfo, names: I) -> Result<(), DefinitionError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                return Err(DefinitionError::DuplicateMember {
                    owner: owner.qualified_name(),
                    member: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_shape(&self, info: &TypeInfo) -> Result<(), DefinitionError> {
        match &info.kind {
            TypeKind::Void
            | TypeKind::Bool
            | TypeKind::Int
            | TypeKind::Float
            | TypeKind::String
            | TypeKind::Any => Ok(()),
            TypeKind::Enum(values) => {
                Self::check_unique(info, values.iter().map(|v| v.ident.as_str()))?;
                let mut ordinals = HashSet::new();
                for value in values {
                    if !ordinals.insert(value.ordinal) {
                        return Err(DefinitionError::DuplicateOrdinal {
                            enum_name: info.qualified_name(),
                            ident: value.ident.clone(),
                            ordinal: value.ordinal,
                        });
                    }
                }
                Ok(())
            }
            TypeKind::Record(fields) => {
                Self::check_unique(info, fields.iter().map(|f| f.ident.as_str()))?;
                fields.iter().try_for_each(|f| self.check_ref(info, f.ty))
            }
            TypeKind::Sequence(element) => {
                self.check_ref(info, element.ty)?;
                if element.ty == self.builtins.void {
                    return Err(DefinitionError::WrongKind {
                        name: info.qualified_name(),
                        expected: "sequence with a non-void element",
                    });
                }
                Ok(())
            }
            TypeKind::Function(sig) => {
                Self::check_unique(info, sig.args.iter().map(|a| a.ident.as_str()))?;
                sig.args
                    .iter()
                    .try_for_each(|a| self.check_ref(info, a.ty))?;
                self.check_ref(info, sig.ret)
            }
            TypeKind::Interface(def) => {
                for prerequisite in &def.prerequisites {
                    self.check_ref(info, *prerequisite)?;
                    let pre = &self.types[prerequisite.index()];
                    if !pre.is_interface() {
                        return Err(DefinitionError::WrongKind {
                            name: pre.qualified_name(),
                            expected: "interface",
                        });
                    }
                }
                Self::check_unique(
                    info,
                    def.fields
                        .iter()
                        .map(|f| f.ident.as_str())
                        .chain(def.methods.iter().map(|m| m.name.as_str()))
                        .chain(def.signals.iter().map(|s| s.name.as_str())),
                )?;
                for field in &def.fields {
                    self.check_ref(info, field.ty)?;
                }
                for member in def.methods.iter().chain(&def.signals) {
                    Self::check_unique(info, member.sig.args.iter().map(|a| a.ident.as_str()))?;
                    for arg in &member.sig.args {
                        self.check_ref(info, arg.ty)?;
                    }
                    self.check_ref(info, member.sig.ret)?;
                }
                Ok(())
            }
        }
    }

    fn check_acyclic(&self) -> Result<(), DefinitionError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        fn visit(
            types: &[TypeInfo],
            id: TypeId,
            marks: &mut [Mark],
            stack: &mut Vec<TypeId>,
        ) -> Result<(), DefinitionError> {
            match marks[id.index()] {
                Mark::Done => Ok(()),
                Mark::Active => {
                    let start = stack.iter().position(|s| *s == id).unwrap_or(0);
                    let mut names: Vec<String> = stack[start..]
                        .iter()
                        .map(|s| types[s.index()].qualified_name())
                        .collect();
                    names.push(types[id.index()].qualified_name());
                    Err(DefinitionError::Cycle(names.join(" -> ")))
                }
                Mark::New => {
                    marks[id.index()] = Mark::Active;
                    stack.push(id);
                    for prerequisite in types[id.index()].prerequisites() {
                        visit(types, *prerequisite, marks, stack)?;
                    }
                    stack.pop();
                    marks[id.index()] = Mark::Done;
                    Ok(())
                }
            }
        }

        let mut marks = vec![Mark::New; self.types.len()];
        let mut stack = Vec::new();
        for index in 0..self.types.len() {
            visit(&self.types, TypeId::from_index(index), &mut marks, &mut stack)?;
        }
        Ok(())
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The resolved, immutable declaration graph. Shared freely (`Arc`) by the
/// digest engine, the inheritance resolver, the value codec and every emitter.
#[derive(Debug, Clone)]
pub struct TypeModel {
    types: Vec<TypeInfo>,
    namespaces: IndexMap<String, Namespace>,
    builtins: Builtins,
}

impl TypeModel {
    /// # Panics
    ///
    /// Panics if `id` was not produced by this model.
    pub fn type_info(&self, id: TypeId) -> &TypeInfo {
        &self.types[id.index()]
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeInfo> {
        self.types.get(id.index())
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn implicit_base(&self) -> TypeId {
        self.builtins.implicit_base
    }

    pub fn resolve(&self, scope: &str, name: &str) -> Result<TypeId, DefinitionError> {
        resolve_type_in(&self.namespaces, scope, name)
    }

    pub fn resolve_const(&self, scope: &str, name: &str) -> Result<&ConstValue, DefinitionError> {
        resolve_const_in(&self.namespaces, scope, name)
    }

    pub fn namespace(&self, path: &str) -> Option<&Namespace> {
        self.namespaces.get(&join_path(&split_path(path)))
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.values()
    }

    pub fn interface(&self, id: TypeId) -> Result<&InterfaceDef, DefinitionError> {
        let info = self
            .get(id)
            .ok_or_else(|| DefinitionError::Unresolved(id.to_string()))?;
        info.as_interface().ok_or_else(|| DefinitionError::WrongKind {
            name: info.qualified_name(),
            expected: "interface",
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeInfo)> {
        self.types
            .iter()
            .enumerate()
            .map(|(index, info)| (TypeId::from_index(index), info))
    }

    pub fn interfaces(&self) -> impl Iterator<Item = (TypeId, &TypeInfo)> {
        self.iter().filter(|(_, info)| info.is_interface())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
