use super::info::{ConstValue, TypeId};
use crate::error::DefinitionError;
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum NamespaceMember {
    Type(TypeId),
    Const(ConstValue),
}

/// Owns the uniquely named constants and types of one `::` scope. Members
/// keep their declaration order.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    path: Vec<String>,
    members: IndexMap<String, NamespaceMember>,
}

impl Namespace {
    pub fn new(path: Vec<String>) -> Self {
        Namespace {
            path,
            members: IndexMap::new(),
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Joined path, empty for the root namespace.
    pub fn name(&self) -> String {
        self.path.join("::")
    }

    fn insert(&mut self, name: &str, member: NamespaceMember) -> Result<(), DefinitionError> {
        if self.members.contains_key(name) {
            return Err(DefinitionError::Duplicate {
                namespace: self.name(),
                name: name.to_string(),
            });
        }
        self.members.insert(name.to_string(), member);
        Ok(())
    }

    pub fn add_type(&mut self, name: &str, id: TypeId) -> Result<(), DefinitionError> {
        self.insert(name, NamespaceMember::Type(id))
    }

    pub fn add_const(&mut self, name: &str, value: ConstValue) -> Result<(), DefinitionError> {
        self.insert(name, NamespaceMember::Const(value))
    }

    pub fn find_type(&self, name: &str) -> Result<TypeId, DefinitionError> {
        match self.members.get(name) {
            Some(NamespaceMember::Type(id)) => Ok(*id),
            _ => Err(DefinitionError::Unresolved(self.qualify(name))),
        }
    }

    pub fn find_const(&self, name: &str) -> Result<&ConstValue, DefinitionError> {
        match self.members.get(name) {
            Some(NamespaceMember::Const(value)) => Ok(value),
            _ => Err(DefinitionError::Unresolved(self.qualify(name))),
        }
    }

    /// True when neither a type nor a constant uses `name`.
    pub fn is_unknown(&self, name: &str) -> bool {
        !self.members.contains_key(name)
    }

    pub fn types(&self) -> impl Iterator<Item = (&str, TypeId)> {
        self.members.iter().filter_map(|(name, member)| match member {
            NamespaceMember::Type(id) => Some((name.as_str(), *id)),
            NamespaceMember::Const(_) => None,
        })
    }

    pub fn consts(&self) -> impl Iterator<Item = (&str, &ConstValue)> {
        self.members.iter().filter_map(|(name, member)| match member {
            NamespaceMember::Const(value) => Some((name.as_str(), value)),
            NamespaceMember::Type(_) => None,
        })
    }

    fn qualify(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", self.name(), name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> Namespace {
        Namespace::new(vec!["Ui".into()])
    }

    #[test]
    fn test_type_and_const_share_one_name_space() {
        let mut ns = ns();
        ns.add_type("Widget", TypeId::from_index(7)).unwrap();

        let err = ns.add_const("Widget", ConstValue::Int(1)).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::Duplicate {
                namespace: "Ui".into(),
                name: "Widget".into()
            }
        );

        ns.add_const("MAX", ConstValue::Int(3)).unwrap();
        assert!(ns.add_type("MAX", TypeId::from_index(8)).is_err());
    }

    #[test]
    fn test_find_reports_unresolved_with_qualified_name() {
        let mut ns = ns();
        ns.add_const("PI", ConstValue::Float(2.5)).unwrap();

        assert_eq!(ns.find_const("PI").unwrap(), &ConstValue::Float(2.5));
        assert_eq!(
            ns.find_type("PI").unwrap_err(),
            DefinitionError::Unresolved("Ui::PI".into())
        );
        assert_eq!(
            ns.find_const("E").unwrap_err(),
            DefinitionError::Unresolved("Ui::E".into())
        );
        assert!(ns.is_unknown("E"));
        assert!(!ns.is_unknown("PI"));
    }

    #[test]
    fn test_iteration_keeps_declaration_order() {
        let mut ns = ns();
        ns.add_type("B", TypeId::from_index(2)).unwrap();
        ns.add_const("X", ConstValue::Str("x".into())).unwrap();
        ns.add_type("A", TypeId::from_index(1)).unwrap();

        let names: Vec<&str> = ns.types().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert_eq!(ns.consts().count(), 1);
    }
}
