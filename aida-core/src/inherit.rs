//! Graph algorithms over interface prerequisites.
//!
//! Interfaces are compared by [`TypeId`], so diamonds collapse by identity
//! rather than by any target language's method resolution order.

use crate::digest::{Digest, DigestEngine};
use crate::error::{DefinitionError, RpcError};
use crate::types::{TypeId, TypeModel};
use crate::wire::{FieldBuffer, FieldReader};
use std::collections::HashSet;

/// True when `parent` is a direct or transitive prerequisite of `child`.
/// An interface is not its own ancestor.
pub fn has_ancestor(model: &TypeModel, child: TypeId, parent: TypeId) -> bool {
    let mut pending: Vec<TypeId> = model.type_info(child).prerequisites().to_vec();
    let mut visited = HashSet::new();
    while let Some(next) = pending.pop() {
        if next == parent {
            return true;
        }
        if visited.insert(next) {
            pending.extend_from_slice(model.type_info(next).prerequisites());
        }
    }
    false
}

/// Minimal-base reduction: drops every interface that duplicates, or is an
/// ancestor of, another interface in the list. Relative order of the
/// survivors matches the input.
pub fn reduce(model: &TypeModel, interfaces: &[TypeId]) -> Vec<TypeId> {
    let mut pending: Vec<TypeId> = interfaces.to_vec();
    let mut kept: Vec<TypeId> = Vec::new();

    while let Some(candidate) = pending.pop() {
        let subsumed = pending
            .iter()
            .chain(kept.iter())
            .any(|other| *other == candidate || has_ancestor(model, *other, candidate));
        if !subsumed {
            kept.insert(0, candidate);
        }
    }
    kept
}

/// `iface` followed by all its transitive prerequisites, depth first, each
/// listed once at its first discovery.
pub fn ancestry_closure(model: &TypeModel, iface: TypeId) -> Vec<TypeId> {
    fn visit(model: &TypeModel, id: TypeId, seen: &mut HashSet<TypeId>, out: &mut Vec<TypeId>) {
        if !seen.insert(id) {
            return;
        }
        out.push(id);
        for prerequisite in model.type_info(id).prerequisites() {
            visit(model, *prerequisite, seen, out);
        }
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    visit(model, iface, &mut seen, &mut out);
    out
}

/// Bases an emitter writes into the class declaration of `iface`.
/// Interfaces without prerequisites derive from the implicit base.
pub fn class_bases(model: &TypeModel, iface: TypeId) -> Result<Vec<TypeId>, DefinitionError> {
    let def = model.interface(iface)?;
    let implicit_base = model.implicit_base();
    if def.prerequisites.is_empty() {
        if iface == implicit_base {
            return Ok(Vec::new());
        }
        return Ok(vec![implicit_base]);
    }
    Ok(reduce(model, &def.prerequisites))
}

/// Type identity digests an object of type `iface` reports to a type-list
/// query: its ancestry closure, then the implicit base.
pub fn type_list(model: &TypeModel, iface: TypeId) -> Result<Vec<Digest>, DefinitionError> {
    model.interface(iface)?;
    let engine = DigestEngine::new(model);
    let mut closure = ancestry_closure(model, iface);
    let implicit_base = model.implicit_base();
    if !closure.contains(&implicit_base) {
        closure.push(implicit_base);
    }
    Ok(closure.into_iter().map(|id| engine.type_digest(id)).collect())
}

/// Narrowing check against a type list received from the peer.
pub fn can_narrow(type_list: &[Digest], target: Digest) -> bool {
    type_list.contains(&target)
}

/// Type list as it travels in a result payload: a sequence of
/// `{hi, lo}` records.
pub fn encode_type_list(digests: &[Digest]) -> FieldBuffer {
    let mut sequence = FieldBuffer::with_capacity(digests.len());
    for digest in digests {
        let mut pair = FieldBuffer::with_capacity(2);
        pair.push_int(digest.hi as i64).push_int(digest.lo as i64);
        sequence.push_record(pair);
    }
    sequence
}

pub fn decode_type_list(reader: &mut FieldReader<'_>) -> Result<Vec<Digest>, RpcError> {
    let mut sequence = reader.pop_sequence()?;
    let mut digests = Vec::with_capacity(sequence.remaining());
    while sequence.remaining() > 0 {
        let mut pair = sequence.pop_record()?;
        let hi = pair.pop_int()? as u64;
        let lo = pair.pop_int()? as u64;
        pair.finish()?;
        digests.push(Digest::new(hi, lo));
    }
    Ok(digests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InterfaceDef, ModelBuilder, Storage, TypeKind};

    fn iface(builder: &mut ModelBuilder, name: &str, prerequisites: &[TypeId]) -> TypeId {
        let def = prerequisites
            .iter()
            .fold(InterfaceDef::new(), |def, p| def.prerequisite(*p));
        builder.add("Ui", name, TypeKind::Interface(def)).unwrap()
    }

    #[test]
    fn test_diamond_closure_lists_common_ancestor_once() {
        let mut builder = ModelBuilder::new();
        let a = iface(&mut builder, "A", &[]);
        let l = iface(&mut builder, "L", &[a]);
        let r = iface(&mut builder, "R", &[a]);
        let b = iface(&mut builder, "B", &[l, r]);
        let model = builder.finish().unwrap();

        assert_eq!(ancestry_closure(&model, b), vec![b, l, a, r]);
        assert!(has_ancestor(&model, b, a));
        assert!(!has_ancestor(&model, a, b));
        assert!(!has_ancestor(&model, a, a));
    }

    #[test]
    fn test_reduce_drops_ancestors_and_duplicates() {
        let mut builder = ModelBuilder::new();
        let a = iface(&mut builder, "A", &[]);
        let l = iface(&mut builder, "L", &[a]);
        let r = iface(&mut builder, "R", &[a]);
        let other = iface(&mut builder, "Other", &[]);
        let model = builder.finish().unwrap();

        assert_eq!(reduce(&model, &[a, l, r]), vec![l, r]);
        assert_eq!(reduce(&model, &[other, a, other]), vec![other, a]);
        assert_eq!(reduce(&model, &[r, l, a]), vec![r, l]);
        assert!(reduce(&model, &[]).is_empty());
    }

    #[test]
    fn test_class_bases_default_to_implicit_base() {
        let mut builder = ModelBuilder::new();
        let a = iface(&mut builder, "A", &[]);
        let l = iface(&mut builder, "L", &[a]);
        let b = iface(&mut builder, "B", &[a, l]);
        let model = builder.finish().unwrap();

        assert_eq!(class_bases(&model, a).unwrap(), vec![model.implicit_base()]);
        assert_eq!(class_bases(&model, b).unwrap(), vec![l]);
        assert!(class_bases(&model, model.implicit_base()).unwrap().is_empty());
        assert!(class_bases(&model, model.builtins().int).is_err());
    }

    #[test]
    fn test_type_list_ends_with_implicit_base() {
        let mut builder = ModelBuilder::new();
        let base = iface(&mut builder, "Base", &[]);
        let derived = iface(&mut builder, "Derived", &[base]);
        let unrelated = builder.declare("Ui", "Unrelated", Storage::Interface).unwrap();
        builder
            .define(unrelated, TypeKind::Interface(InterfaceDef::new()))
            .unwrap();
        let model = builder.finish().unwrap();
        let engine = DigestEngine::new(&model);

        let list = type_list(&model, derived).unwrap();
        assert_eq!(
            list,
            vec![
                engine.type_digest(derived),
                engine.type_digest(base),
                engine.type_digest(model.implicit_base()),
            ]
        );
        assert!(can_narrow(&list, engine.type_digest(base)));
        assert!(!can_narrow(&list, engine.type_digest(unrelated)));
    }

    #[test]
    fn test_type_list_payload() {
        let digests = vec![Digest::new(u64::MAX, 1), Digest::new(2, 3)];
        let mut payload = FieldBuffer::new();
        payload.push_sequence(encode_type_list(&digests));
        let mut reader = payload.reader();
        assert_eq!(decode_type_list(&mut reader).unwrap(), digests);
        reader.finish().unwrap();
    }
}
