// Property tests: reduction laws over random prerequisite DAGs and value
// round trips through nested records and sequences.

use aida_core::inherit::{ancestry_closure, has_ancestor, reduce};
use aida_core::types::{Field, InterfaceDef, ModelBuilder, TypeId, TypeKind, TypeModel};
use aida_core::wire::{Value, ValueCodec};
use aida_core::FieldBuffer;
use proptest::prelude::*;
use std::collections::HashSet;

/// Interfaces `I0..In`, each `Ik` deriving from the listed lower indices.
fn dag_model(edges: &[Vec<usize>]) -> (TypeModel, Vec<TypeId>) {
    let mut builder = ModelBuilder::new();
    let mut ids: Vec<TypeId> = Vec::new();
    for (index, parents) in edges.iter().enumerate() {
        let def = parents
            .iter()
            .filter(|p| **p < index)
            .fold(InterfaceDef::new(), |def, p| def.prerequisite(ids[*p]));
        let id = builder
            .add("P", &format!("I{}", index), TypeKind::Interface(def))
            .unwrap();
        ids.push(id);
    }
    (builder.finish().unwrap(), ids)
}

fn dag_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    prop::collection::vec(prop::collection::vec(0usize..12, 0..3), 1..12)
}

/// Nested type chain: `Leaf{a:int,b:string}`, then alternating sequence and
/// record wrappers until `depth` levels.
struct Nested {
    model: TypeModel,
    levels: Vec<TypeId>,
}

fn nested_model() -> Nested {
    let mut builder = ModelBuilder::new();
    let b = *builder.builtins();
    let leaf = builder
        .add(
            "N",
            "Leaf",
            TypeKind::Record(vec![Field::new("a", b.int), Field::new("b", b.string)]),
        )
        .unwrap();
    let seq1 = builder
        .add("N", "LeafSeq", TypeKind::Sequence(Field::new("leaves", leaf)))
        .unwrap();
    let rec2 = builder
        .add(
            "N",
            "Group",
            TypeKind::Record(vec![Field::new("flag", b.boolean), Field::new("leaves", seq1)]),
        )
        .unwrap();
    let seq3 = builder
        .add("N", "GroupSeq", TypeKind::Sequence(Field::new("groups", rec2)))
        .unwrap();
    Nested {
        model: builder.finish().unwrap(),
        levels: vec![leaf, seq1, rec2, seq3],
    }
}

fn leaf_strategy() -> impl Strategy<Value = Value> {
    (any::<i64>(), ".{0,12}").prop_map(|(a, b)| Value::Record(vec![Value::Int(a), Value::String(b)]))
}

fn group_seq_strategy() -> impl Strategy<Value = Value> {
    let leaves = prop::collection::vec(leaf_strategy(), 0..4).prop_map(Value::Sequence);
    let group = (any::<bool>(), leaves)
        .prop_map(|(flag, leaves)| Value::Record(vec![Value::Bool(flag), leaves]));
    prop::collection::vec(group, 0..4).prop_map(Value::Sequence)
}

proptest! {
    #[test]
    fn test_reduce_is_idempotent(edges in dag_strategy(), picks in prop::collection::vec(0usize..12, 0..8)) {
        let (model, ids) = dag_model(&edges);
        let list: Vec<TypeId> = picks.iter().map(|p| ids[p % ids.len()]).collect();
        let once = reduce(&model, &list);
        prop_assert_eq!(reduce(&model, &once), once.clone());

        for (i, a) in once.iter().enumerate() {
            for (j, b) in once.iter().enumerate() {
                if i != j {
                    prop_assert_ne!(a, b);
                    prop_assert!(!has_ancestor(&model, *a, *b));
                }
            }
        }
    }

    #[test]
    fn test_closure_has_no_duplicates(edges in dag_strategy()) {
        let (model, ids) = dag_model(&edges);
        for id in &ids {
            let closure = ancestry_closure(&model, *id);
            let unique: HashSet<TypeId> = closure.iter().copied().collect();
            prop_assert_eq!(unique.len(), closure.len());
            prop_assert_eq!(closure[0], *id);
            for ancestor in &closure[1..] {
                prop_assert!(has_ancestor(&model, *id, *ancestor));
            }
        }
    }

    #[test]
    fn test_nested_values_round_trip(value in group_seq_strategy()) {
        let nested = nested_model();
        let codec = ValueCodec::new(&nested.model);
        let top = nested.levels[3];

        let mut buffer = FieldBuffer::new();
        codec.write(&mut buffer, top, &value).unwrap();
        let decoded = FieldBuffer::decode(&buffer.encode()).unwrap();
        let mut reader = decoded.reader();
        prop_assert_eq!(codec.read(&mut reader, top).unwrap(), value);
        reader.finish().unwrap();
    }

    #[test]
    fn test_leaf_round_trip(value in leaf_strategy()) {
        let nested = nested_model();
        let codec = ValueCodec::new(&nested.model);
        let leaf = nested.levels[0];

        let mut buffer = FieldBuffer::new();
        codec.write(&mut buffer, leaf, &value).unwrap();
        let decoded = FieldBuffer::decode(&buffer.encode()).unwrap();
        prop_assert_eq!(codec.read(&mut decoded.reader(), leaf).unwrap(), value);
    }
}
