//! Property Tests
//!
//! Serialization round-trips, merge identities, and codec round-trips
//! over generated document trees.

mod common;

use graft_base::CancelToken;
use graft_engine::doc::{parse_documents, to_yaml_string};
use graft_engine::{merge_trees, MergeOptions};
use graft_tree::{Tree, Value};
use indexmap::IndexMap;
use proptest::prelude::*;

fn arb_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        // Printable strings; YAML quoting handles look-alike scalars.
        "[ -~]{0,16}".prop_map(Value::from),
    ]
}

fn arb_value(depth: u32) -> BoxedStrategy<Value> {
    if depth == 0 {
        return arb_scalar().boxed();
    }
    prop_oneof![
        3 => arb_scalar(),
        1 => prop::collection::vec(arb_value(depth - 1), 0..4).prop_map(Value::list),
        1 => prop::collection::vec((arb_key(), arb_value(depth - 1)), 0..4).prop_map(|entries| {
            let mut map = IndexMap::new();
            for (k, v) in entries {
                map.insert(k, v);
            }
            Value::map(map)
        }),
    ]
    .boxed()
}

fn arb_root() -> impl Strategy<Value = Value> {
    prop::collection::vec((arb_key(), arb_value(2)), 0..5).prop_map(|entries| {
        let mut map = IndexMap::new();
        for (k, v) in entries {
            map.insert(k, v);
        }
        Value::map(map)
    })
}

proptest! {
    /// `parse(serialize(x)) == x` for scalar/mapping/sequence trees.
    #[test]
    fn yaml_round_trip(root in arb_root()) {
        let tree = Tree::from_root(root.clone()).unwrap();
        let yaml = to_yaml_string(&tree).unwrap();
        let parsed = parse_documents(&yaml, None).unwrap();
        prop_assert_eq!(parsed.len(), 1);
        prop_assert_eq!(parsed[0].root(), &root);
    }

    /// `merge(d, {}) == d` and `merge({}, d) == d`.
    #[test]
    fn merge_identity(root in arb_root()) {
        let doc = Tree::from_root(root).unwrap();
        let empty = Tree::new();
        let opts = MergeOptions::new();
        let cancel = CancelToken::new();

        let left = merge_trees(&[doc.clone(), empty.clone()], &opts, &cancel).unwrap();
        prop_assert_eq!(left.tree.root(), doc.root());

        let right = merge_trees(&[empty, doc.clone()], &opts, &cancel).unwrap();
        prop_assert_eq!(right.tree.root(), doc.root());
    }

    /// Merging a document with itself changes nothing.
    #[test]
    fn merge_self_idempotent(root in arb_root()) {
        let doc = Tree::from_root(root).unwrap();
        let merged = merge_trees(
            &[doc.clone(), doc.clone()],
            &MergeOptions::new(),
            &CancelToken::new(),
        )
        .unwrap();
        prop_assert_eq!(merged.tree.root(), doc.root());
    }

    /// `base64-decode(base64(x)) == x` through the engine.
    #[test]
    fn base64_round_trip(text in "[ -~]{0,32}") {
        let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
        // Single-quote the YAML value so characters like ` #` survive
        // the document parse untouched.
        let expr = format!("(( base64 \"{escaped}\" ))").replace('\'', "''");
        let doc = format!("enc: '{expr}'\ndec: (( base64-decode enc ))\n");
        let tree = common::evaluate(&[&doc]);
        prop_assert_eq!(common::get_str(&tree, "dec"), text);
    }

    /// Snapshots never observe later writes.
    #[test]
    fn snapshot_isolation(root in arb_root(), extra in arb_key()) {
        let mut tree = Tree::from_root(root).unwrap();
        let snapshot = tree.snapshot();
        let before = snapshot.root().clone();

        let path = graft_tree::Path::parse(&extra).unwrap();
        tree.set(&path, Value::Int(42)).unwrap();
        tree.delete(&path).unwrap();

        prop_assert_eq!(snapshot.root(), &before);
    }
}
