//! # graft-tree
//!
//! The hierarchical document model for graft.
//!
//! - [`Value`] — the recursive document value: scalars, ordered lists,
//!   insertion-ordered mappings
//! - [`Path`]/[`Segment`] — dotted, indexed, and named-entry addressing
//!   with canonicalization against a live tree
//! - [`Tree`] — the mutable store with copy-on-write [`Snapshot`]s and
//!   optimistic [`Transaction`]s
//!
//! # Structural Sharing
//!
//! `Value` lists and mappings are held behind [`std::sync::Arc`], so a
//! snapshot is a single root clone and every write clones only the spine
//! of nodes from the root to the write site. Readers holding an older
//! snapshot keep observing the tree exactly as it was.
//!
//! # Example
//!
//! ```
//! use graft_tree::{Path, Tree, Value};
//!
//! let mut tree = Tree::new();
//! tree.set(&Path::parse("meta.name").unwrap(), Value::from("graft")).unwrap();
//!
//! let snap = tree.snapshot();
//! tree.set(&Path::parse("meta.name").unwrap(), Value::from("changed")).unwrap();
//!
//! assert_eq!(snap.get(&Path::parse("meta.name").unwrap()).unwrap().as_str(), Some("graft"));
//! ```

pub mod path;
pub mod store;
pub mod value;

pub use path::{Path, Segment};
pub use store::{Snapshot, Transaction, Tree};
pub use value::Value;
