//! The mutable tree store: copy-on-write snapshots and transactions.
//!
//! A [`Tree`] owns the live root of a document and a monotone version
//! counter bumped on every write. [`Tree::snapshot`] is O(1): it clones
//! the root `Value`, whose lists and mappings are `Arc`-shared with the
//! live tree. Writes clone only the spine of nodes from the root to the
//! write site (via `Arc::make_mut`), so older snapshots keep observing an
//! immutable view.
//!
//! [`Transaction`]s provide optimistic concurrency for the parallel
//! evaluation mode: a transaction buffers writes against a snapshot and
//! [`Tree::commit`] replaces the live root atomically iff the base
//! version still matches, failing with a `Conflict` error otherwise.

use crate::path::{find_named_entry, Path, Segment};
use crate::value::Value;
use graft_base::{Error, Result};

/// The live, mutable document tree.
#[derive(Debug, Clone)]
pub struct Tree {
    root: Value,
    version: u64,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// An empty tree (root is an empty mapping).
    pub fn new() -> Tree {
        Tree {
            root: Value::empty_map(),
            version: 0,
        }
    }

    /// Wraps a parsed document root. The root must be a mapping.
    pub fn from_root(root: Value) -> Result<Tree> {
        if !matches!(root, Value::Map(_)) {
            return Err(Error::validation(format!(
                "document root must be a map, got {}",
                root.type_name()
            )));
        }
        Ok(Tree { root, version: 0 })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Replaces the entire root, bumping the version.
    ///
    /// Used by the merge engine, which folds documents outside the store
    /// and installs the result.
    pub fn replace_root(&mut self, root: Value) -> Result<()> {
        if !matches!(root, Value::Map(_)) {
            return Err(Error::validation(format!(
                "document root must be a map, got {}",
                root.type_name()
            )));
        }
        self.root = root;
        self.version += 1;
        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, path: &Path) -> Result<&Value> {
        path.resolve(&self.root)
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists(&self.root)
    }

    /// Writes `value` at `path`, creating missing intermediate mappings.
    pub fn set(&mut self, path: &Path, value: Value) -> Result<()> {
        set_in(&mut self.root, path.segments(), value).map_err(|e| e.with_path(path.to_string()))?;
        self.version += 1;
        Ok(())
    }

    /// Removes the node at `path`.
    pub fn delete(&mut self, path: &Path) -> Result<()> {
        delete_in(&mut self.root, path.segments())
            .map_err(|e| e.with_path(path.to_string()))?;
        self.version += 1;
        Ok(())
    }

    /// A deep copy sharing no structure with this tree.
    pub fn deep_clone(&self) -> Tree {
        Tree {
            root: self.root.deep_clone(),
            version: self.version,
        }
    }

    /// An O(1) immutable view of the tree as of now.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            root: self.root.clone(),
            version: self.version,
        }
    }

    /// Opens a writable view over the current state.
    pub fn begin(&self) -> Transaction {
        Transaction {
            base_version: self.version,
            root: self.root.clone(),
            writes: 0,
        }
    }

    /// Atomically installs a transaction's result iff no write has landed
    /// since the transaction began.
    pub fn commit(&mut self, tx: Transaction) -> Result<()> {
        if tx.base_version != self.version {
            return Err(Error::conflict(format!(
                "transaction base version {} does not match tree version {}",
                tx.base_version, self.version
            )));
        }
        if tx.writes > 0 {
            self.root = tx.root;
            self.version += tx.writes;
        }
        Ok(())
    }
}

/// An immutable, structure-shared view of a tree at a given version.
#[derive(Debug, Clone)]
pub struct Snapshot {
    root: Value,
    version: u64,
}

impl Snapshot {
    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, path: &Path) -> Result<&Value> {
        path.resolve(&self.root)
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists(&self.root)
    }
}

/// A buffered writable view created by [`Tree::begin`].
///
/// Writes apply to the transaction's private copy-on-write root; nothing
/// is visible to other readers until [`Tree::commit`]. Dropping the
/// transaction rolls it back.
#[derive(Debug)]
pub struct Transaction {
    base_version: u64,
    root: Value,
    writes: u64,
}

impl Transaction {
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn get(&self, path: &Path) -> Result<&Value> {
        path.resolve(&self.root)
    }

    pub fn set(&mut self, path: &Path, value: Value) -> Result<()> {
        set_in(&mut self.root, path.segments(), value).map_err(|e| e.with_path(path.to_string()))?;
        self.writes += 1;
        Ok(())
    }

    pub fn delete(&mut self, path: &Path) -> Result<()> {
        delete_in(&mut self.root, path.segments())
            .map_err(|e| e.with_path(path.to_string()))?;
        self.writes += 1;
        Ok(())
    }

    /// Discards all buffered writes.
    pub fn rollback(self) {}
}

fn type_mismatch(node: &Value, segment: &Segment) -> Error {
    Error::evaluation(format!(
        "cannot address segment '{segment}' inside a {}",
        node.type_name()
    ))
}

fn set_in(node: &mut Value, segments: &[Segment], value: Value) -> Result<()> {
    let Some((segment, rest)) = segments.split_first() else {
        *node = value;
        return Ok(());
    };

    match node {
        Value::Map(entries) => {
            let key = match segment {
                Segment::Key(k) => k.clone(),
                other => return Err(type_mismatch(node, other)),
            };
            let entries = std::sync::Arc::make_mut(entries);
            if rest.is_empty() {
                entries.insert(key, value);
                return Ok(());
            }
            let slot = entries.entry(key).or_insert_with(Value::empty_map);
            set_in(slot, rest, value)
        }
        Value::List(items) => {
            let index = list_index(items, segment)?;
            let items = std::sync::Arc::make_mut(items);
            match index {
                Some(i) => set_in(&mut items[i], rest, value),
                // One-past-the-end writes append, which is how list
                // results grow during evaluation.
                None if rest.is_empty() => {
                    items.push(value);
                    Ok(())
                }
                None => Err(Error::reference(
                    "cannot create intermediate list elements".to_string(),
                )),
            }
        }
        other => Err(type_mismatch(other, segment)),
    }
}

fn delete_in(node: &mut Value, segments: &[Segment]) -> Result<()> {
    let Some((segment, rest)) = segments.split_first() else {
        return Err(Error::validation("cannot delete the document root"));
    };

    match node {
        Value::Map(entries) => {
            let key = match segment {
                Segment::Key(k) => k.clone(),
                other => return Err(type_mismatch(node, other)),
            };
            let entries = std::sync::Arc::make_mut(entries);
            if rest.is_empty() {
                entries
                    .shift_remove(&key)
                    .map(|_| ())
                    .ok_or_else(|| Error::reference(format!("key '{key}' not found")))
            } else {
                let slot = entries
                    .get_mut(&key)
                    .ok_or_else(|| Error::reference(format!("key '{key}' not found")))?;
                delete_in(slot, rest)
            }
        }
        Value::List(items) => {
            let index = list_index(items, segment)?
                .ok_or_else(|| Error::reference(format!("list element '{segment}' not found")))?;
            let items = std::sync::Arc::make_mut(items);
            if rest.is_empty() {
                items.remove(index);
                Ok(())
            } else {
                delete_in(&mut items[index], rest)
            }
        }
        other => Err(type_mismatch(other, segment)),
    }
}

/// Resolves a segment against a list. `Ok(None)` means one-past-the-end,
/// which [`set_in`] turns into an append.
fn list_index(items: &[Value], segment: &Segment) -> Result<Option<usize>> {
    let found = match segment {
        Segment::Index(i) => {
            if *i < items.len() {
                Some(*i)
            } else if *i == items.len() {
                None
            } else {
                return Err(Error::reference(format!(
                    "list index {i} out of bounds (len {})",
                    items.len()
                )));
            }
        }
        Segment::Key(k) => {
            if let Ok(i) = k.parse::<usize>() {
                if i < items.len() {
                    Some(i)
                } else if i == items.len() {
                    None
                } else {
                    return Err(Error::reference(format!(
                        "list index {i} out of bounds (len {})",
                        items.len()
                    )));
                }
            } else {
                Some(
                    find_named_entry(items, k)
                        .map(|(i, _)| i)
                        .ok_or_else(|| Error::reference(format!("no list entry named '{k}'")))?,
                )
            }
        }
        Segment::Select { field, value } => Some(
            items
                .iter()
                .enumerate()
                .find(|(_, item)| {
                    item.as_map()
                        .and_then(|m| m.get(field))
                        .and_then(|v| v.stringify())
                        .map(|s| &s == value)
                        .unwrap_or(false)
                })
                .map(|(i, _)| i)
                .ok_or_else(|| {
                    Error::reference(format!("no list entry with {field}={value}"))
                })?,
        ),
    };
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn set_creates_intermediate_maps() {
        let mut tree = Tree::new();
        tree.set(&path("a.b.c"), Value::Int(1)).unwrap();
        assert_eq!(tree.get(&path("a.b.c")).unwrap(), &Value::Int(1));
    }

    #[test]
    fn version_bumps_on_every_write() {
        let mut tree = Tree::new();
        assert_eq!(tree.version(), 0);
        tree.set(&path("a"), Value::Int(1)).unwrap();
        tree.set(&path("b"), Value::Int(2)).unwrap();
        tree.delete(&path("a")).unwrap();
        assert_eq!(tree.version(), 3);
    }

    #[test]
    fn snapshot_isolated_from_later_writes() {
        let mut tree = Tree::new();
        tree.set(&path("name"), Value::from("before")).unwrap();
        let snap = tree.snapshot();

        tree.set(&path("name"), Value::from("after")).unwrap();
        tree.set(&path("extra"), Value::Int(1)).unwrap();

        assert_eq!(snap.get(&path("name")).unwrap().as_str(), Some("before"));
        assert!(!snap.exists(&path("extra")));
        assert_eq!(tree.get(&path("name")).unwrap().as_str(), Some("after"));
    }

    #[test]
    fn delete_removes_subtree() {
        let mut tree = Tree::new();
        tree.set(&path("db.host"), Value::from("x")).unwrap();
        tree.set(&path("db.password"), Value::from("y")).unwrap();
        tree.delete(&path("db.password")).unwrap();
        assert!(tree.exists(&path("db.host")));
        assert!(!tree.exists(&path("db.password")));
    }

    #[test]
    fn list_append_via_one_past_end() {
        let mut tree = Tree::new();
        tree.set(&path("xs"), Value::list(vec![Value::Int(1)])).unwrap();
        tree.set(&path("xs.1"), Value::Int(2)).unwrap();
        assert_eq!(
            tree.get(&path("xs")).unwrap().as_list().unwrap().len(),
            2
        );
    }

    #[test]
    fn transaction_commit_applies_buffered_writes() {
        let mut tree = Tree::new();
        tree.set(&path("a"), Value::Int(1)).unwrap();

        let mut tx = tree.begin();
        tx.set(&path("b"), Value::Int(2)).unwrap();
        assert!(!tree.exists(&path("b")));

        tree.commit(tx).unwrap();
        assert_eq!(tree.get(&path("b")).unwrap(), &Value::Int(2));
    }

    #[test]
    fn transaction_conflict_on_interleaved_write() {
        let mut tree = Tree::new();
        let mut tx = tree.begin();
        tx.set(&path("b"), Value::Int(2)).unwrap();

        tree.set(&path("a"), Value::Int(1)).unwrap();

        let err = tree.commit(tx).unwrap_err();
        assert_eq!(err.kind, graft_base::ErrorKind::Conflict);
    }

    #[test]
    fn rollback_discards_changes() {
        let mut tree = Tree::new();
        let mut tx = tree.begin();
        tx.set(&path("ghost"), Value::Int(1)).unwrap();
        tx.rollback();
        assert!(!tree.exists(&path("ghost")));
    }

    #[test]
    fn set_into_scalar_is_a_type_error() {
        let mut tree = Tree::new();
        tree.set(&path("a"), Value::Int(1)).unwrap();
        assert!(tree.set(&path("a.b"), Value::Int(2)).is_err());
    }

    #[test]
    fn named_entry_write() {
        let mut tree = Tree::new();
        let mut api = indexmap::IndexMap::new();
        api.insert("name".to_string(), Value::from("api"));
        api.insert("port".to_string(), Value::Int(80));
        tree.set(&path("jobs"), Value::list(vec![Value::map(api)])).unwrap();

        tree.set(&path("jobs.api.port"), Value::Int(8080)).unwrap();
        assert_eq!(tree.get(&path("jobs[0].port")).unwrap(), &Value::Int(8080));
    }
}
