//! The deep-merge engine.
//!
//! Merging folds an ordered sequence of document roots left to right.
//! Mappings merge key-wise, sequences merge according to the configured
//! [`ArrayStrategy`] (overridable per-list by an in-tree sentinel first
//! element), and any other combination lets the right side replace the
//! left — with one exception: a left-hand `(( prune ))` literal is
//! preserved so that a later override cannot resurrect a pruned key.
//!
//! A right-hand `(( sort [by <field>] ))` leaf over a left-hand sequence
//! keeps the left sequence and registers its path for post-evaluation
//! sorting.
//!
//! Merge failures do not stop the fold; they accumulate into a
//! [`MultiError`] so one run reports every offending path.

use graft_base::{CancelToken, Error, MultiError, Result};
use graft_lang::token::{Scanner, TokenKind};
use graft_lang::parser::opcall_body;
use graft_tree::path::{find_named_entry, shared_identifier_field};
use graft_tree::{Path, Segment, Tree, Value};
use log::{debug, trace};
use std::sync::Arc;

/// How two sequences at the same path combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayStrategy {
    /// Pairwise positional merge; lists of mappings sharing an
    /// identifier field merge by identity instead.
    #[default]
    Inline,
    /// Right replaces left.
    Replace,
    /// Right is concatenated after left.
    Append,
    /// Right is prefixed before left.
    Prepend,
    /// Identity merge when an identifier field exists, append otherwise.
    FallbackAppend,
}

/// Options for one merge run.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub array_strategy: ArrayStrategy,
    /// Paths removed after evaluation (union with operator-registered
    /// prunes).
    pub prune: Vec<String>,
    /// When non-empty, the folded tree is reduced to the union of these
    /// paths.
    pub cherry_pick: Vec<String>,
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_array_strategy(mut self, strategy: ArrayStrategy) -> Self {
        self.array_strategy = strategy;
        self
    }

    pub fn with_prune(mut self, path: impl Into<String>) -> Self {
        self.prune.push(path.into());
        self
    }

    pub fn with_cherry_pick(mut self, path: impl Into<String>) -> Self {
        self.cherry_pick.push(path.into());
        self
    }
}

/// The folded tree plus the sort registrations picked up on the way.
#[derive(Debug)]
pub struct MergeOutcome {
    pub tree: Tree,
    pub sort_paths: Vec<(Path, Option<String>)>,
}

/// Folds `docs` left to right under `opts`.
pub fn merge_trees(
    docs: &[Tree],
    opts: &MergeOptions,
    cancel: &CancelToken,
) -> std::result::Result<MergeOutcome, MultiError> {
    let mut merger = Merger {
        strategy: opts.array_strategy,
        errors: MultiError::new(),
        sort_paths: Vec::new(),
    };

    let mut root = Value::empty_map();
    for doc in docs {
        if let Err(e) = cancel.check() {
            merger.errors.push(e);
            return Err(merger.errors);
        }
        root = merger.merge_value(&root, doc.root(), &Path::root());
    }

    if !merger.errors.is_empty() {
        return Err(merger.errors);
    }

    if !opts.cherry_pick.is_empty() {
        root = match cherry_pick(&root, &opts.cherry_pick) {
            Ok(picked) => picked,
            Err(e) => return Err(e.into()),
        };
    }

    let tree = match Tree::from_root(root) {
        Ok(tree) => tree,
        Err(e) => return Err(e.into()),
    };
    debug!(
        "merge: folded {} document(s), {} sort registration(s)",
        docs.len(),
        merger.sort_paths.len()
    );
    Ok(MergeOutcome {
        tree,
        sort_paths: merger.sort_paths,
    })
}

struct Merger {
    strategy: ArrayStrategy,
    errors: MultiError,
    sort_paths: Vec<(Path, Option<String>)>,
}

impl Merger {
    fn merge_value(&mut self, left: &Value, right: &Value, path: &Path) -> Value {
        match (left, right) {
            (Value::Map(_), Value::Map(_)) => self.merge_maps(left, right, path),
            (Value::List(l), Value::List(r)) => self.merge_lists(l, r, path),
            (l, r) => {
                if is_prune_literal(l) {
                    trace!("merge: preserving prune literal at {path}");
                    return l.clone();
                }
                if let Some(field) = parse_sort_literal(r) {
                    if matches!(l, Value::List(_)) {
                        self.sort_paths.push((path.clone(), field));
                        return l.clone();
                    }
                    self.errors.push(
                        Error::validation(format!(
                            "sort can only be applied to lists, not {}",
                            l.type_name()
                        ))
                        .with_path(path.to_string()),
                    );
                    return l.clone();
                }
                r.deep_clone()
            }
        }
    }

    fn merge_maps(&mut self, left: &Value, right: &Value, path: &Path) -> Value {
        let (Some(l), Some(r)) = (left.as_map(), right.as_map()) else {
            unreachable!("merge_maps called with non-maps");
        };
        let mut result = l.clone();
        for (key, rv) in r {
            let child_path = path.child(Segment::Key(key.clone()));
            match l.get(key) {
                Some(lv) => {
                    let merged = self.merge_value(lv, rv, &child_path);
                    result.insert(key.clone(), merged);
                }
                None => {
                    result.insert(key.clone(), rv.deep_clone());
                }
            }
        }
        Value::Map(Arc::new(result))
    }

    fn merge_lists(&mut self, left: &[Value], right: &[Value], path: &Path) -> Value {
        let (strategy, insert, right) = match detect_sentinel(right) {
            Some((sentinel, rest)) => match sentinel {
                Sentinel::Replace => (ListOp::Replace, None, rest),
                Sentinel::Append => (ListOp::Append, None, rest),
                Sentinel::Prepend => (ListOp::Prepend, None, rest),
                Sentinel::Inline => (ListOp::Inline, None, rest),
                Sentinel::MergeOn(field) => (ListOp::MergeOn(field), None, rest),
                Sentinel::Insert(spec) => (ListOp::Insert, Some(spec), rest),
            },
            None => (
                match self.strategy {
                    ArrayStrategy::Inline => ListOp::Inline,
                    ArrayStrategy::Replace => ListOp::Replace,
                    ArrayStrategy::Append => ListOp::Append,
                    ArrayStrategy::Prepend => ListOp::Prepend,
                    ArrayStrategy::FallbackAppend => ListOp::FallbackAppend,
                },
                None,
                right,
            ),
        };

        let merged = match strategy {
            ListOp::Replace => right.iter().map(Value::deep_clone).collect(),
            ListOp::Append => {
                let mut items = left.to_vec();
                items.extend(right.iter().map(Value::deep_clone));
                items
            }
            ListOp::Prepend => {
                let mut items: Vec<Value> = right.iter().map(Value::deep_clone).collect();
                items.extend(left.iter().cloned());
                items
            }
            ListOp::Inline => match self.identity_field(left, right, None) {
                Some(field) => self.merge_by_identity(left, right, &field, path),
                None => self.merge_positional(left, right, path),
            },
            ListOp::FallbackAppend => match self.identity_field(left, right, None) {
                Some(field) => self.merge_by_identity(left, right, &field, path),
                None => {
                    let mut items = left.to_vec();
                    items.extend(right.iter().map(Value::deep_clone));
                    items
                }
            },
            ListOp::MergeOn(field) => {
                let field = field.unwrap_or_else(|| "name".to_string());
                self.merge_by_identity(left, right, &field, path)
            }
            ListOp::Insert => {
                let spec = insert.expect("insert sentinel carries a spec");
                self.insert_entries(left, right, &spec, path)
            }
        };
        Value::List(Arc::new(merged))
    }

    /// The identifier field usable for identity merging, if both sides
    /// are lists of mappings carrying it.
    fn identity_field(
        &self,
        left: &[Value],
        right: &[Value],
        wanted: Option<&str>,
    ) -> Option<String> {
        if left.is_empty() || right.is_empty() {
            return None;
        }
        let candidate = match wanted {
            Some(f) => f.to_string(),
            None => shared_identifier_field(left)?.to_string(),
        };
        let all_have = |items: &[Value]| {
            items.iter().all(|item| {
                item.as_map()
                    .map(|m| m.contains_key(&candidate))
                    .unwrap_or(false)
            })
        };
        if all_have(left) && all_have(right) {
            Some(candidate)
        } else {
            None
        }
    }

    /// Identity merge: right entries merge into the first left entry
    /// sharing their identifier value; unmatched entries append.
    fn merge_by_identity(
        &mut self,
        left: &[Value],
        right: &[Value],
        field: &str,
        path: &Path,
    ) -> Vec<Value> {
        let mut result: Vec<Value> = left.to_vec();
        for (offset, rv) in right.iter().enumerate() {
            let ident = rv
                .as_map()
                .and_then(|m| m.get(field))
                .and_then(|v| v.stringify());
            let Some(ident) = ident else {
                self.errors.push(
                    Error::validation(format!(
                        "list entry {offset} has no usable '{field}' identifier"
                    ))
                    .with_path(path.to_string()),
                );
                continue;
            };
            let found = result.iter().position(|lv| {
                lv.as_map()
                    .and_then(|m| m.get(field))
                    .and_then(|v| v.stringify())
                    .map(|s| s == ident)
                    .unwrap_or(false)
            });
            match found {
                Some(i) => {
                    let entry_path = path.child(Segment::Index(i));
                    result[i] = self.merge_value(&result[i], rv, &entry_path);
                }
                None => result.push(rv.deep_clone()),
            }
        }
        result
    }

    fn merge_positional(&mut self, left: &[Value], right: &[Value], path: &Path) -> Vec<Value> {
        let mut result = Vec::with_capacity(left.len().max(right.len()));
        for i in 0..left.len().max(right.len()) {
            let entry_path = path.child(Segment::Index(i));
            match (left.get(i), right.get(i)) {
                (Some(l), Some(r)) => result.push(self.merge_value(l, r, &entry_path)),
                (Some(l), None) => result.push(l.clone()),
                (None, Some(r)) => result.push(r.deep_clone()),
                (None, None) => unreachable!(),
            }
        }
        result
    }

    fn insert_entries(
        &mut self,
        left: &[Value],
        right: &[Value],
        spec: &InsertSpec,
        path: &Path,
    ) -> Vec<Value> {
        let anchor = match &spec.target {
            InsertTarget::Index(i) => {
                if *i <= left.len() {
                    Some(*i)
                } else {
                    None
                }
            }
            InsertTarget::Name(name) => match &spec.field {
                Some(field) => left.iter().position(|item| {
                    item.as_map()
                        .and_then(|m| m.get(field))
                        .and_then(|v| v.stringify())
                        .map(|s| &s == name)
                        .unwrap_or(false)
                }),
                None => find_named_entry(left, name).map(|(i, _)| i),
            },
        };
        let Some(anchor) = anchor else {
            self.errors.push(
                Error::reference(format!(
                    "insertion point '{}' not found in list",
                    spec.target
                ))
                .with_path(path.to_string()),
            );
            return left.to_vec();
        };

        let at = match spec.relation {
            InsertRelation::Before => anchor,
            InsertRelation::After => anchor + 1,
        };
        let mut result = left.to_vec();
        for (offset, rv) in right.iter().enumerate() {
            result.insert(at + offset, rv.deep_clone());
        }
        result
    }
}

enum ListOp {
    Inline,
    Replace,
    Append,
    Prepend,
    FallbackAppend,
    MergeOn(Option<String>),
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertRelation {
    Before,
    After,
}

#[derive(Debug, Clone)]
enum InsertTarget {
    Index(usize),
    Name(String),
}

impl std::fmt::Display for InsertTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsertTarget::Index(i) => write!(f, "{i}"),
            InsertTarget::Name(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone)]
struct InsertSpec {
    relation: InsertRelation,
    field: Option<String>,
    target: InsertTarget,
}

enum Sentinel {
    Replace,
    Append,
    Prepend,
    Inline,
    MergeOn(Option<String>),
    Insert(InsertSpec),
}

/// Recognizes a sentinel first element on the right-hand sequence.
fn detect_sentinel(items: &[Value]) -> Option<(Sentinel, &[Value])> {
    let first = items.first()?.as_str()?;
    let (body, _) = opcall_body(first)?;
    let tokens = Scanner::new(body, 1, None).scan().ok()?;
    let mut words = tokens.into_iter().map(|t| t.kind);

    let sentinel = match words.next()? {
        TokenKind::Ident(name) => match name.as_str() {
            "replace" => Sentinel::Replace,
            "append" => Sentinel::Append,
            "prepend" => Sentinel::Prepend,
            "inline" => Sentinel::Inline,
            "merge" => {
                // `merge` | `merge on <field>`
                let field = match words.next() {
                    Some(TokenKind::Ident(on)) if on == "on" => match words.next() {
                        Some(TokenKind::Ident(f)) => Some(f),
                        Some(TokenKind::Str(f)) => Some(f),
                        _ => return None,
                    },
                    None => None,
                    _ => return None,
                };
                Sentinel::MergeOn(field)
            }
            "insert" => {
                let relation = match words.next() {
                    Some(TokenKind::Ident(w)) if w == "after" => InsertRelation::After,
                    Some(TokenKind::Ident(w)) if w == "before" => InsertRelation::Before,
                    _ => return None,
                };
                // `<index>` | `"<name>"` | `<field> "<name>"`
                let (field, target) = match (words.next(), words.next()) {
                    (Some(TokenKind::Int(i)), None) if i >= 0 => {
                        (None, InsertTarget::Index(i as usize))
                    }
                    (Some(TokenKind::Str(name)), None) => (None, InsertTarget::Name(name)),
                    (Some(TokenKind::Ident(name)), None) => (None, InsertTarget::Name(name)),
                    (Some(TokenKind::Ident(field)), Some(TokenKind::Str(name))) => {
                        (Some(field), InsertTarget::Name(name))
                    }
                    (Some(TokenKind::Ident(field)), Some(TokenKind::Ident(name))) => {
                        (Some(field), InsertTarget::Name(name))
                    }
                    _ => return None,
                };
                Sentinel::Insert(InsertSpec {
                    relation,
                    field,
                    target,
                })
            }
            _ => return None,
        },
        _ => return None,
    };

    // Anything left over means this was not a sentinel after all.
    match sentinel {
        Sentinel::MergeOn(_) | Sentinel::Insert(_) => {}
        _ => {
            if words.next().is_some() {
                return None;
            }
        }
    }
    Some((sentinel, &items[1..]))
}

/// True for a `(( prune ))` leaf.
pub fn is_prune_literal(value: &Value) -> bool {
    value
        .as_str()
        .and_then(opcall_body)
        .map(|(body, _)| body.trim() == "prune")
        .unwrap_or(false)
}

/// Recognizes `(( sort ))` / `(( sort by <field> ))`, returning the sort
/// field if one was given.
fn parse_sort_literal(value: &Value) -> Option<Option<String>> {
    let (body, _) = value.as_str().and_then(|s| opcall_body(s))?;
    let mut words = body.split_whitespace();
    if words.next()? != "sort" {
        return None;
    }
    match words.next() {
        None => Some(None),
        Some("by") => {
            let field = words.next()?;
            if words.next().is_some() {
                return None;
            }
            Some(Some(field.to_string()))
        }
        Some(_) => None,
    }
}

/// Reduces `root` to the union of the given paths, preserving the
/// relative structure (named list members land in fresh lists).
fn cherry_pick(root: &Value, paths: &[String]) -> Result<Value> {
    let mut result = Value::empty_map();
    for source in paths {
        let path = Path::parse(source)?;
        pick_into(&mut result, root, path.segments())
            .map_err(|e| e.with_path(path.to_string()))?;
    }
    Ok(result)
}

fn pick_into(result: &mut Value, original: &Value, segments: &[Segment]) -> Result<()> {
    let Some((segment, rest)) = segments.split_first() else {
        *result = original.deep_clone();
        return Ok(());
    };

    match original {
        Value::Map(entries) => {
            let key = match segment {
                Segment::Key(k) => k.clone(),
                other => {
                    return Err(Error::reference(format!(
                        "cannot address '{other}' inside a map"
                    )))
                }
            };
            let child = entries
                .get(&key)
                .ok_or_else(|| Error::reference(format!("key '{key}' not found")))?;
            let result_map = result
                .as_map_mut()
                .ok_or_else(|| Error::validation("cherry-pick structure conflict"))?;
            let slot = result_map
                .entry(key)
                .or_insert_with(|| empty_like(child, rest));
            pick_into(slot, child, rest)
        }
        Value::List(items) => {
            let found = match segment {
                Segment::Index(i) => items.get(*i),
                Segment::Key(k) => match k.parse::<usize>() {
                    Ok(i) => items.get(i),
                    Err(_) => find_named_entry(items, k).map(|(_, v)| v),
                },
                Segment::Select { field, value } => items.iter().find(|item| {
                    item.as_map()
                        .and_then(|m| m.get(field))
                        .and_then(|v| v.stringify())
                        .map(|s| &s == value)
                        .unwrap_or(false)
                }),
            };
            let child = found
                .ok_or_else(|| Error::reference(format!("list entry '{segment}' not found")))?;
            let result_list = result
                .as_list_mut()
                .ok_or_else(|| Error::validation("cherry-pick structure conflict"))?;
            result_list.push(Value::Null);
            let slot = result_list.last_mut().expect("just pushed");
            *slot = empty_like(child, rest);
            pick_into(slot, child, rest)
        }
        other => Err(Error::reference(format!(
            "cannot address '{segment}' inside a {}",
            other.type_name()
        ))),
    }
}

/// An empty container matching what the next pick step needs, or a
/// placeholder when the remaining path is empty (it will be replaced).
fn empty_like(child: &Value, rest: &[Segment]) -> Value {
    if rest.is_empty() {
        return Value::Null;
    }
    match child {
        Value::List(_) => Value::empty_list(),
        _ => Value::empty_map(),
    }
}

/// Merges one pair of values under the default strategy; the right side
/// wins conflicts. Used by the evaluator to apply `Inject` responses.
pub fn merge_pair(left: &Value, right: &Value) -> std::result::Result<Value, MultiError> {
    let mut merger = Merger {
        strategy: ArrayStrategy::Inline,
        errors: MultiError::new(),
        sort_paths: Vec::new(),
    };
    let merged = merger.merge_value(left, right, &Path::root());
    merger.errors.into_result().map(|_| merged)
}
