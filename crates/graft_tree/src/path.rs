//! Dotted, indexed, and named-entry path addressing.
//!
//! A [`Path`] is an ordered list of [`Segment`]s addressing a node in a
//! document tree. The textual form accepts:
//!
//! - plain keys: `meta.name`
//! - numeric indices, bracketed or bare: `jobs[0].name`, `jobs.0.name`
//! - named-entry selectors: `jobs.name=api.port` (an element of a list of
//!   mappings, matched on one of its identifier fields)
//! - an optional `$.` root marker: `$.meta.name`
//!
//! A path is *canonical* for a given tree when every segment resolves
//! exactly once: plain keys over lists and named-entry selectors are
//! rewritten to numeric indices by [`Path::canonicalize`].
//!
//! Identifier fields are tried in the order `name`, `key`, `id`.

use crate::value::Value;
use graft_base::{Error, Result};
use std::fmt;

/// Identifier fields used to address elements of a list of mappings,
/// in preference order.
pub const IDENTIFIER_FIELDS: &[&str] = &["name", "key", "id"];

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A mapping key (or, against a list, an identifier-field value).
    Key(String),
    /// A numeric list index.
    Index(usize),
    /// A `field=value` selector over a list of mappings.
    Select { field: String, value: String },
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{k}"),
            Segment::Index(i) => write!(f, "[{i}]"),
            Segment::Select { field, value } => write!(f, "{field}={value}"),
        }
    }
}

/// An ordered list of segments addressing a node in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// The root path (`$`).
    pub fn root() -> Path {
        Path::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Path {
        Path { segments }
    }

    /// Parses the textual path form.
    ///
    /// Empty segments (doubled dots, trailing dots) are ignored; an empty
    /// source yields the root path.
    pub fn parse(source: &str) -> Result<Path> {
        let trimmed = source.trim();
        let trimmed = trimmed
            .strip_prefix("$.")
            .or_else(|| trimmed.strip_prefix('$'))
            .unwrap_or(trimmed);

        let mut segments = Vec::new();
        let mut buf = String::new();
        let mut chars = trimmed.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '.' => flush_segment(&mut buf, &mut segments)?,
                '[' => {
                    flush_segment(&mut buf, &mut segments)?;
                    let mut digits = String::new();
                    for d in chars.by_ref() {
                        if d == ']' {
                            break;
                        }
                        digits.push(d);
                    }
                    let index: usize = digits.trim().parse().map_err(|_| {
                        Error::parse(format!("invalid list index '[{digits}]' in path '{source}'"))
                    })?;
                    segments.push(Segment::Index(index));
                }
                _ => buf.push(c),
            }
        }
        flush_segment(&mut buf, &mut segments)?;

        Ok(Path { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: Segment) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Path { segments }
    }

    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn pop(&mut self) -> Option<Segment> {
        self.segments.pop()
    }

    /// The enclosing path, or `None` at the root.
    pub fn parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Path {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Prefix-including ancestor test: a path is an ancestor of itself.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        if self.segments.len() > other.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(a, b)| a == b)
    }

    /// Resolves this path to a node of `root`.
    pub fn resolve<'a>(&self, root: &'a Value) -> Result<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = step(current, segment).ok_or_else(|| self.not_found())?;
        }
        Ok(current)
    }

    pub fn exists(&self, root: &Value) -> bool {
        self.resolve(root).is_ok()
    }

    /// Rewrites this path into its canonical form against `root`: plain
    /// keys over lists and named-entry selectors become numeric indices.
    pub fn canonicalize(&self, root: &Value) -> Result<Path> {
        let mut current = root;
        let mut canonical = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            let (index, next) = step_indexed(current, segment).ok_or_else(|| self.not_found())?;
            canonical.push(match index {
                Some(i) => Segment::Index(i),
                None => segment.clone(),
            });
            current = next;
        }
        Ok(Path { segments: canonical })
    }

    /// Depth-strips this path to the deepest prefix that resolves in
    /// `root`, returning it in canonical form. The root path always
    /// resolves, so this cannot fail.
    pub fn nearest_existing_ancestor(&self, root: &Value) -> Path {
        let mut candidate = self.clone();
        loop {
            if let Ok(canonical) = candidate.canonicalize(root) {
                return canonical;
            }
            if candidate.pop().is_none() {
                return Path::root();
            }
        }
    }

    fn not_found(&self) -> Error {
        Error::reference(format!("`{self}` could not be found in the datastructure"))
    }
}

fn flush_segment(buf: &mut String, segments: &mut Vec<Segment>) -> Result<()> {
    if buf.is_empty() {
        return Ok(());
    }
    let text = std::mem::take(buf);
    if let Some((field, value)) = text.split_once('=') {
        if field.is_empty() || value.is_empty() {
            return Err(Error::parse(format!("invalid named-entry selector '{text}'")));
        }
        segments.push(Segment::Select {
            field: field.to_string(),
            value: value.to_string(),
        });
    } else {
        segments.push(Segment::Key(text));
    }
    Ok(())
}

/// Resolves one segment, also reporting the list index it landed on when
/// the parent is a list (used by canonicalization).
fn step_indexed<'a>(current: &'a Value, segment: &Segment) -> Option<(Option<usize>, &'a Value)> {
    match (current, segment) {
        (Value::Map(entries), Segment::Key(k)) => entries.get(k).map(|v| (None, v)),
        (Value::List(items), Segment::Index(i)) => items.get(*i).map(|v| (Some(*i), v)),
        (Value::List(items), Segment::Key(k)) => {
            if let Ok(i) = k.parse::<usize>() {
                return items.get(i).map(|v| (Some(i), v));
            }
            find_named_entry(items, k).map(|(i, v)| (Some(i), v))
        }
        (Value::List(items), Segment::Select { field, value }) => items
            .iter()
            .enumerate()
            .find(|(_, item)| entry_field_matches(item, field, value))
            .map(|(i, v)| (Some(i), v)),
        _ => None,
    }
}

fn step<'a>(current: &'a Value, segment: &Segment) -> Option<&'a Value> {
    step_indexed(current, segment).map(|(_, v)| v)
}

/// First element of `items` whose identifier field equals `wanted`.
/// Duplicate identifier values resolve to the first match.
pub fn find_named_entry<'a>(items: &'a [Value], wanted: &str) -> Option<(usize, &'a Value)> {
    for field in IDENTIFIER_FIELDS {
        if let Some(found) = items
            .iter()
            .enumerate()
            .find(|(_, item)| entry_field_matches(item, field, wanted))
        {
            return Some(found);
        }
    }
    None
}

/// The identifier field shared by every mapping in `items`, if any.
pub fn shared_identifier_field(items: &[Value]) -> Option<&'static str> {
    IDENTIFIER_FIELDS.iter().copied().find(|field| {
        !items.is_empty()
            && items
                .iter()
                .all(|item| item.as_map().map(|m| m.contains_key(*field)).unwrap_or(false))
    })
}

fn entry_field_matches(item: &Value, field: &str, wanted: &str) -> bool {
    item.as_map()
        .and_then(|m| m.get(field))
        .and_then(|v| v.stringify())
        .map(|s| s == wanted)
        .unwrap_or(false)
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for segment in &self.segments {
            match segment {
                Segment::Index(i) => write!(f, "[{i}]")?,
                other => write!(f, ".{other}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn sample() -> Value {
        // { jobs: [ {name: api, port: 80}, {name: db, port: 5432} ], meta: { app: demo } }
        let mut api = IndexMap::new();
        api.insert("name".into(), Value::from("api"));
        api.insert("port".into(), Value::Int(80));
        let mut db = IndexMap::new();
        db.insert("name".into(), Value::from("db"));
        db.insert("port".into(), Value::Int(5432));
        let mut meta = IndexMap::new();
        meta.insert("app".into(), Value::from("demo"));
        let mut root = IndexMap::new();
        root.insert(
            "jobs".into(),
            Value::list(vec![Value::map(api), Value::map(db)]),
        );
        root.insert("meta".into(), Value::map(meta));
        Value::map(root)
    }

    #[test]
    fn parse_dotted_keys() {
        let path = Path::parse("meta.app").unwrap();
        assert_eq!(path.segments().len(), 2);
        assert_eq!(path.to_string(), "$.meta.app");
    }

    #[test]
    fn parse_bracketed_and_bare_indices() {
        let bracketed = Path::parse("jobs[1].port").unwrap();
        let bare = Path::parse("jobs.1.port").unwrap();
        assert_eq!(bracketed.resolve(&sample()).unwrap(), &Value::Int(5432));
        assert_eq!(bare.resolve(&sample()).unwrap(), &Value::Int(5432));
    }

    #[test]
    fn parse_rejects_bad_index() {
        assert!(Path::parse("jobs[x]").is_err());
    }

    #[test]
    fn root_marker_is_stripped() {
        assert_eq!(Path::parse("$.meta.app").unwrap(), Path::parse("meta.app").unwrap());
    }

    #[test]
    fn named_entry_lookup_by_plain_key() {
        let path = Path::parse("jobs.api.port").unwrap();
        assert_eq!(path.resolve(&sample()).unwrap(), &Value::Int(80));
    }

    #[test]
    fn named_entry_selector() {
        let path = Path::parse("jobs.name=db.port").unwrap();
        assert_eq!(path.resolve(&sample()).unwrap(), &Value::Int(5432));
    }

    #[test]
    fn canonicalize_rewrites_to_indices() {
        let path = Path::parse("jobs.db.port").unwrap();
        let canonical = path.canonicalize(&sample()).unwrap();
        assert_eq!(canonical.to_string(), "$.jobs[1].port");
    }

    #[test]
    fn missing_path_reports_reference_error() {
        let err = Path::parse("meta.absent").unwrap().resolve(&sample()).unwrap_err();
        assert!(err.to_string().contains("could not be found"));
    }

    #[test]
    fn nearest_existing_ancestor_strips_depth() {
        let path = Path::parse("meta.absent.deeper").unwrap();
        let ancestor = path.nearest_existing_ancestor(&sample());
        assert_eq!(ancestor.to_string(), "$.meta");
    }

    #[test]
    fn ancestor_test_includes_prefix_and_self() {
        let a = Path::parse("jobs[0]").unwrap();
        let b = Path::parse("jobs[0].port").unwrap();
        assert!(a.is_ancestor_of(&b));
        assert!(a.is_ancestor_of(&a));
        assert!(!b.is_ancestor_of(&a));
    }
}
