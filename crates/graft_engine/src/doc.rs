//! Document ingestion and serialization.
//!
//! YAML is the primary wire format (JSON being a subset the YAML parser
//! accepts). Multi-document streams become one tree per document. Scalar
//! mapping keys of any type are admitted on the wire and collapsed to
//! their string rendering, so the in-memory key type stays `String`.

use graft_base::{Error, Result};
use graft_tree::{Tree, Value};
use indexmap::IndexMap;
use serde::Deserialize;
use std::sync::Arc;

/// Parses a (possibly multi-document) YAML or JSON source into trees.
///
/// Empty documents become empty mappings; a non-mapping root is an
/// error. `name` is attributed to parse errors.
pub fn parse_documents(source: &str, name: Option<&str>) -> Result<Vec<Tree>> {
    let mut trees = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(source).enumerate() {
        let parsed = serde_yaml::Value::deserialize(document).map_err(|e| {
            let label = name.unwrap_or("document");
            Error::parse(format!("{label}: {e}"))
        })?;
        let value = from_yaml(parsed);
        let root = match value {
            Value::Null => Value::empty_map(),
            Value::Map(_) => value,
            other => {
                return Err(Error::validation(format!(
                    "{}: document {} root must be a map, got {}",
                    name.unwrap_or("document"),
                    index + 1,
                    other.type_name()
                )))
            }
        };
        trees.push(Tree::from_root(root)?);
    }
    if trees.is_empty() {
        trees.push(Tree::new());
    }
    Ok(trees)
}

/// Parses a single-document source into an arbitrary value (used by the
/// `load` operator, whose result need not be a mapping).
pub fn parse_value(source: &str, name: Option<&str>) -> Result<Value> {
    let parsed: serde_yaml::Value = serde_yaml::from_str(source).map_err(|e| {
        let label = name.unwrap_or("document");
        Error::parse(format!("{label}: {e}"))
    })?;
    Ok(from_yaml(parsed))
}

fn from_yaml(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::List(Arc::new(items.into_iter().map(from_yaml).collect()))
        }
        serde_yaml::Value::Mapping(entries) => {
            let mut map = IndexMap::with_capacity(entries.len());
            for (key, val) in entries {
                map.insert(key_to_string(key), from_yaml(val));
            }
            Value::Map(Arc::new(map))
        }
        serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value),
    }
}

/// Collapses a scalar mapping key to its string rendering.
fn key_to_string(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Serializes a tree to YAML.
pub fn to_yaml_string(tree: &Tree) -> Result<String> {
    serde_yaml::to_string(tree.root())
        .map_err(|e| Error::validation(format!("could not serialize document: {e}")))
}

/// Serializes a tree to JSON with the caller's indent string; an empty
/// indent produces compact output.
pub fn to_json_string(tree: &Tree, indent: &str) -> Result<String> {
    let fail = |e: serde_json::Error| Error::validation(format!("could not serialize document: {e}"));
    if indent.is_empty() {
        return serde_json::to_string(tree.root()).map_err(fail);
    }
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    serde::Serialize::serialize(tree.root(), &mut serializer).map_err(fail)?;
    String::from_utf8(out).map_err(|e| Error::validation(format!("non-utf8 JSON output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_tree::Path;

    #[test]
    fn parses_scalars_with_native_types() {
        let trees = parse_documents("n: 3\nf: 2.5\nb: true\ns: text\nz: ~\n", None).unwrap();
        let tree = &trees[0];
        assert_eq!(tree.get(&Path::parse("n").unwrap()).unwrap(), &Value::Int(3));
        assert_eq!(tree.get(&Path::parse("f").unwrap()).unwrap(), &Value::Float(2.5));
        assert_eq!(tree.get(&Path::parse("b").unwrap()).unwrap(), &Value::Bool(true));
        assert_eq!(tree.get(&Path::parse("z").unwrap()).unwrap(), &Value::Null);
    }

    #[test]
    fn multi_document_stream() {
        let trees = parse_documents("a: 1\n---\nb: 2\n", None).unwrap();
        assert_eq!(trees.len(), 2);
        assert!(trees[1].exists(&Path::parse("b").unwrap()));
    }

    #[test]
    fn empty_document_is_empty_map() {
        let trees = parse_documents("", None).unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].root(), &Value::empty_map());
    }

    #[test]
    fn non_map_root_is_rejected() {
        assert!(parse_documents("- 1\n- 2\n", None).is_err());
    }

    #[test]
    fn scalar_keys_collapse_to_strings() {
        let trees = parse_documents("1: one\ntrue: yes\n", None).unwrap();
        let tree = &trees[0];
        assert!(tree.exists(&Path::parse("1").unwrap()));
        assert!(tree.exists(&Path::parse("true").unwrap()));
    }

    #[test]
    fn json_is_accepted() {
        let trees = parse_documents(r#"{"a": {"b": 1}}"#, None).unwrap();
        assert!(trees[0].exists(&Path::parse("a.b").unwrap()));
    }

    #[test]
    fn insertion_order_survives_round_trip() {
        let trees = parse_documents("z: 1\na: 2\nm: 3\n", None).unwrap();
        let yaml = to_yaml_string(&trees[0]).unwrap();
        let z = yaml.find("z:").unwrap();
        let a = yaml.find("a:").unwrap();
        let m = yaml.find("m:").unwrap();
        assert!(z < a && a < m);
    }

    #[test]
    fn json_output_honors_indent() {
        let trees = parse_documents("a:\n  b: 1\n", None).unwrap();
        let pretty = to_json_string(&trees[0], "    ").unwrap();
        assert!(pretty.contains("\n    \"a\""));
        let compact = to_json_string(&trees[0], "").unwrap();
        assert!(!compact.contains('\n'));
    }
}
