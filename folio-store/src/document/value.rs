use super::Document;
use crate::external_file::ExternalFile;
use crate::reference::Reference;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Live field value. Stored mappings matching a sub-document, reference or
/// attached-file declaration are translated into their live counterpart.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Document(Document),
    Reference(Reference),
    File(ExternalFile),
}

impl Value {
    /// Untranslated conversion of a stored value.
    pub fn from_plain(value: &serde_yaml::Value) -> Value {
        match value {
            serde_yaml::Value::Null => Value::Null,
            serde_yaml::Value::Bool(b) => Value::Bool(*b),
            serde_yaml::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_yaml::Value::String(s) => Value::String(s.clone()),
            serde_yaml::Value::Sequence(items) => {
                Value::List(items.iter().map(Value::from_plain).collect())
            }
            serde_yaml::Value::Mapping(mapping) => Value::Map(
                mapping
                    .iter()
                    .map(|(k, v)| (plain_key(k), Value::from_plain(v)))
                    .collect(),
            ),
            serde_yaml::Value::Tagged(tagged) => Value::from_plain(&tagged.value),
        }
    }

    /// Stored form of a value holding no live objects.
    pub fn to_plain(&self) -> Option<serde_yaml::Value> {
        Some(match self {
            Value::Null => serde_yaml::Value::Null,
            Value::Bool(b) => serde_yaml::Value::Bool(*b),
            Value::Int(i) => serde_yaml::Value::Number((*i).into()),
            Value::Float(f) => serde_yaml::Value::Number((*f).into()),
            Value::String(s) => serde_yaml::Value::String(s.clone()),
            Value::List(items) => serde_yaml::Value::Sequence(
                items.iter().map(Value::to_plain).collect::<Option<_>>()?,
            ),
            Value::Map(map) => {
                let mut mapping = serde_yaml::Mapping::new();
                for (k, v) in map {
                    mapping.insert(k.clone().into(), v.to_plain()?);
                }
                serde_yaml::Value::Mapping(mapping)
            }
            Value::Document(_) | Value::Reference(_) | Value::File(_) => return None,
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Document(_) => "document",
            Value::Reference(_) => "reference",
            Value::File(_) => "file",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Sub-document or resolved reference target.
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) | Value::Reference(Reference::Resolved(doc)) => Some(doc),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::List(_) => 4,
            Value::Map(_) => 5,
            Value::Document(_) | Value::Reference(_) => 6,
            Value::File(_) => 7,
        }
    }

    fn identity_key(&self) -> Option<String> {
        match self {
            Value::Reference(Reference::Pending(payload)) => Some(payload.uuid.clone()),
            other => other.as_document().and_then(|d| d.uuid().ok()),
        }
    }

    /// Total order used by `order_by`: values of different types order by
    /// type, documents by identifier.
    pub(crate) fn sort_cmp(&self, other: &Value) -> Ordering {
        let by_rank = self.rank().cmp(&other.rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.sort_cmp(y))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Value::File(a), Value::File(b)) => a.filename().cmp(&b.filename()),
            (a, b) if a.rank() == 2 => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
            (a, b) => a.identity_key().cmp(&b.identity_key()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::File(a), Value::File(b)) => a == b,
            (Value::Reference(Reference::Pending(a)), Value::Reference(Reference::Pending(b))) => {
                a == b
            }
            (Value::Reference(Reference::Pending(payload)), other)
            | (other, Value::Reference(Reference::Pending(payload))) => other
                .as_document()
                .and_then(|d| d.ref_payload().ok())
                .map_or(false, |p| p == *payload),
            (a, b) => match (a.as_document(), b.as_document()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Document(doc)
    }
}

fn plain_key(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_conversion() {
        let stored: serde_yaml::Value =
            serde_yaml::from_str("a: 1\nb: [x, 2.5, true]\nc: {d: null}").unwrap();
        let value = Value::from_plain(&stored);
        match &value {
            Value::Map(map) => {
                assert_eq!(map["a"], Value::Int(1));
                assert_eq!(
                    map["b"],
                    Value::List(vec!["x".into(), Value::Float(2.5), true.into()])
                );
            }
            other => panic!("expected a map, got {other:?}"),
        }
        assert_eq!(value.to_plain().unwrap(), stored);
    }

    #[test]
    fn test_numbers_compare_across_types() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::String("2".into()));
        assert_eq!(Value::Int(1).sort_cmp(&Value::Float(1.5)), Ordering::Less);
    }

    #[test]
    fn test_sort_order_by_type_then_value() {
        let mut values = vec![
            Value::String("b".into()),
            Value::Int(3),
            Value::Null,
            Value::String("a".into()),
            Value::Bool(true),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Int(3),
                Value::String("a".into()),
                Value::String("b".into()),
            ]
        );
    }
}
