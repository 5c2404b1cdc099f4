use crate::model::ModelClass;
use crate::reference::RefSpec;
use std::fmt;
use std::rc::Rc;

/// Whether a key must be present once a document has been validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Required,
    Optional,
}

/// Default for an unset key. Both forms produce a stored value, so every
/// document gets its own copy (and factories a freshly generated one).
#[derive(Clone)]
pub enum DefaultValue {
    Const(serde_yaml::Value),
    Factory(fn() -> serde_yaml::Value),
}

impl DefaultValue {
    pub fn produce(&self) -> serde_yaml::Value {
        match self {
            DefaultValue::Const(value) => value.clone(),
            DefaultValue::Factory(factory) => factory(),
        }
    }

    pub fn empty_list() -> Self {
        DefaultValue::Const(serde_yaml::Value::Sequence(Vec::new()))
    }

    pub fn empty_map() -> Self {
        DefaultValue::Const(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()))
    }

    pub fn string(value: &str) -> Self {
        DefaultValue::Const(serde_yaml::Value::String(value.to_string()))
    }

    pub fn bool(value: bool) -> Self {
        DefaultValue::Const(serde_yaml::Value::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        DefaultValue::Const(serde_yaml::Value::Number(value.into()))
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Const(value) => f.debug_tuple("Const").field(value).finish(),
            DefaultValue::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Leaf value types.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    String,
    Integer,
    /// Accepts integers as well.
    Float,
    Boolean,
    Uuid,
    Email,
    OneOf(Vec<String>),
    Any,
}

/// Type of a declared field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Primitive(Primitive),
    /// Plain nested mapping, flattened into dotted paths.
    Object(Schema),
    List(Box<FieldKind>),
    /// Sub-document stored inside its owner's file.
    Document(Rc<ModelClass>),
    Ref(RefSpec),
    /// File attached to the owning document, stored next to it.
    File,
}

impl FieldKind {
    pub fn string() -> Self {
        FieldKind::Primitive(Primitive::String)
    }

    pub fn integer() -> Self {
        FieldKind::Primitive(Primitive::Integer)
    }

    pub fn float() -> Self {
        FieldKind::Primitive(Primitive::Float)
    }

    pub fn boolean() -> Self {
        FieldKind::Primitive(Primitive::Boolean)
    }

    pub fn uuid() -> Self {
        FieldKind::Primitive(Primitive::Uuid)
    }

    pub fn email() -> Self {
        FieldKind::Primitive(Primitive::Email)
    }

    pub fn one_of(values: &[&str]) -> Self {
        FieldKind::Primitive(Primitive::OneOf(
            values.iter().map(|v| v.to_string()).collect(),
        ))
    }

    pub fn any() -> Self {
        FieldKind::Primitive(Primitive::Any)
    }

    pub fn object(schema: Schema) -> Self {
        FieldKind::Object(schema)
    }

    pub fn list(item: FieldKind) -> Self {
        FieldKind::List(Box::new(item))
    }

    pub fn document(class: &Rc<ModelClass>) -> Self {
        FieldKind::Document(Rc::clone(class))
    }

    pub fn reference(spec: RefSpec) -> Self {
        FieldKind::Ref(spec)
    }

    pub fn file() -> Self {
        FieldKind::File
    }
}

/// A declared key.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub marker: Marker,
    pub default: Option<DefaultValue>,
    pub kind: FieldKind,
    /// Accessors for this key (and keys nested under it) refuse writes.
    pub read_only: bool,
}

/// Declarative field description of a model, compiled by
/// [`compile`](super::compile) when the model class is built.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn required(self, name: &str, kind: FieldKind) -> Self {
        self.field(FieldSpec {
            name: name.to_string(),
            marker: Marker::Required,
            default: None,
            kind,
            read_only: false,
        })
    }

    pub fn optional(self, name: &str, kind: FieldKind) -> Self {
        self.field(FieldSpec {
            name: name.to_string(),
            marker: Marker::Optional,
            default: None,
            kind,
            read_only: false,
        })
    }

    /// Required key filled with `default` when absent.
    pub fn required_or(self, name: &str, kind: FieldKind, default: DefaultValue) -> Self {
        self.field(FieldSpec {
            name: name.to_string(),
            marker: Marker::Required,
            default: Some(default),
            kind,
            read_only: false,
        })
    }

    pub fn optional_or(self, name: &str, kind: FieldKind, default: DefaultValue) -> Self {
        self.field(FieldSpec {
            name: name.to_string(),
            marker: Marker::Optional,
            default: Some(default),
            kind,
            read_only: false,
        })
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
