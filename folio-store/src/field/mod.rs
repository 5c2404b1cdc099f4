// Typed accessors bound to a dotted field path of one model class, and the
// predicates they build for queries.

use crate::document::{Document, Value};
use crate::error::{Result, StoreError};
use crate::external_file::ExternalFile;
use crate::model::ModelClass;
use crate::reference::Reference;
use crate::schema::FieldKind;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// A dotted path inside documents of one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    class: String,
    path: String,
}

impl FieldPath {
    pub fn new(class: &str, path: &str) -> Self {
        FieldPath {
            class: class.to_string(),
            path: path.to_string(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> Vec<String> {
        FieldPath::split(&self.path)
    }

    pub(crate) fn split(path: &str) -> Vec<String> {
        path.split('.').map(str::to_string).collect()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class, self.path)
    }
}

/// Conversion between live values and the Rust type a field is read as.
pub trait FieldValue: Sized {
    const TYPE_NAME: &'static str;

    /// Hands the value back when it does not hold a `Self`.
    fn from_value(value: Value) -> std::result::Result<Self, Value>;

    fn into_value(self) -> Value;
}

impl FieldValue for Value {
    const TYPE_NAME: &'static str = "value";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        Ok(value)
    }

    fn into_value(self) -> Value {
        self
    }
}

impl FieldValue for String {
    const TYPE_NAME: &'static str = "str";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(other),
        }
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl FieldValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(other),
        }
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl FieldValue for i64 {
    const TYPE_NAME: &'static str = "int";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(other),
        }
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl FieldValue for f64 {
    const TYPE_NAME: &'static str = "float";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => Err(other),
        }
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl FieldValue for Document {
    const TYPE_NAME: &'static str = "document";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Document(doc) | Value::Reference(Reference::Resolved(doc)) => Ok(doc),
            other => Err(other),
        }
    }

    fn into_value(self) -> Value {
        Value::Document(self)
    }
}

impl FieldValue for ExternalFile {
    const TYPE_NAME: &'static str = "file";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::File(file) => Ok(file),
            other => Err(other),
        }
    }

    fn into_value(self) -> Value {
        Value::File(self)
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    const TYPE_NAME: &'static str = "list";

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(other),
        }
    }

    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(T::into_value).collect())
    }
}

/// Typed get/set/delete of one field, obtained from
/// [`ModelClass::field`](crate::ModelClass::field).
pub struct Field<T> {
    path: FieldPath,
    segments: Vec<String>,
    class: Rc<ModelClass>,
    kind: FieldKind,
    read_only: bool,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Field {
            path: self.path.clone(),
            segments: self.segments.clone(),
            class: Rc::clone(&self.class),
            kind: self.kind.clone(),
            read_only: self.read_only,
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl<T: FieldValue> Field<T> {
    pub(crate) fn new(class: Rc<ModelClass>, path: &str, kind: FieldKind, read_only: bool) -> Self {
        Field {
            path: FieldPath::new(class.name(), path),
            segments: FieldPath::split(path),
            class,
            kind,
            read_only,
            _value: PhantomData,
        }
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Read the field. An unset field with a default gets the default,
    /// which is stored in the document from then on.
    pub fn get(&self, doc: &Document) -> Result<T> {
        self.check_class(doc)?;
        let value = match doc.get_path(&self.segments) {
            Some(value) => value,
            None => {
                let default = self
                    .class
                    .schema()
                    .default_for(self.path.path())
                    .ok_or_else(|| StoreError::MissingField {
                        path: self.path.path().to_string(),
                    })?;
                let value = doc.translate_default(self.path.path(), &self.kind, &default.produce())?;
                doc.set_path(&self.segments, value.clone());
                value
            }
        };

        T::from_value(value).map_err(|found| match found {
            Value::Reference(Reference::Pending(payload)) => StoreError::NoSession {
                owners: doc.label(),
                reference: payload.to_string(),
            },
            _ => StoreError::FieldType {
                path: self.path.path().to_string(),
                expected: T::TYPE_NAME,
            },
        })
    }

    /// Like [`get`](Self::get), with `None` for an unset field without default.
    pub fn get_opt(&self, doc: &Document) -> Result<Option<T>> {
        match self.get(doc) {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::MissingField { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write the field, creating intermediate mappings as needed.
    pub fn set(&self, doc: &Document, value: T) -> Result<()> {
        self.check_writable()?;
        self.check_class(doc)?;
        doc.set_path(&self.segments, coerce(&self.kind, value.into_value()));
        Ok(())
    }

    /// Remove the field. Removing an unset field does nothing.
    pub fn delete(&self, doc: &Document) -> Result<()> {
        self.check_writable()?;
        self.check_class(doc)?;
        doc.delete_path(&self.segments);
        Ok(())
    }

    pub fn eq(&self, value: T) -> Predicate {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(&self, value: T) -> Predicate {
        self.compare(CompareOp::Ne, value)
    }

    fn compare(&self, op: CompareOp, value: T) -> Predicate {
        Predicate::Compare {
            field: self.path.clone(),
            op,
            value: coerce(&self.kind, value.into_value()),
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(StoreError::ReadOnlyField {
                path: self.path.path().to_string(),
            });
        }
        Ok(())
    }

    fn check_class(&self, doc: &Document) -> Result<()> {
        let class = doc.class();
        if class.name() != self.path.class() {
            return Err(StoreError::Definition(format!(
                "field {} used on a {} document",
                self.path,
                class.name()
            )));
        }
        Ok(())
    }
}

/// Sub-documents written to reference fields become resolved references.
fn coerce(kind: &FieldKind, value: Value) -> Value {
    match (kind, value) {
        (FieldKind::Ref(_), Value::Document(doc)) => Value::Reference(Reference::Resolved(doc)),
        (FieldKind::List(item), Value::List(items)) => {
            Value::List(items.into_iter().map(|v| coerce(item, v)).collect())
        }
        (_, value) => value,
    }
}

/// Value of `field` in `doc` without side effects: the stored value, else
/// the default, else null.
pub(crate) fn current_value(doc: &Document, field: &FieldPath) -> Result<Value> {
    if let Some(value) = doc.get_path(&field.segments()) {
        return Ok(value);
    }
    let class = doc.class();
    let schema = class.schema();
    match (schema.default_for(field.path()), schema.key_info(field.path())) {
        (Some(default), Some(info)) => {
            doc.translate_default(field.path(), &info.kind, &default.produce())
        }
        _ => Ok(Value::Null),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
}

/// Boolean test over one document, evaluated by [`Query::filter`](crate::Query::filter).
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        field: FieldPath,
        op: CompareOp,
        value: Value,
    },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

/// Holds when every predicate holds.
pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::All(predicates.into_iter().collect())
}

/// Holds when at least one predicate holds.
pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::Any(predicates.into_iter().collect())
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        and([self, other])
    }

    pub fn or(self, other: Predicate) -> Predicate {
        or([self, other])
    }

    /// Every field path compared by this predicate.
    pub fn fields(&self) -> Vec<&FieldPath> {
        match self {
            Predicate::Compare { field, .. } => vec![field],
            Predicate::All(preds) | Predicate::Any(preds) => {
                preds.iter().flat_map(Predicate::fields).collect()
            }
        }
    }

    pub fn test(&self, doc: &Document) -> Result<bool> {
        match self {
            Predicate::Compare { field, op, value } => {
                let class = doc.class();
                if class.name() != field.class() {
                    return Err(StoreError::InvalidCriterion(format!(
                        "{field} tested against a {} document",
                        class.name()
                    )));
                }
                let current = current_value(doc, field)?;
                Ok(match op {
                    CompareOp::Eq => current == *value,
                    CompareOp::Ne => current != *value,
                })
            }
            Predicate::All(preds) => {
                for pred in preds {
                    if !pred.test(doc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Any(preds) => {
                for pred in preds {
                    if pred.test(doc)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_then_get() {
        let models = testing::models();
        let author = Document::new(&models.author).unwrap();
        let current = models
            .author
            .field::<String>("identity.handles.current")
            .unwrap();
        current.set(&author, "alice".to_string()).unwrap();
        assert_eq!(current.get(&author).unwrap(), "alice");

        let archive = models
            .author
            .field::<Vec<String>>("identity.handles.archive")
            .unwrap();
        archive.set(&author, vec!["al".into(), "ali".into()]).unwrap();
        assert_eq!(archive.get(&author).unwrap(), vec!["al", "ali"]);
    }

    #[test]
    fn test_missing_field_and_default_after_delete() {
        let models = testing::models();
        let author = Document::new(&models.author).unwrap();

        let current = models
            .author
            .field::<String>("identity.handles.current")
            .unwrap();
        let err = current.get(&author).unwrap_err();
        assert_eq!(err.to_string(), "field not found identity.handles.current");
        assert_eq!(current.get_opt(&author).unwrap(), None);

        let name = models.author.field::<String>("identity.name").unwrap();
        name.set(&author, "Alice".to_string()).unwrap();
        name.delete(&author).unwrap();
        assert!(author.get_path(&FieldPath::split("identity.name")).is_none());
        assert_eq!(name.get(&author).unwrap(), "");
        assert_eq!(
            author.get_path(&FieldPath::split("identity.name")),
            Some(Value::String(String::new()))
        );

        // Deleting twice is fine.
        current.delete(&author).unwrap();
        current.delete(&author).unwrap();
    }

    #[test]
    fn test_read_only_fields() {
        let models = testing::models();
        let author = Document::new(&models.author).unwrap();
        let uuid = models.author.uuid_field().unwrap();
        assert_eq!(uuid.get(&author).unwrap(), author.uuid().unwrap());

        let err = uuid.set(&author, "x".into()).unwrap_err();
        assert!(matches!(err, StoreError::ReadOnlyField { .. }));
        assert!(uuid.delete(&author).is_err());
    }

    #[test]
    fn test_type_mismatch() {
        let models = testing::models();
        let author = testing::author(&models, "alice");
        let err = models
            .author
            .field::<i64>("identity.handles.current")
            .unwrap()
            .get(&author)
            .unwrap_err();
        assert!(matches!(err, StoreError::FieldType { expected: "int", .. }));
    }

    #[test]
    fn test_field_of_other_class() {
        let models = testing::models();
        let category = Document::new(&models.category).unwrap();
        let name = models.author.field::<String>("identity.name").unwrap();
        assert!(matches!(
            name.get(&category),
            Err(StoreError::Definition(_))
        ));
    }

    #[test]
    fn test_predicates() {
        let models = testing::models();
        let alice = testing::author(&models, "alice");
        let current = models
            .author
            .field::<String>("identity.handles.current")
            .unwrap();
        let name = models.author.field::<String>("identity.name").unwrap();

        assert!(current.eq("alice".into()).test(&alice).unwrap());
        assert!(!current.ne("alice".into()).test(&alice).unwrap());
        assert!(name.eq(String::new()).test(&alice).unwrap());

        let both = current.eq("alice".into()).and(name.eq("Bob".into()));
        assert!(!both.test(&alice).unwrap());
        let either = or([current.eq("bob".into()), name.eq(String::new())]);
        assert!(either.test(&alice).unwrap());
        assert_eq!(either.fields().len(), 2);

        let category = Document::new(&models.category).unwrap();
        assert!(matches!(
            current.eq("alice".into()).test(&category),
            Err(StoreError::InvalidCriterion(_))
        ));
    }
}
