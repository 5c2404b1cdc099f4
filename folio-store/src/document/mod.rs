// Documents: live records of a model class, their ownership and storage
// paths, and conversion to and from the stored form.

mod translate;
mod value;

pub use value::Value;

use crate::error::{Result, StoreError};
use crate::field::{FieldPath, FieldValue};
use crate::model::{ModelClass, UUID_FIELD};
use crate::owners::Owners;
use crate::path_template::{ancestor_key, UUID_KEY};
use crate::reference::RefPayload;
use crate::schema::{kind_rule, FieldKind};
use crate::session::Session;
use crate::validation;
use serde::{Serialize, Serializer};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use translate::{load_value, DumpCx, LoadCx};

/// Handle to a live document. Clones share the same record, which is how
/// a session hands out one instance per identifier.
#[derive(Clone)]
pub struct Document(pub(crate) Rc<RefCell<DocumentState>>);

pub(crate) struct DocumentState {
    class: Rc<ModelClass>,
    pub(crate) data: BTreeMap<String, Value>,
    parent: Option<Document>,
}

impl Document {
    pub(crate) fn empty(class: &Rc<ModelClass>) -> Document {
        Document(Rc::new(RefCell::new(DocumentState {
            class: Rc::clone(class),
            data: BTreeMap::new(),
            parent: None,
        })))
    }

    /// New document with every declared default filled in, including a
    /// fresh identifier for file-backed classes.
    pub fn new(class: &Rc<ModelClass>) -> Result<Document> {
        let doc = Document::empty(class);
        for (path, default) in class.schema().defaults() {
            let Some(info) = class.schema().key_info(path) else {
                continue;
            };
            let value = doc.translate_default(path, &info.kind, &default.produce())?;
            doc.set_path(&FieldPath::split(path), value);
        }
        Ok(doc)
    }

    /// New inline document owned by `parent`.
    pub fn new_inline(class: &Rc<ModelClass>, parent: &Document) -> Result<Document> {
        let doc = Document::new(class)?;
        doc.set_parent(parent)?;
        Ok(doc)
    }

    /// Build a document from stored data. References stay pending until a
    /// session is available to resolve them.
    pub fn from_data(class: &Rc<ModelClass>, data: &serde_yaml::Value) -> Result<Document> {
        Document::load(class, data, None, None)
    }

    /// Build a document from stored data, resolving references through `session`.
    pub fn load(
        class: &Rc<ModelClass>,
        data: &serde_yaml::Value,
        session: Option<&Session>,
        parent: Option<&Document>,
    ) -> Result<Document> {
        Document::load_with(class, data, session, parent, false)
    }

    /// With `register`, the document enters the session cache before its
    /// fields are translated, so references back to it resolve to it. A
    /// failed load leaves the cache as it found it.
    pub(crate) fn load_with(
        class: &Rc<ModelClass>,
        data: &serde_yaml::Value,
        session: Option<&Session>,
        parent: Option<&Document>,
        register: bool,
    ) -> Result<Document> {
        let validated = class
            .schema()
            .validate(data)
            .into_result()
            .map_err(|message| StoreError::Invalid {
                document: label_of(
                    class,
                    data.get(UUID_FIELD).and_then(serde_yaml::Value::as_str),
                ),
                message,
            })?;

        let doc = Document::empty(class);
        if let Some(uuid) = validated.get(UUID_FIELD).and_then(serde_yaml::Value::as_str) {
            doc.set_path(&[UUID_FIELD.to_string()], Value::String(uuid.to_string()));
        }
        if let Some(parent) = parent {
            doc.set_parent(parent)?;
        }
        let cache = session.filter(|_| register);
        let before = cache.map(|session| {
            let ids = session.cached_ids();
            session.remember(&doc);
            ids
        });

        let loaded = Owners::root().with(&doc, |owners| {
            translate::load_map(
                class.schema().declared(),
                &validated,
                &LoadCx { session, owners },
            )
        });
        let fields = match loaded {
            Ok(fields) => fields,
            Err(e) => {
                // Drop this document and whatever was cached while loading it.
                if let (Some(session), Some(before)) = (cache, before) {
                    session.forget_since(&before);
                }
                return Err(e);
            }
        };
        doc.replace_data(fields);
        log::debug!("Loaded {}", doc.label());
        Ok(doc)
    }

    pub(crate) fn replace_data(&self, data: BTreeMap<String, Value>) {
        self.0.borrow_mut().data = data;
    }

    pub fn class(&self) -> Rc<ModelClass> {
        Rc::clone(&self.0.borrow().class)
    }

    /// Whether both handles point at the same record.
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// `Class uuid=<uuid>` for file-backed documents, `Class` otherwise.
    pub fn label(&self) -> String {
        let state = self.0.borrow();
        let uuid = state.data.get(UUID_FIELD).and_then(Value::as_str);
        label_of(&state.class, uuid)
    }

    pub fn uuid(&self) -> Result<String> {
        let state = self.0.borrow();
        match state.data.get(UUID_FIELD) {
            Some(Value::String(uuid)) if state.class.is_file_backed() => Ok(uuid.clone()),
            _ => Err(StoreError::NotFileBacked {
                document: state.class.name().to_string(),
            }),
        }
    }

    pub fn parent(&self) -> Option<Document> {
        self.0.borrow().parent.clone()
    }

    /// Attach an inline document to its owner. Allowed once, and only with
    /// a parent of the declared class.
    pub fn set_parent(&self, parent: &Document) -> Result<()> {
        if self.0.borrow().parent.is_some() {
            return Err(StoreError::ParentAlreadySet {
                document: self.label(),
            });
        }
        let class = self.class();
        let link = class
            .parent_link()
            .ok_or_else(|| StoreError::NoParentDeclared {
                document: self.label(),
            })?;
        let found = parent.class();
        if found.name() != link.class.name() {
            return Err(StoreError::WrongParentType {
                document: self.label(),
                expected: link.class.name().to_string(),
                found: found.name().to_string(),
            });
        }
        self.0.borrow_mut().parent = Some(parent.clone());
        Ok(())
    }

    /// `<name>_uuid` of every owner, up to the top-level document.
    pub fn ancestor_ids(&self) -> Result<BTreeMap<String, String>> {
        let mut ids = BTreeMap::new();
        let class = self.class();
        if let Some(link) = class.parent_link() {
            let parent = self.parent().ok_or_else(|| StoreError::ParentNotSet {
                document: self.label(),
            })?;
            ids.extend(parent.ancestor_ids()?);
            ids.insert(ancestor_key(&link.name), parent.uuid()?);
        }
        Ok(ids)
    }

    /// Storage path relative to the store root.
    pub fn filename(&self) -> Result<String> {
        let class = self.class();
        let layout = class.layout().ok_or_else(|| StoreError::NotFileBacked {
            document: self.label(),
        })?;
        let mut ids = self.ancestor_ids()?;
        ids.insert(UUID_KEY.to_string(), self.uuid()?);
        layout
            .template
            .render(&ids)
            .ok_or_else(|| StoreError::ParentNotSet {
                document: self.label(),
            })
    }

    /// Pointer stored by reference fields targeting this document.
    pub fn ref_payload(&self) -> Result<RefPayload> {
        Ok(RefPayload {
            class: self.class().name().to_string(),
            uuid: self.uuid()?,
            ancestors: self.ancestor_ids()?,
        })
    }

    /// Stored form, validated. References must point at documents
    /// reachable from `session`.
    pub fn as_dict(&self, session: Option<&Session>) -> Result<serde_yaml::Value> {
        self.serialize_with(session, false, true)
    }

    /// [`as_dict`](Self::as_dict) as pretty JSON with sorted keys.
    pub fn pformat(&self, session: Option<&Session>) -> Result<String> {
        let json: serde_json::Value = serde_json::to_value(self.as_dict(session)?)?;
        Ok(serde_json::to_string_pretty(&json)?)
    }

    /// Stored form without checking reference targets.
    pub fn snapshot(&self) -> Result<serde_yaml::Value> {
        self.serialize_with(None, false, false)
    }

    /// Serialize into the session's staging area and queue its promotion
    /// to the final path.
    pub(crate) fn persist(&self, session: &Session) -> Result<()> {
        let filename = self.filename()?;
        let value = self.serialize_with(Some(session), true, true)?;
        let text = serde_yaml::to_string(&value)?;
        session.stage(&filename, &text)
    }

    fn serialize_with(
        &self,
        session: Option<&Session>,
        persist: bool,
        verify_refs: bool,
    ) -> Result<serde_yaml::Value> {
        let dumped = translate::dump_document(
            self,
            &DumpCx {
                session,
                owners: Owners::root(),
                persist,
                verify_refs,
            },
        )?;
        self.class()
            .schema()
            .validate(&dumped)
            .into_result()
            .map_err(|message| StoreError::Invalid {
                document: self.label(),
                message,
            })
    }

    /// Read a field by dotted path.
    pub fn get<T: FieldValue>(&self, path: &str) -> Result<T> {
        self.class().field::<T>(path)?.get(self)
    }

    /// Write a field by dotted path.
    pub fn set<T: FieldValue>(&self, path: &str, value: T) -> Result<()> {
        self.class().field::<T>(path)?.set(self, value)
    }

    /// Validate and translate a default produced for `path`.
    pub(crate) fn translate_default(
        &self,
        path: &str,
        kind: &FieldKind,
        produced: &serde_yaml::Value,
    ) -> Result<Value> {
        let rule = kind_rule(kind, path)?;
        let checked = validation::validate_value(&rule, produced)
            .into_result()
            .map_err(|message| StoreError::Invalid {
                document: self.label(),
                message,
            })?;
        Owners::root().with(self, |owners| {
            load_value(
                kind,
                &checked,
                &LoadCx {
                    session: None,
                    owners,
                },
            )
        })
    }

    // ── Path helpers ─────────────────────────────────────────────────

    pub(crate) fn get_path(&self, segments: &[String]) -> Option<Value> {
        let state = self.0.borrow();
        let (first, rest) = segments.split_first()?;
        let mut current = state.data.get(first)?;
        for segment in rest {
            match current {
                Value::Map(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current.clone())
    }

    pub(crate) fn set_path(&self, segments: &[String], value: Value) {
        set_in(&mut self.0.borrow_mut().data, segments, value);
    }

    /// Remove the value at `segments` and prune emptied parents.
    pub(crate) fn delete_path(&self, segments: &[String]) -> bool {
        delete_in(&mut self.0.borrow_mut().data, segments)
    }
}

fn label_of(class: &ModelClass, uuid: Option<&str>) -> String {
    match uuid {
        Some(uuid) if class.is_file_backed() => format!("{} uuid={uuid}", class.name()),
        _ => class.name().to_string(),
    }
}

fn set_in(map: &mut BTreeMap<String, Value>, segments: &[String], value: Value) {
    match segments {
        [] => {}
        [last] => {
            map.insert(last.clone(), value);
        }
        [first, rest @ ..] => {
            let entry = map
                .entry(first.clone())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if !matches!(entry, Value::Map(_)) {
                *entry = Value::Map(BTreeMap::new());
            }
            if let Value::Map(inner) = entry {
                set_in(inner, rest, value);
            }
        }
    }
}

fn delete_in(map: &mut BTreeMap<String, Value>, segments: &[String]) -> bool {
    match segments {
        [] => false,
        [last] => map.remove(last).is_some(),
        [first, rest @ ..] => {
            let Some(Value::Map(inner)) = map.get_mut(first) else {
                return false;
            };
            let removed = delete_in(inner, rest);
            if removed && inner.is_empty() {
                map.remove(first);
            }
            removed
        }
    }
}

/// Same class and equal stored form. Errors while dumping count as unequal.
impl PartialEq for Document {
    fn eq(&self, other: &Document) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if self.class().name() != other.class().name() {
            return false;
        }
        match (self.snapshot(), other.snapshot()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Document({})", self.label())
    }
}

/// Serializes the stored form.
impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.snapshot()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use pretty_assertions::assert_eq;

    fn yaml(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_roundtrip_normalizes_defaults() {
        let models = testing::models();
        let data = yaml(
            "uuid: 0f8fad5b-d9cb-469f-a165-70867728950e\n\
             identity: {handles: {current: alice}}\n\
             social: {twitter: {handle: al1ce}}",
        );
        let author = Document::from_data(&models.author, &data).unwrap();
        assert_eq!(
            author.as_dict(None).unwrap(),
            yaml(
                "uuid: 0f8fad5b-d9cb-469f-a165-70867728950e\n\
                 identity: {handles: {current: alice, archive: []}, name: '', short-name: ''}\n\
                 social: {twitter: {handle: al1ce}}",
            )
        );
        assert!(author.get::<Document>("social.twitter").is_ok());
    }

    #[test]
    fn test_invalid_data_names_the_document() {
        let models = testing::models();
        let err = Document::from_data(
            &models.author,
            &yaml("uuid: 0f8fad5b-d9cb-469f-a165-70867728950e\nidentity: {}"),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Author uuid=0f8fad5b-d9cb-469f-a165-70867728950e: \
             required key not provided @ data['identity']['handles']"
        );
    }

    #[test]
    fn test_defaults_differ_only_by_identifier() {
        let models = testing::models();
        let a = Document::new(&models.author).unwrap();
        let b = Document::new(&models.author).unwrap();
        a.set("identity.handles.current", "x".to_string()).unwrap();
        b.set("identity.handles.current", "x".to_string()).unwrap();

        let strip = |doc: &Document| {
            let mut value = doc.as_dict(None).unwrap();
            value.as_mapping_mut().unwrap().remove("uuid");
            value
        };
        assert_eq!(strip(&a), strip(&b));
        assert_ne!(a.uuid().unwrap(), b.uuid().unwrap());
        assert_eq!(a.as_dict(None).unwrap(), a.as_dict(None).unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn test_filenames() {
        let models = testing::models();
        let author = testing::author(&models, "alice");
        let uuid = author.uuid().unwrap();
        assert_eq!(
            author.filename().unwrap(),
            format!("authors/{uuid}/author.yaml")
        );

        let email = Document::new(&models.email).unwrap();
        assert!(matches!(
            email.filename(),
            Err(StoreError::ParentNotSet { .. })
        ));
        email.set_parent(&author).unwrap();
        let email_uuid = email.uuid().unwrap();
        assert_eq!(
            email.filename().unwrap(),
            format!("authors/{uuid}/emails/{email_uuid}/email.yaml")
        );

        let twitter = Document::new(&models.twitter).unwrap();
        assert!(matches!(
            twitter.filename(),
            Err(StoreError::NotFileBacked { .. })
        ));
    }

    #[test]
    fn test_identifier_cannot_be_rewritten() {
        let models = testing::models();
        let author = testing::author(&models, "alice");
        let uuid = author.uuid().unwrap();

        let err = author
            .set("uuid", crate::identity::new_uuid())
            .unwrap_err();
        assert!(matches!(err, StoreError::ReadOnlyField { .. }));

        let field = models.author.field::<String>("uuid").unwrap();
        assert!(field.is_read_only());
        assert!(field.set(&author, "x".into()).is_err());
        assert!(field.delete(&author).is_err());
        assert_eq!(author.uuid().unwrap(), uuid);
        assert_eq!(
            author.filename().unwrap(),
            format!("authors/{uuid}/author.yaml")
        );
    }

    #[test]
    fn test_parent_is_set_once_and_type_checked() {
        let models = testing::models();
        let author = testing::author(&models, "alice");
        let email = Document::new_inline(&models.email, &author).unwrap();

        let err = email.set_parent(&author).unwrap_err();
        assert!(err.to_string().ends_with("parent already set"));

        let other = Document::new(&models.email).unwrap();
        let category = Document::new(&models.category).unwrap();
        let err = other.set_parent(&category).unwrap_err();
        assert!(err
            .to_string()
            .ends_with("type Category is not expected parent type Author"));

        let err = author.set_parent(&category).unwrap_err();
        assert!(err.to_string().ends_with("no parent defined"));
    }

    #[test]
    fn test_references_need_a_session_to_serialize() {
        let models = testing::models();
        let author = testing::author(&models, "alice");
        let article = testing::article(&models, "# Title");
        article.set("authors", vec![author.clone()]).unwrap();

        assert!(matches!(
            article.as_dict(None),
            Err(StoreError::NoSession { .. })
        ));
        let snapshot = article.snapshot().unwrap();
        assert_eq!(
            snapshot["authors"][0]["uuid"].as_str().unwrap(),
            author.uuid().unwrap()
        );
    }

    #[test]
    fn test_pending_references_compare_by_payload() {
        let models = testing::models();
        let author = testing::author(&models, "alice");
        let article = testing::article(&models, "# Title");
        article.set("authors", vec![author.clone()]).unwrap();

        let loaded = Document::from_data(&models.article, &article.snapshot().unwrap()).unwrap();
        assert_eq!(loaded, article);
        let authors = loaded.get::<Value>("authors").unwrap();
        assert_eq!(authors, Value::List(vec![Value::Document(author)]));
        assert!(matches!(
            loaded.get::<Vec<Document>>("authors"),
            Err(StoreError::NoSession { .. })
        ));
    }

    #[test]
    fn test_pformat_sorts_keys() {
        let models = testing::models();
        let category = Document::from_data(
            &models.category,
            &yaml("uuid: 0f8fad5b-d9cb-469f-a165-70867728950e\nname: rust"),
        )
        .unwrap();
        assert_eq!(
            category.pformat(None).unwrap(),
            "{\n  \"name\": \"rust\",\n  \"uuid\": \"0f8fad5b-d9cb-469f-a165-70867728950e\"\n}"
        );
    }

    #[test]
    fn test_path_helpers_prune_empty_parents() {
        let models = testing::models();
        let doc = Document::new(&models.author).unwrap();
        let path = FieldPath::split("social.twitter");
        doc.set_path(&path, Value::Null);
        assert!(doc.get_path(&FieldPath::split("social")).is_some());
        assert!(doc.delete_path(&path));
        assert!(doc.get_path(&FieldPath::split("social")).is_none());
        assert!(!doc.delete_path(&path));
    }
}
