// Queries over the documents of one file-backed class visible to a session.

use crate::document::{Document, Value};
use crate::error::{Result, StoreError};
use crate::field::{current_value, Field, FieldPath, FieldValue, Predicate};
use crate::model::ModelClass;
use crate::path_template::{ancestor_key, UUID_KEY};
use crate::session::Session;
use regex::Captures;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Lazy selection of documents. Nothing is read until a terminal method
/// (`all`, `one`, `count`, ...) runs.
#[derive(Debug, Clone)]
pub struct Query<'s> {
    session: &'s Session,
    class: Rc<ModelClass>,
    parent: Option<Document>,
    /// Template keys fixed to one identifier.
    pinned: BTreeMap<String, String>,
    filters: Vec<Predicate>,
    order: Vec<FieldPath>,
}

impl<'s> Query<'s> {
    pub(crate) fn new(session: &'s Session, class: &Rc<ModelClass>) -> Self {
        Query {
            session,
            class: Rc::clone(class),
            parent: None,
            pinned: BTreeMap::new(),
            filters: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn class(&self) -> &Rc<ModelClass> {
        &self.class
    }

    /// Keep documents for which `predicate` holds.
    pub fn filter(mut self, predicate: Predicate) -> Result<Self> {
        for field in predicate.fields() {
            self.check_field(field)?;
        }
        self.filters.push(predicate);
        Ok(self)
    }

    /// Sort ascending by `field`. Later calls break ties of earlier ones.
    pub fn order_by<T: FieldValue>(mut self, field: &Field<T>) -> Result<Self> {
        self.check_field(field.path())?;
        self.order.push(field.path().clone());
        Ok(self)
    }

    /// Restrict an inline class to the documents owned by `parent`.
    pub fn parent(mut self, parent: &Document) -> Result<Self> {
        let class_name = self.class.name().to_string();
        if self.parent.is_some() {
            return Err(StoreError::QueryParentAlreadySet { class: class_name });
        }
        let link = self
            .class
            .parent_link()
            .ok_or_else(|| StoreError::QueryNoParent {
                class: class_name.clone(),
            })?;
        let found = parent.class();
        if found.name() != link.class.name() {
            return Err(StoreError::QueryParentWrongType {
                class: class_name,
                expected: link.class.name().to_string(),
                found: found.name().to_string(),
            });
        }

        let key = ancestor_key(&link.name);
        self.pinned.extend(parent.ancestor_ids()?);
        self.pinned.insert(key, parent.uuid()?);
        self.parent = Some(parent.clone());
        Ok(self)
    }

    pub(crate) fn pin(mut self, key: &str, value: &str) -> Self {
        self.pinned.insert(key.to_string(), value.to_string());
        self
    }

    /// Every matching document, in filename order unless sorted.
    pub fn all(&self) -> Result<Vec<Document>> {
        let layout = self.class.layout().ok_or_else(|| StoreError::NotFileBacked {
            document: self.class.name().to_string(),
        })?;
        let matcher = layout.template.matcher(&self.pinned)?;

        let mut candidates: BTreeMap<String, Option<Document>> = BTreeMap::new();
        for filename in self.session.known_files() {
            if matcher.is_match(&filename) {
                candidates.insert(filename, None);
            }
        }
        for doc in self.session.cached_of_class(self.class.name()) {
            if let Ok(filename) = doc.filename() {
                if matcher.is_match(&filename) {
                    candidates.insert(filename, Some(doc));
                }
            }
        }

        let mut docs = Vec::with_capacity(candidates.len());
        for (filename, cached) in candidates {
            let doc = match cached {
                Some(doc) => doc,
                None => match matcher.captures(&filename) {
                    Some(caps) => self.load_file(&filename, &caps)?,
                    None => continue,
                },
            };
            if self.accepts(&doc)? {
                docs.push(doc);
            }
        }

        if !self.order.is_empty() {
            let mut keyed = docs
                .into_iter()
                .map(|doc| {
                    let keys = self
                        .order
                        .iter()
                        .map(|field| current_value(&doc, field))
                        .collect::<Result<Vec<_>>>()?;
                    Ok((keys, doc))
                })
                .collect::<Result<Vec<_>>>()?;
            keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b));
            docs = keyed.into_iter().map(|(_, doc)| doc).collect();
        }
        Ok(docs)
    }

    /// The single document with identifier `uuid`.
    pub fn get(self, uuid: &str) -> Result<Document> {
        self.pin(UUID_KEY, uuid).one()
    }

    pub fn get_or_none(self, uuid: &str) -> Result<Option<Document>> {
        self.pin(UUID_KEY, uuid).one_or_none()
    }

    /// The only matching document; an error if there are none or several.
    pub fn one(&self) -> Result<Document> {
        self.one_or_none()?.ok_or_else(|| StoreError::NoObjectFound {
            class: self.class.name().to_string(),
        })
    }

    pub fn one_or_none(&self) -> Result<Option<Document>> {
        let mut docs = self.all()?;
        match docs.len() {
            0 => Ok(None),
            1 => Ok(docs.pop()),
            count => Err(StoreError::TooManyObjects {
                class: self.class.name().to_string(),
                count,
            }),
        }
    }

    pub fn first(&self) -> Result<Document> {
        self.first_or_none()?.ok_or_else(|| StoreError::NoObjectFound {
            class: self.class.name().to_string(),
        })
    }

    pub fn first_or_none(&self) -> Result<Option<Document>> {
        Ok(self.all()?.into_iter().next())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.all()?.len())
    }

    /// Schedule every matching document for deletion. Returns how many.
    pub fn delete(&self) -> Result<usize> {
        let docs = self.all()?;
        self.session.delete(&docs)?;
        Ok(docs.len())
    }

    fn accepts(&self, doc: &Document) -> Result<bool> {
        for predicate in &self.filters {
            if !predicate.test(doc)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn check_field(&self, field: &FieldPath) -> Result<()> {
        if field.class() != self.class.name() {
            return Err(StoreError::InvalidCriterion(format!(
                "{field} used in a query on {}",
                self.class.name()
            )));
        }
        Ok(())
    }

    /// Read a stored document, reusing the session's instance when there is one.
    fn load_file(&self, filename: &str, caps: &Captures<'_>) -> Result<Document> {
        let ids = self.identifiers(caps);
        let uuid = ids.get(UUID_KEY).cloned().unwrap_or_default();
        if let Some(doc) = self.session.cached(&uuid) {
            return Ok(doc);
        }

        let parent = match (&self.parent, self.class.parent_link()) {
            (Some(parent), _) => Some(parent.clone()),
            (None, Some(link)) => {
                let parent_uuid = ids.get(&ancestor_key(&link.name)).cloned().unwrap_or_default();
                let mut query = self.session.query(&link.class);
                for key in link.class.ancestor_keys() {
                    if let Some(value) = ids.get(&key) {
                        query = query.pin(&key, value);
                    }
                }
                Some(query.get(&parent_uuid)?)
            }
            (None, None) => None,
        };

        log::debug!("Reading {}", filename);
        let text = std::fs::read_to_string(self.session.root().join(filename))?;
        let data: serde_yaml::Value = serde_yaml::from_str(&text)?;
        Document::load_with(&self.class, &data, Some(self.session), parent.as_ref(), true)
    }

    /// Pinned identifiers plus those captured from a filename.
    fn identifiers(&self, caps: &Captures<'_>) -> BTreeMap<String, String> {
        let mut ids = self.pinned.clone();
        if let Some(layout) = self.class.layout() {
            for key in layout.template.keys() {
                if let Some(m) = caps.name(&key) {
                    ids.insert(key, m.as_str().to_string());
                }
            }
        }
        ids
    }
}

fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.sort_cmp(y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}
