use crate::document::Document;
use crate::error::{Result, StoreError};
use crate::model::ModelClass;
use crate::owners::Owners;
use crate::schema::{Marker, Primitive};
use crate::session::Session;
use crate::validation::{KeyRule, ObjectRule, Rule};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const CLASS_KEY: &str = "clsname";
const UUID_KEY: &str = "uuid";

/// Declaration of a reference field: the classes it may point to.
#[derive(Debug, Clone, PartialEq)]
pub struct RefSpec {
    classes: BTreeSet<String>,
}

impl RefSpec {
    pub fn new<I, S>(classes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: BTreeSet<String> = classes.into_iter().map(Into::into).collect();
        if classes.is_empty() {
            return Err(StoreError::Definition("no class names provided".into()));
        }
        Ok(RefSpec { classes })
    }

    /// Reference to a single class.
    pub fn to(class: &ModelClass) -> Self {
        RefSpec {
            classes: BTreeSet::from([class.name().to_string()]),
        }
    }

    pub fn allows(&self, class: &str) -> bool {
        self.classes.contains(class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(String::as_str)
    }

    fn wrong_class(&self, owners: Owners<'_>, reference: String, class: &str) -> StoreError {
        StoreError::WrongClass {
            owners: owners.clean_repr(),
            reference,
            class: class.to_string(),
            allowed: self.classes.iter().cloned().collect(),
        }
    }

    /// Serialize a live document into a stored pointer. The target must be
    /// reachable from `session`: cached there or present in its snapshot.
    pub fn reference(
        &self,
        session: Option<&Session>,
        owners: Owners<'_>,
        target: &Document,
    ) -> Result<RefPayload> {
        let session = session.ok_or_else(|| StoreError::NoSession {
            owners: owners.clean_repr(),
            reference: target.label(),
        })?;

        let class = target.class();
        if !self.allows(class.name()) {
            return Err(self.wrong_class(owners, target.label(), class.name()));
        }
        if !session.is_in(target) {
            return Err(StoreError::NotInSession {
                owners: owners.clean_repr(),
                reference: target.label(),
            });
        }
        target.ref_payload()
    }

    /// Resolve a stored pointer to the live document in `session`.
    pub fn dereference(
        &self,
        session: Option<&Session>,
        owners: Owners<'_>,
        payload: &RefPayload,
    ) -> Result<Document> {
        let session = session.ok_or_else(|| StoreError::NoSession {
            owners: owners.clean_repr(),
            reference: payload.to_string(),
        })?;

        if !self.allows(&payload.class) {
            return Err(self.wrong_class(owners, payload.to_string(), &payload.class));
        }
        let class = session.registry().get(&payload.class).ok_or_else(|| {
            StoreError::Definition(format!("model {} is not registered", payload.class))
        })?;

        let mut query = session.query(class);
        for (key, uuid) in &payload.ancestors {
            query = query.pin(key, uuid);
        }
        match query.get(&payload.uuid) {
            Err(StoreError::NoObjectFound { .. }) => Err(StoreError::NotInSession {
                owners: owners.clean_repr(),
                reference: payload.to_string(),
            }),
            other => other,
        }
    }
}

/// Stored form of a reference: class name, identifier and the identifiers
/// of the target's owners (`<parent>_uuid`), for inline targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefPayload {
    #[serde(rename = "clsname")]
    pub class: String,
    pub uuid: String,
    #[serde(flatten)]
    pub ancestors: BTreeMap<String, String>,
}

impl RefPayload {
    /// Read a payload that already passed [`payload_rule`].
    pub fn from_stored(value: &Value) -> Result<Self> {
        Ok(serde_yaml::from_value(value.clone())?)
    }

    pub fn to_stored(&self) -> Result<Value> {
        Ok(serde_yaml::to_value(self)?)
    }
}

impl fmt::Display for RefPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} uuid={}", self.class, self.uuid)
    }
}

/// Validation rule of a stored payload. Ancestor identifiers pass as extra keys.
pub fn payload_rule() -> ObjectRule {
    ObjectRule {
        keys: vec![
            KeyRule {
                name: CLASS_KEY.to_string(),
                marker: Marker::Required,
                default: None,
                rule: Rule::Primitive(Primitive::String),
            },
            KeyRule {
                name: UUID_KEY.to_string(),
                marker: Marker::Required,
                default: None,
                rule: Rule::Primitive(Primitive::Uuid),
            },
        ],
        allow_extra: true,
    }
}

/// Live value of a reference field.
#[derive(Debug, Clone)]
pub enum Reference {
    Resolved(Document),
    /// Loaded without a session; dereferenced on demand.
    Pending(RefPayload),
}

impl Reference {
    pub fn payload(&self) -> Result<RefPayload> {
        match self {
            Reference::Resolved(doc) => doc.ref_payload(),
            Reference::Pending(payload) => Ok(payload.clone()),
        }
    }

    pub fn document(&self) -> Option<&Document> {
        match self {
            Reference::Resolved(doc) => Some(doc),
            Reference::Pending(_) => None,
        }
    }

    /// Resolve a pending reference against `session`.
    pub fn resolve(
        &self,
        spec: &RefSpec,
        session: Option<&Session>,
        owners: Owners<'_>,
    ) -> Result<Document> {
        match self {
            Reference::Resolved(doc) => Ok(doc.clone()),
            Reference::Pending(payload) => spec.dereference(session, owners, payload),
        }
    }
}
