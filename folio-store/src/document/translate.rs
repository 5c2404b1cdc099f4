// Schema-driven translation between stored (YAML) and live values.

use super::{Document, Value};
use crate::error::{Result, StoreError};
use crate::external_file::ExternalFile;
use crate::owners::Owners;
use crate::reference::{RefPayload, RefSpec, Reference};
use crate::schema::{FieldKind, Schema};
use crate::session::Session;
use serde_yaml::Mapping;
use std::collections::BTreeMap;

pub(crate) struct LoadCx<'s, 'o> {
    pub session: Option<&'s Session>,
    pub owners: Owners<'o>,
}

pub(crate) struct DumpCx<'s, 'o> {
    pub session: Option<&'s Session>,
    pub owners: Owners<'o>,
    /// Queue commit actions for attached files.
    pub persist: bool,
    /// Check reference targets against the session.
    pub verify_refs: bool,
}

impl<'s> DumpCx<'s, '_> {
    fn under<'p>(&self, owners: Owners<'p>) -> DumpCx<'s, 'p> {
        DumpCx {
            session: self.session,
            owners,
            persist: self.persist,
            verify_refs: self.verify_refs,
        }
    }
}

pub(crate) fn load_map(
    schema: &Schema,
    stored: &serde_yaml::Value,
    cx: &LoadCx<'_, '_>,
) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    let Some(mapping) = stored.as_mapping() else {
        return Ok(out);
    };
    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            continue;
        };
        let value = match schema.get(key) {
            Some(spec) => load_value(&spec.kind, value, cx)?,
            None => Value::from_plain(value),
        };
        out.insert(key.to_string(), value);
    }
    Ok(out)
}

pub(crate) fn load_value(
    kind: &FieldKind,
    stored: &serde_yaml::Value,
    cx: &LoadCx<'_, '_>,
) -> Result<Value> {
    match kind {
        FieldKind::Primitive(_) => Ok(Value::from_plain(stored)),
        FieldKind::Object(schema) => Ok(Value::Map(load_map(schema, stored, cx)?)),
        FieldKind::List(item) => match stored.as_sequence() {
            Some(items) => items
                .iter()
                .map(|v| load_value(item, v, cx))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            None => Ok(Value::from_plain(stored)),
        },
        FieldKind::Document(class) => {
            let doc = Document::empty(class);
            let data = cx.owners.with(&doc, |owners| {
                load_map(
                    class.schema().declared(),
                    stored,
                    &LoadCx {
                        session: cx.session,
                        owners,
                    },
                )
            })?;
            doc.replace_data(data);
            Ok(Value::Document(doc))
        }
        FieldKind::Ref(spec) => {
            let payload = RefPayload::from_stored(stored)?;
            let reference = match cx.session {
                Some(_) => Reference::Resolved(spec.dereference(cx.session, cx.owners, &payload)?),
                None => Reference::Pending(payload),
            };
            Ok(Value::Reference(reference))
        }
        FieldKind::File => Ok(Value::File(ExternalFile::load(stored, cx.owners)?)),
    }
}

pub(crate) fn dump_map(
    schema: &Schema,
    data: &BTreeMap<String, Value>,
    cx: &DumpCx<'_, '_>,
) -> Result<serde_yaml::Value> {
    let mut out = Mapping::new();
    for (key, value) in data {
        let stored = match schema.get(key) {
            Some(spec) => dump_value(&spec.kind, value, cx)?,
            None => plain(value, cx)?,
        };
        out.insert(key.clone().into(), stored);
    }
    Ok(serde_yaml::Value::Mapping(out))
}

pub(crate) fn dump_value(
    kind: &FieldKind,
    value: &Value,
    cx: &DumpCx<'_, '_>,
) -> Result<serde_yaml::Value> {
    match (kind, value) {
        (FieldKind::Object(schema), Value::Map(map)) => dump_map(schema, map, cx),
        (FieldKind::List(item), Value::List(items)) => items
            .iter()
            .map(|v| dump_value(item, v, cx))
            .collect::<Result<Vec<_>>>()
            .map(serde_yaml::Value::Sequence),
        (FieldKind::Document(class), Value::Document(doc)) => {
            let found = doc.class();
            if found.name() != class.name() {
                return Err(StoreError::Invalid {
                    document: cx.owners.clean_repr(),
                    message: format!(
                        "expected {} document, got {}",
                        class.name(),
                        found.name()
                    ),
                });
            }
            dump_document(doc, cx)
        }
        (FieldKind::Ref(spec), Value::Reference(reference)) => dump_ref(spec, reference, cx),
        (FieldKind::Ref(spec), Value::Document(doc)) => {
            dump_ref(spec, &Reference::Resolved(doc.clone()), cx)
        }
        (FieldKind::File, Value::File(file)) => file.dump(cx.session, cx.owners, cx.persist),
        (_, other) => plain(other, cx),
    }
}

/// Dump a document's own fields with it pushed as the innermost owner.
pub(crate) fn dump_document(doc: &Document, cx: &DumpCx<'_, '_>) -> Result<serde_yaml::Value> {
    let class = doc.class();
    cx.owners.with(doc, |owners| {
        let state = doc.0.borrow();
        dump_map(class.schema().declared(), &state.data, &cx.under(owners))
    })
}

fn dump_ref(spec: &RefSpec, reference: &Reference, cx: &DumpCx<'_, '_>) -> Result<serde_yaml::Value> {
    let payload = if cx.verify_refs {
        let target = reference.resolve(spec, cx.session, cx.owners)?;
        spec.reference(cx.session, cx.owners, &target)?
    } else {
        reference.payload()?
    };
    payload.to_stored()
}

fn plain(value: &Value, cx: &DumpCx<'_, '_>) -> Result<serde_yaml::Value> {
    value.to_plain().ok_or_else(|| StoreError::Invalid {
        document: cx.owners.clean_repr(),
        message: format!("unexpected {} value", value.type_name()),
    })
}
