use super::types::{DefaultValue, FieldKind, Marker, Schema};
use crate::error::{Result, StoreError};
use crate::validation::{self, KeyRule, ObjectRule, Rule, ValidationResult};
use crate::{external_file, reference};
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

/// Marker, type and writability of one flattened field path.
#[derive(Debug, Clone)]
pub struct KeyInfo {
    pub marker: Marker,
    pub kind: FieldKind,
    pub read_only: bool,
}

/// A schema ready for use: the validation rule plus flat indexes of
/// field path -> (marker, type) and field path -> default.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    declared: Schema,
    rule: Rc<ObjectRule>,
    key_info: BTreeMap<String, KeyInfo>,
    defaults: BTreeMap<String, DefaultValue>,
}

impl CompiledSchema {
    pub fn declared(&self) -> &Schema {
        &self.declared
    }

    pub fn rule(&self) -> &Rc<ObjectRule> {
        &self.rule
    }

    pub fn key_info(&self, path: &str) -> Option<&KeyInfo> {
        self.key_info.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.key_info.keys().map(String::as_str)
    }

    pub fn defaults(&self) -> &BTreeMap<String, DefaultValue> {
        &self.defaults
    }

    pub fn default_for(&self, path: &str) -> Option<&DefaultValue> {
        self.defaults.get(path)
    }

    pub fn validate(&self, data: &serde_yaml::Value) -> ValidationResult {
        validation::validate_document(&self.rule, data)
    }
}

/// Compile a declared schema. Deterministic and side-effect free; only
/// malformed declarations fail here, data is checked at validation time.
pub fn compile(schema: &Schema) -> Result<CompiledSchema> {
    let rule = Rc::new(object_rule(schema, None)?);

    let mut key_info = BTreeMap::new();
    let mut defaults = BTreeMap::new();
    index(schema, None, false, &mut key_info, &mut defaults);

    Ok(CompiledSchema {
        declared: schema.clone(),
        rule,
        key_info,
        defaults,
    })
}

/// Validation rule for values of the given kind.
pub(crate) fn kind_rule(kind: &FieldKind, at: &str) -> Result<Rule> {
    Ok(match kind {
        FieldKind::Primitive(primitive) => Rule::Primitive(primitive.clone()),
        FieldKind::Object(schema) => Rule::Object(Rc::new(object_rule(schema, Some(at))?)),
        FieldKind::List(item) => Rule::List(Box::new(kind_rule(item, at)?)),
        FieldKind::Document(class) => Rule::Object(Rc::clone(class.schema().rule())),
        FieldKind::Ref(_) => Rule::Object(Rc::new(reference::payload_rule())),
        FieldKind::File => Rule::Object(Rc::new(external_file::stored_rule())),
    })
}

fn object_rule(schema: &Schema, prefix: Option<&str>) -> Result<ObjectRule> {
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(schema.fields.len());

    for field in &schema.fields {
        let path = join(prefix, &field.name);
        if field.name.is_empty() || field.name.contains('.') {
            return Err(StoreError::Definition(format!(
                "invalid field name '{path}'"
            )));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(StoreError::Definition(format!(
                "duplicate field path '{path}'"
            )));
        }
        keys.push(KeyRule {
            name: field.name.clone(),
            marker: field.marker,
            default: field.default.clone(),
            rule: kind_rule(&field.kind, &path)?,
        });
    }

    Ok(ObjectRule {
        keys,
        allow_extra: false,
    })
}

fn index(
    schema: &Schema,
    prefix: Option<&str>,
    read_only: bool,
    key_info: &mut BTreeMap<String, KeyInfo>,
    defaults: &mut BTreeMap<String, DefaultValue>,
) {
    for field in &schema.fields {
        let path = join(prefix, &field.name);
        if let Some(default) = &field.default {
            defaults.insert(path.clone(), default.clone());
        }
        let read_only = read_only || field.read_only;
        key_info.insert(
            path.clone(),
            KeyInfo {
                marker: field.marker,
                kind: field.kind.clone(),
                read_only,
            },
        );
        if let FieldKind::Object(nested) = &field.kind {
            index(nested, Some(&path), read_only, key_info, defaults);
        }
    }
}

fn join(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) => format!("{p}.{name}"),
        None => name.to_string(),
    }
}
