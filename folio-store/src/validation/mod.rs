use crate::identity;
use crate::schema::{DefaultValue, Marker, Primitive};
use serde_yaml::{Mapping, Value};
use std::rc::Rc;

/// Compiled validation rule. Sub-documents, references and attached files
/// have already been replaced by the object rule of their stored form.
#[derive(Debug, Clone)]
pub enum Rule {
    Primitive(Primitive),
    Object(Rc<ObjectRule>),
    List(Box<Rule>),
}

#[derive(Debug, Clone, Default)]
pub struct ObjectRule {
    pub keys: Vec<KeyRule>,
    pub allow_extra: bool,
}

#[derive(Debug, Clone)]
pub struct KeyRule {
    pub name: String,
    pub marker: Marker,
    pub default: Option<DefaultValue>,
    pub rule: Rule,
}

impl ObjectRule {
    fn key(&self, name: &str) -> Option<&KeyRule> {
        self.keys.iter().find(|k| k.name == name)
    }
}

/// Result of validating a stored document.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub value: Value,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// The normalized value, or every issue joined into one message.
    pub fn into_result(self) -> std::result::Result<Value, String> {
        if self.errors.is_empty() {
            Ok(self.value)
        } else {
            Err(self.errors.join("; "))
        }
    }
}

/// Validate a stored mapping against an object rule.
/// Missing keys with a default are filled in; the normalized mapping is
/// returned alongside every issue found.
pub fn validate_document(rule: &ObjectRule, data: &Value) -> ValidationResult {
    let mut errors = Vec::new();
    let value = check_object(rule, data, "data", &mut errors);
    ValidationResult { value, errors }
}

/// Validate a single value, e.g. a freshly produced default.
pub fn validate_value(rule: &Rule, data: &Value) -> ValidationResult {
    let mut errors = Vec::new();
    let value = check(rule, data, "data", &mut errors);
    ValidationResult { value, errors }
}

fn check(rule: &Rule, value: &Value, at: &str, errors: &mut Vec<String>) -> Value {
    match rule {
        Rule::Primitive(primitive) => {
            if let Some(issue) = check_primitive(primitive, value) {
                errors.push(format!("{issue} @ {at}"));
            }
            value.clone()
        }
        Rule::Object(object) => check_object(object, value, at, errors),
        Rule::List(item) => match value.as_sequence() {
            Some(items) => Value::Sequence(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, v)| check(item, v, &format!("{at}[{idx}]"), errors))
                    .collect(),
            ),
            None => {
                errors.push(format!("expected a list, got {} @ {at}", type_name(value)));
                value.clone()
            }
        },
    }
}

fn check_object(rule: &ObjectRule, value: &Value, at: &str, errors: &mut Vec<String>) -> Value {
    let mapping = match value.as_mapping() {
        Some(m) => m,
        None => {
            errors.push(format!(
                "expected a dictionary, got {} @ {at}",
                type_name(value)
            ));
            return value.clone();
        }
    };

    let mut out = Mapping::new();
    for key in &rule.keys {
        let name = Value::String(key.name.clone());
        let here = format!("{at}['{}']", key.name);
        match (mapping.get(&name), &key.default) {
            (Some(v), _) => {
                out.insert(name, check(&key.rule, v, &here, errors));
            }
            (None, Some(default)) => {
                let produced = default.produce();
                out.insert(name, check(&key.rule, &produced, &here, errors));
            }
            (None, None) => {
                if key.marker == Marker::Required {
                    errors.push(format!("required key not provided @ {here}"));
                }
            }
        }
    }

    for (key, v) in mapping {
        let declared = key.as_str().and_then(|k| rule.key(k)).is_some();
        if declared {
            continue;
        }
        if rule.allow_extra {
            out.insert(key.clone(), v.clone());
        } else {
            errors.push(format!(
                "extra keys not allowed @ {at}[{}]",
                display_key(key)
            ));
        }
    }

    Value::Mapping(out)
}

fn check_primitive(primitive: &Primitive, value: &Value) -> Option<String> {
    let ok = match primitive {
        Primitive::String => value.is_string(),
        Primitive::Integer => value.is_i64() || value.is_u64(),
        Primitive::Float => value.is_number(),
        Primitive::Boolean => value.is_bool(),
        Primitive::Uuid => {
            return match value.as_str() {
                Some(s) if identity::is_uuid(s) => None,
                Some(s) => Some(format!("invalid uuid format '{s}'")),
                None => Some(format!("uuid must be a string, got {}", type_name(value))),
            };
        }
        Primitive::Email => {
            return match value.as_str() {
                Some(s) if is_email(s) => None,
                _ => Some("expected an email address".to_string()),
            };
        }
        Primitive::OneOf(allowed) => {
            return match value.as_str() {
                Some(s) if allowed.iter().any(|a| a == s) => None,
                _ => Some(format!("value must be one of {}", allowed.join(", "))),
            };
        }
        Primitive::Any => true,
    };

    if ok {
        None
    } else {
        Some(format!(
            "expected {}, got {}",
            primitive_name(primitive),
            type_name(value)
        ))
    }
}

fn is_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && domain.split('.').all(|part| !part.is_empty())
        }
        None => false,
    }
}

fn primitive_name(primitive: &Primitive) -> &'static str {
    match primitive {
        Primitive::String => "str",
        Primitive::Integer => "int",
        Primitive::Float => "float",
        Primitive::Boolean => "bool",
        Primitive::Uuid => "uuid",
        Primitive::Email => "email",
        Primitive::OneOf(_) => "str",
        Primitive::Any => "any",
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "dict",
        Value::Tagged(_) => "tagged",
    }
}

fn display_key(key: &Value) -> String {
    match key {
        Value::String(s) => format!("'{s}'"),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| "?".to_string()),
    }
}
